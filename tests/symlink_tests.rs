//! Symlink operations: readlink across layers, creation, lstat, and bounded
//! resolution with loop detection.

mod common;

use common::{read, seed, two_layers};
use strata::testing::MemBackend;
use strata::{Backend, UnionFs};

#[test]
fn test_readlink_from_lower_layer() {
    let ro = MemBackend::new();
    seed(&ro, "/target.txt", "data");
    ro.symlink("/target.txt", "/link").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    assert_eq!(fs.readlink("/link").unwrap(), "/target.txt");
    assert_eq!(fs.readlink_if_possible("/link").unwrap(), "/target.txt");
}

#[test]
fn test_readlink_missing_and_non_link() {
    let ro = MemBackend::new();
    seed(&ro, "/plain.txt", "x");
    let (fs, _) = two_layers(ro);

    assert!(fs.readlink("/ghost").unwrap_err().is_not_found());
    assert!(fs.readlink("/plain.txt").unwrap_err().is_invalid());
}

/// A whiteout hides a lower-layer symlink like any other entry.
#[test]
fn test_whiteout_hides_symlink() {
    let ro = MemBackend::new();
    seed(&ro, "/target.txt", "data");
    ro.symlink("/target.txt", "/link").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    fs.remove("/link").unwrap();

    assert!(fs.readlink("/link").unwrap_err().is_not_found());
    assert!(fs.lstat("/link").unwrap_err().is_not_found());
}

#[test]
fn test_symlink_creates_in_writable_layer() {
    let ro = MemBackend::new();
    seed(&ro, "/data.txt", "payload");
    let (fs, wl) = two_layers(ro);

    fs.symlink("/data.txt", "/alias").unwrap();

    assert_eq!(fs.readlink("/alias").unwrap(), "/data.txt");
    assert!(wl.contains("/alias"));
    assert!(fs.lstat("/alias").unwrap().is_symlink);
}

/// A cached negative lookup must not outlive symlink creation.
#[test]
fn test_symlink_clears_negative_cache_entry() {
    let ro = MemBackend::new();
    seed(&ro, "/data.txt", "payload");
    let wl = MemBackend::new();
    let fs = UnionFs::builder()
        .writable_layer(wl)
        .readonly_layer(ro)
        .stat_cache(true, std::time::Duration::from_secs(60))
        .build()
        .unwrap();

    assert!(fs.stat("/alias").unwrap_err().is_not_found());
    fs.symlink("/data.txt", "/alias").unwrap();
    assert!(fs.stat("/alias").is_ok());
}

#[test]
fn test_symlink_without_writable_layer() {
    let fs = UnionFs::builder()
        .readonly_layer(MemBackend::new())
        .build()
        .unwrap();
    assert!(matches!(
        fs.symlink("/t", "/l").unwrap_err(),
        strata::StrataError::NoWritableLayer
    ));
}

#[test]
fn test_lstat_does_not_follow() {
    let ro = MemBackend::new();
    seed(&ro, "/target.txt", "data");
    ro.symlink("/target.txt", "/link").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    let (info, used_lstat) = fs.lstat_if_possible("/link").unwrap();
    assert!(used_lstat);
    assert!(info.is_symlink);
}

#[test]
fn test_resolve_chain_to_file() {
    let ro = MemBackend::new();
    seed(&ro, "/real/file.txt", "content");
    ro.symlink("/real/file.txt", "/one").unwrap().unwrap();
    ro.symlink("/one", "/two").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    let resolved = fs.resolve("/two").unwrap();
    assert_eq!(resolved, "/real/file.txt");
    assert_eq!(read(&fs, &resolved), "content");
}

#[test]
fn test_resolve_relative_target() {
    let ro = MemBackend::new();
    seed(&ro, "/dir/file.txt", "content");
    ro.symlink("file.txt", "/dir/link").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    assert_eq!(fs.resolve("/dir/link").unwrap(), "/dir/file.txt");
}

#[test]
fn test_resolve_non_link_is_identity() {
    let ro = MemBackend::new();
    seed(&ro, "/plain.txt", "x");
    let (fs, _) = two_layers(ro);

    assert_eq!(fs.resolve("/plain.txt").unwrap(), "/plain.txt");
}

#[test]
fn test_resolve_two_link_loop() {
    let ro = MemBackend::new();
    ro.symlink("/b", "/a").unwrap().unwrap();
    ro.symlink("/a", "/b").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    assert!(fs.resolve("/a").unwrap_err().is_invalid());
}

#[test]
fn test_resolve_self_loop() {
    let ro = MemBackend::new();
    ro.symlink("/me", "/me").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    assert!(fs.resolve("/me").unwrap_err().is_invalid());
}

/// A target under an already-visited path counts as a loop; this is
/// deliberately conservative.
#[test]
fn test_resolve_target_under_visited_ancestor() {
    let ro = MemBackend::new();
    ro.mkdir_all("/dir", 0o755).unwrap();
    ro.symlink("/dir/link/sub", "/dir/link").unwrap().unwrap();
    let (fs, _) = two_layers(ro);

    assert!(fs.resolve("/dir/link").unwrap_err().is_invalid());
}

#[test]
fn test_resolve_depth_limit() {
    let ro = MemBackend::new();
    seed(&ro, "/end.txt", "x");

    // A 39-hop chain resolves; one more hop exhausts the budget.
    ro.symlink("/end.txt", "/l1").unwrap().unwrap();
    for i in 2..=40 {
        ro.symlink(&format!("/l{}", i - 1), &format!("/l{}", i))
            .unwrap()
            .unwrap();
    }
    let (fs, _) = two_layers(ro);

    assert_eq!(fs.resolve("/l39").unwrap(), "/end.txt");
    assert!(fs.resolve("/l40").unwrap_err().is_invalid());
}

#[test]
fn test_lchown_on_writable_symlink() {
    let ro = MemBackend::new();
    seed(&ro, "/data.txt", "payload");
    let (fs, _) = two_layers(ro);

    fs.symlink("/data.txt", "/alias").unwrap();
    fs.lchown("/alias", 1000, 1000).unwrap();

    // The link itself was touched, not its target.
    assert!(fs.lstat("/alias").unwrap().is_symlink);
    assert_eq!(read(&fs, "/data.txt"), "payload");
}

#[test]
fn test_lchown_copies_up_lower_file() {
    let ro = MemBackend::new();
    seed(&ro, "/owned.txt", "body");
    let (fs, wl) = two_layers(ro);

    fs.lchown("/owned.txt", 42, 42).unwrap();

    assert!(wl.contains("/owned.txt"));
    assert_eq!(wl.read_file("/owned.txt").unwrap(), b"body");
}
