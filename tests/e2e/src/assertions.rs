//! Assertions for e2e tests
//!
//! Volume checks look at the backing directory directly, bypassing the
//! adapter, to verify what it left behind. Return-code checks verify what
//! the host would see.

use cephfs_oss::error::retc;
use cephfs_oss::Result as OssResult;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn backing_metadata(path: &Path) -> fs::Metadata {
    fs::metadata(path).unwrap_or_else(|e| panic!("volume entry {:?} unreadable: {}", path, e))
}

/// The volume holds a regular file at `path`
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "no regular file on the volume at {:?}", path);
}

/// Nothing is left on the volume at `path`
pub fn assert_not_exists(path: &Path) {
    assert!(!path.exists(), "volume still has an entry at {:?}", path);
}

/// The volume holds a directory at `path`
pub fn assert_dir_exists(path: &Path) {
    assert!(path.is_dir(), "no directory on the volume at {:?}", path);
}

/// The bytes stored on the volume equal `expected`
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let stored = fs::read(path).unwrap_or_else(|e| panic!("volume file {:?} unreadable: {}", path, e));
    if stored != expected {
        let first_diff = stored
            .iter()
            .zip(expected)
            .position(|(a, b)| a != b)
            .unwrap_or(stored.len().min(expected.len()));
        panic!(
            "volume file {:?} holds {} bytes, wanted {}; first difference at byte {}",
            path,
            stored.len(),
            expected.len(),
            first_diff
        );
    }
}

/// The volume file at `path` is `size` bytes long
pub fn assert_file_size(path: &Path, size: u64) {
    let len = backing_metadata(path).len();
    assert_eq!(len, size, "size of volume file {:?}", path);
}

/// Listing the backing directory yields exactly `names`, in any order
pub fn assert_dir_contains_exactly(path: &Path, names: &[&str]) {
    let mut listed: Vec<String> = fs::read_dir(path)
        .unwrap_or_else(|e| panic!("volume directory {:?} unreadable: {}", path, e))
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    listed.sort();

    let mut wanted: Vec<&str> = names.to_vec();
    wanted.sort_unstable();
    assert_eq!(listed, wanted, "entries of volume directory {:?}", path);
}

/// Permission bits of the volume entry at `path`
pub fn assert_file_mode(path: &Path, mode: u32) {
    let perm = backing_metadata(path).permissions().mode() & 0o7777;
    assert_eq!(
        perm,
        mode & 0o7777,
        "mode of volume entry {:?}: {:o} != {:o}",
        path,
        perm,
        mode & 0o7777
    );
}

/// The host-visible return code of an adapter call
pub fn assert_retc<T>(result: &OssResult<T>, expected: i32) {
    let got = retc(result);
    assert_eq!(got, expected, "adapter returned retc={}, wanted {}", got, expected);
}

/// `size` random payload bytes
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// A volume-unique file name starting with `prefix`
pub fn random_filename(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}
