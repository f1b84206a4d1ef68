//! File and directory operations against a real volume directory


use anyhow::Result;
use cephfs_oss::layout::OpenEnv;
use cephfs_oss::plugin::{CreateOptions, StorageHandle, StorageSystem, XRDOSS_MKPATH, XRDOSS_NEW};
use common::*;

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_write_then_read_back() -> Result<()> {
    let harness = TestHarness::new()?;
    let name = random_filename("data");
    let path = format!("/{}", name);
    let content = random_bytes(300 * 1024);

    put(&harness, &path, &content)?;
    assert_file_content(&harness.backing().join(&name), &content);
    assert_eq!(get(&harness, &path)?, content);

    harness.cleanup()
}

#[test]
fn test_create_empty_file() -> Result<()> {
    let harness = TestHarness::new()?;
    let oss = harness.oss();

    oss.create("e2e", "/empty", 0o640, &OpenEnv::new(), CreateOptions::default())?;
    let target = harness.backing().join("empty");
    assert_file_exists(&target);
    assert_file_size(&target, 0);

    let opts = CreateOptions::from_bits(XRDOSS_NEW);
    assert_retc(
        &oss.create("e2e", "/empty", 0o640, &OpenEnv::new(), opts),
        -libc::EEXIST,
    );

    harness.cleanup()
}

#[test]
fn test_create_with_mkpath() -> Result<()> {
    let harness = TestHarness::new()?;
    let oss = harness.oss();
    let opts = CreateOptions::from_bits(XRDOSS_MKPATH | XRDOSS_NEW);

    oss.create("e2e", "/a/b/c/file", 0o750, &OpenEnv::new(), opts)?;
    assert_dir_exists(&harness.backing().join("a/b/c"));
    assert_file_mode(&harness.backing().join("a/b"), 0o750);
    assert_file_exists(&harness.backing().join("a/b/c/file"));

    // second file in the now existing directory
    oss.create("e2e", "/a/b/c/other", 0o750, &OpenEnv::new(), opts)?;
    assert_dir_contains_exactly(&harness.backing().join("a/b/c"), &["file", "other"]);

    harness.cleanup()
}

#[test]
fn test_create_over_directory() -> Result<()> {
    let harness = TestHarness::new()?;
    std::fs::create_dir(harness.backing().join("dir"))?;

    let result = harness.oss().create(
        "e2e",
        "/dir",
        0o644,
        &OpenEnv::new(),
        CreateOptions::default(),
    );
    assert_retc(&result, -libc::EISDIR);

    harness.cleanup()
}

#[test]
fn test_truncate_chmod_rename_unlink() -> Result<()> {
    let harness = TestHarness::new()?;
    let oss = harness.oss();
    put(&harness, "/f", b"0123456789")?;

    oss.truncate("/f", 4)?;
    assert_file_content(&harness.backing().join("f"), b"0123");

    oss.chmod("/f", 0o600)?;
    assert_file_mode(&harness.backing().join("f"), 0o600);
    assert_eq!(oss.stat("/f")?.perm(), 0o600);

    oss.rename("/f", "/g")?;
    assert_not_exists(&harness.backing().join("f"));
    assert_file_exists(&harness.backing().join("g"));

    oss.unlink("/g")?;
    assert_not_exists(&harness.backing().join("g"));
    assert_retc(&oss.unlink("/g"), -libc::ENOENT);

    harness.cleanup()
}

#[test]
fn test_fstat_and_fsync() -> Result<()> {
    let harness = TestHarness::new()?;
    let file = harness.oss().new_file("e2e")?;
    file.open("/synced", RW_CREATE, 0o644, &OpenEnv::new())?;
    file.write(b"durable", 0)?;
    file.fsync()?;

    let st = file.fstat()?;
    assert_eq!(st.size, 7);
    assert!(st.is_file());
    assert!(file.fd().is_some());
    file.close()?;
    assert!(file.fd().is_none());

    harness.cleanup()
}

#[test]
fn test_open_missing_file() -> Result<()> {
    let harness = TestHarness::new()?;
    let file = harness.oss().new_file("e2e")?;
    let result = file.open("/missing", libc::O_RDONLY, 0, &OpenEnv::new());
    assert_retc(&result, -libc::ENOENT);

    let mut buf = [0u8; 8];
    assert_retc(&file.read(&mut buf, 0), -8004);

    harness.cleanup()
}

#[test]
fn test_paths_cannot_escape_volume() -> Result<()> {
    let harness = TestHarness::new()?;
    std::fs::write(harness.scratch().join("outside"), b"secret")?;

    assert_retc(&harness.oss().stat("/../outside"), -libc::EACCES);

    harness.cleanup()
}

// =============================================================================
// Directories
// =============================================================================

#[test]
fn test_mkdir_and_remdir() -> Result<()> {
    let harness = TestHarness::new()?;
    let oss = harness.oss();

    assert_retc(&oss.mkdir("/x/y", 0o755, false), -libc::ENOENT);
    oss.mkdir("/x/y", 0o755, true)?;
    assert_dir_exists(&harness.backing().join("x/y"));

    assert_retc(&oss.remdir("/x"), -libc::ENOTEMPTY);
    oss.remdir("/x/y")?;
    oss.remdir("/x")?;
    assert_not_exists(&harness.backing().join("x"));

    harness.cleanup()
}

#[test]
fn test_list_directory() -> Result<()> {
    let harness = TestHarness::new()?;
    let oss = harness.oss();
    oss.mkdir("/dir", 0o755, false)?;
    oss.mkdir("/dir/sub", 0o755, false)?;
    put(&harness, "/dir/one", b"1")?;
    put(&harness, "/dir/two", b"2")?;

    let names = list(&harness, "/dir")?;
    assert_eq!(&names[..2], &[".", ".."]);
    let mut rest = names[2..].to_vec();
    rest.sort();
    assert_eq!(rest, vec!["one", "sub", "two"]);

    assert_retc(&list(&harness, "/dir/one"), -libc::ENOTDIR);

    harness.cleanup()
}

#[test]
fn test_space_report() -> Result<()> {
    let harness = TestHarness::new()?;
    let report = harness.oss().stat_fs_report("/")?;
    assert!(report.valid);
    assert!(report.used_percent <= 100);

    let mut buf = [0u8; 256];
    let n = harness.oss().stat_fs("/", &mut buf)?;
    let text = std::str::from_utf8(&buf[..n])?;
    let fields: Vec<&str> = text.split(' ').collect();
    assert_eq!(fields.len(), 6);
    assert_eq!(fields[0], "1");
    assert_eq!(fields[..3], fields[3..]);

    harness.cleanup()
}
