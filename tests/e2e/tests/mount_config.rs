//! Mount configuration tests
//!
//! Tests configuration handling at initialization:
//! - Defaults and overrides
//! - Unknown and malformed directives
//! - Unusable client configuration or volume
//! - Legacy directive namespace
//! - Shutdown behaviour


use anyhow::Result;
use cephfs_oss::config::Variant;
use cephfs_oss::error::OssError;
use cephfs_oss::layout::OpenEnv;
use cephfs_oss::plugin::{StorageHandle, StorageSystem};
use common::*;

// =============================================================================
// Initialization
// =============================================================================

#[test]
fn test_init_is_idempotent() -> Result<()> {
    let harness = TestHarness::with_config(|b| b.id("e2e-client").loglevel("debug"))?;

    harness.oss().init(harness.config_path())?;
    assert!(harness.oss().manager().is_live());
    let conn = harness.oss().manager().connection()?;
    assert_eq!(conn.config().id, "e2e-client");
    assert_eq!(conn.config().logging.level, "debug");

    harness.cleanup()
}

#[test]
fn test_unknown_directive_is_fatal() -> Result<()> {
    let harness = TestHarness::prepare(|b| b.line("cephfs.volumes /elsewhere"))?;

    let err = harness.oss().init(harness.config_path()).unwrap_err();
    assert!(matches!(err, OssError::Config(_)), "{:?}", err);
    assert_eq!(err.retc(), -libc::EINVAL);
    assert!(!harness.oss().manager().is_live());
    assert_retc(&harness.oss().stat("/"), -libc::ENOTCONN);

    harness.cleanup()
}

#[test]
fn test_directive_without_value() -> Result<()> {
    let harness = TestHarness::prepare(|b| b.line("cephfs.id"))?;
    assert!(harness.oss().init(harness.config_path()).is_err());
    harness.cleanup()
}

#[test]
fn test_missing_client_config() -> Result<()> {
    let harness = TestHarness::prepare(|b| b.ceph_config("/nonexistent/ceph.conf"))?;

    let err = harness.oss().init(harness.config_path()).unwrap_err();
    assert!(matches!(err, OssError::Connection { .. }), "{:?}", err);
    assert!(!harness.oss().manager().is_live());

    harness.cleanup()
}

#[test]
fn test_missing_volume() -> Result<()> {
    let harness = TestHarness::prepare(|b| b)?;
    std::fs::remove_dir(harness.backing())?;

    let err = harness.oss().init(harness.config_path()).unwrap_err();
    assert_eq!(err.retc(), -libc::ENOENT);

    // the volume appears and a retry succeeds
    std::fs::create_dir(harness.backing())?;
    harness.oss().init(harness.config_path())?;
    assert!(harness.oss().manager().is_live());

    harness.cleanup()
}

#[test]
fn test_environment_substitution() -> Result<()> {
    std::env::set_var("CEPHFS_OSS_E2E_ID", "from-env");
    let harness = TestHarness::with_config(|b| b.id("${CEPHFS_OSS_E2E_ID}"))?;

    let conn = harness.oss().manager().connection()?;
    assert_eq!(conn.config().id, "from-env");
    std::env::remove_var("CEPHFS_OSS_E2E_ID");

    harness.cleanup()
}

// =============================================================================
// Legacy namespace
// =============================================================================

#[test]
fn test_legacy_variant() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.variant(Variant::Legacy)
            .line("cephfs.aio.workers not-a-number")
    })?;

    // current-namespace directives are someone else's business here
    put(&harness, "/legacy", b"sync only")?;
    assert_eq!(get(&harness, "/legacy")?, b"sync only");

    let file = harness.oss().new_file("e2e")?;
    file.open("/legacy", libc::O_RDONLY, 0, &OpenEnv::new())?;
    let (done, _rx) = cephfs_oss::aio::completion();
    let result = file.read_aio(cephfs_oss::aio::Aio::read(0, 4), done);
    assert_retc(&result, -libc::ENOTSUP);
    file.close()?;

    harness.cleanup()
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_shutdown_refuses_new_work() -> Result<()> {
    let harness = TestHarness::new()?;
    put(&harness, "/before", b"x")?;

    let file = harness.oss().new_file("e2e")?;
    file.open("/before", libc::O_RDONLY, 0, &OpenEnv::new())?;

    harness.oss().manager().shutdown();
    harness.oss().manager().shutdown();

    assert_retc(&harness.oss().stat("/before"), -libc::ESHUTDOWN);
    let mut buf = [0u8; 1];
    assert_retc(&file.read(&mut buf, 0), -libc::ESHUTDOWN);
    file.close()?;

    // nothing was lost on the backing volume
    assert_file_content(&harness.backing().join("before"), b"x");

    harness.cleanup()
}
