//! Test harness for e2e tests
//!
//! Provides a high-level API for setting up and tearing down test
//! environments.
//!
//! ```ignore
//! let harness = TestHarness::with_config(|b| b.aio_workers(2))?;
//! // ... test code ...
//! harness.cleanup()?;
//! ```

use crate::config::{TestConfig, TestConfigBuilder};
use anyhow::{Context, Result};
use cephfs_oss::adapter::CephAdapter;
use cephfs_oss::client::local::LocalFactory;
use cephfs_oss::mount::MountManager;
use cephfs_oss::plugin::StorageSystem;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Initialize logging for tests (call once per test run)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// One adapter mounted over a temporary volume directory
pub struct TestHarness {
    temp_dir: TempDir,
    config: TestConfig,
    config_path: PathBuf,
    oss: CephAdapter,
}

impl TestHarness {
    /// Harness with the default configuration, already initialized
    pub fn new() -> Result<Self> {
        Self::with_config(|builder| builder)
    }

    /// Harness whose configuration is adjusted by `f`, already initialized
    pub fn with_config<F>(f: F) -> Result<Self>
    where
        F: FnOnce(TestConfigBuilder) -> TestConfigBuilder,
    {
        let harness = Self::prepare(f)?;
        harness
            .oss
            .init(&harness.config_path)
            .context("Failed to initialize adapter")?;
        info!("adapter mounted over {:?}", harness.backing());
        Ok(harness)
    }

    /// Harness with configuration files in place but not initialized
    pub fn prepare<F>(f: F) -> Result<Self>
    where
        F: FnOnce(TestConfigBuilder) -> TestConfigBuilder,
    {
        init_logging();

        let temp_dir = TempDir::new().context("Failed to create temp dir")?;
        let volume = temp_dir.path().join("volume");
        fs::create_dir(&volume)?;
        let ceph_config = temp_dir.path().join("ceph.conf");
        fs::write(&ceph_config, "[global]\n")?;

        let config = f(TestConfigBuilder::new(&ceph_config, &volume)).build();
        let config_path = temp_dir.path().join("xrootd.cfg");
        config.write_to(&config_path)?;
        debug!("wrote {:?}", config_path);

        let manager = MountManager::new(Arc::new(LocalFactory), config.variant)
            .without_signal_handlers();
        let oss = CephAdapter::new(Arc::new(manager));

        Ok(Self {
            temp_dir,
            config,
            config_path,
            oss,
        })
    }

    /// The adapter under test
    pub fn oss(&self) -> &CephAdapter {
        &self.oss
    }

    /// Host directory backing the adapter's root
    pub fn backing(&self) -> &Path {
        &self.config.volume
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Scratch space outside the volume
    pub fn scratch(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Shut the adapter down and remove the temporary files
    pub fn cleanup(self) -> Result<()> {
        self.oss.manager().shutdown();
        drop(self.oss);
        self.temp_dir.close()?;
        Ok(())
    }
}
