//! Storage-system facade
//!
//! [`CephAdapter`] implements the path-level half of the plugin contract by
//! forwarding to the mounted client, and creates handles bound to the live
//! connection.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::client::{split_parent, FileStat, StatVfs};
use crate::config::Config;
use crate::error::{OssError, Result};
use crate::handle::{DirHandle, FileHandle};
use crate::layout::{LayoutHints, OpenEnv};
use crate::logging;
use crate::mount::{Connection, MountManager, Op};
use crate::plugin::{copy_cstr, CreateOptions, StorageHandle, StorageSystem};

/// Space usage of the filesystem holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFsReport {
    /// False when the client could not report usable numbers
    pub valid: bool,
    /// Bytes available to unprivileged users
    pub free_bytes: u64,
    /// Used share of the capacity, truncated to a whole percent
    pub used_percent: u32,
}

impl StatFsReport {
    pub fn from_statvfs(vfs: &StatVfs) -> Self {
        if vfs.frsize == 0 || vfs.blocks == 0 {
            return Self::default();
        }

        let total = vfs.blocks.saturating_mul(vfs.frsize);
        let free = vfs.bavail.saturating_mul(vfs.frsize);
        let used = total.saturating_sub(free) as f64 / total as f64 * 100.0;
        Self {
            valid: true,
            free_bytes: free,
            used_percent: used as u32,
        }
    }
}

impl fmt::Display for StatFsReport {
    /// The host expects the triple twice: once for the whole space, once
    /// for the largest contiguous part, which is the same thing here
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = u8::from(self.valid);
        write!(
            f,
            "{} {} {} {} {} {}",
            valid,
            self.free_bytes,
            self.used_percent,
            valid,
            self.free_bytes,
            self.used_percent
        )
    }
}

/// Path-level adapter over the process's mount
pub struct CephAdapter {
    manager: Arc<MountManager>,
}

impl CephAdapter {
    pub fn new(manager: Arc<MountManager>) -> Self {
        Self { manager }
    }

    /// Adapter over the process-wide mount manager
    pub fn global() -> Self {
        Self::new(MountManager::instance())
    }

    pub fn manager(&self) -> &Arc<MountManager> {
        &self.manager
    }

    /// Mount with an already parsed configuration
    pub fn init_with(&self, config: Config) -> Result<()> {
        self.manager.initialize_with(config)?;
        Ok(())
    }

    /// Space report for `path`. Client failures yield an invalid report.
    pub fn stat_fs_report(&self, path: &str) -> Result<StatFsReport> {
        let op = self.session()?;
        match op.statfs(path) {
            Ok(vfs) => Ok(StatFsReport::from_statvfs(&vfs)),
            Err(errno) => {
                debug!(path, "statfs failed: {}", errno);
                Ok(StatFsReport::default())
            }
        }
    }

    fn connection(&self) -> Result<Connection> {
        self.manager.connection()
    }

    fn session(&self) -> Result<Op> {
        self.connection()?.enter()
    }
}

impl StorageSystem for CephAdapter {
    fn init(&self, config_path: &Path) -> Result<()> {
        if self.manager.is_live() {
            debug!("already initialized");
            return Ok(());
        }

        let config = Config::from_file(config_path, self.manager.variant()).map_err(|e| {
            error!("failed to load {}: {}", config_path.display(), e);
            e
        })?;
        logging::init(&config.logging.level);
        info!("loading configuration from {}", config_path.display());
        config.log_summary();
        self.init_with(config)
    }

    fn new_file(&self, tident: &str) -> Result<Box<dyn StorageHandle>> {
        let conn = self.connection()?;
        Ok(Box::new(FileHandle::new(conn, self.manager.aio(), tident)))
    }

    fn new_dir(&self, tident: &str) -> Result<Box<dyn StorageHandle>> {
        Ok(Box::new(DirHandle::new(self.connection()?, tident)))
    }

    fn stat(&self, path: &str) -> Result<FileStat> {
        Ok(self.session()?.stat(path)?)
    }

    fn mkdir(&self, path: &str, mode: u32, mkpath: bool) -> Result<()> {
        let op = self.session()?;
        if mkpath {
            op.mkdirs(path, mode)?;
        } else {
            op.mkdir(path, mode)?;
        }
        Ok(())
    }

    fn remdir(&self, path: &str) -> Result<()> {
        Ok(self.session()?.rmdir(path)?)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        Ok(self.session()?.rename(from, to)?)
    }

    fn unlink(&self, path: &str) -> Result<()> {
        Ok(self.session()?.unlink(path)?)
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        Ok(self.session()?.chmod(path, mode)?)
    }

    fn truncate(&self, path: &str, size: u64) -> Result<()> {
        Ok(self.session()?.truncate(path, size)?)
    }

    fn create(
        &self,
        tident: &str,
        path: &str,
        mode: u32,
        env: &OpenEnv,
        opts: CreateOptions,
    ) -> Result<()> {
        let op = self.session()?;

        if opts.mkpath {
            let (parent, _) = split_parent(path);
            if parent != "/" && op.stat(parent).is_err() {
                debug!(parent, "creating missing parents");
                op.mkdirs(parent, mode)?;
            }
        }

        match op.stat(path) {
            Ok(st) if st.is_dir() => return Err(OssError::IsADirectory(path.to_string())),
            Ok(_) if opts.new => return Err(OssError::AlreadyExists(path.to_string())),
            _ => {}
        }

        let hints = LayoutHints::from_env(env, self.manager.variant());
        // create only: no data is written through this descriptor
        let fd = op.open_layout(path, libc::O_CREAT, mode, &hints)?;
        op.close(fd)?;
        debug!(tident, path, "created");
        Ok(())
    }

    fn stat_fs(&self, path: &str, buf: &mut [u8]) -> Result<usize> {
        let report = self.stat_fs_report(path)?.to_string();
        copy_cstr(buf, report.as_bytes());
        Ok(report.len())
    }
}
