//! Storage-plugin contract
//!
//! The host drives the adapter through two traits: [`StorageSystem`] for
//! path-level operations and handle creation, and [`StorageHandle`] for
//! per-file and per-directory state. Every operation reports failures as
//! [`OssError`]; [`crate::error::retc`] turns a result into the host's
//! integer convention.

use std::path::Path;

use crate::aio::{Aio, AioCompletion};
use crate::client::{Fd, FileStat};
use crate::error::{OssError, Result};
use crate::layout::OpenEnv;

/// `Create` option: make missing parent directories
pub const XRDOSS_MKPATH: i32 = 0x01;
/// `Create` option: fail if the file exists
pub const XRDOSS_NEW: i32 = 0x02;

/// Options of a create request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub mkpath: bool,
    pub new: bool,
}

impl CreateOptions {
    /// Decode the host's option bits; unknown bits are ignored
    pub fn from_bits(opts: i32) -> Self {
        Self {
            mkpath: opts & XRDOSS_MKPATH != 0,
            new: opts & XRDOSS_NEW != 0,
        }
    }
}

/// Path-level operations and handle factory
pub trait StorageSystem: Send + Sync {
    /// Load configuration and mount. Idempotent once a mount is live.
    fn init(&self, config_path: &Path) -> Result<()>;

    /// A fresh, unopened file handle
    fn new_file(&self, tident: &str) -> Result<Box<dyn StorageHandle>>;

    /// A fresh, unopened directory handle
    fn new_dir(&self, tident: &str) -> Result<Box<dyn StorageHandle>>;

    fn stat(&self, path: &str) -> Result<FileStat>;

    /// Create a directory; `mkpath` also creates missing ancestors
    fn mkdir(&self, path: &str, mode: u32, mkpath: bool) -> Result<()>;

    fn remdir(&self, path: &str) -> Result<()>;

    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn unlink(&self, path: &str) -> Result<()>;

    fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    fn truncate(&self, path: &str, size: u64) -> Result<()>;

    /// Create an empty file
    fn create(
        &self,
        tident: &str,
        path: &str,
        mode: u32,
        env: &OpenEnv,
        opts: CreateOptions,
    ) -> Result<()>;

    /// Write the space report for `path` into `buf`.
    ///
    /// The report is truncated to fit with a terminating NUL; the full
    /// report length is returned.
    fn stat_fs(&self, path: &str, buf: &mut [u8]) -> Result<usize>;
}

/// Per-file or per-directory handle
///
/// Handles are created unopened. File operations on a directory handle
/// fail with [`OssError::NotFileHandle`] and directory operations on a
/// file handle with [`OssError::NotDirHandle`].
pub trait StorageHandle: Send + Sync {
    /// Identity of the client this handle serves
    fn tident(&self) -> &str;

    fn open(&self, _path: &str, _flags: i32, _mode: u32, _env: &OpenEnv) -> Result<()> {
        Err(OssError::NotFileHandle)
    }

    fn opendir(&self, _path: &str, _env: &OpenEnv) -> Result<()> {
        Err(OssError::NotDirHandle)
    }

    /// Copy the next entry name into `buf`; 0 means the listing is done
    fn readdir(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(OssError::NotDirHandle)
    }

    /// Release the handle's resources. Later calls succeed without effect.
    fn close(&self) -> Result<()>;

    fn read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Err(OssError::NotFileHandle)
    }

    /// Preread hint without a buffer; transfers nothing
    fn read_probe(&self, _offset: u64, _len: usize) -> Result<usize> {
        Err(OssError::NotFileHandle)
    }

    /// Read bypassing any host-side processing
    fn read_raw(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.read(buf, offset)
    }

    /// Queue a read; the outcome arrives through `done`
    fn read_aio(&self, _aio: Aio, _done: Box<dyn AioCompletion>) -> Result<()> {
        Err(OssError::NotSupported("asynchronous read"))
    }

    fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(OssError::NotFileHandle)
    }

    /// Queue a write; the outcome arrives through `done`
    fn write_aio(&self, _aio: Aio, _done: Box<dyn AioCompletion>) -> Result<()> {
        Err(OssError::NotSupported("asynchronous write"))
    }

    fn fstat(&self) -> Result<FileStat> {
        Err(OssError::NotFileHandle)
    }

    fn fsync(&self) -> Result<()> {
        Err(OssError::NotFileHandle)
    }

    /// Client descriptor while open
    fn fd(&self) -> Option<Fd> {
        None
    }
}

/// Copy `src` into `dst` as a NUL-terminated string, truncating to fit.
/// Returns the number of bytes copied, excluding the NUL.
pub(crate) fn copy_cstr(dst: &mut [u8], src: &[u8]) -> usize {
    let Some(room) = dst.len().checked_sub(1) else {
        return 0;
    };
    let n = src.len().min(room);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n] = 0;
    n
}
