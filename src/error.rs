use thiserror::Error;

use crate::client::Errno;
use crate::config::ConfigError;

/// Success sentinel of the storage-plugin contract
pub const XRDOSS_OK: i32 = 0;

/// Host error code reported for I/O on a handle that is not open
pub const XRDOSS_E8004: i32 = 8004;

/// Main error type for adapter operations
#[derive(Error, Debug)]
pub enum OssError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {what} (errno {})", errno.0)]
    Connection { what: String, errno: Errno },

    #[error("Client error: {0}")]
    Client(#[from] Errno),

    #[error("Handle is not open")]
    NotOpen,

    #[error("Handle was already opened")]
    AlreadyOpen,

    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("Filesystem is not mounted")]
    NotMounted,

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory operation on a file handle")]
    NotDirHandle,

    #[error("File operation on a directory handle")]
    NotFileHandle,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OssError {
    /// Convert error to a positive errno value.
    ///
    /// Client errors are passed through untouched so the host sees the
    /// filesystem's native codes.
    pub fn to_errno(&self) -> i32 {
        match self {
            OssError::Config(_) => libc::EINVAL,
            OssError::Connection { errno, .. } => {
                if errno.0 > 0 {
                    errno.0
                } else {
                    libc::EIO
                }
            }
            OssError::Client(errno) => errno.0,
            OssError::NotOpen => XRDOSS_E8004,
            OssError::AlreadyOpen => libc::EBADF,
            OssError::NotSupported(_) => libc::ENOTSUP,
            OssError::NotMounted => libc::ENOTCONN,
            OssError::ShuttingDown => libc::ESHUTDOWN,
            OssError::IsADirectory(_) => libc::EISDIR,
            OssError::AlreadyExists(_) => libc::EEXIST,
            OssError::NotDirHandle => libc::ENOTDIR,
            OssError::NotFileHandle => libc::EISDIR,
            OssError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Negative return code as the host contract expects it
    pub fn retc(&self) -> i32 {
        -self.to_errno()
    }
}

/// Collapse a result into the host's integer convention
pub fn retc<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => XRDOSS_OK,
        Err(e) => e.retc(),
    }
}

/// Collapse a byte-count result into the host's signed size convention
pub fn retsz(result: &Result<usize>) -> i64 {
    match result {
        Ok(n) => *n as i64,
        Err(e) => e.retc() as i64,
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, OssError>;
