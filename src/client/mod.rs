pub mod local;
pub mod memory;

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::layout::LayoutHints;

/// Positive errno value reported by a filesystem client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

impl From<io::Error> for Errno {
    fn from(e: io::Error) -> Self {
        Errno(e.raw_os_error().unwrap_or(libc::EIO))
    }
}

/// Result type for raw client calls
pub type ClientResult<T> = std::result::Result<T, Errno>;

/// Client file descriptor
pub type Fd = i32;

/// Opaque directory-enumeration cursor handed out by `opendir`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirCursor(pub u64);

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Other,
}

/// Metadata for a file or directory, shaped after `struct stat`
#[derive(Debug, Clone)]
pub struct FileStat {
    pub ino: u64,
    /// File type and permission bits (`st_mode`)
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileStat {
    pub fn file_type(&self) -> FileType {
        match self.mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileType::Directory,
            m if m == libc::S_IFREG as u32 => FileType::File,
            _ => FileType::Other,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == FileType::File
    }

    /// Permission bits only
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Filesystem usage, shaped after `struct statvfs`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatVfs {
    pub bsize: u64,
    /// Fragment size; block counts are in units of this
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    /// Free blocks available to unprivileged users
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub namemax: u64,
}

/// Directory entry returned by `readdir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Directory,
        }
    }
}

/// Distributed filesystem client
///
/// This is the black-box capability set the adapter forwards to. Every
/// call is synchronous and reports failures as a positive errno; the
/// adapter never reinterprets those codes. Implementations must be safe
/// to call from many threads for independent descriptors.
pub trait FsClient: Send + Sync {
    /// Load client settings from a configuration file
    fn conf_read_file(&self, path: &Path) -> ClientResult<()>;

    /// Mount the filesystem rooted at `root`
    fn mount(&self, root: &str) -> ClientResult<()>;

    /// Unmount and release the session. Must tolerate repeated calls.
    fn shutdown(&self);

    /// Get metadata for a path
    fn stat(&self, path: &str) -> ClientResult<FileStat>;

    /// Create exactly one directory level
    fn mkdir(&self, path: &str, mode: u32) -> ClientResult<()>;

    /// Create a directory and all missing ancestors
    fn mkdirs(&self, path: &str, mode: u32) -> ClientResult<()>;

    /// Remove an empty directory
    fn rmdir(&self, path: &str) -> ClientResult<()>;

    /// Rename/move a file or directory
    fn rename(&self, from: &str, to: &str) -> ClientResult<()>;

    /// Remove a file
    fn unlink(&self, path: &str) -> ClientResult<()>;

    /// Set permission bits
    fn chmod(&self, path: &str, mode: u32) -> ClientResult<()>;

    /// Truncate a file to the specified size
    fn truncate(&self, path: &str, size: u64) -> ClientResult<()>;

    /// Report usage of the filesystem containing `path`
    fn statfs(&self, path: &str) -> ClientResult<StatVfs>;

    /// Open a file, applying layout hints if the file gets created
    fn open_layout(
        &self,
        path: &str,
        flags: i32,
        mode: u32,
        layout: &LayoutHints,
    ) -> ClientResult<Fd>;

    /// Open a file with the default layout
    fn open(&self, path: &str, flags: i32, mode: u32) -> ClientResult<Fd> {
        self.open_layout(path, flags, mode, &LayoutHints::default())
    }

    /// Release a descriptor
    fn close(&self, fd: Fd) -> ClientResult<()>;

    /// Read up to `buf.len()` bytes at `offset`
    fn read(&self, fd: Fd, buf: &mut [u8], offset: u64) -> ClientResult<usize>;

    /// Write `buf` at `offset`
    fn write(&self, fd: Fd, buf: &[u8], offset: u64) -> ClientResult<usize>;

    /// Get metadata for an open descriptor
    fn fstat(&self, fd: Fd) -> ClientResult<FileStat>;

    /// Flush an open descriptor; `data_only` skips metadata
    fn fsync(&self, fd: Fd, data_only: bool) -> ClientResult<()>;

    /// Start enumerating a directory
    fn opendir(&self, path: &str) -> ClientResult<DirCursor>;

    /// Next entry, or `None` once enumeration is exhausted
    fn readdir(&self, dir: DirCursor) -> ClientResult<Option<DirEntry>>;

    /// Release a directory cursor
    fn closedir(&self, dir: DirCursor) -> ClientResult<()>;
}

/// Creates client sessions bound to an identity
pub trait ClientFactory: Send + Sync {
    fn create(&self, id: &str) -> ClientResult<Arc<dyn FsClient>>;
}

/// Split a host path into (parent, name). `"/a/b"` gives `("/a", "b")`.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("/", path),
    }
}
