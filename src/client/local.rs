//! Local passthrough client
//!
//! Serves the client capability set from a directory of the local host,
//! typically a kernel mount of the distributed filesystem. The mounted
//! volume is the local directory that becomes the root; host paths are
//! resolved beneath it and may not climb out of it. Layout hints cannot
//! be honoured through the VFS and are only logged.

use std::collections::VecDeque;
use std::ffi::CString;
use std::fs::{self, DirBuilder, File, Permissions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{
    ClientFactory, ClientResult, DirCursor, DirEntry, Errno, Fd, FileStat, FileType, FsClient,
    StatVfs,
};
use crate::layout::LayoutHints;

/// Passthrough client session over a local directory
pub struct LocalClient {
    id: String,
    root: RwLock<Option<PathBuf>>,
    files: DashMap<Fd, Arc<File>>,
    dirs: DashMap<u64, Mutex<VecDeque<DirEntry>>>,
    next_dir: AtomicU64,
}

impl LocalClient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root: RwLock::new(None),
            files: DashMap::new(),
            dirs: DashMap::new(),
            next_dir: AtomicU64::new(1),
        }
    }

    /// Map a host path below the mounted root
    fn resolve(&self, path: &str) -> ClientResult<PathBuf> {
        let root = self.root.read();
        let root = root.as_ref().ok_or(Errno(libc::ENOTCONN))?;

        let mut resolved = root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return Err(Errno(libc::EACCES)),
            }
        }
        Ok(resolved)
    }

    fn file(&self, fd: Fd) -> ClientResult<Arc<File>> {
        self.files
            .get(&fd)
            .map(|f| f.clone())
            .ok_or(Errno(libc::EBADF))
    }
}

fn c_path(path: &Path) -> ClientResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno(libc::EINVAL))
}

fn to_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn to_stat(meta: &fs::Metadata) -> FileStat {
    FileStat {
        ino: meta.ino(),
        mode: meta.mode(),
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.size(),
        blksize: meta.blksize() as u32,
        blocks: meta.blocks(),
        atime: to_time(meta.atime(), meta.atime_nsec()),
        mtime: to_time(meta.mtime(), meta.mtime_nsec()),
        ctime: to_time(meta.ctime(), meta.ctime_nsec()),
    }
}

fn entry_type(ft: fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_file() {
        FileType::File
    } else {
        FileType::Other
    }
}

impl FsClient for LocalClient {
    fn conf_read_file(&self, path: &Path) -> ClientResult<()> {
        let content = fs::read_to_string(path)?;
        debug!(
            "client {} read {} ({} bytes)",
            self.id,
            path.display(),
            content.len()
        );
        Ok(())
    }

    fn mount(&self, root: &str) -> ClientResult<()> {
        let root = PathBuf::from(root);
        let meta = fs::metadata(&root)?;
        if !meta.is_dir() {
            return Err(Errno(libc::ENOTDIR));
        }
        debug!("client {} mounted {}", self.id, root.display());
        *self.root.write() = Some(root);
        Ok(())
    }

    fn shutdown(&self) {
        if let Some(root) = self.root.write().take() {
            debug!("client {} released {}", self.id, root.display());
        }
        self.files.clear();
        self.dirs.clear();
    }

    fn stat(&self, path: &str) -> ClientResult<FileStat> {
        let meta = fs::metadata(self.resolve(path)?)?;
        Ok(to_stat(&meta))
    }

    fn mkdir(&self, path: &str, mode: u32) -> ClientResult<()> {
        DirBuilder::new().mode(mode).create(self.resolve(path)?)?;
        Ok(())
    }

    fn mkdirs(&self, path: &str, mode: u32) -> ClientResult<()> {
        let target = self.resolve(path)?;
        if target.exists() {
            return Err(Errno(libc::EEXIST));
        }
        DirBuilder::new().mode(mode).recursive(true).create(target)?;
        Ok(())
    }

    fn rmdir(&self, path: &str) -> ClientResult<()> {
        fs::remove_dir(self.resolve(path)?)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> ClientResult<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)?;
        Ok(())
    }

    fn unlink(&self, path: &str) -> ClientResult<()> {
        let target = self.resolve(path)?;
        if fs::symlink_metadata(&target)?.is_dir() {
            return Err(Errno(libc::EISDIR));
        }
        fs::remove_file(target)?;
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> ClientResult<()> {
        fs::set_permissions(self.resolve(path)?, Permissions::from_mode(mode))?;
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> ClientResult<()> {
        let cpath = c_path(&self.resolve(path)?)?;
        let ret = unsafe { libc::truncate(cpath.as_ptr(), size as libc::off_t) };
        if ret != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    #[allow(clippy::useless_conversion)]
    fn statfs(&self, path: &str) -> ClientResult<StatVfs> {
        let cpath = c_path(&self.resolve(path)?)?;
        let mut buf: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(cpath.as_ptr(), &mut buf) };
        if ret != 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(StatVfs {
            bsize: u64::from(buf.f_bsize),
            frsize: u64::from(buf.f_frsize),
            blocks: u64::from(buf.f_blocks),
            bfree: u64::from(buf.f_bfree),
            bavail: u64::from(buf.f_bavail),
            files: u64::from(buf.f_files),
            ffree: u64::from(buf.f_ffree),
            namemax: u64::from(buf.f_namemax),
        })
    }

    fn open_layout(
        &self,
        path: &str,
        flags: i32,
        mode: u32,
        layout: &LayoutHints,
    ) -> ClientResult<Fd> {
        let target = self.resolve(path)?;
        if !layout.is_default() {
            trace!("ignoring layout {:?} for {}", layout, target.display());
        }

        let cpath = c_path(&target)?;
        let raw =
            unsafe { libc::open(cpath.as_ptr(), flags | libc::O_CLOEXEC, mode as libc::c_uint) };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let file = unsafe { File::from_raw_fd(raw) };
        let fd = file.as_raw_fd();
        self.files.insert(fd, Arc::new(file));
        Ok(fd)
    }

    fn close(&self, fd: Fd) -> ClientResult<()> {
        // dropping the last reference closes the OS descriptor
        self.files.remove(&fd).ok_or(Errno(libc::EBADF))?;
        Ok(())
    }

    fn read(&self, fd: Fd, buf: &mut [u8], offset: u64) -> ClientResult<usize> {
        Ok(self.file(fd)?.read_at(buf, offset)?)
    }

    fn write(&self, fd: Fd, buf: &[u8], offset: u64) -> ClientResult<usize> {
        Ok(self.file(fd)?.write_at(buf, offset)?)
    }

    fn fstat(&self, fd: Fd) -> ClientResult<FileStat> {
        Ok(to_stat(&self.file(fd)?.metadata()?))
    }

    fn fsync(&self, fd: Fd, data_only: bool) -> ClientResult<()> {
        let file = self.file(fd)?;
        if data_only {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    fn opendir(&self, path: &str) -> ClientResult<DirCursor> {
        let mut entries = VecDeque::from([DirEntry::directory("."), DirEntry::directory("..")]);
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            entries.push_back(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                file_type: entry_type(entry.file_type()?),
            });
        }

        let id = self.next_dir.fetch_add(1, Ordering::SeqCst);
        self.dirs.insert(id, Mutex::new(entries));
        Ok(DirCursor(id))
    }

    fn readdir(&self, dir: DirCursor) -> ClientResult<Option<DirEntry>> {
        let entries = self.dirs.get(&dir.0).ok_or(Errno(libc::EBADF))?;
        let next = entries.lock().pop_front();
        Ok(next)
    }

    fn closedir(&self, dir: DirCursor) -> ClientResult<()> {
        self.dirs.remove(&dir.0).ok_or(Errno(libc::EBADF))?;
        Ok(())
    }
}

/// Creates [`LocalClient`] sessions
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFactory;

impl ClientFactory for LocalFactory {
    fn create(&self, id: &str) -> ClientResult<Arc<dyn FsClient>> {
        Ok(Arc::new(LocalClient::new(id)))
    }
}
