//! In-memory filesystem client
//!
//! A process-local, POSIX-like tree that implements the full client
//! capability set. Every session created through [`MemoryFactory`] shares
//! one tree, and the client keeps counters of descriptor releases and
//! shutdowns so callers can observe lifecycle behaviour.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{
    split_parent, ClientFactory, ClientResult, DirCursor, DirEntry, Errno, Fd, FileStat, FileType,
    FsClient, StatVfs,
};
use crate::layout::LayoutHints;

const BLOCK_SIZE: u64 = 4096;
const TOTAL_BLOCKS: u64 = 1 << 20;

/// Largest file the in-memory tree will hold
pub const MAX_FILE_SIZE: u64 = 1 << 32;

/// Checked end offset of `len` bytes at `offset`
fn file_end(offset: u64, len: usize) -> ClientResult<usize> {
    offset
        .checked_add(len as u64)
        .filter(|end| *end <= MAX_FILE_SIZE)
        .map(|end| end as usize)
        .ok_or(Errno(libc::EFBIG))
}

#[derive(Debug, Clone)]
enum NodeKind {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    ino: u64,
    kind: NodeKind,
    perm: u32,
    mtime: SystemTime,
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    fn stat(&self) -> FileStat {
        let (fmt, size, nlink) = match &self.kind {
            NodeKind::File(data) => (libc::S_IFREG as u32, data.len() as u64, 1),
            NodeKind::Directory => (libc::S_IFDIR as u32, 0, 2),
        };
        FileStat {
            ino: self.ino,
            mode: fmt | self.perm,
            nlink,
            uid: 0,
            gid: 0,
            size,
            blksize: BLOCK_SIZE as u32,
            blocks: size.div_ceil(512),
            atime: self.mtime,
            mtime: self.mtime,
            ctime: self.mtime,
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    flags: i32,
}

/// In-memory client session
pub struct MemoryClient {
    nodes: RwLock<BTreeMap<String, Node>>,
    next_ino: AtomicU64,
    fds: DashMap<Fd, OpenFile>,
    next_fd: AtomicI32,
    dirs: DashMap<u64, Mutex<VecDeque<DirEntry>>>,
    next_dir: AtomicU64,
    /// Mounted root, `None` while unmounted
    root: RwLock<Option<String>>,
    identity: Mutex<Option<String>>,
    conf_file: Mutex<Option<PathBuf>>,
    layouts: DashMap<String, LayoutHints>,
    statvfs: Mutex<Option<StatVfs>>,
    mount_error: Mutex<Option<Errno>>,
    closes: AtomicUsize,
    closedirs: AtomicUsize,
    fsyncs: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MemoryClient {
    /// Create an empty tree containing only the root directory
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                ino: 1,
                kind: NodeKind::Directory,
                perm: 0o755,
                mtime: SystemTime::now(),
            },
        );

        Self {
            nodes: RwLock::new(nodes),
            next_ino: AtomicU64::new(2),
            fds: DashMap::new(),
            next_fd: AtomicI32::new(3),
            dirs: DashMap::new(),
            next_dir: AtomicU64::new(1),
            root: RwLock::new(None),
            identity: Mutex::new(None),
            conf_file: Mutex::new(None),
            layouts: DashMap::new(),
            statvfs: Mutex::new(None),
            mount_error: Mutex::new(None),
            closes: AtomicUsize::new(0),
            closedirs: AtomicUsize::new(0),
            fsyncs: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Report fixed usage numbers from `statfs`
    pub fn set_statvfs(&self, stat: StatVfs) {
        *self.statvfs.lock() = Some(stat);
    }

    /// Make the next `mount` call fail with `errno`
    pub fn fail_mount(&self, errno: Errno) {
        *self.mount_error.lock() = Some(errno);
    }

    pub fn is_mounted(&self) -> bool {
        self.root.read().is_some()
    }

    pub fn identity(&self) -> Option<String> {
        self.identity.lock().clone()
    }

    pub fn conf_file(&self) -> Option<PathBuf> {
        self.conf_file.lock().clone()
    }

    /// Layout requested when `path` was last opened
    pub fn layout_of(&self, path: &str) -> Option<LayoutHints> {
        let full = self.resolve(path).ok()?;
        self.layouts.get(&full).map(|l| l.clone())
    }

    pub fn open_descriptors(&self) -> usize {
        self.fds.len()
    }

    pub fn open_cursors(&self) -> usize {
        self.dirs.len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn closedir_count(&self) -> usize {
        self.closedirs.load(Ordering::SeqCst)
    }

    pub fn fsync_count(&self) -> usize {
        self.fsyncs.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Map a host path onto the tree, below the mounted root
    fn resolve(&self, path: &str) -> ClientResult<String> {
        let root = self.root.read();
        let root = root.as_deref().ok_or(Errno(libc::ENOTCONN))?;
        Ok(join(root, path))
    }

    fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::SeqCst)
    }

    fn new_node(&self, kind: NodeKind, mode: u32) -> Node {
        Node {
            ino: self.alloc_ino(),
            kind,
            perm: mode & 0o7777,
            mtime: SystemTime::now(),
        }
    }

    fn check_parent(nodes: &BTreeMap<String, Node>, path: &str) -> ClientResult<()> {
        let (parent, _) = split_parent(path);
        match nodes.get(parent) {
            Some(n) if n.is_dir() => Ok(()),
            Some(_) => Err(Errno(libc::ENOTDIR)),
            None => Err(Errno(libc::ENOENT)),
        }
    }

    fn with_open<T>(&self, fd: Fd, f: impl FnOnce(&OpenFile) -> ClientResult<T>) -> ClientResult<T> {
        let open = self.fds.get(&fd).ok_or(Errno(libc::EBADF))?;
        f(&open)
    }

    fn used_blocks(&self) -> u64 {
        self.nodes
            .read()
            .values()
            .map(|n| match &n.kind {
                NodeKind::File(data) => (data.len() as u64).div_ceil(BLOCK_SIZE),
                NodeKind::Directory => 1,
            })
            .sum()
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FsClient for MemoryClient {
    fn conf_read_file(&self, path: &Path) -> ClientResult<()> {
        std::fs::read_to_string(path)?;
        *self.conf_file.lock() = Some(path.to_path_buf());
        Ok(())
    }

    fn mount(&self, root: &str) -> ClientResult<()> {
        if let Some(errno) = self.mount_error.lock().take() {
            return Err(errno);
        }

        let root = normalize(root);
        match self.nodes.read().get(&root) {
            Some(n) if n.is_dir() => {}
            Some(_) => return Err(Errno(libc::ENOTDIR)),
            None => return Err(Errno(libc::ENOENT)),
        }

        debug!("memory client mounted at {}", root);
        *self.root.write() = Some(root);
        Ok(())
    }

    fn shutdown(&self) {
        if self.root.write().take().is_some() {
            self.fds.clear();
            self.dirs.clear();
        }
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn stat(&self, path: &str) -> ClientResult<FileStat> {
        let full = self.resolve(path)?;
        self.nodes
            .read()
            .get(&full)
            .map(Node::stat)
            .ok_or(Errno(libc::ENOENT))
    }

    fn mkdir(&self, path: &str, mode: u32) -> ClientResult<()> {
        let full = self.resolve(path)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&full) {
            return Err(Errno(libc::EEXIST));
        }
        Self::check_parent(&nodes, &full)?;
        nodes.insert(full, self.new_node(NodeKind::Directory, mode));
        Ok(())
    }

    fn mkdirs(&self, path: &str, mode: u32) -> ClientResult<()> {
        let full = self.resolve(path)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&full) {
            return Err(Errno(libc::EEXIST));
        }

        let mut current = String::new();
        for component in full.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            match nodes.get(&current) {
                Some(n) if n.is_dir() => continue,
                Some(_) => return Err(Errno(libc::ENOTDIR)),
                None => {
                    let node = self.new_node(NodeKind::Directory, mode);
                    nodes.insert(current.clone(), node);
                }
            }
        }
        Ok(())
    }

    fn rmdir(&self, path: &str) -> ClientResult<()> {
        let full = self.resolve(path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&full) {
            Some(n) if n.is_dir() => {}
            Some(_) => return Err(Errno(libc::ENOTDIR)),
            None => return Err(Errno(libc::ENOENT)),
        }
        if full == "/" {
            return Err(Errno(libc::EBUSY));
        }
        if children(&nodes, &full).next().is_some() {
            return Err(Errno(libc::ENOTEMPTY));
        }
        nodes.remove(&full);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> ClientResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        let mut nodes = self.nodes.write();

        let src_is_dir = nodes.get(&src).ok_or(Errno(libc::ENOENT))?.is_dir();
        Self::check_parent(&nodes, &dst)?;
        if src == dst {
            return Ok(());
        }
        if src_is_dir && dst.starts_with(&format!("{}/", src)) {
            return Err(Errno(libc::EINVAL));
        }

        if let Some(existing) = nodes.get(&dst) {
            match (src_is_dir, existing.is_dir()) {
                (true, false) => return Err(Errno(libc::ENOTDIR)),
                (false, true) => return Err(Errno(libc::EISDIR)),
                (true, true) if children(&nodes, &dst).next().is_some() => {
                    return Err(Errno(libc::ENOTEMPTY))
                }
                _ => {}
            }
            nodes.remove(&dst);
        }

        let subtree_prefix = format!("{}/", src);
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| **k == src || k.starts_with(&subtree_prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let renamed = format!("{}{}", dst, &key[src.len()..]);
                nodes.insert(renamed, node);
            }
        }
        Ok(())
    }

    fn unlink(&self, path: &str) -> ClientResult<()> {
        let full = self.resolve(path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&full) {
            Some(n) if n.is_dir() => Err(Errno(libc::EISDIR)),
            Some(_) => {
                nodes.remove(&full);
                Ok(())
            }
            None => Err(Errno(libc::ENOENT)),
        }
    }

    fn chmod(&self, path: &str, mode: u32) -> ClientResult<()> {
        let full = self.resolve(path)?;
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&full).ok_or(Errno(libc::ENOENT))?;
        node.perm = mode & 0o7777;
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> ClientResult<()> {
        let full = self.resolve(path)?;
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&full).ok_or(Errno(libc::ENOENT))?;
        match &mut node.kind {
            NodeKind::File(data) => {
                data.resize(file_end(size, 0)?, 0);
                node.mtime = SystemTime::now();
                Ok(())
            }
            NodeKind::Directory => Err(Errno(libc::EISDIR)),
        }
    }

    fn statfs(&self, path: &str) -> ClientResult<StatVfs> {
        let full = self.resolve(path)?;
        if !self.nodes.read().contains_key(&full) {
            return Err(Errno(libc::ENOENT));
        }
        if let Some(stat) = *self.statvfs.lock() {
            return Ok(stat);
        }

        let used = self.used_blocks().min(TOTAL_BLOCKS);
        let files = self.nodes.read().len() as u64;
        Ok(StatVfs {
            bsize: BLOCK_SIZE,
            frsize: BLOCK_SIZE,
            blocks: TOTAL_BLOCKS,
            bfree: TOTAL_BLOCKS - used,
            bavail: TOTAL_BLOCKS - used,
            files,
            ffree: u64::from(u32::MAX) - files,
            namemax: 255,
        })
    }

    fn open_layout(
        &self,
        path: &str,
        flags: i32,
        mode: u32,
        layout: &LayoutHints,
    ) -> ClientResult<Fd> {
        let full = self.resolve(path)?;
        let accmode = flags & libc::O_ACCMODE;
        let mut nodes = self.nodes.write();

        match nodes.get_mut(&full) {
            Some(_) if flags & libc::O_CREAT != 0 && flags & libc::O_EXCL != 0 => {
                return Err(Errno(libc::EEXIST));
            }
            Some(node) => match &mut node.kind {
                NodeKind::Directory if accmode != libc::O_RDONLY => {
                    return Err(Errno(libc::EISDIR));
                }
                NodeKind::Directory => {}
                NodeKind::File(data) => {
                    if flags & libc::O_TRUNC != 0 && accmode != libc::O_RDONLY {
                        data.clear();
                        node.mtime = SystemTime::now();
                    }
                }
            },
            None if flags & libc::O_CREAT != 0 => {
                Self::check_parent(&nodes, &full)?;
                let node = self.new_node(NodeKind::File(Vec::new()), mode);
                nodes.insert(full.clone(), node);
                self.layouts.insert(full.clone(), layout.clone());
            }
            None => return Err(Errno(libc::ENOENT)),
        }
        drop(nodes);

        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        trace!("memory open {} -> fd {}", full, fd);
        self.fds.insert(fd, OpenFile { path: full, flags });
        Ok(fd)
    }

    fn close(&self, fd: Fd) -> ClientResult<()> {
        self.fds.remove(&fd).ok_or(Errno(libc::EBADF))?;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, fd: Fd, buf: &mut [u8], offset: u64) -> ClientResult<usize> {
        self.with_open(fd, |open| {
            if open.flags & libc::O_ACCMODE == libc::O_WRONLY {
                return Err(Errno(libc::EBADF));
            }
            let nodes = self.nodes.read();
            match nodes.get(&open.path).map(|n| &n.kind) {
                Some(NodeKind::File(data)) => {
                    let start = (offset as usize).min(data.len());
                    let n = buf.len().min(data.len() - start);
                    buf[..n].copy_from_slice(&data[start..start + n]);
                    Ok(n)
                }
                Some(NodeKind::Directory) => Err(Errno(libc::EISDIR)),
                None => Err(Errno(libc::ENOENT)),
            }
        })
    }

    fn write(&self, fd: Fd, buf: &[u8], offset: u64) -> ClientResult<usize> {
        self.with_open(fd, |open| {
            if open.flags & libc::O_ACCMODE == libc::O_RDONLY {
                return Err(Errno(libc::EBADF));
            }
            let mut nodes = self.nodes.write();
            let node = nodes.get_mut(&open.path).ok_or(Errno(libc::ENOENT))?;
            match &mut node.kind {
                NodeKind::File(data) => {
                    let end = file_end(offset, buf.len())?;
                    let start = end - buf.len();
                    if data.len() < end {
                        data.resize(end, 0);
                    }
                    data[start..end].copy_from_slice(buf);
                    node.mtime = SystemTime::now();
                    Ok(buf.len())
                }
                NodeKind::Directory => Err(Errno(libc::EISDIR)),
            }
        })
    }

    fn fstat(&self, fd: Fd) -> ClientResult<FileStat> {
        self.with_open(fd, |open| {
            self.nodes
                .read()
                .get(&open.path)
                .map(Node::stat)
                .ok_or(Errno(libc::ENOENT))
        })
    }

    fn fsync(&self, fd: Fd, _data_only: bool) -> ClientResult<()> {
        self.with_open(fd, |_| {
            self.fsyncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn opendir(&self, path: &str) -> ClientResult<DirCursor> {
        let full = self.resolve(path)?;
        let nodes = self.nodes.read();
        match nodes.get(&full) {
            Some(n) if n.is_dir() => {}
            Some(_) => return Err(Errno(libc::ENOTDIR)),
            None => return Err(Errno(libc::ENOENT)),
        }

        let mut entries: VecDeque<DirEntry> =
            VecDeque::from([DirEntry::directory("."), DirEntry::directory("..")]);
        entries.extend(children(&nodes, &full).map(|(name, node)| DirEntry {
            name: name.to_string(),
            file_type: if node.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            },
        }));
        drop(nodes);

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
        self.closedirs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out sessions that all share one [`MemoryClient`]
pub struct MemoryFactory {
    client: Arc<MemoryClient>,
    created: AtomicUsize,
}

impl MemoryFactory {
    pub fn new(client: Arc<MemoryClient>) -> Self {
        Self {
            client,
            created: AtomicUsize::new(0),
        }
    }

    pub fn client(&self) -> &Arc<MemoryClient> {
        &self.client
    }

    /// Number of sessions created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MemoryFactory {
    fn create(&self, id: &str) -> ClientResult<Arc<dyn FsClient>> {
        *self.client.identity.lock() = Some(id.to_string());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

/// Direct children of `dir` as (name, node)
fn children<'a>(
    nodes: &'a BTreeMap<String, Node>,
    dir: &'a str,
) -> impl Iterator<Item = (&'a str, &'a Node)> + 'a {
    let prefix = if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    };
    nodes
        .range(prefix.clone()..)
        .take_while(move |(k, _)| k.starts_with(&prefix))
        .filter_map(move |(k, n)| {
            let rest = &k[k.len().min(dir.len() + usize::from(dir != "/"))..];
            (!rest.is_empty() && !rest.contains('/')).then_some((rest, n))
        })
}

/// Collapse duplicate separators and strip the trailing one
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    format!("/{}", parts.join("/"))
}

fn join(root: &str, path: &str) -> String {
    if root == "/" {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", root, path))
    }
}
