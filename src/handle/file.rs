//! File handle

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::HandleState;
use crate::aio::{Aio, AioCompletion, AioDispatcher};
use crate::client::{Fd, FileStat};
use crate::error::{retsz, OssError, Result};
use crate::layout::{LayoutHints, OpenEnv};
use crate::mount::Connection;
use crate::plugin::StorageHandle;

/// State shared between a handle and its queued asynchronous requests.
///
/// Data operations hold the state read lock across the client call and
/// close takes the write lock, so a close waits for every request already
/// running against the descriptor.
struct FileInner {
    conn: Connection,
    tident: String,
    state: RwLock<HandleState<Fd>>,
}

impl FileInner {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let state = self.state.read();
        let fd = state.resource()?;
        let op = self.conn.enter()?;
        let n = op.read(fd, buf, offset)?;
        trace!(fd, offset, len = buf.len(), n, "read");
        Ok(n)
    }

    fn write(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let state = self.state.read();
        let fd = state.resource()?;
        let op = self.conn.enter()?;
        let n = op.write(fd, buf, offset)?;
        trace!(fd, offset, len = buf.len(), n, "write");
        Ok(n)
    }

    fn close(&self) -> Result<()> {
        let Some(fd) = self.state.write().take() else {
            return Ok(());
        };

        match self.conn.enter() {
            Ok(op) => {
                op.close(fd)?;
                debug!(tident = %self.tident, fd, "closed");
                Ok(())
            }
            Err(_) => {
                // the session teardown already released every descriptor
                debug!(fd, "session released before close");
                Ok(())
            }
        }
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(tident = %self.tident, "close on drop failed: {}", e);
        }
    }
}

/// Handle for one file opened through the client
pub struct FileHandle {
    inner: Arc<FileInner>,
    aio: Option<Arc<AioDispatcher>>,
}

impl FileHandle {
    /// An unopened handle; without a dispatcher async requests are refused
    pub fn new(conn: Connection, aio: Option<Arc<AioDispatcher>>, tident: &str) -> Self {
        Self {
            inner: Arc::new(FileInner {
                conn,
                tident: tident.to_string(),
                state: RwLock::new(HandleState::Unopened),
            }),
            aio,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.read().is_open()
    }

    fn dispatcher(&self, what: &'static str) -> Result<&AioDispatcher> {
        self.aio.as_deref().ok_or(OssError::NotSupported(what))
    }
}

impl StorageHandle for FileHandle {
    fn tident(&self) -> &str {
        &self.inner.tident
    }

    fn open(&self, path: &str, flags: i32, mode: u32, env: &OpenEnv) -> Result<()> {
        let mut state = self.inner.state.write();
        state.ensure_unopened()?;

        let hints = LayoutHints::from_env(env, self.inner.conn.variant());
        let op = self.inner.conn.enter()?;
        let fd = op.open_layout(path, flags, mode, &hints).map_err(|errno| {
            debug!(tident = %self.inner.tident, path, "open failed: {}", errno);
            errno
        })?;

        *state = HandleState::Open(fd);
        debug!(tident = %self.inner.tident, path, flags, fd, "opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }

    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.inner.read(buf, offset)
    }

    fn read_probe(&self, _offset: u64, _len: usize) -> Result<usize> {
        self.inner.state.read().resource().map(|_| 0)
    }

    fn read_aio(&self, aio: Aio, done: Box<dyn AioCompletion>) -> Result<()> {
        let pool = self.dispatcher("asynchronous read")?;
        let inner = self.inner.clone();
        pool.dispatch(move || {
            let mut aio = aio;
            let result = inner.read(&mut aio.buffer[..], aio.offset);
            aio.result = retsz(&result);
            done.done_read(aio);
        });
        Ok(())
    }

    fn write(&self, buf: &[u8], offset: u64) -> Result<usize> {
        self.inner.write(buf, offset)
    }

    fn write_aio(&self, aio: Aio, done: Box<dyn AioCompletion>) -> Result<()> {
        let pool = self.dispatcher("asynchronous write")?;
        let inner = self.inner.clone();
        pool.dispatch(move || {
            let mut aio = aio;
            let result = inner.write(&aio.buffer[..], aio.offset);
            aio.result = retsz(&result);
            done.done_write(aio);
        });
        Ok(())
    }

    fn fstat(&self) -> Result<FileStat> {
        let state = self.inner.state.read();
        let fd = state.resource()?;
        let op = self.inner.conn.enter()?;
        Ok(op.fstat(fd)?)
    }

    fn fsync(&self) -> Result<()> {
        let state = self.inner.state.read();
        let fd = state.resource()?;
        let op = self.inner.conn.enter()?;
        Ok(op.fsync(fd, true)?)
    }

    fn fd(&self) -> Option<Fd> {
        self.inner.state.read().resource().ok()
    }
}
