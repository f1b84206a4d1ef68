//! Directory handle

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::HandleState;
use crate::client::{DirCursor, DirEntry};
use crate::error::Result;
use crate::layout::OpenEnv;
use crate::mount::Connection;
use crate::plugin::{copy_cstr, StorageHandle};

/// Handle enumerating one directory
pub struct DirHandle {
    conn: Connection,
    tident: String,
    state: Mutex<HandleState<DirCursor>>,
}

impl DirHandle {
    pub fn new(conn: Connection, tident: &str) -> Self {
        Self {
            conn,
            tident: tident.to_string(),
            state: Mutex::new(HandleState::Unopened),
        }
    }

    /// Next entry, or `None` once the listing is exhausted
    pub fn next_entry(&self) -> Result<Option<DirEntry>> {
        let state = self.state.lock();
        let cursor = state.resource()?;
        let op = self.conn.enter()?;
        Ok(op.readdir(cursor)?)
    }
}

impl StorageHandle for DirHandle {
    fn tident(&self) -> &str {
        &self.tident
    }

    fn opendir(&self, path: &str, _env: &OpenEnv) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_unopened()?;

        let op = self.conn.enter()?;
        let cursor = op.opendir(path)?;
        *state = HandleState::Open(cursor);
        debug!(tident = %self.tident, path, "opendir");
        Ok(())
    }

    fn readdir(&self, buf: &mut [u8]) -> Result<usize> {
        match self.next_entry()? {
            Some(entry) => Ok(copy_cstr(buf, entry.name.as_bytes())),
            None => Ok(copy_cstr(buf, b"")),
        }
    }

    fn close(&self) -> Result<()> {
        let Some(cursor) = self.state.lock().take() else {
            return Ok(());
        };

        match self.conn.enter() {
            Ok(op) => Ok(op.closedir(cursor)?),
            Err(_) => {
                debug!("session released before closedir");
                Ok(())
            }
        }
    }
}

impl Drop for DirHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(tident = %self.tident, "closedir on drop failed: {}", e);
        }
    }
}
