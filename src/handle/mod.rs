//! File and directory handles
//!
//! A handle moves Unopened -> Open -> Closed. Opening is only valid from
//! Unopened; a failed open leaves it there. Closing releases the client
//! resource exactly once and is repeatable.

pub mod dir;
pub mod file;

pub use dir::DirHandle;
pub use file::FileHandle;

use crate::error::{OssError, Result};

/// Lifecycle of a handle holding a client resource `D`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState<D> {
    Unopened,
    Open(D),
    Closed,
}

impl<D> Default for HandleState<D> {
    fn default() -> Self {
        HandleState::Unopened
    }
}

impl<D: Copy> HandleState<D> {
    /// The open resource
    pub fn resource(&self) -> Result<D> {
        match self {
            HandleState::Open(d) => Ok(*d),
            _ => Err(OssError::NotOpen),
        }
    }

    /// Check that an open may proceed
    pub fn ensure_unopened(&self) -> Result<()> {
        match self {
            HandleState::Unopened => Ok(()),
            _ => Err(OssError::AlreadyOpen),
        }
    }

    /// Move to Closed, yielding the resource if it was open
    pub fn take(&mut self) -> Option<D> {
        match std::mem::replace(self, HandleState::Closed) {
            HandleState::Open(d) => Some(d),
            HandleState::Unopened => {
                // never opened: nothing to release and still reopenable
                *self = HandleState::Unopened;
                None
            }
            HandleState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, HandleState::Open(_))
    }
}
