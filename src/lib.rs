//! cephfs-oss: a storage-plugin adapter exposing a distributed filesystem
//! to a data-server host
//!
//! The host talks to the adapter through the [`plugin`] contract; the
//! adapter forwards every request to a filesystem client mounted once per
//! process.
//!
//! # Architecture
//!
//! - **Client**: The filesystem capability set ([`client::FsClient`]) the
//!   adapter forwards to. Failures are positive errno values that reach the
//!   host untouched.
//! - **Mount Manager**: Creates, configures and mounts the single client
//!   session, and drains it on shutdown or termination signals.
//! - **Facade**: [`adapter::CephAdapter`] implements path-level operations
//!   and creates handles.
//! - **Handles**: File and directory handles with an explicit
//!   Unopened/Open/Closed lifecycle; file reads and writes may be queued on
//!   a bounded asynchronous pool.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use cephfs_oss::adapter::CephAdapter;
//! use cephfs_oss::layout::OpenEnv;
//! use cephfs_oss::plugin::StorageSystem;
//!
//! # fn example() -> cephfs_oss::Result<()> {
//! let oss = CephAdapter::global();
//! oss.init(Path::new("/etc/xrootd/xrootd-cephfs.cfg"))?;
//!
//! let file = oss.new_file("user.1:7@client")?;
//! file.open("/data/run1.root", libc::O_RDONLY, 0, &OpenEnv::new())?;
//! let mut buf = vec![0u8; 4096];
//! let n = file.read(&mut buf, 0)?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod aio;
pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod handle;
pub mod layout;
pub mod logging;
pub mod mount;
pub mod plugin;
pub mod signals;

pub use error::{OssError, Result};
