//! Mount management and lifecycle
//!
//! One [`MountManager`] owns the process's session with the filesystem.
//! It hands out [`Connection`]s that handles and the facade keep, and
//! every client call is registered through [`Connection::enter`] so that
//! shutdown can refuse new work and wait for the calls already running.

use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::aio::AioDispatcher;
use crate::client::local::LocalFactory;
use crate::client::{ClientFactory, FsClient};
use crate::config::{Config, Variant};
use crate::error::{OssError, Result};
use crate::signals;

/// Admission state of a connection
struct Gate {
    accepting: bool,
    running: usize,
}

struct Shared {
    client: Arc<dyn FsClient>,
    config: Config,
    gate: Mutex<Gate>,
    idle: Condvar,
    released: AtomicBool,
}

/// Shared view of a mounted session
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.shared.gate.lock();
        f.debug_struct("Connection")
            .field("id", &self.shared.config.id)
            .field("volume", &self.shared.config.volume)
            .field("accepting", &gate.accepting)
            .field("running", &gate.running)
            .finish()
    }
}

impl Connection {
    fn new(client: Arc<dyn FsClient>, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                config,
                gate: Mutex::new(Gate {
                    accepting: true,
                    running: 0,
                }),
                idle: Condvar::new(),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Register one client call. Fails once shutdown has started.
    pub fn enter(&self) -> Result<Op> {
        let mut gate = self.shared.gate.lock();
        if !gate.accepting {
            return Err(OssError::ShuttingDown);
        }
        gate.running += 1;
        Ok(Op {
            shared: self.shared.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn variant(&self) -> Variant {
        self.shared.config.variant
    }

    /// True until shutdown starts
    pub fn is_live(&self) -> bool {
        self.shared.gate.lock().accepting
    }

    /// Number of client calls currently running
    pub fn inflight(&self) -> usize {
        self.shared.gate.lock().running
    }

    /// Stop admitting calls and wait up to `timeout` for running ones.
    /// Returns how many were still running when the wait ended.
    fn quiesce(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut gate = self.shared.gate.lock();
        gate.accepting = false;

        while gate.running > 0 {
            if self.shared.idle.wait_until(&mut gate, deadline).timed_out() {
                break;
            }
        }
        gate.running
    }

    /// Release the session. Only the first call reaches the client.
    fn release(&self) {
        if !self.shared.released.swap(true, Ordering::SeqCst) {
            self.shared.client.shutdown();
        }
    }
}

/// A registered client call, dereferencing to the client
///
/// Dropping it ends the call. It owns its connection reference so it can
/// travel to a worker thread with an asynchronous request.
pub struct Op {
    shared: Arc<Shared>,
}

impl Deref for Op {
    type Target = dyn FsClient;

    fn deref(&self) -> &Self::Target {
        self.shared.client.as_ref()
    }
}

impl Drop for Op {
    fn drop(&mut self) {
        let mut gate = self.shared.gate.lock();
        gate.running -= 1;
        if gate.running == 0 {
            self.shared.idle.notify_all();
        }
    }
}

enum MountState {
    Idle,
    Live(Connection),
    Shutdown,
}

static INSTANCE: OnceCell<Arc<MountManager>> = OnceCell::new();

/// Mount manager - owns the lifecycle of the process-wide session
pub struct MountManager {
    factory: Arc<dyn ClientFactory>,
    variant: Variant,
    install_signals: bool,
    state: Mutex<MountState>,
    /// Pool for asynchronous requests, present once an async-capable
    /// variant is mounted. Requests never hold it, only handles do.
    aio: Mutex<Option<Arc<AioDispatcher>>>,
}

impl MountManager {
    /// Create a manager that installs termination handlers on first mount
    pub fn new(factory: Arc<dyn ClientFactory>, variant: Variant) -> Self {
        Self {
            factory,
            variant,
            install_signals: true,
            state: Mutex::new(MountState::Idle),
            aio: Mutex::new(None),
        }
    }

    /// Leave process signal dispositions alone
    pub fn without_signal_handlers(mut self) -> Self {
        self.install_signals = false;
        self
    }

    /// The process-wide manager.
    ///
    /// Unless [`MountManager::install`] ran first, this is a manager for
    /// the local passthrough client.
    pub fn instance() -> Arc<MountManager> {
        INSTANCE
            .get_or_init(|| Arc::new(MountManager::new(Arc::new(LocalFactory), Variant::Cephfs)))
            .clone()
    }

    /// Make `manager` the process-wide manager. Fails if one already exists.
    pub fn install(manager: Arc<MountManager>) -> std::result::Result<(), Arc<MountManager>> {
        INSTANCE.set(manager)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Parse the host configuration file and mount.
    ///
    /// Returns immediately once a session is live.
    pub fn initialize(self: &Arc<Self>, config_path: &Path) -> Result<Connection> {
        if let Ok(conn) = self.connection() {
            debug!("already initialized");
            return Ok(conn);
        }

        let config = Config::from_file(config_path, self.variant).map_err(|e| {
            error!("failed to load {}: {}", config_path.display(), e);
            e
        })?;
        config.log_summary();
        self.initialize_with(config)
    }

    /// Create the client session described by `config` and mount it
    pub fn initialize_with(self: &Arc<Self>, config: Config) -> Result<Connection> {
        let mut state = self.state.lock();
        match &*state {
            MountState::Live(conn) => {
                debug!("already initialized");
                return Ok(conn.clone());
            }
            MountState::Shutdown => return Err(OssError::ShuttingDown),
            MountState::Idle => {}
        }

        let aio = if self.variant.supports_aio() {
            Some(Arc::new(AioDispatcher::new(config.aio_workers)?))
        } else {
            None
        };

        let client = self
            .factory
            .create(&config.id)
            .map_err(|errno| OssError::Connection {
                what: format!("cannot create client '{}'", config.id),
                errno,
            })?;

        client
            .conf_read_file(&config.ceph_config)
            .map_err(|errno| {
                error!(
                    "failed to read client config {}: {}",
                    config.ceph_config.display(),
                    errno
                );
                OssError::Connection {
                    what: format!("cannot read {}", config.ceph_config.display()),
                    errno,
                }
            })?;

        client.mount(&config.volume).map_err(|errno| {
            error!("mount of {} failed retc=-{}", config.volume, errno.0);
            OssError::Connection {
                what: format!("cannot mount {}", config.volume),
                errno,
            }
        })?;

        info!("mounted volume {} as client '{}'", config.volume, config.id);
        let conn = Connection::new(client, config);
        *self.aio.lock() = aio;
        *state = MountState::Live(conn.clone());
        drop(state);

        if self.install_signals {
            match signals::install(Arc::downgrade(self)) {
                Ok(true) => debug!("termination handlers installed"),
                Ok(false) => {}
                Err(e) => warn!("cannot install termination handlers: {}", e),
            }
        }

        Ok(conn)
    }

    /// The live connection
    pub fn connection(&self) -> Result<Connection> {
        match &*self.state.lock() {
            MountState::Live(conn) => Ok(conn.clone()),
            MountState::Idle => Err(OssError::NotMounted),
            MountState::Shutdown => Err(OssError::ShuttingDown),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(&*self.state.lock(), MountState::Live(_))
    }

    /// The asynchronous request pool, if the mounted variant has one
    pub fn aio(&self) -> Option<Arc<AioDispatcher>> {
        self.aio.lock().clone()
    }

    /// Drain in-flight work and release the session.
    ///
    /// Only the first call on a live manager does anything.
    pub fn shutdown(&self) {
        let conn = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, MountState::Shutdown) {
                MountState::Live(conn) => conn,
                MountState::Idle => {
                    *state = MountState::Idle;
                    return;
                }
                MountState::Shutdown => return,
            }
        };

        let timeout = conn.config().drain_timeout;
        info!("running shutdown");
        let abandoned = conn.quiesce(timeout);
        if abandoned > 0 {
            warn!(
                "{} operations still running after {}, releasing session anyway",
                abandoned,
                humantime::format_duration(timeout)
            );
        }
        conn.release();
        info!("shutdown completed");
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A live connection over an already constructed client, mounted at `/`
#[cfg(test)]
pub(crate) fn mounted(client: Arc<dyn FsClient>, variant: Variant) -> Connection {
    client.mount("/").expect("mount test client");
    Connection::new(client, Config::new(variant))
}
