//! Termination signal handling
//!
//! SIGINT, SIGTERM and SIGQUIT are received by a dedicated thread that
//! runs a small tokio runtime. Nothing happens in signal-handler context:
//! the thread wakes up, drains and releases the mount, then exits the
//! process. Later signals find the coordinator already fired.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::thread;

use once_cell::sync::OnceCell;
use tokio::select;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, info};

use crate::mount::MountManager;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Turns the first termination signal into an orderly shutdown
pub struct ShutdownCoordinator {
    manager: Weak<MountManager>,
    fired: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(manager: Weak<MountManager>) -> Self {
        Self {
            manager,
            fired: AtomicBool::new(false),
        }
    }

    /// Shut the manager down. Returns false if this already happened.
    pub fn trigger(&self, signal: &str) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("ignoring {}, shutdown already running", signal);
            return false;
        }

        info!("received {}, shutting down", signal);
        if let Some(manager) = self.manager.upgrade() {
            manager.shutdown();
        }
        true
    }
}

struct Listeners {
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl Listeners {
    async fn next(&mut self) -> &'static str {
        select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

/// Install the process-wide coordinator for `manager`.
///
/// Returns `Ok(false)` when a coordinator is already installed.
pub fn install(manager: Weak<MountManager>) -> io::Result<bool> {
    let mut installed = false;
    INSTALLED.get_or_try_init(|| -> io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // register before returning so no signal is lost to the default action
        let mut listeners = {
            let _guard = runtime.enter();
            Listeners {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                quit: signal(SignalKind::quit())?,
            }
        };

        let coordinator = ShutdownCoordinator::new(manager);
        thread::Builder::new()
            .name("oss-signals".to_string())
            .spawn(move || {
                let name = runtime.block_on(listeners.next());
                // the mount's own runtimes must not be torn down from async context
                drop(runtime);
                coordinator.trigger(name);
                std::process::exit(0);
            })?;

        installed = true;
        Ok(())
    })?;

    Ok(installed)
}
