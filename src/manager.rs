use std::time::Duration;

use anyhow::Result;
use log::{error, info};

use pkgserve::config::ServerConfig;
use pkgserve::logging::ServerLog;
use pkgserve::service::PackageServer;

/// How often the run loop looks for a pending signal.
const SIGNAL_POLL: Duration = Duration::from_millis(200);

/// Grace period for in-flight downloads on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the HTTP server for the lifetime of the process.
pub struct Supervisor {
    config: ServerConfig,
    log: ServerLog,
}

impl Supervisor {
    pub fn new(config: ServerConfig, log: ServerLog) -> Self {
        Self { config, log }
    }

    /// Start serving and run until SIGINT / SIGTERM.
    pub async fn run(self) -> Result<()> {
        let server = PackageServer::start(&self.config, self.log.clone()).await?;
        let mut sig_tick = tokio::time::interval(SIGNAL_POLL);

        loop {
            sig_tick.tick().await;

            if let Some(sig) = check_signals() {
                info!("signal {sig:?} – orderly shutdown");
                break;
            }
            if server.has_exited() {
                error!("package server stopped unexpectedly");
                break;
            }
        }

        server.shutdown(SHUTDOWN_TIMEOUT).await
    }
}

// Cheap, polling‑based Unix signal handling (lock‑free).
static RECEIVED_SIGNAL: std::sync::LazyLock<std::sync::atomic::AtomicUsize> =
    std::sync::LazyLock::new(|| std::sync::atomic::AtomicUsize::new(0));

pub fn install_signal_handlers() -> anyhow::Result<()> {
    use nix::sys::signal::{self, Signal};
    extern "C" fn handler(sig: i32) {
        RECEIVED_SIGNAL.store(sig as usize, std::sync::atomic::Ordering::SeqCst);
    }

    let action = signal::SigAction::new(
        signal::SigHandler::Handler(handler),
        signal::SaFlags::empty(),
        signal::SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
            anyhow::anyhow!("Failed to register {sig:?} handler: {e}. Signal handling is required to stop the server cleanly.")
        })?;
    }
    Ok(())
}

/// Non‑blocking check – returns Some(signal) once.
fn check_signals() -> Option<nix::sys::signal::Signal> {
    use std::sync::atomic::Ordering::AcqRel;

    use nix::sys::signal::Signal;
    let val = RECEIVED_SIGNAL.swap(0, AcqRel);
    if val == 0 {
        None
    } else {
        match Signal::try_from(val as i32) {
            Ok(sig) => Some(sig),
            Err(e) => {
                log::error!("BUG: Invalid signal number {val} from signal handler: {e}");
                None
            }
        }
    }
}
