use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::logging::ServerLog;
use crate::service::http::{AppState, router};

/// Handle to the package HTTP server running in a background task
pub struct PackageServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<std::io::Result<()>>,
}

impl PackageServer {
    /// Bind the listener and start serving (non-blocking - returns once bound)
    pub async fn start(config: &ServerConfig, log: ServerLog) -> Result<Self> {
        let listener = TcpListener::bind(config.bind)
            .await
            .with_context(|| format!("Failed to bind {}", config.bind))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        let store = config.manifest_store();
        log::info!(
            "Serving packages from {} (manifest {})",
            store.store_dir().display(),
            store.manifest_path().display()
        );
        let app = router(AppState::new(store, log), config.max_concurrent_requests);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    // A dropped sender also ends the server
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        log::info!("Package server listening on {local_addr}");
        Ok(Self {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True once the serve task has ended, whether by shutdown or failure
    pub fn has_exited(&self) -> bool {
        self.task.is_finished()
    }

    /// Gracefully shutdown: stop accepting, let in-flight requests finish
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        log::info!("Shutting down package server on {}", self.local_addr);
        self.shutdown_tx.send_replace(true);

        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(Ok(()))) => {
                log::info!("Package server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e).context("Package server failed"),
            Ok(Err(e)) => Err(anyhow::anyhow!("Package server task aborted: {e}")),
            Err(_) => Err(anyhow::anyhow!(
                "Package server did not stop within {timeout:?}"
            )),
        }
    }
}
