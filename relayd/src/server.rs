//! Embedded relay server handle.
//!
//! A supervising host starts the relay with [`RelayServer::start`], reads
//! [`RelayServer::status`] to show whether it is listening, and calls
//! [`RelayServer::set_port`] when the configured port changes.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use relay_common::{RelayConfig, ScriptRunner, normalize_port};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gate::RunGate;
use crate::http_api::{RelayState, create_router};

/// How long [`RelayServer::stop`] waits for in-flight requests.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Snapshot reported to the supervising host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    pub host: String,
    pub port: u16,
    /// An update script is currently executing.
    pub running: bool,
    /// The listener is accepting connections.
    pub listening: bool,
}

pub struct RelayServer {
    config: RelayConfig,
    host: IpAddr,
    local_addr: SocketAddr,
    runner: Arc<dyn ScriptRunner>,
    state: Arc<RelayState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl RelayServer {
    /// Bind the listener and spawn the service.
    ///
    /// Port `0` binds an ephemeral port; the bound port is what `/health`
    /// and [`RelayServer::status`] report.
    pub async fn start(
        config: &RelayConfig,
        runner: Arc<dyn ScriptRunner>,
    ) -> std::io::Result<Self> {
        Self::bind(config, runner, Arc::new(RunGate::new())).await
    }

    async fn bind(
        config: &RelayConfig,
        runner: Arc<dyn ScriptRunner>,
        gate: Arc<RunGate>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(config.host, config.port)).await?;
        let local_addr = listener.local_addr()?;

        let mut state = RelayState::new(runner.clone(), config, local_addr.port());
        state.gate = gate;
        let state = Arc::new(state);
        let router = create_router(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        info!("listening on http://{}", local_addr);

        Ok(Self {
            config: config.clone(),
            host: config.host,
            local_addr,
            runner,
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            host: self.host.to_string(),
            port: self.local_addr.port(),
            running: self.state.gate.is_running(),
            listening: self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
        }
    }

    /// Stop accepting connections and wait for the service task.
    ///
    /// In-flight requests get [`SHUTDOWN_GRACE`] to finish before the task is
    /// aborted. Calling `stop` twice is a no-op.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(Ok(()))) => debug!("Relay on {} stopped", self.local_addr),
            Ok(Ok(Err(e))) => warn!("Relay on {} stopped with error: {}", self.local_addr, e),
            Ok(Err(e)) => warn!("Relay task on {} failed: {}", self.local_addr, e),
            Err(_) => {
                warn!(
                    "Relay on {} did not stop within {:?}, aborting",
                    self.local_addr, SHUTDOWN_GRACE
                );
                handle.abort();
            }
        }
        info!("Relay stopped");
    }

    /// Stop, then start again with `config` and the same runner.
    ///
    /// The run gate carries over, so an update still running from before the
    /// restart keeps blocking new ones.
    pub async fn restart(&mut self, config: &RelayConfig) -> std::io::Result<()> {
        self.stop().await;
        let next = Self::bind(config, self.runner.clone(), self.state.gate.clone()).await?;
        // Replacing `self` drops the stopped server, whose handles are empty.
        *self = next;
        Ok(())
    }

    /// Apply a port taken from host settings, restarting when it changed.
    ///
    /// Values outside `1024..=65535` fall back to the default port. Returns
    /// the port now in effect.
    pub async fn set_port(&mut self, requested: i64) -> std::io::Result<u16> {
        let port = normalize_port(requested);
        if port != self.local_addr.port() || !self.status().listening {
            let config = RelayConfig {
                port,
                ..self.config.clone()
            };
            self.restart(&config).await?;
        }
        Ok(port)
    }

    /// Wait until the service task ends on its own.
    pub async fn wait(&mut self) -> std::io::Result<()> {
        match self.handle.as_mut() {
            Some(handle) => {
                let result = handle.await.map_err(std::io::Error::other)?;
                self.handle = None;
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
