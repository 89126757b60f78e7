//! Static file server - serving the built site and checking it is reachable

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to the in-process static file server
pub struct ServerHandle {
    addr: SocketAddr,
    root: PathBuf,
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Serve `root` on the configured address and wait until it answers
    pub async fn start(root: &Path, config: &ServerConfig) -> E2eResult<Self> {
        ensure_servable(root)?;

        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                E2eError::ServerStartup(format!(
                    "could not bind {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}/", addr);

        info!("Serving {} on {}", root.display(), base_url);

        let app = Router::new()
            .fallback_service(ServeDir::new(root))
            .layer(TraceLayer::new_for_http());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("Static server error: {}", e);
            }
        });

        let mut handle = ServerHandle {
            addr,
            root: root.to_path_buf(),
            base_url,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };

        if let Err(e) = handle.wait_for_ready(config).await {
            handle.stop().await;
            return Err(e);
        }

        info!("Server is ready at {}", handle.base_url);
        Ok(handle)
    }

    /// Poll the root URL until it returns a success status
    async fn wait_for_ready(&self, config: &ServerConfig) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < config.ready_timeout() {
            attempts += 1;

            match client.get(&self.base_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Readiness check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while the listener spins up
                    if !e.is_connect() {
                        warn!("Readiness check error: {}", e);
                    }
                }
            }

            sleep(config.poll_interval()).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Base URL with a trailing slash, e.g. `http://127.0.0.1:3333/`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
            && self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the server. Calling this again is a no-op.
    pub async fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };

        info!("Stopping server on {}", self.addr);
        let _ = shutdown.send(());

        if let Some(mut task) = self.task.take() {
            if timeout(Duration::from_secs(2), &mut task).await.is_err() {
                warn!("Server did not drain in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Configuration for the static file server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on (0 = any free port)
    pub port: u16,

    /// How long to wait for the root URL to answer
    pub ready_timeout_ms: u64,

    /// Delay between readiness probes
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3333,
            ready_timeout_ms: 5_000,
            poll_interval_ms: 100,
        }
    }
}

impl ServerConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// The server must never come up against a failed or empty build
fn ensure_servable(root: &Path) -> E2eResult<()> {
    let mut entries = std::fs::read_dir(root).map_err(|e| {
        E2eError::ServerStartup(format!("cannot read {}: {}", root.display(), e))
    })?;

    if entries.next().is_none() {
        return Err(E2eError::ServerStartup(format!(
            "refusing to serve empty directory {}",
            root.display()
        )));
    }
    Ok(())
}

/// Find a free port to use
pub fn find_free_port() -> E2eResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
