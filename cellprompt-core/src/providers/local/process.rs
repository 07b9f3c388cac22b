//! Local model server lifecycle
//!
//! A server is provisioned once: its executable and weights are downloaded
//! when missing, it is started on a free loopback port, and it must answer
//! its health endpoint before the startup timeout.

use crate::config::LocalProcessConfig;
use crate::http::HttpClient;
use crate::providers::{ProviderError, ProviderResult};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tracks every server started by this process
///
/// Children are spawned with `kill_on_drop`, so dropping the registry also
/// stops them; [`shutdown`](Self::shutdown) does it explicitly and waits.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: Mutex<Vec<(String, Child)>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: impl Into<String>, child: Child) {
        self.children.lock().await.push((name.into(), child));
    }

    pub async fn len(&self) -> usize {
        self.children.lock().await.len()
    }

    /// Terminate every registered process
    pub async fn shutdown(&self) {
        let children = std::mem::take(&mut *self.children.lock().await);
        for (name, mut child) in children {
            if let Err(e) = child.start_kill() {
                debug!("{} already stopped: {}", name, e);
                continue;
            }
            match child.wait().await {
                Ok(status) => info!("Stopped local server {} ({})", name, status),
                Err(e) => warn!("Failed to reap local server {}: {}", name, e),
            }
        }
    }
}

/// A running local server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalServer {
    pub port: u16,
}

impl LocalServer {
    /// OpenAI-compatible endpoint of this server
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/v1", self.port)
    }

    fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}/health", self.port)
    }

    /// Provision, start and health-check a server, then register it
    pub async fn start(
        name: &str,
        config: &LocalProcessConfig,
        http: &HttpClient,
        registry: &ProcessRegistry,
        cancel: &CancellationToken,
    ) -> ProviderResult<Self> {
        ensure_asset(http, &config.executable_path, config.executable_url.as_deref()).await?;
        make_executable(&config.executable_path)?;
        if let Some(model_path) = &config.model_path {
            ensure_asset(http, model_path, config.model_url.as_deref()).await?;
        }

        let server = LocalServer { port: free_port()? };

        let mut command = Command::new(&config.executable_path);
        command
            .args(["--server", "--nobrowser", "--host", "127.0.0.1", "--port"])
            .arg(server.port.to_string());
        if let Some(model_path) = &config.model_path {
            command.arg("-m").arg(model_path);
        }
        command
            .args(&config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        info!("Starting {} on port {}", name, server.port);
        let mut child = command
            .spawn()
            .map_err(|e| ProviderError::LocalProcess(format!("Failed to start {}: {}", name, e)))?;

        let timeout = Duration::from_secs(config.startup_timeout_secs);
        if let Err(e) = server.wait_healthy(&mut child, http, timeout, cancel).await {
            let _ = child.start_kill();
            return Err(e);
        }

        info!("{} is healthy on port {}", name, server.port);
        registry.register(name, child).await;
        Ok(server)
    }

    async fn wait_healthy(
        &self,
        child: &mut Child,
        http: &HttpClient,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<()> {
        let deadline = Instant::now() + timeout;
        let url = self.health_url();

        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| ProviderError::LocalProcess(e.to_string()))?
            {
                return Err(ProviderError::LocalProcess(format!(
                    "Server exited during startup ({})",
                    status
                )));
            }

            match http.get_status(&url, HEALTH_PROBE_TIMEOUT).await {
                Ok(200) => return Ok(()),
                Ok(status) => debug!("Health probe returned {}", status),
                Err(e) => debug!("Health probe failed: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(ProviderError::LocalProcess(format!(
                    "Server not healthy after {:?}",
                    timeout
                )));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(HEALTH_POLL_INTERVAL) => {}
            }
        }
    }
}

/// Download `path` from `url` unless it already exists
pub async fn ensure_asset(http: &HttpClient, path: &Path, url: Option<&str>) -> ProviderResult<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!("{} already present", path.display());
        return Ok(());
    }
    match url {
        Some(url) => http.download(url, path).await,
        None => Err(ProviderError::LocalProcess(format!(
            "{} is missing and no download URL is configured",
            path.display()
        ))),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> ProviderResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| ProviderError::LocalProcess(e.to_string()))?;
    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 == 0 {
        permissions.set_mode(permissions.mode() | 0o755);
        std::fs::set_permissions(path, permissions)
            .map_err(|e| ProviderError::LocalProcess(e.to_string()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> ProviderResult<()> {
    Ok(())
}

/// Ask the OS for an unused loopback port
pub fn free_port() -> ProviderResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| ProviderError::LocalProcess(format!("No free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| ProviderError::LocalProcess(e.to_string()))?
        .port();
    Ok(port)
}
