//! Connection strategy resolution.
//!
//! Produces a live browser connection by trying strategies in a fixed
//! order:
//!
//! 1. Configured endpoint override: attach, skip on failure.
//! 2. Explicit WebSocket debugger URL: attach or fail.
//! 3. Remote-debugging attach: structured attach with a deadline, then a
//!    manual version fetch with loopback host rewrite, or fail with both
//!    messages.
//! 4. Local launch with the profile's user-data directory.
//!
//! Attached browsers are never killed on close; launched ones are.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::handler::Handler;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SurfaceConfig;
use crate::connect::endpoint::{fetch_ws_url, resolve_cdp_endpoint, rewrite_advertised_host};
use crate::error::{Error, Result};
use crate::profile::ProfileStore;

// ============================================================================
// Constants
// ============================================================================

/// Deadline for the structured attach attempt before falling back to the
/// manual version fetch.
const STRUCTURED_ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ConnectionMode
// ============================================================================

/// How the browser connection was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Locally launched process with a persistent profile directory.
    LocalPersistent,
    /// Attached via an explicit WebSocket debugger URL.
    WebSocketAttach,
    /// Attached via the remote-debugging HTTP endpoint.
    CdpAttach,
}

impl ConnectionMode {
    /// Returns `true` if the connection attached to a browser this crate
    /// did not launch.
    #[inline]
    #[must_use]
    pub fn is_attached(self) -> bool {
        !matches!(self, Self::LocalPersistent)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A live browser connection plus the task pumping its event stream.
pub struct Connection {
    /// The connected browser.
    pub browser: Browser,
    /// How the connection was obtained.
    pub mode: ConnectionMode,
    handler_task: JoinHandle<()>,
}

impl Connection {
    fn new(browser: Browser, mode: ConnectionMode, handler_task: JoinHandle<()>) -> Self {
        Self {
            browser,
            mode,
            handler_task,
        }
    }

    /// Shuts the connection down.
    ///
    /// A launched browser is asked to exit and awaited; an attached browser
    /// is left running and only the local event pump stops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] if a launched browser rejects the close
    /// command.
    pub async fn close(&mut self) -> Result<()> {
        if self.mode.is_attached() {
            debug!("detaching from external browser");
            self.handler_task.abort();
            return Ok(());
        }
        info!("closing launched browser");
        self.browser.close().await?;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionResolver
// ============================================================================

/// Resolves a [`Connection`] from surface configuration.
pub struct ConnectionResolver {
    config: Arc<SurfaceConfig>,
    profiles: Arc<dyn ProfileStore>,
}

impl ConnectionResolver {
    /// Creates a resolver over the given configuration and profile store.
    #[inline]
    #[must_use]
    pub fn new(config: Arc<SurfaceConfig>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { config, profiles }
    }

    /// Resolves a connection by walking the strategy chain.
    ///
    /// # Errors
    ///
    /// Returns a connection-layer error when the selected strategy fails.
    /// Only the endpoint-override strategy falls through on failure; every
    /// other strategy is final once selected.
    pub async fn resolve(&self) -> Result<Connection> {
        if let Some(endpoint) = &self.config.endpoint_override {
            match self.attach_via_endpoint(endpoint).await {
                Ok(conn) => {
                    info!(endpoint = %endpoint, "attached via endpoint override");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "endpoint override failed, trying next strategy");
                }
            }
        }

        if let Some(ws_url) = &self.config.ws_endpoint {
            let (browser, task) = attach(ws_url).await.map_err(|e| {
                Error::connection(format!("attach to {ws_url} failed: {e}"))
            })?;
            info!(url = %ws_url, "attached via explicit WebSocket URL");
            return Ok(Connection::new(browser, ConnectionMode::WebSocketAttach, task));
        }

        if self.config.cdp_attach {
            let endpoint = resolve_cdp_endpoint(self.config.cdp_endpoint.as_deref());
            return self.attach_via_endpoint(&endpoint).await;
        }

        self.launch_local().await
    }

    /// Attaches over a remote-debugging HTTP endpoint.
    ///
    /// Tries the structured attach first under a deadline, then fetches the
    /// advertised debugger URL and retries once with the loopback host
    /// rewrite applied.
    async fn attach_via_endpoint(&self, endpoint: &str) -> Result<Connection> {
        let structured_err = match timeout(STRUCTURED_ATTACH_TIMEOUT, attach(endpoint)).await {
            Ok(Ok((browser, task))) => {
                debug!(endpoint = %endpoint, "structured attach succeeded");
                return Ok(Connection::new(browser, ConnectionMode::CdpAttach, task));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "timed out after {}ms",
                STRUCTURED_ATTACH_TIMEOUT.as_millis()
            ),
        };
        debug!(endpoint = %endpoint, error = %structured_err, "structured attach failed, fetching version info");

        let fallback_err = match self.attach_via_version_fetch(endpoint).await {
            Ok(conn) => return Ok(conn),
            Err(e) => e.to_string(),
        };
        Err(Error::attach(structured_err, fallback_err))
    }

    async fn attach_via_version_fetch(&self, endpoint: &str) -> Result<Connection> {
        let advertised = fetch_ws_url(endpoint).await?;
        let ws_url = match rewrite_advertised_host(&advertised, endpoint)? {
            Some(rewritten) => {
                debug!(advertised = %advertised, rewritten = %rewritten, "rewrote advertised debugger host");
                rewritten
            }
            None => advertised,
        };
        let (browser, task) = attach(&ws_url).await?;
        info!(url = %ws_url, "attached via version fetch");
        Ok(Connection::new(browser, ConnectionMode::CdpAttach, task))
    }

    /// Launches a local browser bound to the profile's user-data directory.
    async fn launch_local(&self) -> Result<Connection> {
        let user_data = self.profiles.user_data_dir(&self.config.profile_id)?;
        let viewport = self.config.viewport;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data)
            .window_size(viewport.width, viewport.height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-infobars");
        builder = if self.config.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };
        let browser_config = builder
            .build()
            .map_err(Error::launch_failed)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::launch_failed(e.to_string()))?;
        let task = spawn_event_pump(handler);
        info!(
            profile = %self.config.profile_id,
            user_data = %user_data.display(),
            headless = self.config.headless,
            "launched local browser"
        );
        Ok(Connection::new(browser, ConnectionMode::LocalPersistent, task))
    }
}

// ============================================================================
// Attach Helpers
// ============================================================================

/// Connects to a debugger URL and starts the event pump.
async fn attach(url: &str) -> Result<(Browser, JoinHandle<()>)> {
    let (browser, handler) = Browser::connect(url).await?;
    Ok((browser, spawn_event_pump(handler)))
}

/// Drains browser events on a background task so the connection stays live.
fn spawn_event_pump(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!(error = %e, "browser event stream error");
            }
        }
        debug!("browser event stream ended");
    })
}

// ============================================================================
// Tests
// ============================================================================
