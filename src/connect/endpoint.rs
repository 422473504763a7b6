//! Remote-debugging endpoint discovery.
//!
//! Attaching to a running browser needs its WebSocket debugger URL. The
//! browser advertises it at `<endpoint>/json/version`, but the advertised
//! host reflects the browser's view of its own address, which is wrong when
//! it runs behind a port forward or in a container. The rewrite below keeps
//! the host the caller actually asked for.

// ============================================================================
// Imports
// ============================================================================

use std::env;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::{CDP_ENDPOINT_ENV, DEFAULT_CDP_ENDPOINT};
use crate::error::{Error, Result};

// ============================================================================
// Endpoint Resolution
// ============================================================================

/// Resolves the remote-debugging HTTP endpoint to probe.
///
/// Precedence: explicit configuration, then the `CHATPILOT_CDP_URL`
/// environment variable, then `http://localhost:9222`.
#[must_use]
pub fn resolve_cdp_endpoint(configured: Option<&str>) -> String {
    if let Some(endpoint) = configured {
        return endpoint.to_string();
    }
    if let Ok(endpoint) = env::var(CDP_ENDPOINT_ENV) {
        if !endpoint.is_empty() {
            return endpoint;
        }
    }
    DEFAULT_CDP_ENDPOINT.to_string()
}

// ============================================================================
// Version Fetch
// ============================================================================

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Fetches the WebSocket debugger URL advertised at `<endpoint>/json/version`.
///
/// # Errors
///
/// Returns [`Error::Http`] if the request fails, or [`Error::Connection`]
/// if the response does not carry a debugger URL.
pub async fn fetch_ws_url(endpoint: &str) -> Result<String> {
    let version_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    debug!(url = %version_url, "fetching debugger version info");
    let info: VersionInfo = reqwest::get(&version_url)
        .await?
        .error_for_status()?
        .json()
        .await?;
    if info.web_socket_debugger_url.is_empty() {
        return Err(Error::connection(format!(
            "{version_url} returned no webSocketDebuggerUrl"
        )));
    }
    Ok(info.web_socket_debugger_url)
}

// ============================================================================
// Host Rewrite
// ============================================================================

/// Rewrites the advertised WebSocket URL's authority to match the endpoint
/// the caller requested.
///
/// Returns `Ok(Some(url))` with the rewritten URL when the requested host is
/// a loopback name and the advertised host differs, `Ok(None)` when no
/// rewrite is needed.
///
/// # Errors
///
/// Returns [`Error::Connection`] if either URL cannot be parsed.
pub fn rewrite_advertised_host(advertised: &str, requested: &str) -> Result<Option<String>> {
    let mut ws = Url::parse(advertised)
        .map_err(|e| Error::connection(format!("bad advertised URL {advertised}: {e}")))?;
    let req = Url::parse(requested)
        .map_err(|e| Error::connection(format!("bad endpoint URL {requested}: {e}")))?;

    let req_host = req
        .host_str()
        .ok_or_else(|| Error::connection(format!("endpoint URL {requested} has no host")))?;
    if req_host != "localhost" && req_host != "127.0.0.1" {
        return Ok(None);
    }
    if ws.host_str() == Some(req_host) && ws.port() == req.port() {
        return Ok(None);
    }

    ws.set_host(Some(req_host))
        .map_err(|e| Error::connection(format!("cannot rewrite host: {e}")))?;
    ws.set_port(req.port())
        .map_err(|()| Error::connection("cannot rewrite port"))?;
    Ok(Some(ws.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
