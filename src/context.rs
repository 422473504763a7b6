//! Browsing context acquisition.
//!
//! Decides how pages are prepared for sessions. Attaching to a browser
//! that already shows the surface adopts its first page untouched, so a
//! logged-in tab keeps its state. Everything else gets fresh pages:
//! viewport override, fingerprint masking, cookie seeding from the
//! profile, then navigation to the entry URL.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetCookiesParams, TimeSinceEpoch,
};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::SurfaceConfig;
use crate::connect::{Connection, ConnectionMode};
use crate::error::{Error, Result};
use crate::profile::{Cookie, ProfileStore, SameSite, StorageState};
use crate::query::page::{CdpSurface, SurfacePage};
use crate::session::SessionFactory;

// ============================================================================
// ContextPolicy
// ============================================================================

/// How pages are handed to sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPolicy {
    /// Adopt the attached browser's first page as-is; later sessions get
    /// new tabs without cookie seeding.
    ReuseExisting,
    /// Every session gets a fresh, seeded tab.
    Fresh,
}

// ============================================================================
// SurfaceContext
// ============================================================================

/// A resolved connection plus the page-preparation policy.
///
/// Implements [`SessionFactory`], so the session pool opens its tabs
/// through it.
pub struct SurfaceContext {
    connection: AsyncMutex<Connection>,
    policy: ContextPolicy,
    config: Arc<SurfaceConfig>,
    profiles: Arc<dyn ProfileStore>,
    adoptable: Mutex<Option<Page>>,
}

impl SurfaceContext {
    /// Builds a context over a resolved connection.
    ///
    /// Attached connections with existing pages get the
    /// [`ReuseExisting`](ContextPolicy::ReuseExisting) policy; everything
    /// else is [`Fresh`](ContextPolicy::Fresh).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] if the page list cannot be read.
    pub async fn acquire(
        connection: Connection,
        config: Arc<SurfaceConfig>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Result<Self> {
        let (policy, adoptable) = if connection.mode == ConnectionMode::CdpAttach {
            let mut pages = connection.browser.pages().await?;
            if pages.is_empty() {
                (ContextPolicy::Fresh, None)
            } else {
                info!(pages = pages.len(), "adopting first page of attached browser");
                (ContextPolicy::ReuseExisting, Some(pages.remove(0)))
            }
        } else {
            (ContextPolicy::Fresh, None)
        };
        Ok(Self {
            connection: AsyncMutex::new(connection),
            policy,
            config,
            profiles,
            adoptable: Mutex::new(adoptable),
        })
    }

    /// The policy this context resolved to.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> ContextPolicy {
        self.policy
    }

    /// Prepares a fresh tab: viewport, fingerprint masking, cookie seeding
    /// when the policy asks for it, then navigation to the entry URL.
    async fn prepare_page(&self, page: &Page, seed_cookies: bool) -> Result<()> {
        let viewport = self.config.viewport;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(Error::context)?;
        page.execute(metrics).await?;
        crate::stealth::inject(page).await?;

        if seed_cookies {
            self.seed_storage_state(page).await?;
        }
        page.goto(self.config.entry_url.as_str()).await?;
        Ok(())
    }

    /// Seeds cookies and localStorage from the profile's storage state.
    ///
    /// On a locally launched browser the user-data directory already
    /// carries state, so a seeding failure is only a warning there. On
    /// other connections it is fatal.
    async fn seed_storage_state(&self, page: &Page) -> Result<()> {
        let state = match self.profiles.load_storage_state(&self.config.profile_id) {
            Ok(Some(state)) if !state.is_empty() => state,
            Ok(_) => return Ok(()),
            Err(e) => return self.tolerate_seed_failure(e).await,
        };
        debug!(
            cookies = state.cookies.len(),
            origins = state.origins.len(),
            "seeding storage state"
        );
        if let Err(e) = apply_cookies(page, &state).await {
            return self.tolerate_seed_failure(e).await;
        }
        if let Err(e) = apply_local_storage(page, &state, &self.config.entry_url).await {
            return self.tolerate_seed_failure(e).await;
        }
        Ok(())
    }

    async fn tolerate_seed_failure(&self, error: Error) -> Result<()> {
        let mode = self.connection.lock().await.mode;
        if mode == ConnectionMode::LocalPersistent {
            warn!(error = %error, "storage seeding failed, relying on user-data directory");
            Ok(())
        } else {
            Err(Error::context(format!("storage seeding failed: {error}")))
        }
    }

    /// Writes the first page's live cookies back to the profile.
    ///
    /// Keeps any origins already recorded for the profile; cookies are
    /// replaced wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] if cookies cannot be read, or
    /// [`Error::Profile`] if the state cannot be written.
    pub async fn save_storage_state(&self) -> Result<()> {
        let connection = self.connection.lock().await;
        let pages = connection.browser.pages().await?;
        let Some(page) = pages.first() else {
            debug!("no pages open, skipping storage writeback");
            return Ok(());
        };
        let live = page.get_cookies().await?;
        drop(connection);

        let origins = self
            .profiles
            .load_storage_state(&self.config.profile_id)?
            .map(|s| s.origins)
            .unwrap_or_default();
        let state = StorageState {
            cookies: live.iter().map(cookie_from_cdp).collect(),
            origins,
        };
        self.profiles
            .save_storage_state(&self.config.profile_id, &state)?;
        info!(cookies = state.cookies.len(), "storage state written back");
        Ok(())
    }

    /// Closes the underlying connection. Writes storage state back first
    /// for locally launched browsers.
    ///
    /// # Errors
    ///
    /// Returns connection-layer errors from the close.
    pub async fn close(&self) -> Result<()> {
        let mode = self.connection.lock().await.mode;
        if mode == ConnectionMode::LocalPersistent {
            if let Err(e) = self.save_storage_state().await {
                warn!(error = %e, "storage writeback failed during close");
            }
        }
        self.connection.lock().await.close().await
    }
}

#[async_trait]
impl SessionFactory for SurfaceContext {
    async fn open(&self) -> Result<Arc<dyn SurfacePage>> {
        if let Some(page) = self.adoptable.lock().take() {
            debug!("handing out adopted page");
            return Ok(Arc::new(CdpSurface::new(page, self.config.action_delay)));
        }

        let connection = self.connection.lock().await;
        let page = connection.browser.new_page("about:blank").await?;
        drop(connection);

        let seed_cookies = self.policy == ContextPolicy::Fresh;
        self.prepare_page(&page, seed_cookies).await?;
        Ok(Arc::new(CdpSurface::new(page, self.config.action_delay)))
    }
}

// ============================================================================
// Storage State Application
// ============================================================================

async fn apply_cookies(page: &Page, state: &StorageState) -> Result<()> {
    if state.cookies.is_empty() {
        return Ok(());
    }
    let params: Vec<CookieParam> = state
        .cookies
        .iter()
        .map(cookie_to_cdp)
        .collect::<Result<_>>()?;
    page.execute(SetCookiesParams::new(params)).await?;
    Ok(())
}

fn cookie_to_cdp(cookie: &Cookie) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.as_str())
        .value(cookie.value.as_str())
        .domain(cookie.domain.as_str())
        .path(cookie.path.as_str());
    if let Some(expires) = cookie.expires {
        if expires >= 0.0 {
            builder = builder.expires(TimeSinceEpoch::new(expires));
        }
    }
    if let Some(http_only) = cookie.http_only {
        builder = builder.http_only(http_only);
    }
    if let Some(secure) = cookie.secure {
        builder = builder.secure(secure);
    }
    if let Some(same_site) = cookie.same_site {
        builder = builder.same_site(match same_site {
            SameSite::None => CookieSameSite::None,
            SameSite::Lax => CookieSameSite::Lax,
            SameSite::Strict => CookieSameSite::Strict,
        });
    }
    builder
        .build()
        .map_err(|e| Error::context(format!("cookie {}: {e}", cookie.name)))
}

fn cookie_from_cdp(cookie: &chromiumoxide::cdp::browser_protocol::network::Cookie) -> Cookie {
    Cookie {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        expires: Some(cookie.expires),
        http_only: Some(cookie.http_only),
        secure: Some(cookie.secure),
        same_site: cookie.same_site.as_ref().map(|s| match s {
            CookieSameSite::None => SameSite::None,
            CookieSameSite::Lax => SameSite::Lax,
            CookieSameSite::Strict => SameSite::Strict,
        }),
    }
}

/// Seeds localStorage entries for the entry URL's origin. The page has to
/// visit the origin first; seeding happens on a throwaway navigation.
async fn apply_local_storage(page: &Page, state: &StorageState, entry_url: &str) -> Result<()> {
    let Some(entry_origin) = origin_of(entry_url) else {
        return Ok(());
    };
    let matching: Vec<_> = state
        .origins
        .iter()
        .filter(|o| origin_of(&o.origin).as_deref() == Some(entry_origin.as_str()))
        .collect();
    if matching.is_empty() {
        return Ok(());
    }
    page.goto(entry_url).await?;
    for origin in matching {
        for entry in &origin.local_storage {
            let key = serde_json::to_string(&entry.name)?;
            let value = serde_json::to_string(&entry.value)?;
            page.evaluate(format!("localStorage.setItem({key}, {value})"))
                .await?;
        }
    }
    Ok(())
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

// ============================================================================
// Tests
// ============================================================================
