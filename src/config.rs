//! Surface configuration.
//!
//! Describes everything the crate needs to know about a target surface:
//! entry URL, the selector vocabulary for its DOM, connection preferences,
//! profile and results locations, and the polling budgets for completion
//! detection.
//!
//! # Example
//!
//! ```ignore
//! use chatpilot::SurfaceConfig;
//!
//! let config = SurfaceConfig::new("https://chat.example.com")
//!     .with_input_selector("textarea#prompt")
//!     .with_answer_selector("div.answer-block")
//!     .with_headless();
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default remote-debugging endpoint probed when attach is requested
/// without an explicit address.
pub const DEFAULT_CDP_ENDPOINT: &str = "http://localhost:9222";

/// Environment variable consulted for the remote-debugging endpoint.
pub const CDP_ENDPOINT_ENV: &str = "CHATPILOT_CDP_URL";

/// Default profile identifier when none is configured.
pub const DEFAULT_PROFILE_ID: &str = "default";

/// Pattern matching reasoning-disclosure toggles across common locales.
pub const DEFAULT_REASONING_PATTERN: &str =
    r"(?i)(thoughts|thinking|reasoning|steps|razonamiento|réflexion|gedanken|思考)";

// ============================================================================
// Viewport
// ============================================================================

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 900,
        }
    }
}

// ============================================================================
// SurfaceConfig
// ============================================================================

/// Configuration for one conversational surface.
///
/// Selector fields describe the surface's DOM; connection fields choose how
/// a browser is obtained; budget fields bound the completion-detection loop.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// URL of the surface's conversation page.
    pub entry_url: String,

    /// Configured input selectors, probed in order before the generic
    /// fallbacks (`textarea`, `[contenteditable="true"]`).
    pub input_selectors: Vec<String>,

    /// Selector for the follow-up input shown once a conversation exists.
    /// Probed after `input_selectors` when set.
    pub followup_selector: Option<String>,

    /// Selector matching answer containers.
    pub answer_selector: String,

    /// Selector for the deep-research toggle, when the surface has one.
    pub deep_research_selector: Option<String>,

    /// Regex matched against clickable text to expand reasoning disclosures
    /// before extraction.
    pub reasoning_toggle_pattern: String,

    /// Identifier of the profile whose storage state seeds fresh contexts.
    pub profile_id: String,

    /// Root directory for profile data. Defaults under the platform data dir.
    pub profile_dir: PathBuf,

    /// Directory where query results are persisted.
    pub results_dir: PathBuf,

    /// Endpoint tried first and skipped on failure, before any other
    /// strategy.
    pub endpoint_override: Option<String>,

    /// Explicit WebSocket debugger URL. Attach to it or fail.
    pub ws_endpoint: Option<String>,

    /// Attach to an already-running browser over its remote-debugging port
    /// instead of launching one.
    pub cdp_attach: bool,

    /// Remote-debugging HTTP endpoint for [`cdp_attach`](Self::cdp_attach).
    /// Falls back to [`CDP_ENDPOINT_ENV`] then [`DEFAULT_CDP_ENDPOINT`].
    pub cdp_endpoint: Option<String>,

    /// Launch the local browser without a visible window.
    pub headless: bool,

    /// Viewport applied to freshly created pages.
    pub viewport: Viewport,

    /// Pause inserted between filling the input and submitting.
    pub action_delay: Duration,

    /// Per-candidate budget when probing input selectors.
    pub selector_timeout: Duration,

    /// Interval between completion-detection polls.
    pub poll_interval: Duration,

    /// Maximum polls while waiting for a new answer container.
    pub generation_budget: u32,

    /// Maximum polls while waiting for the answer text to stop changing.
    pub stability_budget: u32,

    /// Consecutive unchanged reads required to declare the answer complete.
    pub stability_threshold: u32,
}

// ============================================================================
// Constructors
// ============================================================================

impl SurfaceConfig {
    /// Creates a configuration for the given entry URL with default
    /// selectors, budgets, and storage locations.
    #[must_use]
    pub fn new(entry_url: impl Into<String>) -> Self {
        let data_root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatpilot");
        Self {
            entry_url: entry_url.into(),
            input_selectors: Vec::new(),
            followup_selector: None,
            answer_selector: String::from("[data-answer]"),
            deep_research_selector: None,
            reasoning_toggle_pattern: DEFAULT_REASONING_PATTERN.to_string(),
            profile_id: DEFAULT_PROFILE_ID.to_string(),
            profile_dir: data_root.join("profiles"),
            results_dir: data_root.join("results"),
            endpoint_override: None,
            ws_endpoint: None,
            cdp_attach: false,
            cdp_endpoint: None,
            headless: false,
            viewport: Viewport::default(),
            action_delay: Duration::from_millis(400),
            selector_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            generation_budget: 60,
            stability_budget: 240,
            stability_threshold: 5,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SurfaceConfig {
    /// Appends an input selector candidate.
    #[inline]
    #[must_use]
    pub fn with_input_selector(mut self, selector: impl Into<String>) -> Self {
        self.input_selectors.push(selector.into());
        self
    }

    /// Sets the follow-up input selector.
    #[inline]
    #[must_use]
    pub fn with_followup_selector(mut self, selector: impl Into<String>) -> Self {
        self.followup_selector = Some(selector.into());
        self
    }

    /// Sets the answer container selector.
    #[inline]
    #[must_use]
    pub fn with_answer_selector(mut self, selector: impl Into<String>) -> Self {
        self.answer_selector = selector.into();
        self
    }

    /// Sets the deep-research toggle selector.
    #[inline]
    #[must_use]
    pub fn with_deep_research_selector(mut self, selector: impl Into<String>) -> Self {
        self.deep_research_selector = Some(selector.into());
        self
    }

    /// Sets the profile identifier.
    #[inline]
    #[must_use]
    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = profile_id.into();
        self
    }

    /// Sets the try-first endpoint that is skipped on failure.
    #[inline]
    #[must_use]
    pub fn with_endpoint_override(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    /// Sets an explicit WebSocket debugger URL.
    #[inline]
    #[must_use]
    pub fn with_ws_endpoint(mut self, url: impl Into<String>) -> Self {
        self.ws_endpoint = Some(url.into());
        self
    }

    /// Requests attach to a running browser's remote-debugging port.
    #[inline]
    #[must_use]
    pub fn with_cdp_attach(mut self) -> Self {
        self.cdp_attach = true;
        self
    }

    /// Sets the remote-debugging HTTP endpoint for attach.
    #[inline]
    #[must_use]
    pub fn with_cdp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.cdp_endpoint = Some(endpoint.into());
        self
    }

    /// Enables headless launch.
    #[inline]
    #[must_use]
    pub fn with_headless(mut self) -> Self {
        self.headless = true;
        self
    }

    /// Sets the viewport applied to fresh pages.
    #[inline]
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// Sets the results directory.
    #[inline]
    #[must_use]
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    /// Sets the profile data root.
    #[inline]
    #[must_use]
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = dir.into();
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SurfaceConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the entry URL is empty, the answer
    /// selector is empty, the reasoning pattern does not compile, a budget
    /// is zero, or mutually exclusive connection modes are both requested.
    pub fn validate(&self) -> Result<()> {
        if self.entry_url.is_empty() {
            return Err(Error::config("entry_url must not be empty"));
        }
        if self.answer_selector.is_empty() {
            return Err(Error::config("answer_selector must not be empty"));
        }
        if let Err(e) = regex::Regex::new(&self.reasoning_toggle_pattern) {
            return Err(Error::config(format!(
                "reasoning_toggle_pattern is not a valid regex: {e}"
            )));
        }
        if self.ws_endpoint.is_some() && self.cdp_attach {
            return Err(Error::config(
                "ws_endpoint and cdp_attach are mutually exclusive",
            ));
        }
        if self.generation_budget == 0 || self.stability_budget == 0 {
            return Err(Error::config("polling budgets must be non-zero"));
        }
        if self.stability_threshold == 0 {
            return Err(Error::config("stability_threshold must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
