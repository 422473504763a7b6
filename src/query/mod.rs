//! Query execution.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`page`] | Page trait seam and the CDP implementation |
//! | [`poll`] | Bounded polling combinators |
//! | [`extract`] | Citation rewriting and response assembly |
//!
//! [`QueryExecutor`] drives one turn against a page: locate the input,
//! submit, wait for a new answer container, wait for its text to settle,
//! then extract and persist. The surface offers no completion signal, so
//! the whole pipeline is bounded polling over the DOM.

pub mod extract;
pub mod page;
pub mod poll;

pub use extract::{QueryResponse, Source};
pub use page::{CdpSurface, RawAnchor, RawExtract, RawStep, SurfacePage};
pub use poll::{PollBudget, Stability};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::SurfaceConfig;
use crate::error::{Error, Result};
use crate::results;

// ============================================================================
// Constants
// ============================================================================

/// Fallback input selectors probed after the configured candidates.
pub const GENERIC_INPUT_SELECTORS: &[&str] = &["textarea", "[contenteditable=\"true\"]"];

/// Interval between probes of one input selector candidate.
const INPUT_PROBE_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// Phase
// ============================================================================

/// Where a query currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Probing input selector candidates.
    Locating,
    /// Filling and submitting the query.
    Submitting,
    /// Waiting for a new answer container.
    Generating,
    /// Waiting for the answer text to stop changing.
    Stabilizing,
    /// Reading the answer out of the DOM.
    Extracting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Locating => "locating",
            Self::Submitting => "submitting",
            Self::Generating => "generating",
            Self::Stabilizing => "stabilizing",
            Self::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

// ============================================================================
// QueryOptions
// ============================================================================

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Route to the session with this id.
    pub session_id: Option<String>,
    /// Route to the session with this name, creating it if absent.
    pub session_name: Option<String>,
    /// Engage the surface's deep-research mode for this query.
    pub deep_research: bool,
}

impl QueryOptions {
    /// Options targeting a session by name.
    #[inline]
    #[must_use]
    pub fn in_session(name: impl Into<String>) -> Self {
        Self {
            session_name: Some(name.into()),
            ..Self::default()
        }
    }
}

// ============================================================================
// QueryExecutor
// ============================================================================

/// Runs query turns against pages.
pub struct QueryExecutor {
    config: Arc<SurfaceConfig>,
}

impl QueryExecutor {
    /// Creates an executor over the given configuration.
    #[inline]
    #[must_use]
    pub fn new(config: Arc<SurfaceConfig>) -> Self {
        Self { config }
    }

    /// Runs one query turn against a page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputNotFound`] when no input selector matches,
    /// [`Error::GenerationTimeout`] when no answer container appears and
    /// none existed before, and [`Error::Extraction`] when the DOM read
    /// fails. Persistence failures are logged, never returned.
    pub async fn run(&self, page: &dyn SurfacePage, query: &str) -> Result<QueryResponse> {
        self.run_with(page, query, &QueryOptions::default()).await
    }

    /// Runs one query turn with explicit options.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with(
        &self,
        page: &dyn SurfacePage,
        query: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        info!(phase = %Phase::Locating, "probing for query input");
        let input = self.locate_input(page).await?;
        debug!(selector = %input, "input located");

        info!(phase = %Phase::Submitting, "submitting query");
        // Baseline first: containers present now are previous answers.
        let baseline = page.count(&self.config.answer_selector).await?;
        if options.deep_research {
            self.engage_deep_research(page).await;
        }
        page.fill(&input, query).await?;
        page.press_enter(&input).await?;

        info!(phase = %Phase::Generating, baseline, "waiting for answer container");
        let index = self.await_container(page, baseline).await?;

        info!(phase = %Phase::Stabilizing, index, "waiting for answer to settle");
        self.await_stable(page, index).await?;

        info!(phase = %Phase::Extracting, "extracting answer");
        self.expand_reasoning(page).await;
        let raw = page
            .extract_raw(&self.config.answer_selector, index)
            .await
            .inspect_err(|e| warn!(error = %e, "extraction failed"))?;
        let url = match page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "could not read page URL");
                None
            }
        };
        let response = extract::assemble(query, &raw, url, Utc::now());

        if let Err(e) = results::persist(&response, &self.config.results_dir) {
            warn!(error = %e, "failed to persist result, keeping in-memory response");
        }
        info!(
            sources = response.sources.len(),
            steps = response.steps.len(),
            "query complete"
        );
        Ok(response)
    }

    /// Probes input selector candidates in priority order.
    ///
    /// On a full miss with the page away from the entry URL, navigates to
    /// the entry URL and probes exactly one more pass.
    async fn locate_input(&self, page: &dyn SurfacePage) -> Result<String> {
        let candidates = self.input_candidates();
        if let Some(selector) = self.probe_pass(page, &candidates).await? {
            return Ok(selector);
        }

        let current = page.current_url().await?.unwrap_or_default();
        if current != self.config.entry_url {
            debug!(current = %current, entry = %self.config.entry_url, "input missing off entry URL, navigating");
            page.navigate(&self.config.entry_url).await?;
            if let Some(selector) = self.probe_pass(page, &candidates).await? {
                return Ok(selector);
            }
            return Err(Error::input_not_found(candidates.len(), 2));
        }
        Err(Error::input_not_found(candidates.len(), 1))
    }

    fn input_candidates(&self) -> Vec<String> {
        let mut candidates = self.config.input_selectors.clone();
        if let Some(followup) = &self.config.followup_selector {
            candidates.push(followup.clone());
        }
        candidates.extend(GENERIC_INPUT_SELECTORS.iter().map(|s| (*s).to_string()));
        candidates
    }

    async fn probe_pass(
        &self,
        page: &dyn SurfacePage,
        candidates: &[String],
    ) -> Result<Option<String>> {
        let iterations = (self.config.selector_timeout.as_millis()
            / INPUT_PROBE_INTERVAL.as_millis())
        .max(1) as u32;
        let budget = PollBudget::new(INPUT_PROBE_INTERVAL, iterations);
        for selector in candidates {
            let hit = poll::poll_until(budget, move || async move {
                Ok(page.query_exists(selector).await?.then_some(()))
            })
            .await?;
            if hit.is_some() {
                return Ok(Some(selector.clone()));
            }
        }
        Ok(None)
    }

    /// Best-effort engagement of the deep-research toggle.
    async fn engage_deep_research(&self, page: &dyn SurfacePage) {
        let Some(selector) = &self.config.deep_research_selector else {
            warn!("deep research requested but no toggle selector configured");
            return;
        };
        match page.click(selector).await {
            Ok(()) => debug!(selector = %selector, "deep research engaged"),
            Err(e) => warn!(selector = %selector, error = %e, "deep research toggle failed, continuing"),
        }
    }

    /// Waits for a container beyond the baseline count.
    ///
    /// Falls back to the newest pre-existing container when the budget runs
    /// out but containers exist; the fallback index is never re-selected
    /// upward even if more containers appear later.
    async fn await_container(&self, page: &dyn SurfacePage, baseline: usize) -> Result<usize> {
        let budget = PollBudget::new(self.config.poll_interval, self.config.generation_budget);
        let selector = self.config.answer_selector.as_str();
        let count = poll::poll_until(budget, move || async move {
            let current = page.count(selector).await?;
            Ok((current > baseline).then_some(current))
        })
        .await?;
        match count {
            Some(count) => Ok(count - 1),
            None if baseline > 0 => {
                warn!(baseline, "no new container, falling back to newest existing one");
                Ok(baseline - 1)
            }
            None => Err(Error::generation_timeout(budget.elapsed_ms())),
        }
    }

    async fn await_stable(&self, page: &dyn SurfacePage, index: usize) -> Result<()> {
        let budget = PollBudget::new(self.config.poll_interval, self.config.stability_budget);
        let selector = self.config.answer_selector.as_str();
        let outcome = poll::poll_stable(budget, self.config.stability_threshold, move || {
            async move { page.text_of(selector, index).await }
        })
        .await?;
        if !outcome.stable {
            warn!(
                reads = outcome.reads,
                "answer never settled within budget, extracting anyway"
            );
        }
        Ok(())
    }

    /// Best-effort expansion of reasoning disclosures before extraction.
    async fn expand_reasoning(&self, page: &dyn SurfacePage) {
        let pattern = match Regex::new(&self.config.reasoning_toggle_pattern) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(error = %e, "reasoning pattern invalid, skipping expansion");
                return;
            }
        };
        match page.click_text_matches(&pattern).await {
            Ok(0) => {}
            Ok(clicked) => debug!(clicked, "expanded reasoning disclosures"),
            Err(e) => warn!(error = %e, "reasoning expansion failed, continuing"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::page::fake::FakeSurface;
    use super::*;

    const ENTRY: &str = "https://chat.example.com";

    fn config() -> Arc<SurfaceConfig> {
        let mut config = SurfaceConfig::new(ENTRY)
            .with_input_selector("textarea#prompt")
            .with_answer_selector("div.answer");
        // Keep persistence inside the test sandbox.
        config.results_dir = std::env::temp_dir().join("chatpilot-executor-tests");
        Arc::new(config)
    }

    fn answered_fake() -> FakeSurface {
        let fake = FakeSurface::with_url(ENTRY);
        fake.add_selector("textarea#prompt");
        fake.script_counts("div.answer", &[0, 0, 1]);
        fake.script_texts(&["partial", "full answer"]);
        *fake.raw.lock() = Some(RawExtract {
            text: String::from("full answer"),
            anchors: vec![],
            steps: vec![],
        });
        fake
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_turn() {
        let executor = QueryExecutor::new(config());
        let fake = answered_fake();
        let response = executor.run(&fake, "why is the sky blue").await.unwrap();
        assert_eq!(response.answer, "full answer");
        assert_eq!(
            fake.fills.lock().as_slice(),
            &[("textarea#prompt".to_string(), "why is the sky blue".to_string())]
        );
        assert_eq!(fake.enters.lock().as_slice(), &["textarea#prompt".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_followup_selector_probed_after_primaries() {
        let mut config = SurfaceConfig::new(ENTRY)
            .with_input_selector("textarea#prompt")
            .with_followup_selector("div.followup")
            .with_answer_selector("div.answer");
        config.results_dir = std::env::temp_dir().join("chatpilot-executor-tests");
        let executor = QueryExecutor::new(Arc::new(config));

        // Primary selector gone mid-conversation, follow-up present.
        let fake = answered_fake();
        fake.existing.lock().clear();
        fake.add_selector("div.followup");
        executor.run(&fake, "and why is it red at dusk").await.unwrap();
        assert_eq!(fake.fills.lock()[0].0, "div.followup");
        // The primary candidate was exhausted before the follow-up hit.
        assert_eq!(fake.probes.lock().first().map(String::as_str), Some("textarea#prompt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_order_and_elapsed_bound() {
        let executor = QueryExecutor::new(config());
        let fake = FakeSurface::with_url(ENTRY);

        let started = tokio::time::Instant::now();
        let err = executor.run(&fake, "q").await.unwrap_err();
        assert!(matches!(err, Error::InputNotFound { .. }));

        // Candidates probed strictly in declared order, one full budget each.
        let probes = fake.probes.lock();
        let per_candidate = probes.len() / 3;
        assert!(probes[..per_candidate].iter().all(|s| s == "textarea#prompt"));
        assert!(
            probes[per_candidate..2 * per_candidate]
                .iter()
                .all(|s| s == "textarea")
        );
        assert!(
            probes[2 * per_candidate..]
                .iter()
                .all(|s| s == "[contenteditable=\"true\"]")
        );

        // Elapsed wall time stays within timeout x candidate count.
        assert!(started.elapsed() <= Duration::from_secs(2) * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_miss_navigates_to_entry_once() {
        let executor = QueryExecutor::new(config());
        let fake = answered_fake();
        *fake.url.lock() = Some(String::from("https://chat.example.com/settings"));
        fake.existing.lock().clear();

        let err = executor.run(&fake, "q").await.unwrap_err();
        assert!(matches!(err, Error::InputNotFound { passes: 2, .. }));
        assert_eq!(fake.navigations.lock().as_slice(), &[ENTRY.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_miss_on_entry_fails_without_navigation() {
        let executor = QueryExecutor::new(config());
        let fake = FakeSurface::with_url(ENTRY);
        let err = executor.run(&fake, "q").await.unwrap_err();
        assert!(matches!(err, Error::InputNotFound { passes: 1, tried: 3 }));
        assert!(fake.navigations.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_without_containers() {
        let executor = QueryExecutor::new(config());
        let fake = answered_fake();
        fake.script_counts("div.answer", &[0]);
        let started = tokio::time::Instant::now();
        let err = executor.run(&fake, "q").await.unwrap_err();
        // 60 probes at 500ms sleep 59 intervals.
        assert!(matches!(err, Error::GenerationTimeout { waited_ms: 29_500 }));
        assert!(started.elapsed() >= Duration::from_millis(29_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_falls_back_to_existing_container() {
        let executor = QueryExecutor::new(config());
        let fake = answered_fake();
        // Two containers before submission, none ever added.
        fake.script_counts("div.answer", &[2]);
        let response = executor.run(&fake, "q").await.unwrap();
        assert_eq!(response.answer, "full answer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deep_research_click_is_best_effort() {
        let mut config = SurfaceConfig::new(ENTRY)
            .with_input_selector("textarea#prompt")
            .with_answer_selector("div.answer")
            .with_deep_research_selector("button.deep");
        config.results_dir = std::env::temp_dir().join("chatpilot-executor-tests");
        let executor = QueryExecutor::new(Arc::new(config));

        let fake = answered_fake();
        let options = QueryOptions {
            deep_research: true,
            ..QueryOptions::default()
        };
        executor.run_with(&fake, "q", &options).await.unwrap();
        assert_eq!(fake.clicks.lock().as_slice(), &["button.deep".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reasoning_expansion_attempted_before_extraction() {
        let executor = QueryExecutor::new(config());
        let fake = answered_fake();
        executor.run(&fake, "q").await.unwrap();
        assert_eq!(fake.text_clicks.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_propagates() {
        let executor = QueryExecutor::new(config());
        let fake = answered_fake();
        *fake.raw.lock() = None;
        let err = executor.run(&fake, "q").await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_turn_with_prior_answers() {
        // Two answers already on the page; the new one streams in, holds
        // "Hello" for three polls, then settles on "Hello world.".
        let executor = QueryExecutor::new(config());
        let fake = FakeSurface::with_url(ENTRY);
        fake.add_selector("textarea#prompt");
        fake.script_counts("div.answer", &[2, 2, 3]);
        fake.script_texts(&["Hello", "Hello", "Hello", "Hello world."]);
        *fake.raw.lock() = Some(RawExtract {
            text: String::from("Hello world."),
            anchors: vec![],
            steps: vec![],
        });

        let response = executor.run(&fake, "greet the world").await.unwrap();
        assert_eq!(response.answer, "Hello world.");
        assert!(response.markdown.unwrap().contains("### Answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_index_fixed_despite_later_growth() {
        // Two prior answers; a third appears after submission, then a
        // fourth while its text settles. The target index never moves.
        let executor = QueryExecutor::new(config());
        let fake = FakeSurface::with_url(ENTRY);
        fake.add_selector("textarea#prompt");
        fake.script_counts("div.answer", &[2, 2, 3, 4]);
        fake.script_texts(&["streaming", "done"]);
        *fake.raw.lock() = Some(RawExtract {
            text: String::from("done"),
            anchors: vec![],
            steps: vec![],
        });

        let response = executor.run(&fake, "q").await.unwrap();
        assert_eq!(response.answer, "done");
        assert!(fake.reads.lock().iter().all(|&i| i == 2));
        assert_eq!(fake.extracts.lock().as_slice(), &[2]);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Generating.to_string(), "generating");
        assert_eq!(Phase::Stabilizing.to_string(), "stabilizing");
    }
}
