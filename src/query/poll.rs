//! Bounded polling combinators.
//!
//! Completion detection is polling against a DOM that offers no completion
//! event. Two shapes cover it: wait until a probe yields a value, and wait
//! until consecutive reads of a string stop changing. Both are bounded by
//! an iteration budget so a stuck surface cannot hang a query.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::trace;

use crate::error::Result;

// ============================================================================
// PollBudget
// ============================================================================

/// Iteration budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Sleep between probes.
    pub interval: Duration,
    /// Maximum number of probes.
    pub max_iterations: u32,
}

impl PollBudget {
    /// Creates a budget.
    #[inline]
    #[must_use]
    pub const fn new(interval: Duration, max_iterations: u32) -> Self {
        Self {
            interval,
            max_iterations,
        }
    }

    /// Wall-clock time an exhausted run waits, in milliseconds.
    ///
    /// The first probe runs without a sleep, so exhaustion waits one
    /// interval fewer than the iteration count.
    #[inline]
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.interval.as_millis() as u64 * u64::from(self.max_iterations.saturating_sub(1))
    }
}

// ============================================================================
// poll_until
// ============================================================================

/// Polls until the probe yields `Some`, the probe fails, or the budget is
/// exhausted.
///
/// The probe runs once per iteration; the sleep happens between iterations,
/// not after the last one. Budget exhaustion returns `Ok(None)`.
///
/// # Errors
///
/// Propagates the first probe error.
pub async fn poll_until<T, F, Fut>(budget: PollBudget, mut probe: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for iteration in 0..budget.max_iterations {
        if iteration > 0 {
            tokio::time::sleep(budget.interval).await;
        }
        if let Some(value) = probe().await? {
            trace!(iteration, "probe satisfied");
            return Ok(Some(value));
        }
    }
    trace!(iterations = budget.max_iterations, "probe budget exhausted");
    Ok(None)
}

// ============================================================================
// poll_stable
// ============================================================================

/// Outcome of a stability poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stability {
    /// The last snapshot read.
    pub text: String,
    /// Whether the threshold of consecutive unchanged reads was reached.
    pub stable: bool,
    /// Reads performed.
    pub reads: u32,
}

/// Polls a string read until it is unchanged for `threshold` consecutive
/// reads or the budget runs out.
///
/// Every change resets the unchanged counter to zero and stores the new
/// snapshot. Budget exhaustion returns the last snapshot with
/// `stable: false`.
///
/// # Errors
///
/// Propagates the first read error.
pub async fn poll_stable<F, Fut>(
    budget: PollBudget,
    threshold: u32,
    mut read: F,
) -> Result<Stability>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut snapshot = String::new();
    let mut unchanged: u32 = 0;
    let mut reads: u32 = 0;

    for iteration in 0..budget.max_iterations {
        if iteration > 0 {
            tokio::time::sleep(budget.interval).await;
        }
        let current = read().await?;
        reads += 1;
        if iteration > 0 && current == snapshot {
            unchanged += 1;
            if unchanged >= threshold {
                trace!(reads, "text stabilized");
                return Ok(Stability {
                    text: snapshot,
                    stable: true,
                    reads,
                });
            }
        } else {
            unchanged = 0;
            snapshot = current;
        }
    }
    trace!(reads, "stability budget exhausted");
    Ok(Stability {
        text: snapshot,
        stable: false,
        reads,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::Error;

    fn budget(max: u32) -> PollBudget {
        PollBudget::new(Duration::from_millis(500), max)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_immediate_hit_sleeps_zero_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = poll_until(budget(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(7_u32))
            }
        })
        .await
        .unwrap();
        assert_eq!(result, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_exhaustion_returns_none() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Option<u32> = poll_until(budget(4), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await
        .unwrap();
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_propagates_probe_error() {
        let result: Result<Option<u32>> = poll_until(budget(4), || async {
            Err(Error::extraction("probe blew up"))
        })
        .await;
        assert!(matches!(result, Err(Error::Extraction { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stability_reached_on_exact_read() {
        // Reads: 1,2,3,4 then 4 repeating. The value changes three times,
        // so the fifth identical read lands on read number nine.
        let script = ["1", "2", "3", "4", "4", "4", "4", "4", "4", "4"];
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome = poll_stable(budget(240), 5, move || {
            let counter = Arc::clone(&counter);
            async move {
                let i = counter.fetch_add(1, Ordering::SeqCst) as usize;
                Ok(script[i.min(script.len() - 1)].to_string())
            }
        })
        .await
        .unwrap();
        assert!(outcome.stable);
        assert_eq!(outcome.text, "4");
        assert_eq!(outcome.reads, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_resets_counter() {
        // Four identical reads, a change, then five identical reads.
        let script = ["a", "a", "a", "a", "b", "b", "b", "b", "b", "b"];
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome = poll_stable(budget(240), 5, move || {
            let counter = Arc::clone(&counter);
            async move {
                let i = counter.fetch_add(1, Ordering::SeqCst) as usize;
                Ok(script[i.min(script.len() - 1)].to_string())
            }
        })
        .await
        .unwrap();
        assert!(outcome.stable);
        assert_eq!(outcome.text, "b");
        assert_eq!(outcome.reads, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_snapshot_unstable() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome = poll_stable(budget(6), 5, move || {
            let counter = Arc::clone(&counter);
            async move {
                let i = counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("tick-{i}"))
            }
        })
        .await
        .unwrap();
        assert!(!outcome.stable);
        assert_eq!(outcome.text, "tick-5");
        assert_eq!(outcome.reads, 6);
    }

    #[test]
    fn test_budget_elapsed_ms() {
        // 60 probes at 500ms sleep 59 intervals; a single probe sleeps none.
        assert_eq!(budget(60).elapsed_ms(), 29_500);
        assert_eq!(budget(240).elapsed_ms(), 119_500);
        assert_eq!(budget(1).elapsed_ms(), 0);
    }
}
