//! Result persistence.
//!
//! Every completed query is written twice: the structured response as JSON
//! and the rendered document as markdown, named by the millisecond
//! timestamp of the write. Persistence failures never invalidate an
//! in-memory response; the executor logs them and moves on.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::extract::QueryResponse;

// ============================================================================
// PersistedPaths
// ============================================================================

/// Where a response landed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPaths {
    /// Structured response.
    pub json: PathBuf,
    /// Rendered document, absent when the response carried none.
    pub markdown: Option<PathBuf>,
}

// ============================================================================
// Persistence
// ============================================================================

/// Writes a response to `results_dir` as `result-<epoch-ms>.json` and
/// `result-<epoch-ms>.md`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`Error::Persist`] if the directory or either file cannot be
/// written.
pub fn persist(response: &QueryResponse, results_dir: &Path) -> Result<PersistedPaths> {
    fs::create_dir_all(results_dir)
        .map_err(|e| Error::persist(format!("create {}: {e}", results_dir.display())))?;

    let stamp = Utc::now().timestamp_millis();
    let json_path = results_dir.join(format!("result-{stamp}.json"));
    let md_path = results_dir.join(format!("result-{stamp}.md"));

    let json = serde_json::to_string_pretty(response)
        .map_err(|e| Error::persist(format!("serialize response: {e}")))?;
    fs::write(&json_path, json)
        .map_err(|e| Error::persist(format!("write {}: {e}", json_path.display())))?;
    let markdown = match &response.markdown {
        Some(doc) => {
            fs::write(&md_path, doc)
                .map_err(|e| Error::persist(format!("write {}: {e}", md_path.display())))?;
            Some(md_path)
        }
        None => None,
    };

    debug!(json = %json_path.display(), markdown = ?markdown, "persisted result");
    Ok(PersistedPaths {
        json: json_path,
        markdown,
    })
}

// ============================================================================
// Tests
// ============================================================================
