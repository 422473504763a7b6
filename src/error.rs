//! Error types for chatpilot.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chatpilot::{Result, Error};
//!
//! async fn example(pool: &SessionPool) -> Result<()> {
//!     let session = pool.acquire("latest").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Profile`] |
//! | Connection | [`Error::Connection`], [`Error::Attach`], [`Error::LaunchFailed`] |
//! | Context | [`Error::Context`] |
//! | Execution | [`Error::InputNotFound`], [`Error::GenerationTimeout`], [`Error::Extraction`] |
//! | Persistence | [`Error::Persist`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Http`], [`Error::Cdp`] |
//!
//! Everything except [`Error::Persist`] propagates to the caller unmodified;
//! this crate adds no retry wrapping. Retry and backoff policy belong above it.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use chromiumoxide::error::CdpError;
use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when surface configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Profile store error.
    ///
    /// Returned when storage state cannot be loaded or saved.
    #[error("Profile error: {message}")]
    Profile {
        /// Description of the profile error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No connection strategy yielded a browser.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Both the structured attach and the version-fetch fallback failed.
    ///
    /// Carries both failure messages so neither attempt is lost.
    #[error("CDP attach failed: structured attach: {structured}; version-fetch fallback: {fallback}")]
    Attach {
        /// Error from the structured attach attempt.
        structured: String,
        /// Error from the manual version-fetch retry.
        fallback: String,
    },

    /// Failed to launch a local browser process.
    #[error("Failed to launch browser: {message}")]
    LaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // Context Errors
    // ========================================================================
    /// Browsing context creation or reuse failed.
    #[error("Context error: {message}")]
    Context {
        /// Description of the context error.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// No input selector candidate matched, including after the one
    /// navigate-and-retry pass.
    #[error("No query input found: tried {tried} candidate(s) across {passes} pass(es)")]
    InputNotFound {
        /// Number of selector candidates probed per pass.
        tried: usize,
        /// Number of probe passes performed.
        passes: usize,
    },

    /// No new answer container appeared within the polling budget and the
    /// surface had no containers to fall back to.
    #[error("No answer containers after submission (waited {waited_ms}ms)")]
    GenerationTimeout {
        /// Milliseconds spent polling before giving up.
        waited_ms: u64,
    },

    /// DOM read or in-page evaluation threw during extraction.
    #[error("Extraction failed: {message}")]
    Extraction {
        /// Error message from the extraction step.
        message: String,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Result persistence failed.
    ///
    /// The executor logs this and keeps the in-memory result; persistence
    /// never invalidates a response already produced.
    #[error("Persist failed: {message}")]
    Persist {
        /// Description of the persistence failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error while discovering the remote-debugging endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Browser-control channel error.
    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a profile error.
    #[inline]
    pub fn profile(message: impl Into<String>) -> Self {
        Self::Profile {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an attach error from both attempt failures.
    #[inline]
    pub fn attach(structured: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self::Attach {
            structured: structured.into(),
            fallback: fallback.into(),
        }
    }

    /// Creates a launch failure error.
    #[inline]
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
        }
    }

    /// Creates a context error.
    #[inline]
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
        }
    }

    /// Creates an input-not-found error.
    #[inline]
    pub fn input_not_found(tried: usize, passes: usize) -> Self {
        Self::InputNotFound { tried, passes }
    }

    /// Creates a generation timeout error.
    #[inline]
    pub fn generation_timeout(waited_ms: u64) -> Self {
        Self::GenerationTimeout { waited_ms }
    }

    /// Creates an extraction error.
    #[inline]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Creates a persistence error.
    #[inline]
    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-layer error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Attach { .. } | Self::LaunchFailed { .. }
        )
    }

    /// Returns `true` if this is a polling-budget timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::GenerationTimeout { .. })
    }

    /// Returns `true` if the executor treats this error as non-fatal.
    ///
    /// Only persistence failures qualify: the in-memory result has already
    /// been produced when they occur.
    #[inline]
    #[must_use]
    pub fn is_non_fatal(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("no strategy yielded a browser");
        assert_eq!(
            err.to_string(),
            "Connection failed: no strategy yielded a browser"
        );
    }

    #[test]
    fn test_attach_embeds_both_messages() {
        let err = Error::attach("timed out after 5000ms", "connection refused");
        let text = err.to_string();
        assert!(text.contains("timed out after 5000ms"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_input_not_found_display() {
        let err = Error::input_not_found(4, 2);
        assert_eq!(
            err.to_string(),
            "No query input found: tried 4 candidate(s) across 2 pass(es)"
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::attach("a", "b").is_connection_error());
        assert!(Error::launch_failed("x").is_connection_error());
        assert!(!Error::context("x").is_connection_error());
    }

    #[test]
    fn test_is_non_fatal() {
        assert!(Error::persist("disk full").is_non_fatal());
        assert!(!Error::extraction("boom").is_non_fatal());
        assert!(!Error::generation_timeout(30_000).is_non_fatal());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::generation_timeout(30_000).is_timeout());
        assert!(!Error::connection("x").is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
