//! chatpilot - Turn-based automation for conversational web surfaces.
//!
//! This library drives a conversational web UI that exposes no API: it
//! obtains a browser over the Chrome DevTools Protocol, submits queries
//! through the page's own input, detects completion by watching the DOM,
//! and extracts the answer with footnoted sources and reasoning steps.
//!
//! # Architecture
//!
//! A query turn flows through four layers:
//!
//! - **Connect**: resolve a browser by strategy (endpoint override,
//!   explicit WebSocket URL, remote-debugging attach, local launch)
//! - **Context**: prepare pages (viewport, fingerprint masking, profile
//!   storage seeding) or adopt an existing logged-in tab
//! - **Sessions**: a bounded pool of conversation tabs, routed by
//!   selector strings
//! - **Query**: bounded DOM polling for completion, then extraction and
//!   citation rewriting
//!
//! # Quick Start
//!
//! ```no_run
//! use chatpilot::{QueryOptions, Result, Surface, SurfaceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SurfaceConfig::new("https://chat.example.com")
//!         .with_input_selector("textarea#prompt")
//!         .with_answer_selector("div[data-message-author=\"assistant\"]");
//!
//!     let surface = Surface::connect(config).await?;
//!     let response = surface
//!         .ask("why is the sky blue", &QueryOptions::default())
//!         .await?;
//!     println!("{}", response.answer);
//!
//!     surface.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Surface configuration and polling budgets |
//! | [`connect`] | Connection strategy resolution |
//! | [`context`] | Page preparation and profile seeding |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`profile`] | Storage-state persistence |
//! | [`query`] | Turn execution, polling, extraction |
//! | [`results`] | Result persistence to disk |
//! | [`session`] | Bounded session pool |
//! | [`stealth`] | Automation-fingerprint masking |
//! | [`surface`] | The [`Surface`] facade |

// ============================================================================
// Modules
// ============================================================================

/// Surface configuration and polling budgets.
pub mod config;

/// Browser connection resolution.
///
/// Walks a fixed strategy chain until one yields a live browser.
pub mod connect;

/// Browsing context acquisition and page preparation.
pub mod context;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Profile storage-state persistence.
pub mod profile;

/// Query execution: polling, completion detection, extraction.
pub mod query;

/// Result persistence to disk.
pub mod results;

/// Bounded session pool and selector routing.
pub mod session;

/// Automation-fingerprint masking.
pub mod stealth;

/// The high-level [`Surface`] facade.
pub mod surface;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{SurfaceConfig, Viewport};

// Connection types
pub use connect::{Connection, ConnectionMode, ConnectionResolver};

// Context types
pub use context::{ContextPolicy, SurfaceContext};

// Error types
pub use error::{Error, Result};

// Profile types
pub use profile::{Cookie, DiskProfileStore, ProfileStore, SameSite, StorageState};

// Query types
pub use query::{
    Phase, QueryExecutor, QueryOptions, QueryResponse, RawExtract, Source, SurfacePage,
};

// Session types
pub use session::{MAX_RESIDENT_SESSIONS, Session, SessionFactory, SessionPool};

// Facade
pub use surface::Surface;
