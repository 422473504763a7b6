//! Surface facade.
//!
//! One object wiring the layers together: resolve a connection, acquire a
//! context, keep a session pool, and run query turns. Most callers only
//! ever touch this.
//!
//! # Example
//!
//! ```ignore
//! use chatpilot::{Surface, SurfaceConfig, QueryOptions};
//!
//! let config = SurfaceConfig::new("https://chat.example.com")
//!     .with_input_selector("textarea#prompt")
//!     .with_answer_selector("div.answer");
//! let surface = Surface::connect(config).await?;
//! let response = surface.ask("why is the sky blue", &QueryOptions::default()).await?;
//! println!("{}", response.answer);
//! surface.close().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;

use crate::config::SurfaceConfig;
use crate::connect::ConnectionResolver;
use crate::context::SurfaceContext;
use crate::error::Result;
use crate::profile::{DiskProfileStore, ProfileStore};
use crate::query::{QueryExecutor, QueryOptions, QueryResponse};
use crate::session::SessionPool;

// ============================================================================
// Surface
// ============================================================================

/// A connected conversational surface.
pub struct Surface {
    context: Arc<SurfaceContext>,
    pool: SessionPool,
    executor: QueryExecutor,
}

impl Surface {
    /// Connects to the surface described by the configuration, using disk
    /// profiles rooted at the configured profile directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) on invalid
    /// configuration, or a connection-layer error when no strategy yields
    /// a browser.
    pub async fn connect(config: SurfaceConfig) -> Result<Self> {
        let profiles: Arc<dyn ProfileStore> =
            Arc::new(DiskProfileStore::new(config.profile_dir.clone()));
        Self::connect_with(config, profiles).await
    }

    /// Connects with an explicit profile store.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with(
        config: SurfaceConfig,
        profiles: Arc<dyn ProfileStore>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let resolver = ConnectionResolver::new(Arc::clone(&config), Arc::clone(&profiles));
        let connection = resolver.resolve().await?;
        info!(mode = ?connection.mode, "browser connection established");

        let context = Arc::new(
            SurfaceContext::acquire(connection, Arc::clone(&config), profiles).await?,
        );
        let pool = SessionPool::new(Arc::clone(&context) as Arc<dyn crate::session::SessionFactory>);
        let executor = QueryExecutor::new(Arc::clone(&config));
        Ok(Self {
            context,
            pool,
            executor,
        })
    }

    /// Runs one query turn, routed to a session by the options.
    ///
    /// Routing order: explicit session id, then session name, then the
    /// most recent session.
    ///
    /// # Errors
    ///
    /// Propagates session creation and execution errors; see
    /// [`QueryExecutor::run`].
    pub async fn ask(&self, query: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let selector = options
            .session_id
            .as_deref()
            .or(options.session_name.as_deref())
            .unwrap_or("latest");
        let session = self.pool.acquire(selector).await?;
        info!(session = %session.id, "running query turn");
        self.executor
            .run_with(session.page.as_ref(), query, options)
            .await
    }

    /// The session pool, for direct session management.
    #[inline]
    #[must_use]
    pub fn sessions(&self) -> &SessionPool {
        &self.pool
    }

    /// Shuts the surface down: closes all sessions, then the connection.
    ///
    /// # Errors
    ///
    /// Returns connection-layer errors from the final close.
    pub async fn close(&self) -> Result<()> {
        self.pool.shutdown().await;
        self.context.close().await
    }
}
