//! Bounded session pool.
//!
//! Sessions are conversation tabs, kept in creation order. The pool holds
//! at most [`MAX_RESIDENT_SESSIONS`]; creating one beyond the cap evicts
//! and closes the oldest. Selector strings route queries to members:
//!
//! | Selector | Resolution |
//! |----------|------------|
//! | `new` | Always creates a session |
//! | `latest`, `last` | Most recently created, creating one if empty |
//! | anything else | By id, then by name, then as a 0-based index; a miss creates a session named after the selector |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::query::page::SurfacePage;

// ============================================================================
// Constants
// ============================================================================

/// Maximum sessions resident in the pool.
pub const MAX_RESIDENT_SESSIONS: usize = 5;

// ============================================================================
// Session
// ============================================================================

/// One conversation tab.
pub struct Session {
    /// Unique id assigned at creation.
    pub id: String,
    /// Caller-supplied name, when the session was created by name.
    pub name: Option<String>,
    /// The tab itself.
    pub page: Arc<dyn SurfacePage>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Monotonic creation order.
    pub order: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionFactory
// ============================================================================

/// Opens new tabs for the pool.
///
/// The production implementation is the browsing context; tests substitute
/// a scripted factory.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a fresh tab ready for queries.
    async fn open(&self) -> Result<Arc<dyn SurfacePage>>;
}

// ============================================================================
// SessionPool
// ============================================================================

/// Bounded pool of sessions with selector routing.
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    sessions: RwLock<Vec<Arc<Session>>>,
    next_order: AtomicU64,
}

impl SessionPool {
    /// Creates an empty pool over a factory.
    #[must_use]
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(Vec::new()),
            next_order: AtomicU64::new(0),
        }
    }

    /// Resolves a selector to a session, creating one when the selector
    /// calls for it.
    ///
    /// # Errors
    ///
    /// Propagates factory errors when a session has to be created.
    pub async fn acquire(&self, selector: &str) -> Result<Arc<Session>> {
        match selector {
            "new" => self.create(None).await,
            "latest" | "last" => {
                if let Some(session) = self.sessions.read().last().cloned() {
                    return Ok(session);
                }
                self.create(None).await
            }
            _ => {
                if let Some(session) = self.lookup(selector) {
                    return Ok(session);
                }
                debug!(selector, "no session matched, creating one by that name");
                self.create(Some(selector.to_string())).await
            }
        }
    }

    /// Resolves a selector without creating: id, then name, then 0-based
    /// creation index.
    fn lookup(&self, selector: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read();
        if let Some(session) = sessions.iter().find(|s| s.id == selector) {
            return Some(Arc::clone(session));
        }
        if let Some(session) = sessions
            .iter()
            .find(|s| s.name.as_deref() == Some(selector))
        {
            return Some(Arc::clone(session));
        }
        if let Ok(index) = selector.parse::<usize>() {
            return sessions.get(index).cloned();
        }
        None
    }

    /// Creates a session, evicting the oldest past the cap.
    async fn create(&self, name: Option<String>) -> Result<Arc<Session>> {
        // Open the tab before taking the write lock.
        let page = self.factory.open().await?;
        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            page,
            created_at: Utc::now(),
            order: self.next_order.fetch_add(1, Ordering::SeqCst),
        });

        let evicted = {
            let mut sessions = self.sessions.write();
            sessions.push(Arc::clone(&session));
            if sessions.len() > MAX_RESIDENT_SESSIONS {
                Some(sessions.remove(0))
            } else {
                None
            }
        };
        if let Some(old) = evicted {
            info!(id = %old.id, "evicting oldest session");
            if let Err(e) = old.page.close().await {
                warn!(id = %old.id, error = %e, "evicted session close failed");
            }
        }
        info!(id = %session.id, name = ?session.name, "session created");
        Ok(session)
    }

    /// Number of resident sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no sessions are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Closes every resident session. Close failures are logged, not
    /// returned.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Session>> = std::mem::take(&mut *self.sessions.write());
        for session in drained {
            if let Err(e) = session.page.close().await {
                warn!(id = %session.id, error = %e, "session close failed during shutdown");
            }
        }
        debug!("session pool shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================
