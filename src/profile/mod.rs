//! Profile storage state.
//!
//! Profiles carry the authentication material for a surface: cookies and
//! per-origin localStorage, serialized as a JSON storage-state file. Fresh
//! browsing contexts are seeded from the profile so the surface sees a
//! logged-in visitor.
//!
//! # Layout
//!
//! | Path | Contents |
//! |------|----------|
//! | `<root>/<profile_id>/storage_state.json` | Cookies and origin storage |
//! | `<root>/<profile_id>/user_data/` | Browser user-data dir for local launches |

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Storage State Model
// ============================================================================

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Sent on all requests.
    None,
    /// Sent on same-site requests and top-level navigations.
    Lax,
    /// Sent on same-site requests only.
    Strict,
}

/// A single cookie in a storage state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to.
    pub domain: String,
    /// Path the cookie applies to.
    pub path: String,
    /// Expiry as a Unix timestamp in seconds. `-1` means session cookie.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// Whether the cookie is HTTP-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Whether the cookie requires a secure channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// SameSite policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

/// One localStorage key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStorageEntry {
    /// Storage key.
    pub name: String,
    /// Stored value.
    pub value: String,
}

/// localStorage contents for one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    /// Origin URL, e.g. `https://chat.example.com`.
    pub origin: String,
    /// Entries under that origin.
    pub local_storage: Vec<LocalStorageEntry>,
}

/// Complete storage state for a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// All cookies.
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Per-origin localStorage.
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl StorageState {
    /// Returns `true` if the state carries no cookies and no origin storage.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }
}

// ============================================================================
// ProfileStore Trait
// ============================================================================

/// Storage backend for profile state.
///
/// The disk implementation is [`DiskProfileStore`]; tests substitute an
/// in-memory one.
pub trait ProfileStore: Send + Sync {
    /// Loads the storage state for a profile.
    ///
    /// Returns `Ok(None)` when the profile has no saved state yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the state file exists but cannot be
    /// read or parsed.
    fn load_storage_state(&self, profile_id: &str) -> Result<Option<StorageState>>;

    /// Saves the storage state for a profile, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the state cannot be written.
    fn save_storage_state(&self, profile_id: &str, state: &StorageState) -> Result<()>;

    /// Returns the browser user-data directory for a profile, creating it
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] if the directory cannot be created.
    fn user_data_dir(&self, profile_id: &str) -> Result<PathBuf>;
}

// ============================================================================
// DiskProfileStore
// ============================================================================

/// Profile store backed by a directory tree on disk.
#[derive(Debug, Clone)]
pub struct DiskProfileStore {
    root: PathBuf,
}

impl DiskProfileStore {
    /// Creates a store rooted at the given directory.
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn state_path(&self, profile_id: &str) -> PathBuf {
        self.root.join(profile_id).join("storage_state.json")
    }
}

impl ProfileStore for DiskProfileStore {
    fn load_storage_state(&self, profile_id: &str) -> Result<Option<StorageState>> {
        let path = self.state_path(profile_id);
        if !path.exists() {
            debug!(profile = profile_id, "no storage state on disk");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::profile(format!("read {}: {e}", path.display())))?;
        let state: StorageState = serde_json::from_str(&raw)
            .map_err(|e| Error::profile(format!("parse {}: {e}", path.display())))?;
        debug!(
            profile = profile_id,
            cookies = state.cookies.len(),
            origins = state.origins.len(),
            "loaded storage state"
        );
        Ok(Some(state))
    }

    fn save_storage_state(&self, profile_id: &str, state: &StorageState) -> Result<()> {
        let path = self.state_path(profile_id);
        ensure_parent(&path)?;
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&path, raw)
            .map_err(|e| Error::profile(format!("write {}: {e}", path.display())))?;
        debug!(profile = profile_id, "saved storage state");
        Ok(())
    }

    fn user_data_dir(&self, profile_id: &str) -> Result<PathBuf> {
        let dir = self.root.join(profile_id).join("user_data");
        fs::create_dir_all(&dir)
            .map_err(|e| Error::profile(format!("create {}: {e}", dir.display())))?;
        Ok(dir)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::profile(format!("create {}: {e}", parent.display())))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> StorageState {
        StorageState {
            cookies: vec![Cookie {
                name: "session".into(),
                value: "abc123".into(),
                domain: ".example.com".into(),
                path: "/".into(),
                expires: Some(1_900_000_000.0),
                http_only: Some(true),
                secure: Some(true),
                same_site: Some(SameSite::Lax),
            }],
            origins: vec![OriginState {
                origin: "https://chat.example.com".into(),
                local_storage: vec![LocalStorageEntry {
                    name: "theme".into(),
                    value: "dark".into(),
                }],
            }],
        }
    }

    #[test]
    fn test_missing_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskProfileStore::new(dir.path());
        assert!(store.load_storage_state("default").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskProfileStore::new(dir.path());
        let state = sample_state();
        store.save_storage_state("default", &state).unwrap();
        let loaded = store.load_storage_state("default").unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_corrupt_state_is_profile_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskProfileStore::new(dir.path());
        let path = dir.path().join("default");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("storage_state.json"), "{not json").unwrap();
        let err = store.load_storage_state("default").unwrap_err();
        assert!(matches!(err, Error::Profile { .. }));
    }

    #[test]
    fn test_serializes_camel_case() {
        let state = sample_state();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"httpOnly\""));
        assert!(json.contains("\"sameSite\""));
        assert!(json.contains("\"localStorage\""));
    }

    #[test]
    fn test_user_data_dir_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskProfileStore::new(dir.path());
        let path = store.user_data_dir("work").unwrap();
        assert!(path.is_dir());
        assert!(path.ends_with("work/user_data"));
    }

    #[test]
    fn test_empty_state() {
        assert!(StorageState::default().is_empty());
        assert!(!sample_state().is_empty());
    }
}
