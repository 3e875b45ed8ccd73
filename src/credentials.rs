//! Per-profile credential records and the shared credentials file
//!
//! Credentials are stored in a single JSON file mapping profile name to a
//! record with 0600 permissions (owner read/write only). Writes go through a
//! temp file and an atomic rename so a crash mid-write never corrupts other
//! profiles' data.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AuthError;

/// Clock-skew margin, in seconds, applied when deciding whether stored
/// credentials are still usable. Tokens within this margin of `expires_at`
/// are refreshed before use.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Tokens and expiry for one profile.
///
/// Invariant: `access_token` and `refresh_token` are both non-empty and
/// `expires_at` is always set. On disk the fields are camelCase
/// (`accessToken`, `refreshToken`, `expiresAt`, `scope`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Bearer token attached to outgoing API requests.
    pub access_token: String,
    /// Token used to obtain a new access token without user interaction.
    pub refresh_token: String,
    /// Absolute instant after which `access_token` is no longer accepted.
    pub expires_at: DateTime<Utc>,
    /// Scopes granted by the authorization server.
    pub scope: String,
}

impl Credentials {
    /// Check whether the access token is expired, or will be within the
    /// clock-skew margin ([`EXPIRY_MARGIN_SECS`]).
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS)
    }

    /// Build credentials from a token-endpoint response.
    ///
    /// The refresh endpoint may omit `refresh_token` when it does not rotate
    /// it; the previous credentials supply the fallback. Returns `None` when
    /// no refresh token is available from either source or the access token
    /// is empty.
    pub(crate) fn from_token_response(
        response: TokenResponse,
        previous: Option<&Credentials>,
    ) -> Option<Self> {
        if response.access_token.is_empty() {
            return None;
        }
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous.map(|p| p.refresh_token.clone()))?;
        let scope = response
            .scope
            .or_else(|| previous.map(|p| p.scope.clone()))
            .unwrap_or_default();
        Some(Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
            scope,
        })
    }
}

/// Wire format of the token-exchange and token-refresh responses.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The on-disk mapping of profile name to credentials.
type CredentialsFile = BTreeMap<String, Credentials>;

/// Process-wide slot holding the store installed by [`CredentialsStore::init`].
static SHARED_STORE: RwLock<Option<Arc<CredentialsStore>>> = RwLock::new(None);

/// Loads and saves the per-profile credentials file.
///
/// One instance exists per process, installed with [`CredentialsStore::init`]
/// at startup and passed by reference to every authenticator. The store is
/// the only component that opens or writes the file; it also owns the
/// per-profile locks that serialize login and refresh for a profile across
/// authenticator instances.
pub struct CredentialsStore {
    path: PathBuf,
    /// Serializes the file-level read-modify-write in `save` and `remove`.
    file_lock: StdMutex<()>,
    profile_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialsStore {
    /// Create a store for the given credentials file path.
    ///
    /// The file itself is created lazily on the first `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_lock: StdMutex::new(()),
            profile_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Create a store and install it as the process-wide instance.
    ///
    /// Must be called before any authenticator is constructed. Calling it
    /// again replaces the slot (used by tests to isolate state);
    /// authenticators already holding a reference are unaffected.
    pub fn init(path: impl Into<PathBuf>) -> Arc<Self> {
        let store = Arc::new(Self::new(path));
        debug!("Credentials file set to {:?}", store.path);
        *SHARED_STORE.write().expect("store slot poisoned") = Some(store.clone());
        store
    }

    /// The process-wide store installed by [`init`](Self::init).
    pub fn shared() -> Result<Arc<Self>, AuthError> {
        SHARED_STORE
            .read()
            .expect("store slot poisoned")
            .clone()
            .ok_or(AuthError::NotConfigured)
    }

    /// Path of the credentials file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the credentials stored for a profile.
    ///
    /// Returns `None` when the file or the profile entry does not exist.
    /// A file that exists but does not parse is an explicit
    /// [`AuthError::StoreCorrupt`], never treated as a blank store.
    pub fn load(&self, profile: &str) -> Result<Option<Credentials>, AuthError> {
        let all = self.read_all()?;
        Ok(all.get(profile).cloned())
    }

    /// Merge credentials into the file under `profile`, preserving every
    /// other profile, and write atomically.
    pub fn save(&self, profile: &str, credentials: &Credentials) -> Result<(), AuthError> {
        let _guard = self.file_lock.lock().expect("file lock poisoned");
        let mut all = self.read_all()?;
        all.insert(profile.to_string(), credentials.clone());
        self.write_all(&all)?;
        debug!("Saved credentials for profile {} to {:?}", profile, self.path);
        Ok(())
    }

    /// Delete the entry for `profile`, preserving every other profile.
    pub fn remove(&self, profile: &str) -> Result<(), AuthError> {
        let _guard = self.file_lock.lock().expect("file lock poisoned");
        let mut all = self.read_all()?;
        if all.remove(profile).is_some() {
            self.write_all(&all)?;
            debug!("Removed credentials for profile {}", profile);
        }
        Ok(())
    }

    /// The lock serializing login and refresh for one profile.
    ///
    /// Held across the whole read-decide-write of a refresh or login so two
    /// flows for the same profile never interleave, even across
    /// authenticator instances.
    pub fn profile_lock(&self, profile: &str) -> Arc<Mutex<()>> {
        let mut locks = self.profile_locks.lock().expect("profile lock map poisoned");
        locks.entry(profile.to_string()).or_default().clone()
    }

    fn read_all(&self) -> Result<CredentialsFile, AuthError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CredentialsFile::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|source| AuthError::StoreCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Write to a temp file, set permissions, then rename into place.
    fn write_all(&self, all: &CredentialsFile) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(all)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;

        // 0600: tokens are secrets (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)?;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(access: &str) -> Credentials {
        Credentials {
            access_token: access.to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::seconds(3600),
            scope: "controller:hubctl".to_string(),
        }
    }

    #[test]
    fn test_expiry_margin() {
        // Expires in an hour - usable
        let fresh = credentials("token");
        assert!(!fresh.is_expired());

        // Expires within the margin - treated as expired
        let soon = Credentials {
            expires_at: Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS / 2),
            ..credentials("token")
        };
        assert!(soon.is_expired());

        // Already expired
        let past = Credentials {
            expires_at: Utc::now() - Duration::seconds(100),
            ..credentials("token")
        };
        assert!(past.is_expired());
    }

    #[test]
    fn test_file_fields_are_camel_case() {
        let json = serde_json::to_string(&credentials("token")).unwrap();
        assert!(json.contains("\"accessToken\""));
        assert!(json.contains("\"refreshToken\""));
        assert!(json.contains("\"expiresAt\""));
        assert!(json.contains("\"scope\""));
    }

    #[test]
    fn test_from_token_response_keeps_previous_refresh_token() {
        let previous = credentials("old");
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: 3600,
            scope: None,
        };
        let updated = Credentials::from_token_response(response, Some(&previous)).unwrap();
        assert_eq!(updated.access_token, "new");
        assert_eq!(updated.refresh_token, "refresh");
        assert_eq!(updated.scope, "controller:hubctl");
    }

    #[test]
    fn test_from_token_response_requires_some_refresh_token() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: 3600,
            scope: None,
        };
        assert!(Credentials::from_token_response(response, None).is_none());
    }

    #[test]
    fn test_rotated_refresh_token_wins() {
        let previous = credentials("old");
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: Some("rotated".to_string()),
            expires_in: 3600,
            scope: Some("controller:hubctl".to_string()),
        };
        let updated = Credentials::from_token_response(response, Some(&previous)).unwrap();
        assert_eq!(updated.refresh_token, "rotated");
    }
}
