//! Typed errors for credential management
//!
//! Provides structured error types so callers can distinguish recoverable
//! conditions (a rejected refresh token) from fatal ones (no free callback
//! port) without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Credential manager errors with typed variants
///
/// The refresh-then-login fallback in `LoginAuthenticator` keys off
/// `RefreshFailed`; everything else propagates to the caller, which owns
/// user-facing messaging.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The process-wide credentials store was used before `CredentialsStore::init`.
    ///
    /// This is a programming error in the embedding CLI, not a runtime
    /// condition, and is surfaced immediately.
    #[error("credentials file not set; call CredentialsStore::init before constructing an authenticator")]
    NotConfigured,

    /// Every candidate callback port was already bound.
    #[error("no free local callback port (tried {ports:?})")]
    PortUnavailable { ports: &'static [u16] },

    /// The `/finish` route was reached without a usable `code` parameter.
    ///
    /// The inner string is the `error` parameter from the authorization
    /// server when one was supplied.
    #[error("authorization callback failed: {0}")]
    Callback(String),

    /// No authorization callback arrived within the login timeout.
    #[error("login timed out after {0} seconds waiting for the authorization callback")]
    LoginTimeout(u64),

    /// The token endpoint rejected the authorization-code exchange.
    ///
    /// Terminal for the login attempt; the user should retry.
    #[error("token exchange failed ({status}): {message}")]
    ExchangeFailed { status: u16, message: String },

    /// The refresh endpoint rejected the stored refresh token.
    ///
    /// Not a hard failure by itself: the authenticator falls back to a
    /// full interactive login.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The credentials file exists but is not valid JSON.
    ///
    /// Surfaced explicitly rather than falling back to a blank store,
    /// which would mask loss of the user's saved profiles.
    #[error("credentials file at {} is not valid JSON: {source}", path.display())]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A stored access token cannot be carried in an HTTP header.
    #[error("invalid access token: {0}")]
    InvalidToken(String),

    /// Credentials file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// HTTP failure talking to the token endpoints.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
