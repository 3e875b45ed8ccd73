//! OAuth credential management for the hubctl CLI
//!
//! This library provides:
//! - Browser-based authorization-code login through a short-lived local HTTP listener
//! - A per-profile credentials file with atomic writes
//! - Automatic token refresh, falling back to interactive login
//! - Bearer-token attachment for outgoing API requests
//!
//! The CLI's command classes call [`LoginAuthenticator::authenticate`] before
//! issuing their own API calls; everything else here is in service of that
//! one entry point.

pub mod authenticator;
pub mod browser;
pub mod config;
pub mod credentials;
pub mod error;

mod login;
mod refresh;

pub use authenticator::{
    Authenticator, BearerTokenAuthenticator, LoginAuthenticator, NoOpAuthenticator,
};
pub use browser::{BrowserLauncher, SystemBrowser};
pub use config::{default_credentials_path, ClientIdProvider};
pub use credentials::{Credentials, CredentialsStore, EXPIRY_MARGIN_SECS};
pub use error::AuthError;
