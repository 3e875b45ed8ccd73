//! Request authentication façade
//!
//! `LoginAuthenticator` is what the CLI's command classes hold: before a
//! request goes out, `authenticate` makes sure valid credentials exist -
//! refreshing or running the interactive login as needed - and attaches the
//! bearer token. `BearerTokenAuthenticator` and `NoOpAuthenticator` cover
//! personal access tokens and unauthenticated endpoints behind the same
//! trait.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::config::ClientIdProvider;
use crate::credentials::{Credentials, CredentialsStore};
use crate::error::AuthError;
use crate::login::LoginFlow;
use crate::refresh::TokenRefresher;

/// Attaches authentication to an outgoing request's headers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), AuthError>;
}

/// Attaches a fixed bearer token (personal access tokens, CI).
pub struct BearerTokenAuthenticator {
    token: String,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        headers.insert(AUTHORIZATION, bearer_header(&self.token)?);
        Ok(())
    }
}

/// Attaches nothing; for endpoints that take no authentication.
pub struct NoOpAuthenticator;

#[async_trait]
impl Authenticator for NoOpAuthenticator {
    async fn authenticate(&self, _headers: &mut HeaderMap) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Interactive OAuth authenticator for one profile.
///
/// Holds the profile name, the endpoint configuration, and a reference to
/// the process-wide credentials store. Instances are cheap; multiple
/// instances for the same profile serialize their login attempts through
/// the store's per-profile lock.
pub struct LoginAuthenticator {
    profile: String,
    provider: ClientIdProvider,
    store: Arc<CredentialsStore>,
    client: reqwest::Client,
    browser: Box<dyn BrowserLauncher>,
}

impl LoginAuthenticator {
    /// Create an authenticator bound to the process-wide store.
    ///
    /// Fails with [`AuthError::NotConfigured`] when
    /// [`CredentialsStore::init`] has not been called.
    pub fn new(
        profile: impl Into<String>,
        provider: ClientIdProvider,
    ) -> Result<Self, AuthError> {
        Ok(Self::with_store(profile, provider, CredentialsStore::shared()?))
    }

    /// Create an authenticator with an explicit store reference.
    pub fn with_store(
        profile: impl Into<String>,
        provider: ClientIdProvider,
        store: Arc<CredentialsStore>,
    ) -> Self {
        Self {
            profile: profile.into(),
            provider,
            store,
            client: reqwest::Client::new(),
            browser: Box::new(SystemBrowser),
        }
    }

    /// Replace the browser launcher (tests drive the flow without a display).
    pub fn with_browser(mut self, browser: Box<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Force an interactive login, serialized with any other flow for this
    /// profile.
    pub async fn login(&self) -> Result<Credentials, AuthError> {
        let lock = self.store.profile_lock(&self.profile);
        let _guard = lock.lock().await;
        self.run_login().await
    }

    /// A valid access token for this profile, logging in or refreshing as
    /// needed.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        // Fast path: fresh credentials need no lock.
        if let Some(credentials) = self.store.load(&self.profile)? {
            if !credentials.is_expired() {
                return Ok(credentials.access_token);
            }
        }

        let lock = self.store.profile_lock(&self.profile);
        let _guard = lock.lock().await;

        // Re-check under the lock: a concurrent flow for this profile may
        // have finished while we waited, and its outcome is ours too.
        let current = self.store.load(&self.profile)?;
        if let Some(credentials) = &current {
            if !credentials.is_expired() {
                return Ok(credentials.access_token.clone());
            }
            debug!("Stored credentials for profile {} expired", self.profile);
            let refresher =
                TokenRefresher::new(&self.profile, &self.provider, &self.store, &self.client);
            match refresher.refresh().await {
                Ok(fresh) => return Ok(fresh.access_token),
                Err(AuthError::RefreshFailed(reason)) => {
                    warn!(
                        "Token refresh for profile {} failed ({}); starting interactive login",
                        self.profile, reason
                    );
                }
                Err(other) => return Err(other),
            }
        }

        let credentials = self.run_login().await?;
        Ok(credentials.access_token)
    }

    /// Ensure valid credentials exist and attach the bearer token to the
    /// outgoing request's headers.
    pub async fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        let token = self.access_token().await?;
        headers.insert(AUTHORIZATION, bearer_header(&token)?);
        Ok(())
    }

    /// Remove this profile's stored credentials.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let lock = self.store.profile_lock(&self.profile);
        let _guard = lock.lock().await;
        self.store.remove(&self.profile)
    }

    async fn run_login(&self) -> Result<Credentials, AuthError> {
        LoginFlow::new(
            &self.profile,
            &self.provider,
            &self.store,
            self.browser.as_ref(),
            &self.client,
        )
        .run()
        .await
    }
}

#[async_trait]
impl Authenticator for LoginAuthenticator {
    async fn authenticate(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        LoginAuthenticator::authenticate(self, headers).await
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue, AuthError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bearer_token_authenticator_attaches_header() {
        let authenticator = BearerTokenAuthenticator::new("my-token");
        let mut headers = HeaderMap::new();
        authenticator.authenticate(&mut headers).await.unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer my-token");
    }

    #[tokio::test]
    async fn test_noop_authenticator_leaves_headers_alone() {
        let authenticator = NoOpAuthenticator;
        let mut headers = HeaderMap::new();
        authenticator.authenticate(&mut headers).await.unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_bearer_header_is_sensitive() {
        let value = bearer_header("secret").unwrap();
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_bearer_header_rejects_control_characters() {
        assert!(matches!(
            bearer_header("bad\ntoken"),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
