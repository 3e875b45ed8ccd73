//! Non-interactive token refresh
//!
//! Exchanges the stored refresh token for a new access token. A rejection
//! here is not terminal: the authenticator falls back to an interactive
//! login.

use tracing::debug;

use crate::config::ClientIdProvider;
use crate::credentials::{Credentials, CredentialsStore, TokenResponse};
use crate::error::AuthError;

/// Refreshes the access token for one profile using its stored refresh token.
pub(crate) struct TokenRefresher<'a> {
    profile: &'a str,
    provider: &'a ClientIdProvider,
    store: &'a CredentialsStore,
    client: &'a reqwest::Client,
}

impl<'a> TokenRefresher<'a> {
    pub(crate) fn new(
        profile: &'a str,
        provider: &'a ClientIdProvider,
        store: &'a CredentialsStore,
        client: &'a reqwest::Client,
    ) -> Self {
        Self {
            profile,
            provider,
            store,
            client,
        }
    }

    /// POST the stored refresh token to the refresh endpoint and persist the
    /// resulting credentials.
    ///
    /// The endpoint may rotate the refresh token; when it does not return
    /// one, the previous refresh token is kept.
    pub(crate) async fn refresh(&self) -> Result<Credentials, AuthError> {
        let current = self.store.load(self.profile)?.ok_or_else(|| {
            AuthError::RefreshFailed(format!("no stored credentials for profile {}", self.profile))
        })?;

        debug!("Refreshing access token for profile {}", self.profile);
        let response = self
            .client
            .post(&self.provider.oauth_auth_token_refresh_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
                ("client_id", self.provider.client_id.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!(
                "endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let credentials = Credentials::from_token_response(token, Some(&current)).ok_or_else(
            || AuthError::RefreshFailed("refresh response missing access token".to_string()),
        )?;

        self.store.save(self.profile, &credentials)?;
        debug!("Token refreshed for profile {}", self.profile);
        Ok(credentials)
    }
}
