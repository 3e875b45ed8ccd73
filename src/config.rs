//! Endpoint and client-id configuration for the hub cloud OAuth integration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Static endpoint and client-id configuration for one integration target.
///
/// All fields are plain strings supplied at construction; the struct carries
/// no behavior beyond derived endpoint URLs. The `Default` impl points at the
/// production hub cloud, so the CLI can construct one without configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdProvider {
    /// Base URL for the resource APIs the CLI calls after authenticating.
    pub base_url: String,
    /// Authorization endpoint the browser is redirected to.
    pub auth_url: String,
    /// Endpoint for personal-access-key validation.
    pub key_api_url: String,
    /// Base URL of the OAuth-in service; the token-exchange endpoint is
    /// `{base_oauth_in_url}/token`.
    pub base_oauth_in_url: String,
    /// Endpoint for the `refresh_token` grant.
    pub oauth_auth_token_refresh_url: String,
    /// OAuth client id registered for the CLI.
    pub client_id: String,
}

impl ClientIdProvider {
    /// The authorization-code exchange endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_oauth_in_url)
    }
}

impl Default for ClientIdProvider {
    fn default() -> Self {
        Self {
            base_url: "https://api.hubcloud.dev".to_string(),
            auth_url: "https://auth.hubcloud.dev/oauth/authorize".to_string(),
            key_api_url: "https://api.hubcloud.dev/v1/keys".to_string(),
            base_oauth_in_url: "https://auth.hubcloud.dev/oauth-in".to_string(),
            oauth_auth_token_refresh_url: "https://auth.hubcloud.dev/oauth/token/refresh"
                .to_string(),
            client_id: "6c7a8c0d-2f10-4b21-9c8e-5d1f3a9b4e72".to_string(),
        }
    }
}

/// Default location of the credentials file: `<config dir>/hubctl/credentials.json`.
///
/// Returns `None` when the platform config directory cannot be determined.
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hubctl").join("credentials.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url_is_derived_from_oauth_in_base() {
        let provider = ClientIdProvider::default();
        assert_eq!(
            provider.token_url(),
            "https://auth.hubcloud.dev/oauth-in/token"
        );
    }

    #[test]
    fn test_default_credentials_path_ends_with_crate_file() {
        if let Some(path) = default_credentials_path() {
            assert!(path.ends_with("hubctl/credentials.json"));
        }
    }
}
