//! Interactive browser login through a short-lived local HTTP listener
//!
//! The flow binds one of a fixed set of loopback ports, serves `/start`
//! (redirect to the authorization endpoint) and `/finish` (authorization-code
//! callback), opens the user's browser, exchanges the code for tokens, and
//! persists the result. The listener is bound before the browser is opened,
//! so the server is known to be ready without polling, and the suspend point
//! is a single-use channel the `/finish` handler resolves.

use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::browser::BrowserLauncher;
use crate::config::ClientIdProvider;
use crate::credentials::{Credentials, CredentialsStore, TokenResponse};
use crate::error::AuthError;

/// Ordered candidate ports for the local callback server; first free wins.
/// These are registered as allowed `redirect_uri` ports for the CLI client.
pub(crate) const CALLBACK_PORTS: [u16; 3] = [61973, 61974, 61975];

/// How long the flow waits for the user to complete authorization in the
/// browser before tearing the server down.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Scope requested for CLI sessions.
const REQUESTED_SCOPE: &str = "controller:hubctl";

const CONFIRMATION_PAGE: &str = "<html><body><h1>You can close the window.</h1>\
    <p>Login completed. Return to the terminal to continue.</p></body></html>";

/// Outcome delivered by the `/finish` handler: the authorization code, or
/// the error reported by the authorization server.
type CallbackOutcome = Result<String, String>;

/// One interactive login attempt for a single profile.
///
/// Callers serialize attempts per profile through the store's profile lock;
/// the flow itself assumes it is the only one running for its profile.
pub(crate) struct LoginFlow<'a> {
    profile: &'a str,
    provider: &'a ClientIdProvider,
    store: &'a CredentialsStore,
    browser: &'a dyn BrowserLauncher,
    client: &'a reqwest::Client,
}

impl<'a> LoginFlow<'a> {
    pub(crate) fn new(
        profile: &'a str,
        provider: &'a ClientIdProvider,
        store: &'a CredentialsStore,
        browser: &'a dyn BrowserLauncher,
        client: &'a reqwest::Client,
    ) -> Self {
        Self {
            profile,
            provider,
            store,
            browser,
            client,
        }
    }

    /// Run the flow to completion and persist the resulting credentials.
    ///
    /// The local server is shut down on every path - success, exchange
    /// failure, timeout - before this returns.
    pub(crate) async fn run(&self) -> Result<Credentials, AuthError> {
        let (listener, port) = bind_callback_listener().await?;
        debug!("Login callback server listening on port {}", port);

        let (code_tx, code_rx) = oneshot::channel::<CallbackOutcome>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = callback_router(authorize_url(self.provider, port), code_tx);
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Login callback server error: {}", e);
            }
        });

        let result = self.drive(port, code_rx).await;

        // Tear the server down regardless of how the flow ended.
        let _ = shutdown_tx.send(());
        let _ = server.await;
        debug!("Login callback server on port {} stopped", port);

        let credentials = result?;
        self.store.save(self.profile, &credentials)?;
        Ok(credentials)
    }

    /// Everything between server start and token exchange; failures here
    /// still pass through the teardown in `run`.
    async fn drive(
        &self,
        port: u16,
        code_rx: oneshot::Receiver<CallbackOutcome>,
    ) -> Result<Credentials, AuthError> {
        let start_url = format!("http://localhost:{}/start", port);
        if let Err(e) = self.browser.open(&start_url) {
            warn!("Failed to open browser: {}", e);
            println!("Could not open a browser automatically. Visit {} to log in.", start_url);
        }

        debug!("Awaiting authorization callback for profile {}", self.profile);
        let outcome = match tokio::time::timeout(LOGIN_TIMEOUT, code_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                return Err(AuthError::Callback(
                    "authorization callback channel closed".to_string(),
                ))
            }
            Err(_) => return Err(AuthError::LoginTimeout(LOGIN_TIMEOUT.as_secs())),
        };

        let code = outcome.map_err(AuthError::Callback)?;
        debug!("Authorization code received, exchanging for tokens");
        self.exchange_code(&code, port).await
    }

    /// Exchange the authorization code for tokens at the OAuth-in endpoint.
    async fn exchange_code(&self, code: &str, port: u16) -> Result<Credentials, AuthError> {
        let redirect_uri = finish_redirect_uri(port);
        let response = self
            .client
            .post(self.provider.token_url())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.provider.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed { status, message });
        }

        let token: TokenResponse = response.json().await?;
        Credentials::from_token_response(token, None).ok_or_else(|| AuthError::ExchangeFailed {
            status: 200,
            message: "token response missing access or refresh token".to_string(),
        })
    }
}

/// Bind the first free port from [`CALLBACK_PORTS`].
///
/// A successful bind doubles as the server-ready signal: the socket is
/// listening before the browser is pointed at it.
async fn bind_callback_listener() -> Result<(TcpListener, u16), AuthError> {
    for port in CALLBACK_PORTS {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => debug!("Callback port {} unavailable: {}", port, e),
        }
    }
    Err(AuthError::PortUnavailable {
        ports: &CALLBACK_PORTS,
    })
}

/// The `redirect_uri` registered with the authorization request.
fn finish_redirect_uri(port: u16) -> String {
    format!("http://localhost:{}/finish", port)
}

/// The authorization-endpoint URL `/start` redirects the browser to.
fn authorize_url(provider: &ClientIdProvider, port: u16) -> String {
    let redirect_uri = finish_redirect_uri(port);
    format!(
        "{}?client_id={}&scope={}&response_type=code&redirect_uri={}",
        provider.auth_url,
        urlencoding::encode(&provider.client_id),
        urlencoding::encode(REQUESTED_SCOPE),
        urlencoding::encode(&redirect_uri),
    )
}

#[derive(Debug, Deserialize)]
struct FinishQuery {
    code: Option<String>,
    error: Option<String>,
}

/// Build the two-route router for the callback server.
///
/// `/start` redirects the browser to the authorization endpoint; `/finish`
/// resolves the flow's completion channel exactly once and renders a
/// human-readable page either way.
fn callback_router(authorize: String, code_tx: oneshot::Sender<CallbackOutcome>) -> Router {
    let code_tx = Arc::new(Mutex::new(Some(code_tx)));

    Router::new()
        .route(
            "/start",
            get(move || {
                let authorize = authorize.clone();
                async move { (StatusCode::FOUND, [(header::LOCATION, authorize)]) }
            }),
        )
        .route(
            "/finish",
            get(move |Query(query): Query<FinishQuery>| {
                let code_tx = code_tx.clone();
                async move {
                    let (outcome, page) = match query.code {
                        Some(code) if !code.is_empty() => {
                            (Ok(code), CONFIRMATION_PAGE.to_string())
                        }
                        _ => {
                            let reason = query
                                .error
                                .unwrap_or_else(|| "missing code parameter".to_string());
                            let page = format!(
                                "<html><body><h1>Login failed</h1><p>{}</p>\
                                 <p>Close the window and try again.</p></body></html>",
                                reason
                            );
                            (Err(reason), page)
                        }
                    };
                    if let Some(sender) = code_tx.lock().await.take() {
                        let _ = sender.send(outcome);
                    }
                    Html(page)
                }
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_contains_required_params() {
        let provider = ClientIdProvider::default();
        let url = authorize_url(&provider, 61973);

        assert!(url.starts_with(&provider.auth_url));
        assert!(url.contains("client_id="));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(&format!(
            "scope={}",
            urlencoding::encode(REQUESTED_SCOPE)
        )));
        assert!(url.contains(&format!(
            "redirect_uri={}",
            urlencoding::encode("http://localhost:61973/finish")
        )));
    }

    #[test]
    fn test_finish_redirect_uri_points_at_finish_route() {
        assert_eq!(
            finish_redirect_uri(61974),
            "http://localhost:61974/finish"
        );
    }
}
