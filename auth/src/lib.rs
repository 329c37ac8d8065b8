//! Authentication module for the Instagram API.
//!
//! Drives the OAuth2 authorization-code flow against Instagram, upgrades the
//! resulting token to a long-lived one and keeps it in a [`TokenStore`].

mod credential;
mod store;

pub use credential::Credential;
#[cfg(feature = "file-store")]
pub use store::FileStore;
pub use store::{FallbackStore, KeyringStore, MemoryStore, TokenStore, KEYRING_SERVICE_NAME};

use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenUrl};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

pub const DEFAULT_OAUTH_URL: &str = "https://api.instagram.com";
pub const DEFAULT_GRAPH_URL: &str = "https://graph.instagram.com";

/// Short-lived tokens are valid for one hour.
const SHORT_LIVED_TOKEN_SECS: i64 = 3600;
/// Refresh long-lived tokens once they are this close to expiry.
const REFRESH_WINDOW_DAYS: i64 = 7;

const REDIRECT_PAGE: &str = "<html><body><h3>Instagram authorization complete.</h3>\
<p>You can close this window and return to the picker.</p></body></html>";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Keyring Error: {0}")]
    Keyring(String),
    #[error("Token Store Error: {0}")]
    Store(String),
    #[error("OAuth Error: {0}")]
    OAuth(String),
    #[error("Authorization denied: {0}")]
    Denied(String),
    #[error("Authorization state mismatch")]
    StateMismatch,
    #[error("Timed out waiting for authorization")]
    Timeout,
    #[error("IO Error: {0}")]
    Io(String),
    #[error("Other Error: {0}")]
    Other(String),
}

/// Client registration and endpoints used for the OAuth2 flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub graph_url: String,
    pub scopes: Vec<String>,
    pub authorization_timeout: Duration,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            redirect_uri: redirect_uri.into(),
            authorize_url: String::new(),
            token_url: String::new(),
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            scopes: vec!["user_profile".to_string(), "user_media".to_string()],
            authorization_timeout: Duration::from_secs(300),
        }
        .with_oauth_url(DEFAULT_OAUTH_URL)
    }

    /// Point the authorize and token endpoints at another host. Mainly used for testing.
    pub fn with_oauth_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorize_url = format!("{}/oauth/authorize", base);
        self.token_url = format!("{}/oauth/access_token", base);
        self
    }

    pub fn with_graph_url(mut self, graph_url: &str) -> Self {
        self.graph_url = graph_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }
}

/// Opens the authorization page for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), AuthError>;
}

/// Launches the platform's default browser.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        webbrowser::open(url).map_err(|e| AuthError::Io(e.to_string()))
    }
}

/// A pending authorization: the URL to show and the state it must come back with.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: CsrfToken,
}

#[derive(Debug, Deserialize)]
struct ShortLivedToken {
    access_token: String,
    user_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeExchangeResponse {
    Wrapped { data: Vec<ShortLivedToken> },
    Plain(ShortLivedToken),
}

#[derive(Debug, Deserialize)]
struct LongLivedToken {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error_type: Option<String>,
    error_message: Option<String>,
    error: Option<serde_json::Value>,
}

/// Reads the most useful message out of an Instagram OAuth error body.
fn oauth_error_message(body: &str) -> String {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(OAuthErrorBody { error_message: Some(msg), error_type, .. }) => match error_type {
            Some(kind) => format!("{}: {}", kind, msg),
            None => msg,
        },
        Ok(OAuthErrorBody { error: Some(err), .. }) => err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
        _ => body.to_string(),
    }
}

pub struct Authenticator {
    config: OAuthConfig,
    store: Arc<dyn TokenStore>,
    launcher: Arc<dyn BrowserLauncher>,
    http: reqwest::Client,
}

impl Authenticator {
    pub fn new(config: OAuthConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            store,
            launcher: Arc::new(SystemBrowser),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn graph_url(&self) -> &str {
        &self.config.graph_url
    }

    /// Return whatever credential the store currently holds.
    pub fn cached_credential(&self) -> Result<Option<Credential>, AuthError> {
        self.store.load()
    }

    /// Drop the cached credential, e.g. after the API rejected it.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        tracing::info!("Invalidating cached Instagram credential");
        self.store.clear()
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.invalidate()
    }

    pub fn authorization_request(&self) -> Result<AuthorizationRequest, AuthError> {
        let client = BasicClient::new(
            self.config.client_id.clone(),
            Some(self.config.client_secret.clone()),
            AuthUrl::new(self.config.authorize_url.clone()).map_err(|e| AuthError::OAuth(e.to_string()))?,
            Some(TokenUrl::new(self.config.token_url.clone()).map_err(|e| AuthError::OAuth(e.to_string()))?),
        )
        .set_redirect_uri(RedirectUrl::new(self.config.redirect_uri.clone()).map_err(|e| AuthError::OAuth(e.to_string()))?);

        // Instagram expects a comma separated scope list.
        let (url, state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(self.config.scopes.join(",")))
            .url();

        Ok(AuthorizationRequest { url, state })
    }

    /// Extract the authorization code from the URL Instagram redirected to.
    pub fn code_from_redirect(&self, request: &AuthorizationRequest, redirect: &Url) -> Result<AuthorizationCode, AuthError> {
        let param = |name: &str| {
            redirect
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param("error") {
            let detail = param("error_description")
                .or_else(|| param("error_reason"))
                .unwrap_or(error);
            return Err(AuthError::Denied(detail));
        }

        match param("state") {
            Some(state) if state == *request.state.secret() => {}
            _ => return Err(AuthError::StateMismatch),
        }

        param("code")
            .map(AuthorizationCode::new)
            .ok_or_else(|| AuthError::OAuth("No authorization code found in redirect URL".into()))
    }

    /// Exchange an authorization code for a credential, upgraded to a
    /// long-lived token when Instagram allows it.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, code)))]
    pub async fn exchange_code(&self, code: AuthorizationCode) -> Result<Credential, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.secret().as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code.secret().as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::OAuth(oauth_error_message(&body)));
        }

        let token = match response
            .json::<CodeExchangeResponse>()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))?
        {
            CodeExchangeResponse::Plain(token) => token,
            CodeExchangeResponse::Wrapped { data } => data
                .into_iter()
                .next()
                .ok_or_else(|| AuthError::OAuth("Empty token response".into()))?,
        };

        let user_id = token.user_id.map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let credential = match self.exchange_long_lived(&token.access_token).await {
            Ok(long) => Credential::new(long.access_token, long.expires_in),
            Err(e) => {
                tracing::warn!(error = %e, "Long-lived token exchange failed, keeping short-lived token");
                Credential::new(token.access_token, Some(SHORT_LIVED_TOKEN_SECS))
            }
        };

        Ok(credential.with_user_id(user_id))
    }

    async fn exchange_long_lived(&self, short_token: &str) -> Result<LongLivedToken, AuthError> {
        let url = format!("{}/access_token", self.config.graph_url);
        self.graph_token_request(
            &url,
            &[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", self.config.client_secret.secret().as_str()),
                ("access_token", short_token),
            ],
        )
        .await
    }

    async fn graph_token_request(&self, url: &str, query: &[(&str, &str)]) -> Result<LongLivedToken, AuthError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::OAuth(oauth_error_message(&body)));
        }

        response
            .json::<LongLivedToken>()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))
    }

    /// Extend a long-lived token and store the result.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, credential)))]
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let url = format!("{}/refresh_access_token", self.config.graph_url);
        let token = self
            .graph_token_request(
                &url,
                &[
                    ("grant_type", "ig_refresh_token"),
                    ("access_token", credential.access_token.as_str()),
                ],
            )
            .await?;

        let refreshed = Credential::new(token.access_token, token.expires_in).with_user_id(credential.user_id.clone());
        self.store.save(&refreshed)?;
        tracing::info!("Refreshed Instagram access token");
        Ok(refreshed)
    }

    /// Run the interactive flow: open the browser and wait on the loopback
    /// address named by the redirect URI until Instagram sends the user back.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn authorize(&self) -> Result<Credential, AuthError> {
        let redirect = Url::parse(&self.config.redirect_uri).map_err(|e| AuthError::OAuth(e.to_string()))?;
        let host = match redirect.host_str() {
            Some("localhost") => "127.0.0.1",
            Some(host @ ("127.0.0.1" | "[::1]")) => host.trim_matches(|c| c == '[' || c == ']'),
            _ => {
                return Err(AuthError::Other(format!(
                    "Redirect URI {} is not a loopback address",
                    self.config.redirect_uri
                )))
            }
        };
        let port = redirect
            .port_or_known_default()
            .ok_or_else(|| AuthError::Other("Redirect URI has no port".into()))?;

        // Bind before opening the browser so the redirect cannot arrive early.
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| AuthError::Io(e.to_string()))?;

        let request = self.authorization_request()?;
        tracing::info!("Opening browser for Instagram authorization");
        self.launcher.open(request.url.as_str())?;

        let returned = tokio::time::timeout(self.config.authorization_timeout, wait_for_redirect(&listener, &redirect))
            .await
            .map_err(|_| AuthError::Timeout)??;

        let code = self.code_from_redirect(&request, &returned)?;
        let credential = self.exchange_code(code).await?;
        self.store.save(&credential)?;
        tracing::info!("Instagram authorization successful");
        Ok(credential)
    }

    /// Return a usable credential: the cached one, refreshed when close to
    /// expiry, or a fresh one from the interactive flow.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn ensure_credential(&self) -> Result<Credential, AuthError> {
        let now = Utc::now();
        match self.store.load() {
            Ok(Some(cred)) if !cred.is_expired(now) => {
                if cred.needs_refresh(now, chrono::Duration::days(REFRESH_WINDOW_DAYS)) {
                    match self.refresh(&cred).await {
                        Ok(refreshed) => return Ok(refreshed),
                        Err(e) => tracing::warn!(error = %e, "Token refresh failed, using current token"),
                    }
                }
                return Ok(cred);
            }
            Ok(Some(_)) => tracing::info!("Cached Instagram credential expired"),
            Ok(None) => tracing::info!("No cached Instagram credential"),
            Err(e) => tracing::warn!(error = %e, "Failed to read cached credential"),
        }
        self.authorize().await
    }
}

async fn wait_for_redirect(listener: &TcpListener, redirect: &Url) -> Result<Url, AuthError> {
    loop {
        let (stream, _) = listener.accept().await.map_err(|e| AuthError::Io(e.to_string()))?;
        let mut stream = BufReader::new(stream);

        let mut request_line = String::new();
        stream
            .read_line(&mut request_line)
            .await
            .map_err(|e| AuthError::Io(e.to_string()))?;

        let target = match request_line.split_whitespace().nth(1) {
            Some(target) => target,
            None => continue,
        };
        let url = redirect.join(target).map_err(|e| AuthError::OAuth(e.to_string()))?;

        // Browsers like to ask for a favicon first.
        if url.path() != redirect.path() {
            let _ = stream
                .get_mut()
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            continue;
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            REDIRECT_PAGE.len(),
            REDIRECT_PAGE
        );
        if let Err(e) = stream.get_mut().write_all(response.as_bytes()).await {
            tracing::warn!(error = %e, "Failed to answer authorization redirect");
        }
        return Ok(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        let config = OAuthConfig::new("client", "secret", "http://127.0.0.1:8765/callback");
        Authenticator::new(config, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_authorization_url() {
        let auth = authenticator();
        let request = auth.authorization_request().unwrap();
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert_eq!(request.url.path(), "/oauth/authorize");
        assert!(pairs.contains(&("client_id".into(), "client".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("scope".into(), "user_profile,user_media".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://127.0.0.1:8765/callback".into())));
        assert!(pairs.contains(&("state".into(), request.state.secret().clone())));
    }

    #[test]
    fn test_code_from_redirect() {
        let auth = authenticator();
        let request = auth.authorization_request().unwrap();
        let url = Url::parse(&format!(
            "http://127.0.0.1:8765/callback?code=abc123&state={}#_",
            request.state.secret()
        ))
        .unwrap();
        let code = auth.code_from_redirect(&request, &url).unwrap();
        assert_eq!(code.secret(), "abc123");
    }

    #[test]
    fn test_code_from_redirect_rejects_wrong_state() {
        let auth = authenticator();
        let request = auth.authorization_request().unwrap();
        let url = Url::parse("http://127.0.0.1:8765/callback?code=abc123&state=forged").unwrap();
        assert!(matches!(auth.code_from_redirect(&request, &url), Err(AuthError::StateMismatch)));
    }

    #[test]
    fn test_code_from_redirect_denied() {
        let auth = authenticator();
        let request = auth.authorization_request().unwrap();
        let url = Url::parse(
            "http://127.0.0.1:8765/callback?error=access_denied&error_reason=user_denied&error_description=The+user+denied+your+request.",
        )
        .unwrap();
        match auth.code_from_redirect(&request, &url) {
            Err(AuthError::Denied(msg)) => assert_eq!(msg, "The user denied your request."),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_oauth_error_message() {
        let body = r#"{"error_type": "OAuthException", "code": 400, "error_message": "Invalid authorization code"}"#;
        assert_eq!(oauth_error_message(body), "OAuthException: Invalid authorization code");
        let graph = r#"{"error": {"message": "Invalid OAuth access token.", "code": 190}}"#;
        assert_eq!(oauth_error_message(graph), "Invalid OAuth access token.");
        assert_eq!(oauth_error_message("plain"), "plain");
    }

    #[tokio::test]
    async fn test_non_loopback_redirect_rejected() {
        let config = OAuthConfig::new("client", "secret", "https://example.com/callback");
        let auth = Authenticator::new(config, Arc::new(MemoryStore::new()));
        assert!(matches!(auth.authorize().await, Err(AuthError::Other(_))));
    }
}
