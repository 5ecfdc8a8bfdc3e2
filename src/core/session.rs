//! Credential state and auth-token lifecycle.

use crate::error::{NacosError, Result};
use crate::remote::context::{FORM_CONTENT_TYPE, HttpContext};
use crate::remote::signing::{SignedHeaders, canonical_string, sign_sha1};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default margin subtracted from the server-declared token TTL.
pub const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(600);

/// Authentication mode of a client. Modes are mutually exclusive.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No auth material is attached.
    None,
    /// Username/password exchanged for a bearer token at the login endpoint.
    Token {
        /// Login user
        username: String,
        /// Login password
        password: String,
    },
    /// Every request is signed with HMAC-SHA1 using an access key pair.
    Signature {
        /// Access key id
        access_key: String,
        /// Access key secret
        secret_key: String,
    },
}

impl AuthMode {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Token { .. } => "token",
            Self::Signature { .. } => "signature",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Signature { access_key, .. } => f
                .debug_struct("Signature")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
        }
    }
}

/// Auth material to attach to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAuth {
    /// Nothing to attach.
    Anonymous,
    /// `accessToken` request parameter.
    Token(String),
    /// `Spas-*` and `Timestamp` headers.
    Signed(SignedHeaders),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    token_ttl: u64,
}

#[derive(Default)]
struct TokenState {
    token: Option<String>,
    expires_at: Option<Instant>,
}

impl TokenState {
    fn valid_token(&self, now: Instant) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expiry)) if expiry > now => Some(token),
            _ => None,
        }
    }
}

/// Owns the credentials and the current auth token.
///
/// Token reads and renewals are serialized through one mutex, so concurrent
/// requests never observe a half-written token and at most one login runs at
/// a time.
pub struct Session {
    ctx: Arc<HttpContext>,
    mode: AuthMode,
    safety_margin: Duration,
    state: Mutex<TokenState>,
}

impl Session {
    pub(crate) fn new(ctx: Arc<HttpContext>, mode: AuthMode, safety_margin: Duration) -> Self {
        Self {
            ctx,
            mode,
            safety_margin,
            state: Mutex::new(TokenState::default()),
        }
    }

    /// The active authentication mode.
    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Make sure a token valid strictly beyond now is held, logging in if needed.
    ///
    /// Returns the token to attach, or `None` when the mode does not use tokens.
    ///
    /// # Errors
    ///
    /// Returns [`NacosError::Auth`] if the login exchange is rejected.
    pub async fn ensure_valid(&self) -> Result<Option<String>> {
        if !matches!(self.mode, AuthMode::Token { .. }) {
            return Ok(None);
        }

        let mut state = self.state.lock().await;
        if let Some(token) = state.valid_token(Instant::now()) {
            return Ok(Some(token.to_string()));
        }

        let (token, expires_at) = self.login().await?;
        state.token = Some(token.clone());
        state.expires_at = Some(expires_at);
        Ok(Some(token))
    }

    /// Repeat the login exchange regardless of the current token's expiry.
    ///
    /// No-op outside token mode. On failure the previous token is kept.
    pub async fn force_renew(&self) -> Result<()> {
        if !matches!(self.mode, AuthMode::Token { .. }) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let (token, expires_at) = self.login().await?;
        state.token = Some(token);
        state.expires_at = Some(expires_at);
        Ok(())
    }

    /// Log in only if the held token is no longer valid.
    ///
    /// Watches sharing this session each run a renewal timer for the same
    /// expiry; the first one to fire renews and the rest find a fresh token.
    /// No-op outside token mode.
    pub async fn renew_if_expired(&self) -> Result<()> {
        if !matches!(self.mode, AuthMode::Token { .. }) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if state.valid_token(Instant::now()).is_some() {
            debug!("token already renewed");
            return Ok(());
        }
        let (token, expires_at) = self.login().await?;
        state.token = Some(token);
        state.expires_at = Some(expires_at);
        Ok(())
    }

    /// Time left before the held token must be renewed.
    ///
    /// `None` outside token mode or before the first login.
    pub async fn remaining_lifetime(&self) -> Option<Duration> {
        if !matches!(self.mode, AuthMode::Token { .. }) {
            return None;
        }
        let state = self.state.lock().await;
        state
            .expires_at
            .map(|expiry| expiry.saturating_duration_since(Instant::now()))
    }

    /// Sign a request against `namespace`/`group` at `timestamp` (epoch millis).
    ///
    /// Returns `None` outside signature mode.
    pub fn sign(
        &self,
        namespace: &str,
        group: &str,
        timestamp: &str,
    ) -> Result<Option<SignedHeaders>> {
        match &self.mode {
            AuthMode::Signature {
                access_key,
                secret_key,
            } => {
                let text = canonical_string(namespace, group, timestamp);
                Ok(Some(SignedHeaders {
                    access_key: access_key.clone(),
                    signature: sign_sha1(&text, secret_key)?,
                    timestamp: timestamp.to_string(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Auth material for one request.
    pub(crate) async fn authorize(
        &self,
        namespace: &str,
        group: &str,
        timestamp: &str,
    ) -> Result<RequestAuth> {
        match &self.mode {
            AuthMode::None => Ok(RequestAuth::Anonymous),
            AuthMode::Token { .. } => match self.ensure_valid().await? {
                Some(token) => Ok(RequestAuth::Token(token)),
                None => Ok(RequestAuth::Anonymous),
            },
            AuthMode::Signature { .. } => match self.sign(namespace, group, timestamp)? {
                Some(headers) => Ok(RequestAuth::Signed(headers)),
                None => Ok(RequestAuth::Anonymous),
            },
        }
    }

    async fn login(&self) -> Result<(String, Instant)> {
        let AuthMode::Token { username, password } = &self.mode else {
            return Err(NacosError::Auth(
                "Login requires token authentication".to_string(),
            ));
        };

        let url = self.ctx.url(&self.ctx.paths.login).await?;
        debug!(url = %url, username = %username, "logging in");

        let response = self
            .ctx
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .timeout(self.ctx.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(NacosError::Auth(format!(
                "login rejected with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let login: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| NacosError::Auth(format!("malformed login response: {}", e)))?;

        let lifetime = Duration::from_secs(login.token_ttl).saturating_sub(self.safety_margin);
        info!(
            username = %username,
            token_ttl = login.token_ttl,
            renew_in_secs = lifetime.as_secs(),
            "login succeeded"
        );
        Ok((login.access_token, Instant::now() + lifetime))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("safety_margin", &self.safety_margin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ServerAddress;
    use crate::remote::context::ApiPaths;
    use reqwest::Client;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(base: &str, mode: AuthMode, margin: Duration) -> Session {
        let ctx = HttpContext::new(
            Client::new(),
            ServerAddress::fixed(base),
            ApiPaths::default(),
            Duration::from_secs(5),
        );
        Session::new(Arc::new(ctx), mode, margin)
    }

    fn token_mode() -> AuthMode {
        AuthMode::Token {
            username: "nacos".to_string(),
            password: "secret".to_string(),
        }
    }

    async fn mount_login(server: &MockServer, ttl: u64, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/nacos/v1/auth/login"))
            .and(body_string_contains("username=nacos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "tok-1",
                "tokenTtl": ttl,
                "globalAdmin": true
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_ensure_valid_logs_in_once_while_token_is_fresh() {
        let server = MockServer::start().await;
        mount_login(&server, 18000, 1).await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        assert_eq!(session.ensure_valid().await.unwrap().as_deref(), Some("tok-1"));
        assert_eq!(session.ensure_valid().await.unwrap().as_deref(), Some("tok-1"));

        let remaining = session.remaining_lifetime().await.unwrap();
        assert!(remaining <= Duration::from_secs(18000 - 600));
        assert!(remaining > Duration::from_secs(17000));
    }

    #[tokio::test]
    async fn test_ensure_valid_renews_expired_token() {
        let server = MockServer::start().await;
        // TTL shorter than the margin: every token is already due for renewal.
        mount_login(&server, 300, 2).await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        session.ensure_valid().await.unwrap();
        session.ensure_valid().await.unwrap();
        assert_eq!(session.remaining_lifetime().await, Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_renew_if_expired_skips_fresh_token() {
        let server = MockServer::start().await;
        mount_login(&server, 18000, 1).await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        session.ensure_valid().await.unwrap();
        // A second watch firing at the same deadline finds the token renewed.
        session.renew_if_expired().await.unwrap();
        session.renew_if_expired().await.unwrap();
    }

    #[tokio::test]
    async fn test_renew_if_expired_logs_in_when_due() {
        let server = MockServer::start().await;
        mount_login(&server, 300, 2).await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        session.ensure_valid().await.unwrap();
        session.renew_if_expired().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_requires_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/nacos/v1/auth/login"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "accessToken": "tok-1",
                "tokenTtl": 18000
            })))
            .mount(&server)
            .await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        assert!(matches!(session.ensure_valid().await, Err(NacosError::Auth(_))));
    }

    #[tokio::test]
    async fn test_force_renew_always_logs_in() {
        let server = MockServer::start().await;
        mount_login(&server, 18000, 2).await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        session.ensure_valid().await.unwrap();
        session.force_renew().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/nacos/v1/auth/login"))
            .respond_with(ResponseTemplate::new(403).set_body_string("unknown user!"))
            .mount(&server)
            .await;

        let session = session(&server.uri(), token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        let err = session.ensure_valid().await.unwrap_err();
        assert!(matches!(err, NacosError::Auth(msg) if msg.contains("unknown user!")));
        assert!(session.force_renew().await.is_err());
    }

    #[tokio::test]
    async fn test_non_token_modes_never_log_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/nacos/v1/auth/login"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let anonymous = session(&server.uri(), AuthMode::None, DEFAULT_TOKEN_SAFETY_MARGIN);
        assert_eq!(anonymous.ensure_valid().await.unwrap(), None);
        anonymous.force_renew().await.unwrap();
        assert_eq!(anonymous.remaining_lifetime().await, None);

        let signed = session(
            &server.uri(),
            AuthMode::Signature {
                access_key: "ak".to_string(),
                secret_key: "secret".to_string(),
            },
            DEFAULT_TOKEN_SAFETY_MARGIN,
        );
        assert_eq!(signed.ensure_valid().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_only_in_signature_mode() {
        let signed = session(
            "http://localhost:8848",
            AuthMode::Signature {
                access_key: "ak".to_string(),
                secret_key: "secret".to_string(),
            },
            DEFAULT_TOKEN_SAFETY_MARGIN,
        );
        let headers = signed
            .sign("pay-dev", "DEFAULT_GROUP", "1700000000000")
            .unwrap()
            .unwrap();
        assert_eq!(headers.access_key, "ak");
        assert_eq!(headers.signature, "OoXADwGxTr0U+vlWl58VMGcy94s=");

        let auth = signed
            .authorize("pay-dev", "DEFAULT_GROUP", "1700000000000")
            .await
            .unwrap();
        assert!(matches!(auth, RequestAuth::Signed(_)));

        let plain = session("http://localhost:8848", token_mode(), DEFAULT_TOKEN_SAFETY_MARGIN);
        assert_eq!(plain.sign("a", "b", "1").unwrap(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let text = format!("{:?}", token_mode());
        assert!(text.contains("nacos"));
        assert!(!text.contains("secret"));
    }
}
