//! Builder for constructing NacosClient instances.

use crate::core::client::NacosClient;
use crate::core::session::{AuthMode, DEFAULT_TOKEN_SAFETY_MARGIN, Session};
use crate::core::settings::ClientSettings;
use crate::core::Validate;
use crate::error::{NacosError, Result};
use crate::notify::{DEFAULT_POLL_INTERVAL, WatchOptions};
use crate::remote::context::HttpContext;
use crate::remote::{
    ApiPaths, ConfigEndpoint, DEFAULT_LONG_POLL_TIMEOUT, LongPollListener, Separator,
    ServerAddress,
};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::WatchMetrics;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for constructing a `NacosClient`.
///
/// Provides a fluent interface for the server address, auth mode and
/// timeouts.
///
/// # Examples
///
/// ```rust,no_run
/// use nacos_watch::prelude::*;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let client = NacosClient::builder()
///     .with_server_addr("http://127.0.0.1:8848")
///     .with_token_auth("nacos", "nacos")
///     .with_poll_interval(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct NacosClientBuilder {
    address: Option<ServerAddress>,
    auth: AuthMode,
    http: Option<reqwest::Client>,
    request_timeout: Duration,
    long_poll_timeout: Duration,
    poll_interval: Duration,
    token_safety_margin: Duration,
    separator: Separator,
    paths: ApiPaths,
    #[cfg(feature = "metrics")]
    metrics: Option<WatchMetrics>,
}

impl NacosClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            address: None,
            auth: AuthMode::None,
            http: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            long_poll_timeout: DEFAULT_LONG_POLL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
            separator: Separator::default(),
            paths: ApiPaths::default(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Start from loaded [`ClientSettings`].
    ///
    /// # Errors
    ///
    /// Returns [`NacosError::InvalidConfig`] if the settings fail validation.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        settings.validate()?;

        let mut builder = Self::new()
            .with_request_timeout(settings.request_timeout())
            .with_long_poll_timeout(settings.long_poll_timeout())
            .with_poll_interval(settings.poll_interval())
            .with_token_safety_margin(settings.token_safety_margin())
            .with_separator(settings.separator);

        if let Some(addr) = &settings.server_addr {
            builder = builder.with_server_addr(addr.clone());
        }
        if let Some(url) = &settings.address_server {
            builder = builder.with_address_server(url.clone());
        }
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.with_token_auth(username.clone(), password.clone());
        }
        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key)
        {
            builder = builder.with_signature_auth(access_key.clone(), secret_key.clone());
        }

        Ok(builder)
    }

    /// Talk to a fixed server base URL, e.g. `http://127.0.0.1:8848`.
    pub fn with_server_addr(mut self, base_url: impl Into<String>) -> Self {
        self.address = Some(ServerAddress::fixed(base_url));
        self
    }

    /// Discover the server base URL from an address server on first use.
    pub fn with_address_server(mut self, url: impl Into<String>) -> Self {
        self.address = Some(ServerAddress::address_server(url));
        self
    }

    /// Authenticate with a login token. Replaces any previous auth mode.
    pub fn with_token_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = AuthMode::Token {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Sign every request with an access key pair. Replaces any previous auth mode.
    pub fn with_signature_auth(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.auth = AuthMode::Signature {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        };
        self
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, ...).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Timeout for plain requests; probes add the long-poll hold on top.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Server-side hold advertised on each probe.
    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Default poll interval for watches started from this client.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Amount subtracted from the server token TTL when scheduling renewal.
    pub fn with_token_safety_margin(mut self, margin: Duration) -> Self {
        self.token_safety_margin = margin;
        self
    }

    /// Separator style for listen requests.
    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    /// Override the service API paths.
    pub fn with_api_paths(mut self, paths: ApiPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Record watch activity for every watch started from this client.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the client.
    ///
    /// No network traffic happens here; login and address discovery are
    /// deferred to the first request.
    ///
    /// # Errors
    ///
    /// Returns [`NacosError::InvalidConfig`] if:
    /// - no server address was given
    /// - credentials are empty
    /// - the poll interval or long-poll timeout is zero
    ///
    /// Returns [`NacosError::Transport`] if the HTTP client cannot be created.
    pub fn build(self) -> Result<NacosClient> {
        let address = self.address.ok_or_else(|| {
            NacosError::InvalidConfig(
                "a server address or address server URL is required".to_string(),
            )
        })?;
        validate_auth(&self.auth)?;
        if self.poll_interval.is_zero() {
            return Err(NacosError::InvalidConfig(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        if self.long_poll_timeout.is_zero() {
            return Err(NacosError::InvalidConfig(
                "long-poll timeout must be greater than 0".to_string(),
            ));
        }

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| NacosError::Transport(format!("Failed to create HTTP client: {}", e)))?,
        };

        let ctx = Arc::new(HttpContext::new(
            http,
            address,
            self.paths,
            self.request_timeout,
        ));
        let session = Arc::new(Session::new(
            Arc::clone(&ctx),
            self.auth,
            self.token_safety_margin,
        ));
        let endpoint = ConfigEndpoint::new(Arc::clone(&ctx), Arc::clone(&session));
        let listener = LongPollListener::new(
            ctx,
            Arc::clone(&session),
            self.long_poll_timeout,
            self.separator,
        );

        let watch_options = WatchOptions::default().with_poll_interval(self.poll_interval);
        #[cfg(feature = "metrics")]
        let watch_options = match self.metrics {
            Some(metrics) => watch_options.with_metrics(metrics),
            None => watch_options,
        };

        Ok(NacosClient::new(session, endpoint, listener, watch_options))
    }
}

impl Default for NacosClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_auth(auth: &AuthMode) -> Result<()> {
    let empty = match auth {
        AuthMode::None => None,
        AuthMode::Token { username, password } => {
            (username.is_empty() || password.is_empty()).then_some("username and password")
        }
        AuthMode::Signature {
            access_key,
            secret_key,
        } => (access_key.is_empty() || secret_key.is_empty()).then_some("access key and secret key"),
    };
    match empty {
        Some(what) => Err(NacosError::InvalidConfig(format!(
            "{} must not be empty",
            what
        ))),
        None => Ok(()),
    }
}
