//! Shared HTTP plumbing for the session, config endpoint and listener.

use super::ServerAddress;
use crate::error::Result;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Form content type used by every request.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";

/// API paths relative to the server base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPaths {
    /// Login exchange
    pub login: String,
    /// Fetch and publish
    pub config: String,
    /// Long-poll listener
    pub listener: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            login: "/nacos/v1/auth/login".to_string(),
            config: "/nacos/v2/cs/config".to_string(),
            listener: "/nacos/v1/cs/configs/listener".to_string(),
        }
    }
}

/// HTTP client, server address and timeouts shared by all remote calls.
pub(crate) struct HttpContext {
    pub(crate) http: Client,
    address: ServerAddress,
    base_url: OnceCell<String>,
    pub(crate) paths: ApiPaths,
    pub(crate) request_timeout: Duration,
}

impl HttpContext {
    pub(crate) fn new(
        http: Client,
        address: ServerAddress,
        paths: ApiPaths,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            address,
            base_url: OnceCell::new(),
            paths,
            request_timeout,
        }
    }

    /// Base URL, resolved once per client.
    pub(crate) async fn base_url(&self) -> Result<&str> {
        let base = self
            .base_url
            .get_or_try_init(|| self.address.resolve(&self.http, self.request_timeout))
            .await?;
        Ok(base.as_str())
    }

    pub(crate) async fn url(&self, path: &str) -> Result<String> {
        Ok(format!("{}{}", self.base_url().await?, path))
    }
}

/// Current time as epoch milliseconds, the format of the `Timestamp` header.
pub(crate) fn timestamp_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
