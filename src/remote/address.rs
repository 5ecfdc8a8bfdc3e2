//! Server endpoint resolution.

use crate::error::{NacosError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Port assumed when an address-server entry carries none.
pub const DEFAULT_SERVER_PORT: u16 = 8848;

/// How the client finds the configuration server.
///
/// # Examples
///
/// ```rust
/// use nacos_watch::remote::ServerAddress;
///
/// let fixed = ServerAddress::fixed("http://127.0.0.1:8848");
/// let discovered = ServerAddress::address_server("http://acm.example.com:8080/diamond-server/diamond");
/// assert!(matches!(fixed, ServerAddress::Fixed(_)));
/// assert!(matches!(discovered, ServerAddress::AddressServer(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// Talk to this base URL directly.
    Fixed(String),
    /// Ask this URL for a newline-separated `host:port` list and use the first entry.
    AddressServer(String),
}

impl ServerAddress {
    /// A fixed base URL.
    pub fn fixed(url: impl Into<String>) -> Self {
        Self::Fixed(url.into())
    }

    /// An address server returning the list of configuration servers.
    pub fn address_server(url: impl Into<String>) -> Self {
        Self::AddressServer(url.into())
    }

    /// Resolve to a base URL without a trailing slash.
    ///
    /// The address-server lookup is bounded by `timeout`.
    pub(crate) async fn resolve(&self, http: &Client, timeout: Duration) -> Result<String> {
        match self {
            Self::Fixed(url) => Ok(url.trim_end_matches('/').to_string()),
            Self::AddressServer(url) => {
                debug!(address_server = %url, "resolving configuration server");
                let response = http.get(url).timeout(timeout).send().await?;
                let status = response.status();
                let body = response.text().await?;
                if status != StatusCode::OK {
                    return Err(NacosError::server(status.as_u16(), body));
                }
                let base = parse_server_list(&body)?;
                info!(address_server = %url, server = %base, "resolved configuration server");
                Ok(base)
            }
        }
    }
}

/// Pick the first server from an address-server response.
fn parse_server_list(body: &str) -> Result<String> {
    let entry = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| NacosError::Decode("Address server returned no servers".to_string()))?;

    let with_scheme = if entry.starts_with("http://") || entry.starts_with("https://") {
        entry.to_string()
    } else {
        format!("http://{}", entry)
    };

    let authority = with_scheme
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or_default();
    if authority.contains(':') {
        Ok(with_scheme.trim_end_matches('/').to_string())
    } else {
        Ok(format!(
            "{}:{}",
            with_scheme.trim_end_matches('/'),
            DEFAULT_SERVER_PORT
        ))
    }
}
