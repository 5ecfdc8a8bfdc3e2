//! Main client handle for the remote configuration service.

use crate::core::builder::NacosClientBuilder;
use crate::core::{ConfigKey, Fingerprint, Session};
use crate::error::Result;
use crate::notify::{WatchHandle, WatchOptions, spawn_watch};
use crate::remote::{ConfigBackend, ConfigEndpoint, LongPollListener, ProbeOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Client for fetching, publishing and watching configuration entries.
///
/// Cloning is cheap; all clones share one session and one HTTP client.
///
/// # Examples
///
/// ```rust,no_run
/// use nacos_watch::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let client = NacosClient::builder()
///     .with_server_addr("http://127.0.0.1:8848")
///     .with_token_auth("nacos", "nacos")
///     .build()?;
///
/// let key = ConfigKey::new("pay-dev", "DEFAULT_GROUP", "test");
/// client.publish(&key, "123").await?;
/// assert_eq!(client.fetch(&key).await?, "123");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NacosClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    session: Arc<Session>,
    endpoint: ConfigEndpoint,
    listener: LongPollListener,
    watch_options: WatchOptions,
}

impl NacosClient {
    pub(crate) fn new(
        session: Arc<Session>,
        endpoint: ConfigEndpoint,
        listener: LongPollListener,
        watch_options: WatchOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                session,
                endpoint,
                listener,
                watch_options,
            }),
        }
    }

    /// Create a new builder for constructing a client.
    pub fn builder() -> NacosClientBuilder {
        NacosClientBuilder::new()
    }

    /// The shared auth session.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Fetch the current content of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound`](crate::error::NacosError::NotFound) for a missing
    /// entry, or an auth, transport or server error.
    pub async fn fetch(&self, key: &ConfigKey) -> Result<String> {
        self.inner.endpoint.fetch(key).await
    }

    /// Create or overwrite `key` with `content`.
    ///
    /// # Errors
    ///
    /// Returns [`Server`](crate::error::NacosError::Server) when the server
    /// rejects the write.
    pub async fn publish(&self, key: &ConfigKey, content: &str) -> Result<()> {
        self.inner.endpoint.publish(key, content).await
    }

    /// Issue one long-poll probe for `key` against `fingerprint`.
    pub async fn probe(&self, key: &ConfigKey, fingerprint: &Fingerprint) -> Result<ProbeOutcome> {
        self.inner.listener.probe(key, fingerprint).await
    }

    /// Watch `key`, invoking `callback` with the new content after each change.
    ///
    /// Uses the poll interval configured on the builder.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial fetch; no watch is started then.
    pub async fn watch<F>(&self, key: ConfigKey, callback: F) -> Result<WatchHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        self.watch_with(key, self.inner.watch_options.clone(), callback)
            .await
    }

    /// Watch `key` with explicit loop options.
    pub async fn watch_with<F>(
        &self,
        key: ConfigKey,
        options: WatchOptions,
        callback: F,
    ) -> Result<WatchHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        spawn_watch(Arc::new(self.clone()), key, options, callback).await
    }
}

#[async_trait]
impl ConfigBackend for NacosClient {
    async fn fetch(&self, key: &ConfigKey) -> Result<String> {
        NacosClient::fetch(self, key).await
    }

    async fn probe(&self, key: &ConfigKey, fingerprint: &Fingerprint) -> Result<ProbeOutcome> {
        NacosClient::probe(self, key, fingerprint).await
    }

    async fn renew_credentials(&self) -> Result<()> {
        self.inner.session.renew_if_expired().await
    }

    async fn credentials_valid_for(&self) -> Option<Duration> {
        self.inner.session.remaining_lifetime().await
    }

    fn name(&self) -> String {
        "nacos".to_string()
    }
}

impl std::fmt::Debug for NacosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NacosClient")
            .field("auth", self.inner.session.mode())
            .field("poll_interval", &self.inner.watch_options.poll_interval)
            .finish()
    }
}
