//! Handle returned by watch registration.

use crate::core::{ConfigKey, Fingerprint};
use crate::error::{NacosError, Result};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Latest content delivered by a watch and its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSnapshot {
    /// Entry content
    pub content: String,
    /// Fingerprint of `content`
    pub fingerprint: Fingerprint,
}

/// Handle for a running watch.
///
/// Dropping the handle detaches it: the watch keeps running for the rest of
/// the process. Call [`WatchHandle::stop`] to end it.
///
/// # Examples
///
/// ```rust,no_run
/// use nacos_watch::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let client = NacosClient::builder()
///     .with_server_addr("http://127.0.0.1:8848")
///     .build()?;
///
/// let handle = client
///     .watch(ConfigKey::new("pay-dev", "DEFAULT_GROUP", "test"), |content| {
///         println!("new content: {}", content);
///     })
///     .await?;
///
/// println!("initial content: {}", handle.snapshot().content);
/// handle.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct WatchHandle {
    key: ConfigKey,
    snapshot: Arc<ArcSwap<WatchSnapshot>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub(crate) fn new(
        key: ConfigKey,
        snapshot: Arc<ArcSwap<WatchSnapshot>>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            key,
            snapshot,
            shutdown,
            task,
        }
    }

    /// The watched entry.
    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    /// Latest content, lock-free.
    ///
    /// Starts with the content fetched at registration and follows every
    /// delivered change.
    pub fn snapshot(&self) -> Arc<WatchSnapshot> {
        self.snapshot.load_full()
    }

    /// Fingerprint of the latest delivered content.
    pub fn fingerprint(&self) -> Fingerprint {
        self.snapshot.load().fingerprint.clone()
    }

    /// Whether the background task is still alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the watch to stop without waiting for it.
    ///
    /// An in-flight probe is abandoned at its next suspension point.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the watch and wait for its task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`NacosError::Watch`] if the task panicked, e.g. inside the
    /// user callback.
    pub async fn stop(self) -> Result<()> {
        let Self {
            key,
            shutdown,
            task,
            ..
        } = self;
        let _ = shutdown.send(true);
        task.await
            .map_err(|e| NacosError::Watch(format!("watch task for {} failed: {}", key, e)))
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("key", &self.key)
            .field("fingerprint", &self.fingerprint())
            .field("running", &self.is_running())
            .finish()
    }
}
