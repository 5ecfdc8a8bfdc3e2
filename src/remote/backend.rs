//! The remote operations a watch is driven by.

use super::ProbeOutcome;
use crate::core::{ConfigKey, Fingerprint};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for configuration backends a watch can run against.
///
/// [`NacosClient`](crate::core::NacosClient) is the HTTP implementation.
/// Implement this trait to drive watches from another store or from a
/// scripted fake in tests.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Fetch the current content of `key`.
    async fn fetch(&self, key: &ConfigKey) -> Result<String>;

    /// Ask whether `key` changed away from `fingerprint`, waiting up to the
    /// backend's long-poll hold time.
    async fn probe(&self, key: &ConfigKey, fingerprint: &Fingerprint) -> Result<ProbeOutcome>;

    /// Renew credentials whose lifetime ran out.
    ///
    /// Called when the renewal deadline fires. Several watches may share the
    /// same credentials, so a renewal already done by another caller counts.
    ///
    /// Backends without expiring credentials keep the default no-op.
    async fn renew_credentials(&self) -> Result<()> {
        Ok(())
    }

    /// Time until credentials need renewing, or `None` if they never expire.
    async fn credentials_valid_for(&self) -> Option<Duration> {
        None
    }

    /// Human-readable name for logging.
    fn name(&self) -> String;
}
