//! # nacos-watch
//!
//! Client and change-detection engine for a Nacos-style remote configuration service.
//!
//! ## Overview
//!
//! `nacos-watch` fetches and publishes configuration entries and keeps a
//! local copy in sync with the server:
//! - Entries are addressed by namespace, group and data id
//! - Changes are detected by comparing MD5 fingerprints through long-poll probes
//! - Token auth (login with automatic renewal) or HMAC-SHA1 request signing
//! - Each watch runs in one background task and is cancelled through its handle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nacos_watch::prelude::*;
//!
//! # async fn example() -> nacos_watch::error::Result<()> {
//! let client = NacosClient::builder()
//!     .with_server_addr("http://127.0.0.1:8848")
//!     .with_token_auth("nacos", "nacos")
//!     .build()?;
//!
//! let key = ConfigKey::new("pay-dev", "DEFAULT_GROUP", "test");
//! let handle = client
//!     .watch(key, |content| println!("config changed: {}", content))
//!     .await?;
//!
//! // Lock-free read of the latest content
//! println!("current: {}", handle.snapshot().content);
//!
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry counters and histograms for the watch loop
//!
//! ```toml
//! [dependencies]
//! nacos-watch = { version = "0.1", features = ["metrics"] }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod remote;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        AuthMode, ClientSettings, ConfigKey, Fingerprint, NacosClient, NacosClientBuilder,
        Validate,
    };
    pub use crate::error::{NacosError, Result, ValidationError};
    pub use crate::notify::{WatchHandle, WatchOptions};
    pub use crate::remote::{ConfigBackend, ProbeOutcome, ServerAddress};
}
