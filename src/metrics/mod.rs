//! Built-in metrics for the watch loop.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Probe attempts, failures and durations
//! - Detected changes and delivered notifications
//! - Credential renewal failures
//! - Time since the last delivered change
//!
//! # Examples
//!
//! ```rust,no_run
//! use nacos_watch::prelude::*;
//! use nacos_watch::metrics::WatchMetrics;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let client = NacosClient::builder()
//!     .with_server_addr("http://127.0.0.1:8848")
//!     .with_metrics(WatchMetrics::new(global::meter("my-app")))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod watch_metrics;

pub use watch_metrics::WatchMetrics;
