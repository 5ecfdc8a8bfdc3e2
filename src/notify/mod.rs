//! Change notification: the per-watch background loop and its handle.
//!
//! A watch fetches its entry once, then repeatedly long-polls for changes and
//! delivers each new content to the registered callback.

pub mod handle;
pub mod scheduler;

pub use handle::{WatchHandle, WatchSnapshot};
pub use scheduler::{DEFAULT_POLL_INTERVAL, WatchCallback, WatchOptions, spawn_watch};
