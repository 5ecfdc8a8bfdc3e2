//! Core client types.

mod builder;
mod client;
mod fingerprint;
mod key;
mod session;
mod settings;
mod validation;

pub use builder::NacosClientBuilder;
pub use client::NacosClient;
pub use fingerprint::{Fingerprint, has_changed};
pub use key::{ConfigKey, DEFAULT_GROUP};
pub use session::{AuthMode, DEFAULT_TOKEN_SAFETY_MARGIN, RequestAuth, Session};
pub use settings::ClientSettings;
pub use validation::Validate;
