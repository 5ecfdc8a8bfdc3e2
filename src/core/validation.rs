//! Settings validation support.

use crate::error::ValidationError;

/// Trait for validating settings before a client is built from them.
///
/// # Examples
///
/// ```rust
/// use nacos_watch::core::{ClientSettings, Validate};
///
/// let settings = ClientSettings {
///     server_addr: Some("http://127.0.0.1:8848".to_string()),
///     username: Some("nacos".to_string()),
///     ..ClientSettings::default()
/// };
///
/// // A username without a password is rejected.
/// assert!(settings.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
