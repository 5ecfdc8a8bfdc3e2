//! Client settings loaded from files and environment variables.

use crate::core::Validate;
use crate::error::{NacosError, Result, ValidationError};
use crate::remote::Separator;
use config::{Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Settings a [`NacosClient`](crate::core::NacosClient) can be built from.
///
/// Every field has a default, so a file or environment only needs to carry
/// what differs.
///
/// # Examples
///
/// ```rust,no_run
/// use nacos_watch::prelude::*;
/// use std::path::Path;
///
/// # fn example() -> Result<()> {
/// // NACOS_SERVER_ADDR=http://127.0.0.1:8848 NACOS_USERNAME=nacos NACOS_PASSWORD=nacos
/// let settings = ClientSettings::load(Some(Path::new("config/nacos.yaml")), "NACOS")?;
/// let client = NacosClientBuilder::from_settings(&settings)?.build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Fixed server base URL
    pub server_addr: Option<String>,
    /// Address server URL (alternative to `server_addr`)
    pub address_server: Option<String>,
    /// Token auth user
    pub username: Option<String>,
    /// Token auth password
    pub password: Option<String>,
    /// Signature auth access key id
    pub access_key: Option<String>,
    /// Signature auth secret
    pub secret_key: Option<String>,
    /// Seconds between change probes
    pub poll_interval_secs: u64,
    /// Server-side hold advertised on each probe, in milliseconds
    pub long_poll_timeout_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Seconds subtracted from the server token TTL
    pub token_safety_margin_secs: u64,
    /// Listen request separator style
    pub separator: Separator,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_addr: None,
            address_server: None,
            username: None,
            password: None,
            access_key: None,
            secret_key: None,
            poll_interval_secs: 10,
            long_poll_timeout_ms: 3000,
            request_timeout_secs: 10,
            token_safety_margin_secs: 600,
            separator: Separator::Control,
        }
    }
}

impl ClientSettings {
    /// Load settings from an optional file, overridden by `<PREFIX>_*` environment variables.
    ///
    /// Supported file formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json).
    ///
    /// # Errors
    ///
    /// Returns [`NacosError::InvalidConfig`] if the file is missing or
    /// unparseable, or if the merged settings fail validation.
    pub fn load(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            validate_extension(path)?;
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .try_parsing(true),
        );

        let settings: ClientSettings = builder
            .build()
            .map_err(|e| NacosError::InvalidConfig(format!("Failed to load settings: {}", e)))?
            .try_deserialize()
            .map_err(|e| {
                NacosError::InvalidConfig(format!("Failed to deserialize settings: {}", e))
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Long-poll hold as a `Duration`.
    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token safety margin as a `Duration`.
    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }
}

impl Validate for ClientSettings {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        match (&self.server_addr, &self.address_server) {
            (None, None) => errors.push(ValidationError::custom(
                "one of server_addr or address_server is required",
            )),
            (Some(_), Some(_)) => errors.push(ValidationError::custom(
                "server_addr and address_server are mutually exclusive",
            )),
            _ => {}
        }

        let token = pair_present(&self.username, &self.password, "username", "password", &mut errors);
        let signature = pair_present(
            &self.access_key,
            &self.secret_key,
            "access_key",
            "secret_key",
            &mut errors,
        );
        if token && signature {
            errors.push(ValidationError::custom(
                "token auth and signature auth are mutually exclusive",
            ));
        }

        if self.poll_interval_secs == 0 {
            errors.push(ValidationError::invalid_field(
                "poll_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.long_poll_timeout_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "long_poll_timeout_ms",
                "must be greater than 0",
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Both fields set and non-empty -> true; neither -> false; anything else is an error.
fn pair_present(
    first: &Option<String>,
    second: &Option<String>,
    first_name: &str,
    second_name: &str,
    errors: &mut Vec<ValidationError>,
) -> bool {
    let first_set = first.as_deref().is_some_and(|v| !v.is_empty());
    let second_set = second.as_deref().is_some_and(|v| !v.is_empty());
    match (first_set, second_set) {
        (true, true) => true,
        (false, false) => false,
        (true, false) => {
            errors.push(ValidationError::invalid_field(
                second_name,
                format!("required when {} is set", first_name),
            ));
            false
        }
        (false, true) => {
            errors.push(ValidationError::invalid_field(
                first_name,
                format!("required when {} is set", second_name),
            ));
            false
        }
    }
}

fn validate_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            NacosError::InvalidConfig(format!(
                "Unable to determine file format for: {}",
                path.display()
            ))
        })?;

    match extension {
        "yaml" | "yml" | "toml" | "json" => Ok(()),
        _ => Err(NacosError::InvalidConfig(format!(
            "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
            extension
        ))),
    }
}
