//! Error types for nacos-watch.

use std::fmt;

/// Result type alias for nacos-watch operations.
pub type Result<T> = std::result::Result<T, NacosError>;

/// Errors that can occur when talking to the configuration service.
#[derive(Debug, thiserror::Error)]
pub enum NacosError {
    /// Login exchange failed or the credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server refused the request (401/403).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested configuration entry does not exist.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// Network or IO failure before a response was read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-200 status or a non-affirmative application response.
    #[error("Server error (status {status}): {body}")]
    Server {
        /// HTTP status code of the response
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Client settings are missing or inconsistent.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The background watch task failed.
    #[error("Watch error: {0}")]
    Watch(String),
}

impl NacosError {
    /// Build a server error from a status code and raw body.
    pub fn server(status: u16, body: impl Into<String>) -> Self {
        Self::Server {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for NacosError {
    fn from(err: reqwest::Error) -> Self {
        NacosError::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for NacosError {
    fn from(err: config::ConfigError) -> Self {
        NacosError::InvalidConfig(err.to_string())
    }
}

/// Validation error for client settings.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for NacosError {
    fn from(err: ValidationError) -> Self {
        NacosError::InvalidConfig(err.to_string())
    }
}
