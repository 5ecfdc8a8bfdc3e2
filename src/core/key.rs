//! Identity of a configuration entry.

use std::fmt;

/// Group used when the caller does not pick one.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// A (namespace, group, data id) tuple naming one configuration entry.
///
/// # Examples
///
/// ```rust
/// use nacos_watch::core::ConfigKey;
///
/// let key = ConfigKey::new("pay-dev", "DEFAULT_GROUP", "test");
/// assert_eq!(key.to_string(), "pay-dev/DEFAULT_GROUP/test");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    /// Namespace (tenant) id; empty for the public namespace
    pub namespace: String,
    /// Group name
    pub group: String,
    /// Entry id
    pub data_id: String,
}

impl ConfigKey {
    /// Create a key from its three parts.
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        data_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            data_id: data_id.into(),
        }
    }

    /// Key in `DEFAULT_GROUP`.
    pub fn in_default_group(namespace: impl Into<String>, data_id: impl Into<String>) -> Self {
        Self::new(namespace, DEFAULT_GROUP, data_id)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.group, self.data_id)
    }
}
