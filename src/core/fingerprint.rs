//! Content fingerprints used to detect configuration changes.

use md5::{Digest, Md5};
use std::fmt;

/// Hex-encoded MD5 digest of a configuration entry's content.
///
/// The empty fingerprint is a valid state meaning "no known prior content";
/// it differs from the fingerprint of every piece of content, including the
/// empty string.
///
/// # Examples
///
/// ```rust
/// use nacos_watch::core::{Fingerprint, has_changed};
///
/// let before = Fingerprint::of("123");
/// let after = Fingerprint::of("456");
///
/// assert!(has_changed(&before, &after));
/// assert!(has_changed(&Fingerprint::empty(), &before));
/// assert!(!has_changed(&before, &Fingerprint::of("123")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint for "nothing observed yet".
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Compute the fingerprint of `content`.
    pub fn of(content: &str) -> Self {
        Self(hex::encode(Md5::digest(content.as_bytes())))
    }

    /// Wrap a digest received from elsewhere without recomputing it.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Whether this is the empty fingerprint.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The digest as a hex string (empty for [`Fingerprint::empty`]).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true when `new` differs from `old`.
pub fn has_changed(old: &Fingerprint, new: &Fingerprint) -> bool {
    old != new
}
