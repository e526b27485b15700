//! API credential models.
//!
//! A credential is an opaque secret. Everything that leaves the process
//! (logs, reports, metrics labels) only ever sees the [`CredentialId`]
//! or the masked fingerprint, never the secret itself.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Maximum number of trailing characters shown in a fingerprint.
const FINGERPRINT_CHARS: usize = 6;

/// Stable identifier for a credential, derived from a hash of the secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(pub String);

impl CredentialId {
    /// Derive the identifier for a secret.
    pub fn for_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let short: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
        Self(format!("key_{}", short))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An interchangeable API credential.
///
/// Cloning is cheap; the secret is shared behind an `Arc`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: CredentialId,
    fingerprint: String,
    secret: Arc<str>,
}

impl Credential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        Self {
            id: CredentialId::for_secret(&secret),
            fingerprint: mask_secret(&secret),
            secret: Arc::from(secret),
        }
    }

    pub fn id(&self) -> &CredentialId {
        &self.id
    }

    /// Masked form safe for logs, e.g. `…abc123`.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The raw secret. Only pass this to the outbound request.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Mask a secret down to its last few characters.
///
/// Short secrets reveal proportionally less so the full value never shows.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    let visible = FINGERPRINT_CHARS.min(len / 3);
    let tail: String = secret.chars().skip(len - visible).collect();
    format!("…{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_stable_and_hides_secret() {
        let a = Credential::new("sk-test-1234567890abcdef");
        let b = Credential::new("sk-test-1234567890abcdef");
        assert_eq!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("key_"));
        assert!(!a.id().as_str().contains("abcdef"));
    }

    #[test]
    fn test_distinct_secrets_have_distinct_ids() {
        let a = Credential::new("sk-aaaaaaaaaaaa");
        let b = Credential::new("sk-bbbbbbbbbbbb");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_fingerprint_shows_tail_only() {
        let c = Credential::new("sk-test-1234567890abcdef");
        assert_eq!(c.fingerprint(), "…abcdef");
    }

    #[test]
    fn test_short_secret_mask() {
        assert_eq!(mask_secret("abc"), "…c");
        assert_eq!(mask_secret("ab"), "…");
        assert_eq!(mask_secret(""), "…");
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let c = Credential::new("sk-super-secret-value-999");
        let debug = format!("{:?}", c);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("key_"));
    }
}
