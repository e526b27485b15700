//! Credential loading and shape validation.
//!
//! Secrets arrive through one environment variable per pool, in any of
//! the encodings deployments have used:
//! - base64 of a JSON string array
//! - a raw JSON string array
//! - a comma-separated list (optionally base64-encoded)
//!
//! Validation errors name the offending index, never the secret.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::info;

use autocast_models::Credential;

use crate::error::{DispatchError, DispatchResult};
use crate::pool::{CooldownConfig, CredentialPool};

/// Expected shape of a credential string.
#[derive(Debug, Clone)]
pub struct CredentialFormat {
    /// Prefix every secret must start with (e.g. `sk-`).
    pub required_prefix: Option<String>,
    /// Minimum secret length in characters.
    pub min_len: usize,
}

impl Default for CredentialFormat {
    fn default() -> Self {
        Self {
            required_prefix: None,
            min_len: 8,
        }
    }
}

impl CredentialFormat {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            required_prefix: Some(prefix.into()),
            ..Default::default()
        }
    }

    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    /// Check one secret; `index` is zero-based.
    pub fn validate(&self, index: usize, secret: &str) -> DispatchResult<()> {
        if let Some(prefix) = &self.required_prefix {
            if !secret.starts_with(prefix.as_str()) {
                return Err(DispatchError::configuration(format!(
                    "credential #{} does not start with required prefix '{}'",
                    index + 1,
                    prefix
                )));
            }
        }

        let len = secret.chars().count();
        if len < self.min_len {
            return Err(DispatchError::configuration(format!(
                "credential #{} is too short ({} < {} characters)",
                index + 1,
                len,
                self.min_len
            )));
        }

        if secret.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DispatchError::configuration(format!(
                "credential #{} contains whitespace or control characters",
                index + 1
            )));
        }

        Ok(())
    }
}

/// Decode a raw secret list into individual secrets.
pub fn decode_secrets(raw: &str) -> DispatchResult<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DispatchError::configuration("credential list is empty"));
    }

    if raw.starts_with('[') {
        return parse_json_list(raw);
    }

    if let Some(decoded) = decode_base64_text(raw) {
        let decoded = decoded.trim();
        if decoded.starts_with('[') {
            return parse_json_list(decoded);
        }
        return Ok(split_list(decoded));
    }

    Ok(split_list(raw))
}

/// Decode and validate a secret list.
pub fn load_credentials(raw: &str, format: &CredentialFormat) -> DispatchResult<Vec<Credential>> {
    let secrets = decode_secrets(raw)?;
    if secrets.is_empty() {
        return Err(DispatchError::configuration("credential list is empty"));
    }

    for (index, secret) in secrets.iter().enumerate() {
        format.validate(index, secret)?;
    }

    Ok(secrets.into_iter().map(Credential::new).collect())
}

/// Load and validate the secret list stored in `var`.
pub fn load_credentials_from_env(
    var: &str,
    format: &CredentialFormat,
) -> DispatchResult<Vec<Credential>> {
    let raw = std::env::var(var)
        .map_err(|_| DispatchError::configuration(format!("{} not set", var)))?;
    let credentials = load_credentials(&raw, format)
        .map_err(|e| DispatchError::configuration(format!("{}: {}", var, e)))?;

    info!(
        var = %var,
        count = credentials.len(),
        fingerprints = ?credentials.iter().map(|c| c.fingerprint()).collect::<Vec<_>>(),
        "Loaded credentials"
    );
    Ok(credentials)
}

impl CredentialPool {
    /// Build a pool from the secret list stored in `var`.
    pub fn from_env(
        name: impl Into<String>,
        var: &str,
        format: &CredentialFormat,
        cooldown: CooldownConfig,
    ) -> DispatchResult<Self> {
        let credentials = load_credentials_from_env(var, format)?;
        CredentialPool::new(name, credentials, cooldown)
    }
}

fn parse_json_list(text: &str) -> DispatchResult<Vec<String>> {
    let list: Vec<String> = serde_json::from_str(text).map_err(|e| {
        DispatchError::configuration(format!("credential list is not a JSON string array: {}", e))
    })?;
    Ok(list.into_iter().map(|s| s.trim().to_string()).collect())
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Base64-decode `text` if it yields printable UTF-8.
fn decode_base64_text(text: &str) -> Option<String> {
    let bytes = STANDARD.decode(text).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let printable = decoded
        .chars()
        .all(|c| !c.is_control() || c == '\n' || c == '\r' || c == '\t');
    printable.then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "sk-aaaaaaaaaaaaaaaaaaaa";
    const KEY_B: &str = "sk-bbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn test_decode_raw_json() {
        let raw = format!(r#"["{}", "{}"]"#, KEY_A, KEY_B);
        assert_eq!(decode_secrets(&raw).unwrap(), vec![KEY_A, KEY_B]);
    }

    #[test]
    fn test_decode_base64_json() {
        let raw = STANDARD.encode(format!(r#"["{}","{}"]"#, KEY_A, KEY_B));
        assert_eq!(decode_secrets(&raw).unwrap(), vec![KEY_A, KEY_B]);
    }

    #[test]
    fn test_decode_base64_csv() {
        let raw = STANDARD.encode(format!("{},{}", KEY_A, KEY_B));
        assert_eq!(decode_secrets(&raw).unwrap(), vec![KEY_A, KEY_B]);
    }

    #[test]
    fn test_decode_plain_csv() {
        let raw = format!(" {} , {} ,", KEY_A, KEY_B);
        assert_eq!(decode_secrets(&raw).unwrap(), vec![KEY_A, KEY_B]);
    }

    #[test]
    fn test_decode_empty_rejected() {
        assert!(decode_secrets("   ").is_err());
    }

    #[test]
    fn test_decode_bad_json_rejected() {
        let err = decode_secrets(r#"["unterminated"#).unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_prefix_enforced() {
        let format = CredentialFormat::with_prefix("sk-");
        let raw = format!(r#"["{}", "pk-cccccccccccccccccc"]"#, KEY_A);
        let err = load_credentials(&raw, &format).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("#2"));
        assert!(!msg.contains("pk-ccc"));
    }

    #[test]
    fn test_min_len_enforced() {
        let format = CredentialFormat::default().with_min_len(10);
        assert!(load_credentials("short", &format).is_err());
    }

    #[test]
    fn test_empty_json_list_rejected() {
        assert!(load_credentials("[]", &CredentialFormat::default()).is_err());
    }

    #[test]
    fn test_load_valid() {
        let format = CredentialFormat::with_prefix("sk-");
        let creds = load_credentials(&format!("{},{}", KEY_A, KEY_B), &format).unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].expose_secret(), KEY_A);
    }

    #[test]
    fn test_missing_env_var() {
        let err = load_credentials_from_env(
            "AUTOCAST_TEST_DEFINITELY_UNSET_VAR",
            &CredentialFormat::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }
}
