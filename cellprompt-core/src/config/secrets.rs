//! Secret values and log-safe rendering
//!
//! API keys are held in [`SecretString`], which never prints its value
//! through `Display` or `Debug`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A wrapper type for sensitive strings like API keys
#[derive(Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the actual value (use with caution)
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Partially redacted form for diagnostics
    pub fn partial_redact(&self) -> String {
        if self.value.is_empty() {
            return "[EMPTY]".to_string();
        }

        let len = self.value.chars().count();
        if len <= 8 {
            return "[REDACTED]".to_string();
        }

        let keep_front = if self.value.starts_with("sk-") || self.value.starts_with("pk-") {
            3
        } else {
            2
        };
        let keep_back = if keep_front == 3 { 4 } else { 2 };
        let front: String = self.value.chars().take(keep_front).collect();
        let back: String = self.value.chars().skip(len - keep_back).collect();
        format!("{}...{}", front, back)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Types that can describe themselves without leaking secrets
pub trait SafeLogging {
    fn safe_for_logging(&self) -> String;
}

const SENSITIVE_FIELD_PATTERNS: &[&str] = &[
    "api_key",
    "secret",
    "token",
    "password",
    "credential",
    "auth",
    "private",
];

/// Whether a field name looks like it holds a credential
pub fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    SENSITIVE_FIELD_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Render `value` for logs, hiding it when the field name is sensitive
pub fn redact_by_field_name(field_name: &str, value: &str) -> String {
    if is_sensitive_field(field_name) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redaction() {
        let secret = SecretString::new("sk-1234567890abcdef");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.partial_redact(), "sk-...cdef");
        assert_eq!(SecretString::new("short").partial_redact(), "[REDACTED]");
        assert_eq!(SecretString::new("").partial_redact(), "[EMPTY]");
        assert_eq!(SecretString::new("abcdefghijkl").partial_redact(), "ab...kl");
    }

    #[test]
    fn test_redact_by_field_name() {
        assert_eq!(redact_by_field_name("api_key", "sk-123"), "[REDACTED]");
        assert_eq!(redact_by_field_name("Auth_Token", "bearer-xyz"), "[REDACTED]");
        assert_eq!(redact_by_field_name("top_p", "0.9"), "0.9");
    }
}
