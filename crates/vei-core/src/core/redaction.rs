// crates/vei-core/src/core/redaction.rs
// ============================================================================
// Module: VEI Receipt Redaction
// Description: Scrubs personal data and secrets from receipt payloads.
// Purpose: Keep receipts shareable without leaking addresses or keys.
// Dependencies: regex, serde_json
// ============================================================================

//! ## Overview
//! Receipts store redacted copies of call arguments and results. Strings are
//! scrubbed of e-mail addresses, phone numbers, and key-like tokens; values
//! stored under secret-named object keys are replaced wholesale. Redaction
//! applies only to persisted receipts; callers always see unredacted results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Replacement for e-mail addresses.
pub const REDACTED_EMAIL: &str = "[REDACTED_EMAIL]";
/// Replacement for phone numbers.
pub const REDACTED_PHONE: &str = "[REDACTED_PHONE]";
/// Replacement for key-like tokens.
pub const REDACTED_KEY: &str = "[REDACTED_KEY]";
/// Replacement for values under secret-named keys.
pub const REDACTED_SECRET: &str = "[REDACTED]";

/// E-mail address pattern.
const EMAIL_PATTERN: &str = r"(?i)\b[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}\b";
/// North American phone number pattern.
const PHONE_PATTERN: &str = r"\b(?:\+?1[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)\d{3}[-.\s]?\d{4}\b";
/// API key and token pattern.
const KEY_PATTERN: &str = r"(?i)\b(?:sk|pk|api|token)[_\-]?[A-Za-z0-9]{8,}\b";

/// Object key fragments whose values are always secret.
const SECRET_KEY_FRAGMENTS: &[&str] =
    &["password", "secret", "token", "api_key", "apikey", "authorization", "credential"];

// ============================================================================
// SECTION: Redactor
// ============================================================================

/// Compiled redaction rules.
#[derive(Debug, Clone)]
pub struct Redactor {
    /// E-mail matcher.
    email: Regex,
    /// Phone matcher.
    phone: Regex,
    /// Key matcher.
    key: Regex,
}

impl Redactor {
    /// Compiles the redaction rules.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(EMAIL_PATTERN)?,
            phone: Regex::new(PHONE_PATTERN)?,
            key: Regex::new(KEY_PATTERN)?,
        })
    }

    /// Redacts one string.
    #[must_use]
    pub fn redact_text(&self, value: &str) -> String {
        let redacted = self.email.replace_all(value, REDACTED_EMAIL);
        let redacted = self.phone.replace_all(&redacted, REDACTED_PHONE);
        self.key.replace_all(&redacted, REDACTED_KEY).into_owned()
    }

    /// Redacts a JSON value recursively.
    #[must_use]
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.redact_text(text)),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.redact_value(item)).collect()),
            Value::Object(map) => Value::Object(self.redact_map(map)),
            other => other.clone(),
        }
    }

    /// Redacts a JSON object recursively.
    #[must_use]
    pub fn redact_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let redacted = if is_secret_key(key) && !value.is_null() {
                    Value::String(REDACTED_SECRET.to_string())
                } else {
                    self.redact_value(value)
                };
                (key.clone(), redacted)
            })
            .collect()
    }
}

/// Returns true when the key names a secret.
fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SECRET_KEY_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
