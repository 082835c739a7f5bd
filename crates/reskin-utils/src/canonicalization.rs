//! Canonical JSON emission and content fingerprints for persisted artifacts.
//!
//! Reports are emitted in JCS (RFC 8785) form so re-runs over the same state produce
//! byte-identical documents.

use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as JCS canonical JSON.
///
/// # Example
///
/// ```rust
/// use reskin_utils::canonicalization::emit_jcs;
///
/// #[derive(serde::Serialize)]
/// struct Summary { total: u32, failed: u32 }
///
/// let json = emit_jcs(&Summary { total: 3, failed: 1 }).unwrap();
/// assert_eq!(json, r#"{"failed":1,"total":3}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// BLAKE3 fingerprint of raw bytes, hex encoded.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Short fingerprint (first 16 hex chars) used for prompt identifiers in reports.
#[must_use]
pub fn short_fingerprint(text: &str) -> String {
    let full = fingerprint(text.as_bytes());
    full[..16].to_string()
}
