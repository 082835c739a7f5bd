//! Credential masking for log lines and user-facing error text.
//!
//! Provider error bodies and transport errors can echo request headers or URLs;
//! everything that leaves the process through tracing or `display_for_user` is
//! passed through [`redact_credentials`] first.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s]+:[^@\s]+@").unwrap());

static BEARER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+").unwrap());

static KEY_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)((?:api[_-]?key|x-api-key|token|secret)["']?\s*[:=]\s*["']?)[^\s"',&]+"#)
        .unwrap()
});

// Long opaque strings that look like keys.
static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_-])[A-Za-z0-9_-]{32,}(?:[^A-Za-z0-9_-]|$)").unwrap()
});

/// Mask credentials embedded in free text.
#[must_use]
pub fn redact_credentials(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    let redacted = BEARER_TOKEN.replace_all(&redacted, "$1[REDACTED]");
    let redacted = KEY_ASSIGNMENT.replace_all(&redacted, "$1[REDACTED]");
    let redacted = POTENTIAL_KEY.replace_all(&redacted, |caps: &regex::Captures<'_>| {
        let matched = &caps[0];
        let lead = matched
            .chars()
            .next()
            .filter(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'));
        let trail = matched
            .chars()
            .last()
            .filter(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'));
        format!(
            "{}[REDACTED_KEY]{}",
            lead.map(String::from).unwrap_or_default(),
            trail.map(String::from).unwrap_or_default()
        )
    });
    redacted.into_owned()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_long_keys_never_survive(
            prefix in "[a-z ]{0,20}",
            key in "[A-Za-z0-9]{32,48}",
            suffix in "[a-z ]{0,20}",
        ) {
            let message = format!("{prefix} {key} {suffix}");
            let out = redact_credentials(&message);
            prop_assert!(!out.contains(&key));
        }
    }
}
