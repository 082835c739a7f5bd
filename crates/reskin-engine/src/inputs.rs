//! Capture and audit documents produced outside the pipeline.
//!
//! Both are JSON. Capture lists screens in order with the path of each captured
//! image; audit maps screen ids to improvement strings plus a few global strings.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use reskin_utils::error::ReskinError;

/// Improvements injected into one screen prompt
pub const MAX_IMPROVEMENTS: usize = 5;

/// Global improvements take at most this many of the slots
pub const MAX_GLOBAL_IMPROVEMENTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedScreen {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub flow: String,
    /// Captured image; absolute after import
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub screens: Vec<CapturedScreen>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDocument {
    /// Improvements per screen id, highest priority first
    #[serde(default)]
    pub screens: BTreeMap<String, Vec<String>>,
    /// Improvements that apply across screens
    #[serde(default)]
    pub global: Vec<String>,
}

fn input_error(document: &str, reason: impl Into<String>) -> ReskinError {
    ReskinError::Input {
        document: document.to_string(),
        reason: reason.into(),
    }
}

fn is_valid_screen_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl CaptureDocument {
    /// Parse and check a capture document, resolving relative image paths
    /// against `base_dir`.
    pub fn parse(content: &str, base_dir: &Utf8Path) -> Result<Self, ReskinError> {
        let mut doc: Self = serde_json::from_str(content)
            .map_err(|e| input_error("capture", format!("invalid JSON: {e}")))?;

        if doc.screens.is_empty() {
            return Err(input_error("capture", "no screens listed"));
        }

        let mut seen = HashSet::new();
        for screen in &mut doc.screens {
            if !is_valid_screen_id(&screen.id) {
                return Err(input_error(
                    "capture",
                    format!(
                        "screen id '{}' must use only letters, digits, '-', '_' or '.'",
                        screen.id
                    ),
                ));
            }
            if !seen.insert(screen.id.clone()) {
                return Err(input_error("capture", format!("duplicate screen id '{}'", screen.id)));
            }

            let path = Utf8PathBuf::from(&screen.source_path);
            let resolved = if path.is_absolute() { path } else { base_dir.join(path) };
            if !resolved.is_file() {
                return Err(input_error(
                    "capture",
                    format!("screen '{}' image not found at {resolved}", screen.id),
                ));
            }
            screen.source_path = resolved.to_string();
        }
        Ok(doc)
    }

    pub fn load(path: &Utf8Path) -> Result<Option<Self>, ReskinError> {
        load_json(path, "capture")
    }
}

impl AuditDocument {
    /// Parse an audit document, promoting strings that recur on two or more
    /// screens to globals and de-duplicating per-screen lists.
    pub fn parse(content: &str) -> Result<Self, ReskinError> {
        let doc: Self = serde_json::from_str(content)
            .map_err(|e| input_error("audit", format!("invalid JSON: {e}")))?;
        Ok(doc.normalized())
    }

    pub fn load(path: &Utf8Path) -> Result<Option<Self>, ReskinError> {
        load_json(path, "audit")
    }

    fn normalized(self) -> Self {
        let clean = |s: &String| s.trim().to_string();

        let mut global: Vec<String> = Vec::new();
        for g in self.global.iter().map(clean).filter(|s| !s.is_empty()) {
            if !global.contains(&g) {
                global.push(g);
            }
        }

        let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();
        let mut first_seen: Vec<String> = Vec::new();
        for items in self.screens.values() {
            let unique: HashSet<String> = items.iter().map(clean).collect();
            for item in items.iter().map(clean) {
                if unique.contains(&item) && !first_seen.contains(&item) {
                    first_seen.push(item.clone());
                }
            }
            for item in unique {
                *occurrences.entry(item).or_default() += 1;
            }
        }
        for item in first_seen {
            let repeated = occurrences.get(&item).copied().unwrap_or(0) >= 2;
            if !item.is_empty() && repeated && !global.contains(&item) {
                global.push(item);
            }
        }

        let screens = self
            .screens
            .iter()
            .map(|(id, items)| {
                let mut kept: Vec<String> = Vec::new();
                for item in items.iter().map(clean) {
                    if !item.is_empty() && !global.contains(&item) && !kept.contains(&item) {
                        kept.push(item);
                    }
                }
                (id.clone(), kept)
            })
            .collect();

        Self { screens, global }
    }

    /// Prompt injections for one screen: up to two globals first, then the
    /// screen's own strings, five at most.
    #[must_use]
    pub fn improvements_for(&self, screen_id: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .global
            .iter()
            .take(MAX_GLOBAL_IMPROVEMENTS)
            .cloned()
            .collect();
        if let Some(own) = self.screens.get(screen_id) {
            out.extend(own.iter().cloned());
        }
        out.truncate(MAX_IMPROVEMENTS);
        out
    }
}

fn load_json<T: serde::de::DeserializeOwned>(
    path: &Utf8Path,
    document: &str,
) -> Result<Option<T>, ReskinError> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| input_error(document, format!("{path}: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ReskinError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_capture_parse_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(base.join("home.png"), b"png").unwrap();

        let doc = CaptureDocument::parse(
            r#"{"screens": [{"id": "home", "name": "Home", "source_path": "home.png"}]}"#,
            &base,
        )
        .unwrap();
        assert_eq!(doc.screens[0].source_path, base.join("home.png").to_string());
        assert_eq!(doc.screens[0].flow, "");
    }

    #[test]
    fn test_capture_rejects_bad_documents() {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(base.join("a.png"), b"png").unwrap();

        let missing = CaptureDocument::parse(
            r#"{"screens": [{"id": "a", "name": "A", "source_path": "nope.png"}]}"#,
            &base,
        );
        assert!(missing.unwrap_err().to_string().contains("not found"));

        let dup = CaptureDocument::parse(
            r#"{"screens": [
                {"id": "a", "name": "A", "source_path": "a.png"},
                {"id": "a", "name": "A2", "source_path": "a.png"}
            ]}"#,
            &base,
        );
        assert!(dup.unwrap_err().to_string().contains("duplicate"));

        let bad_id = CaptureDocument::parse(
            r#"{"screens": [{"id": "../etc", "name": "A", "source_path": "a.png"}]}"#,
            &base,
        );
        assert!(bad_id.is_err());

        assert!(CaptureDocument::parse(r#"{"screens": []}"#, &base).is_err());
    }

    #[test]
    fn test_audit_promotes_recurring_strings() {
        let audit = AuditDocument::parse(
            r#"{
                "screens": {
                    "home": ["Increase contrast", "Shorten hero copy"],
                    "list": ["Increase contrast", "Add row hover state"]
                },
                "global": ["Use 8px grid"]
            }"#,
        )
        .unwrap();
        assert_eq!(audit.global, vec!["Use 8px grid", "Increase contrast"]);
        assert_eq!(audit.screens["home"], vec!["Shorten hero copy"]);
    }

    #[test]
    fn test_improvements_cap_and_order() {
        let audit = AuditDocument {
            screens: BTreeMap::from([(
                "home".to_string(),
                (1..=6).map(|i| format!("screen {i}")).collect(),
            )]),
            global: vec!["g1".into(), "g2".into(), "g3".into()],
        };
        let picked = audit.improvements_for("home");
        assert_eq!(picked, vec!["g1", "g2", "screen 1", "screen 2", "screen 3"]);
        assert_eq!(audit.improvements_for("unknown"), vec!["g1", "g2"]);
    }
}
