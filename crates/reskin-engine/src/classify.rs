//! Screen-type classification.
//!
//! The type picks the prompt template, the edit strength, and the coherence
//! sensitivity of a captured screen.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, IntoEnumIterator};

use crate::inputs::CapturedScreen;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ScreenType {
    Dashboard,
    List,
    Detail,
    Form,
    Settings,
    Auth,
    Landing,
    Modal,
    Empty,
    Error,
    Generic,
}

/// Keyword table, checked in order; the first hit wins.
const KEYWORDS: &[(ScreenType, &[&str])] = &[
    (
        ScreenType::Auth,
        &[
            "login", "log-in", "signin", "sign-in", "signup", "sign-up", "register", "password",
            "auth", "otp",
        ],
    ),
    (ScreenType::Error, &["error", "404", "500", "not-found", "notfound", "oops"]),
    (ScreenType::Empty, &["empty", "no-results", "zero-state", "blank"]),
    (ScreenType::Modal, &["modal", "dialog", "popup", "drawer", "sheet"]),
    (ScreenType::Settings, &["settings", "preferences", "account", "profile", "config"]),
    (ScreenType::Form, &["form", "edit", "create", "new", "checkout", "wizard", "compose"]),
    (ScreenType::Dashboard, &["dashboard", "overview", "analytics", "stats", "metrics"]),
    (ScreenType::List, &["list", "table", "index", "browse", "search", "inbox", "feed"]),
    (ScreenType::Detail, &["detail", "details", "view", "show", "item", "article"]),
    (ScreenType::Landing, &["landing", "home", "welcome", "marketing", "pricing", "about"]),
];

impl ScreenType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::List => "list",
            Self::Detail => "detail",
            Self::Form => "form",
            Self::Settings => "settings",
            Self::Auth => "auth",
            Self::Landing => "landing",
            Self::Modal => "modal",
            Self::Empty => "empty",
            Self::Error => "error",
            Self::Generic => "generic",
        }
    }

    /// Parse a capture-supplied hint (`"list"`, `"Settings"`, ...).
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim();
        Self::iter().find(|t| t.as_str().eq_ignore_ascii_case(hint))
    }

    /// Edit strength used when propagating the style onto this type.
    #[must_use]
    pub const fn strength(&self) -> f64 {
        match self {
            Self::Form | Self::Modal => 0.50,
            Self::Settings | Self::Auth => 0.55,
            Self::Dashboard | Self::List | Self::Detail | Self::Generic => 0.60,
            Self::Landing | Self::Empty | Self::Error => 0.65,
        }
    }

    /// Coherence sensitivity: deviations on high-visibility screens weigh more.
    #[must_use]
    pub const fn deviation_multiplier(&self) -> f64 {
        match self {
            Self::Landing | Self::Auth => 1.2,
            Self::Settings | Self::Modal => 0.8,
            _ => 1.0,
        }
    }
}

impl fmt::Display for ScreenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify by hint when it names a known type, else by keywords in the id,
/// name and flow.
#[must_use]
pub fn classify(screen: &CapturedScreen) -> ScreenType {
    if let Some(t) = screen.type_hint.as_deref().and_then(ScreenType::from_hint) {
        return t;
    }
    let haystack = format!("{} {} {}", screen.id, screen.name, screen.flow)
        .to_ascii_lowercase()
        .replace(['_', ' '], "-");
    let tokens: Vec<&str> = haystack.split('-').filter(|t| !t.is_empty()).collect();

    KEYWORDS
        .iter()
        .find(|(_, words)| {
            words.iter().any(|w| {
                if w.contains('-') {
                    haystack.contains(w)
                } else {
                    tokens.contains(w)
                }
            })
        })
        .map_or(ScreenType::Generic, |(t, _)| *t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(id: &str, name: &str, hint: Option<&str>) -> CapturedScreen {
        CapturedScreen {
            id: id.to_string(),
            name: name.to_string(),
            flow: String::new(),
            source_path: format!("/captures/{id}.png"),
            type_hint: hint.map(str::to_string),
        }
    }

    #[test]
    fn test_hint_wins() {
        assert_eq!(classify(&screen("orders", "Orders", Some("Detail"))), ScreenType::Detail);
        // Unknown hints fall through to keywords.
        assert_eq!(classify(&screen("orders-list", "Orders", Some("grid"))), ScreenType::List);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(classify(&screen("login", "Sign in", None)), ScreenType::Auth);
        assert_eq!(classify(&screen("search-no-results", "Search", None)), ScreenType::Empty);
        assert_eq!(classify(&screen("user_settings", "Settings", None)), ScreenType::Settings);
        assert_eq!(classify(&screen("invoice-detail", "Invoice", None)), ScreenType::Detail);
        assert_eq!(classify(&screen("main", "Overview", None)), ScreenType::Dashboard);
        assert_eq!(classify(&screen("s1", "Screen one", None)), ScreenType::Generic);
    }

    #[test]
    fn test_keywords_match_whole_tokens() {
        // "renew" contains "new" but is not a form keyword
        assert_eq!(classify(&screen("renewal", "Renewal", None)), ScreenType::Generic);
    }

    #[test]
    fn test_strengths_and_multipliers() {
        assert_eq!(ScreenType::Form.strength(), 0.50);
        assert_eq!(ScreenType::Auth.strength(), 0.55);
        assert_eq!(ScreenType::Generic.strength(), 0.60);
        assert_eq!(ScreenType::Error.strength(), 0.65);
        assert_eq!(ScreenType::Landing.deviation_multiplier(), 1.2);
        assert_eq!(ScreenType::Modal.deviation_multiplier(), 0.8);
        assert_eq!(ScreenType::List.deviation_multiplier(), 1.0);
    }
}
