//! Palette derivation and the style configuration.
//!
//! Primary, background and text colors are mandatory; every other palette entry
//! is derived by mixing those three unless configured explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use reskin_config::{Config, StyleSettings};
use reskin_utils::error::ConfigError;
use reskin_utils::types::Viewport;

use crate::anchors::Anchor;

pub const DEFAULT_DIRECTION: &str = "modern, clean product design with consistent visual language";
pub const DEFAULT_TYPOGRAPHY: &str = "Inter, system-ui; scale 1.25";
pub const DEFAULT_SPACING: [u32; 7] = [4, 8, 12, 16, 24, 32, 48];
pub const DEFAULT_BORDER_RADIUS: &str = "md";
pub const DEFAULT_SHADOW: &str = "soft";

const DEFAULT_ERROR: Rgb = Rgb(0xDC, 0x26, 0x26);
const DEFAULT_SUCCESS: Rgb = Rgb(0x16, 0xA3, 0x4A);
const DEFAULT_WARNING: Rgb = Rgb(0xD9, 0x77, 0x06);

/// 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse `#RRGGBB` or `#RGB`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let hex = value.trim().strip_prefix('#')?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Self(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Move `amount` (0..=1) of the way toward `other`.
    #[must_use]
    pub fn mix(self, other: Rgb, amount: f64) -> Rgb {
        let lerp = |a: u8, b: u8| {
            let v = f64::from(a) + (f64::from(b) - f64::from(a)) * amount;
            v.round().clamp(0.0, 255.0) as u8
        };
        Rgb(lerp(self.0, other.0), lerp(self.1, other.1), lerp(self.2, other.2))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub surface: String,
    pub text: String,
    pub muted: String,
    pub border: String,
    pub error: String,
    pub success: String,
    pub warning: String,
}

impl Palette {
    /// Build the full palette from `[style]` settings.
    ///
    /// # Errors
    ///
    /// `MissingRequired` when primary, background or text is unset, and
    /// `InvalidValue` for any entry that is not a hex color.
    pub fn from_settings(style: &StyleSettings) -> Result<Self, ConfigError> {
        let required = |key: &str, value: &Option<String>| -> Result<Rgb, ConfigError> {
            let raw = value
                .as_deref()
                .ok_or_else(|| ConfigError::MissingRequired(format!("style.{key}")))?;
            parse_color(key, raw)
        };
        let primary = required("primary", &style.primary)?;
        let background = required("background", &style.background)?;
        let text = required("text", &style.text)?;

        let pick = |key: &str, value: &Option<String>, derived: Rgb| match value.as_deref() {
            Some(raw) => parse_color(key, raw).map(|c| c.to_string()),
            None => Ok(derived.to_string()),
        };

        Ok(Self {
            primary: primary.to_string(),
            secondary: pick("secondary", &style.secondary, primary.mix(text, 0.30))?,
            accent: pick("accent", &style.accent, primary.mix(background, 0.40))?,
            background: background.to_string(),
            surface: pick("surface", &style.surface, background.mix(text, 0.04))?,
            text: text.to_string(),
            muted: pick("muted", &style.muted, text.mix(background, 0.45))?,
            border: pick("border", &style.border, text.mix(background, 0.85))?,
            error: pick("error", &style.error, DEFAULT_ERROR)?,
            success: pick("success", &style.success, DEFAULT_SUCCESS)?,
            warning: pick("warning", &style.warning, DEFAULT_WARNING)?,
        })
    }

    /// `primary #2563EB, secondary #...` in a fixed order, for prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        [
            ("primary", &self.primary),
            ("secondary", &self.secondary),
            ("accent", &self.accent),
            ("background", &self.background),
            ("surface", &self.surface),
            ("text", &self.text),
            ("muted", &self.muted),
            ("border", &self.border),
            ("error", &self.error),
            ("success", &self.success),
            ("warning", &self.warning),
        ]
        .iter()
        .map(|(name, hex)| format!("{name} {hex}"))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

fn parse_color(key: &str, raw: &str) -> Result<Rgb, ConfigError> {
    Rgb::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
        key: format!("style.{key}"),
        value: raw.to_string(),
    })
}

/// Style inputs every prompt is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleContext {
    pub direction: String,
    pub palette: Palette,
    pub typography: String,
    pub spacing: Vec<u32>,
    pub border_radius: String,
    pub shadow: String,
}

impl StyleContext {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let style = &config.style;
        Ok(Self {
            direction: style
                .direction
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DIRECTION.to_string()),
            palette: Palette::from_settings(style)?,
            typography: style
                .typography
                .clone()
                .unwrap_or_else(|| DEFAULT_TYPOGRAPHY.to_string()),
            spacing: style.spacing.clone().unwrap_or_else(|| DEFAULT_SPACING.to_vec()),
            border_radius: style
                .border_radius
                .clone()
                .unwrap_or_else(|| DEFAULT_BORDER_RADIUS.to_string()),
            shadow: style.shadow.clone().unwrap_or_else(|| DEFAULT_SHADOW.to_string()),
        })
    }

    /// One-line constraint naming the palette and the style direction.
    #[must_use]
    pub fn constraint_line(&self) -> String {
        format!(
            "Use only these colors: {}. Keep the {} style exactly.",
            self.palette.describe(),
            self.direction
        )
    }
}

impl From<&StyleConfig> for StyleContext {
    fn from(config: &StyleConfig) -> Self {
        Self {
            direction: config.direction.clone(),
            palette: config.palette.clone(),
            typography: config.typography.clone(),
            spacing: config.spacing.clone(),
            border_radius: config.border_radius.clone(),
            shadow: config.shadow.clone(),
        }
    }
}

/// Written once to `style-config.json` when anchoring completes; read-only after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    pub generated_at: DateTime<Utc>,
    pub viewport: Viewport,
    pub direction: String,
    pub palette: Palette,
    pub typography: String,
    pub spacing: Vec<u32>,
    pub border_radius: String,
    pub shadow: String,
    pub anchors: Vec<Anchor>,
}

impl StyleConfig {
    #[must_use]
    pub fn new(style: &StyleContext, viewport: Viewport, anchors: Vec<Anchor>) -> Self {
        Self {
            generated_at: Utc::now(),
            viewport,
            direction: style.direction.clone(),
            palette: style.palette.clone(),
            typography: style.typography.clone(),
            spacing: style.spacing.clone(),
            border_radius: style.border_radius.clone(),
            shadow: style.shadow.clone(),
            anchors,
        }
    }
}
