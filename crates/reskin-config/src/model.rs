use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use reskin_utils::types::ConfigSource;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_ANCHOR_ATTEMPTS: u32 = 3;
pub const DEFAULT_PROPAGATION_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_HERO_VARIANTS: u32 = 3;
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 900;

pub const DEFAULT_COHERENCE_THRESHOLD: f64 = 85.0;
pub const DEFAULT_MAX_PASSES: u32 = 2;
pub const DEFAULT_REGEN_ATTEMPTS: u32 = 2;
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 30.0;
pub const DEFAULT_REGENERATE_THRESHOLD: f64 = 50.0;

pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_API_KEY_ENV: &str = "RESKIN_API_KEY";
pub const DEFAULT_COST_PER_IMAGE: f64 = 0.04;

/// How human validation gates are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Suspend at each gate until a person responds (default)
    #[default]
    Manual,
    /// Resolve gates immediately: first passing hero candidate, approve everything else
    Auto,
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown approval mode '{other}' (expected manual or auto)")),
        }
    }
}

/// Configuration for reskin operations.
///
/// Precedence: CLI arguments > config file > built-in defaults. Each effective
/// value records where it came from in `source_attribution`.
///
/// ```toml
/// [defaults]
/// viewport = "1440x900"
/// batch_size = 5
/// approval_mode = "manual"
///
/// [style]
/// direction = "calm fintech, generous whitespace"
/// primary = "#2563EB"
/// background = "#FFFFFF"
/// text = "#0F172A"
///
/// [coherence]
/// threshold = 85
/// max_passes = 2
///
/// [generation]
/// provider = "http"
/// endpoint = "https://images.example.com/v1"
/// api_key_env = "RESKIN_API_KEY"
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub style: StyleSettings,
    pub coherence: CoherenceSettings,
    pub generation: GenerationSettings,
    /// Source attribution for each setting (for status display).
    pub source_attribution: HashMap<String, ConfigSource>,
    /// The config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
}

/// Pipeline-wide defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Target viewport as `WIDTHxHEIGHT`
    pub viewport: Option<String>,
    /// Screens per propagation batch
    pub batch_size: Option<usize>,
    /// Screen×state units per state-variant batch (defaults to `batch_size`)
    pub state_batch_size: Option<usize>,
    /// Attempts per anchor slot, including pre-validation failures
    pub anchor_attempts: Option<u32>,
    /// Attempts per propagated screen or state variant
    pub propagation_attempts: Option<u32>,
    /// Base delay between retries; the n-th retry waits `backoff_ms * n`
    pub backoff_ms: Option<u64>,
    pub approval_mode: Option<ApprovalMode>,
    /// Hero candidates generated for the selection gate
    pub hero_variants: Option<u32>,
    pub lock_ttl_seconds: Option<u64>,
    pub verbose: Option<bool>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            viewport: Some("1440x900".to_string()),
            batch_size: Some(DEFAULT_BATCH_SIZE),
            state_batch_size: None,
            anchor_attempts: Some(DEFAULT_ANCHOR_ATTEMPTS),
            propagation_attempts: Some(DEFAULT_PROPAGATION_ATTEMPTS),
            backoff_ms: Some(DEFAULT_BACKOFF_MS),
            approval_mode: Some(ApprovalMode::Manual),
            hero_variants: Some(DEFAULT_HERO_VARIANTS),
            lock_ttl_seconds: Some(DEFAULT_LOCK_TTL_SECONDS),
            verbose: Some(false),
        }
    }
}

/// Style direction and palette inputs. Unset palette entries are derived.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StyleSettings {
    /// Free-text style-direction label threaded into every prompt
    pub direction: Option<String>,
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub accent: Option<String>,
    pub background: Option<String>,
    pub surface: Option<String>,
    pub text: Option<String>,
    pub muted: Option<String>,
    pub border: Option<String>,
    pub error: Option<String>,
    pub success: Option<String>,
    pub warning: Option<String>,
    pub typography: Option<String>,
    pub spacing: Option<Vec<u32>>,
    pub border_radius: Option<String>,
    pub shadow: Option<String>,
}

/// Coherence loop bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoherenceSettings {
    /// Overall score at or above which the set is converged (0-100)
    pub threshold: Option<f64>,
    /// Maximum regeneration rounds
    pub max_passes: Option<u32>,
    /// Attempts per regenerated item
    pub regen_attempts: Option<u32>,
    /// Deviation at or above which an item is an outlier
    pub outlier_threshold: Option<f64>,
    /// Deviation at or above which an outlier is regenerated
    pub regenerate_threshold: Option<f64>,
}

impl Default for CoherenceSettings {
    fn default() -> Self {
        Self {
            threshold: Some(DEFAULT_COHERENCE_THRESHOLD),
            max_passes: Some(DEFAULT_MAX_PASSES),
            regen_attempts: Some(DEFAULT_REGEN_ATTEMPTS),
            outlier_threshold: Some(DEFAULT_OUTLIER_THRESHOLD),
            regenerate_threshold: Some(DEFAULT_REGENERATE_THRESHOLD),
        }
    }
}

/// Generation service settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationSettings {
    /// `http` or `stub`
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Maximum number of generation calls per process
    pub budget: Option<u32>,
    /// Estimated cost per generated image when the service reports none
    pub cost_per_image: Option<f64>,
    /// Cost charged for a failed call (defaults to `cost_per_image`)
    pub failed_call_cost: Option<f64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: Some("http".to_string()),
            endpoint: None,
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
            model: None,
            timeout_secs: Some(DEFAULT_GENERATION_TIMEOUT_SECS),
            budget: None,
            cost_per_image: Some(DEFAULT_COST_PER_IMAGE),
            failed_call_cost: None,
        }
    }
}
