//! Configuration management for reskin
//!
//! Hierarchical configuration with discovery and precedence CLI > file > defaults.
//! Configuration files are TOML with `[defaults]`, `[style]`, `[coherence]` and
//! `[generation]` sections, discovered as `.reskin/config.toml` upward from the
//! working directory.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use model::*;
pub use reskin_utils::types::ConfigSource;
pub use validation::is_hex_color;

use reskin_utils::types::Viewport;

impl Config {
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.defaults
            .viewport
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.defaults.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    #[must_use]
    pub fn state_batch_size(&self) -> usize {
        self.defaults
            .state_batch_size
            .unwrap_or_else(|| self.batch_size())
    }

    #[must_use]
    pub fn anchor_attempts(&self) -> u32 {
        self.defaults.anchor_attempts.unwrap_or(DEFAULT_ANCHOR_ATTEMPTS)
    }

    #[must_use]
    pub fn propagation_attempts(&self) -> u32 {
        self.defaults
            .propagation_attempts
            .unwrap_or(DEFAULT_PROPAGATION_ATTEMPTS)
    }

    #[must_use]
    pub fn backoff_ms(&self) -> u64 {
        self.defaults.backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS)
    }

    #[must_use]
    pub fn approval_mode(&self) -> ApprovalMode {
        self.defaults.approval_mode.unwrap_or_default()
    }

    #[must_use]
    pub fn hero_variants(&self) -> u32 {
        self.defaults.hero_variants.unwrap_or(DEFAULT_HERO_VARIANTS)
    }

    #[must_use]
    pub fn lock_ttl_seconds(&self) -> u64 {
        self.defaults
            .lock_ttl_seconds
            .unwrap_or(DEFAULT_LOCK_TTL_SECONDS)
    }

    #[must_use]
    pub fn coherence_threshold(&self) -> f64 {
        self.coherence.threshold.unwrap_or(DEFAULT_COHERENCE_THRESHOLD)
    }

    #[must_use]
    pub fn max_passes(&self) -> u32 {
        self.coherence.max_passes.unwrap_or(DEFAULT_MAX_PASSES)
    }

    #[must_use]
    pub fn regen_attempts(&self) -> u32 {
        self.coherence.regen_attempts.unwrap_or(DEFAULT_REGEN_ATTEMPTS)
    }

    #[must_use]
    pub fn outlier_threshold(&self) -> f64 {
        self.coherence
            .outlier_threshold
            .unwrap_or(DEFAULT_OUTLIER_THRESHOLD)
    }

    #[must_use]
    pub fn regenerate_threshold(&self) -> f64 {
        self.coherence
            .regenerate_threshold
            .unwrap_or(DEFAULT_REGENERATE_THRESHOLD)
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        self.generation.provider.as_deref().unwrap_or("http")
    }

    #[must_use]
    pub fn cost_per_image(&self) -> f64 {
        self.generation
            .cost_per_image
            .unwrap_or(DEFAULT_COST_PER_IMAGE)
    }

    #[must_use]
    pub fn failed_call_cost(&self) -> f64 {
        self.generation
            .failed_call_cost
            .unwrap_or_else(|| self.cost_per_image())
    }

    /// Defaults plus a palette, with the stub provider and no backoff; for tests.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        let defaults = Defaults {
            backoff_ms: Some(0),
            ..Defaults::default()
        };
        let style = StyleSettings {
            primary: Some("#2563EB".to_string()),
            background: Some("#FFFFFF".to_string()),
            text: Some("#0F172A".to_string()),
            ..StyleSettings::default()
        };
        let generation = GenerationSettings {
            provider: Some("stub".to_string()),
            ..GenerationSettings::default()
        };
        Config {
            defaults,
            style,
            coherence: CoherenceSettings::default(),
            generation,
            source_attribution: std::collections::HashMap::new(),
            config_path: None,
        }
    }
}
