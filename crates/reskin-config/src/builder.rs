use std::collections::HashMap;

use reskin_utils::error::ConfigError;

use super::{
    ApprovalMode, CoherenceSettings, Config, ConfigSource, Defaults, GenerationSettings,
    StyleSettings,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use reskin_config::{ApprovalMode, Config};
    ///
    /// let config = Config::builder()
    ///     .viewport("1280x800")
    ///     .batch_size(3)
    ///     .approval_mode(ApprovalMode::Auto)
    ///     .provider("stub")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.batch_size(), 3);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent construction of a `Config` without files or environment.
///
/// Values set here are attributed to `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    defaults: Defaults,
    style: StyleSettings,
    coherence: CoherenceSettings,
    generation: GenerationSettings,
    touched: Vec<&'static str>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(mut self, key: &'static str) -> Self {
        self.touched.push(key);
        self
    }

    #[must_use]
    pub fn viewport(mut self, viewport: impl Into<String>) -> Self {
        self.defaults.viewport = Some(viewport.into());
        self.touch("viewport")
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.defaults.batch_size = Some(size);
        self.touch("batch_size")
    }

    #[must_use]
    pub fn state_batch_size(mut self, size: usize) -> Self {
        self.defaults.state_batch_size = Some(size);
        self.touch("state_batch_size")
    }

    #[must_use]
    pub fn anchor_attempts(mut self, attempts: u32) -> Self {
        self.defaults.anchor_attempts = Some(attempts);
        self.touch("anchor_attempts")
    }

    #[must_use]
    pub fn propagation_attempts(mut self, attempts: u32) -> Self {
        self.defaults.propagation_attempts = Some(attempts);
        self.touch("propagation_attempts")
    }

    #[must_use]
    pub fn backoff_ms(mut self, ms: u64) -> Self {
        self.defaults.backoff_ms = Some(ms);
        self.touch("backoff_ms")
    }

    #[must_use]
    pub fn approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.defaults.approval_mode = Some(mode);
        self.touch("approval_mode")
    }

    #[must_use]
    pub fn hero_variants(mut self, n: u32) -> Self {
        self.defaults.hero_variants = Some(n);
        self.touch("hero_variants")
    }

    #[must_use]
    pub fn style_direction(mut self, direction: impl Into<String>) -> Self {
        self.style.direction = Some(direction.into());
        self.touch("style.direction")
    }

    /// Set the three mandatory palette colors.
    #[must_use]
    pub fn palette(
        mut self,
        primary: impl Into<String>,
        background: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.style.primary = Some(primary.into());
        self.style.background = Some(background.into());
        self.style.text = Some(text.into());
        self.touch("style.primary")
            .touch("style.background")
            .touch("style.text")
    }

    #[must_use]
    pub fn style(mut self, style: StyleSettings) -> Self {
        self.style = style;
        self.touch("style")
    }

    #[must_use]
    pub fn coherence_threshold(mut self, threshold: f64) -> Self {
        self.coherence.threshold = Some(threshold);
        self.touch("coherence.threshold")
    }

    #[must_use]
    pub fn max_passes(mut self, passes: u32) -> Self {
        self.coherence.max_passes = Some(passes);
        self.touch("coherence.max_passes")
    }

    #[must_use]
    pub fn regen_attempts(mut self, attempts: u32) -> Self {
        self.coherence.regen_attempts = Some(attempts);
        self.touch("coherence.regen_attempts")
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.generation.provider = Some(provider.into());
        self.touch("generation.provider")
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.generation.endpoint = Some(endpoint.into());
        self.touch("generation.endpoint")
    }

    #[must_use]
    pub fn budget(mut self, calls: u32) -> Self {
        self.generation.budget = Some(calls);
        self.touch("generation.budget")
    }

    #[must_use]
    pub fn cost_per_image(mut self, cost: f64) -> Self {
        self.generation.cost_per_image = Some(cost);
        self.touch("generation.cost_per_image")
    }

    #[must_use]
    pub fn failed_call_cost(mut self, cost: f64) -> Self {
        self.generation.failed_call_cost = Some(cost);
        self.touch("generation.failed_call_cost")
    }

    /// Build and validate.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution: HashMap<String, ConfigSource> = HashMap::new();
        for key in self.touched {
            source_attribution.insert(key.to_string(), ConfigSource::Programmatic);
        }

        let config = Config {
            defaults: self.defaults,
            style: self.style,
            coherence: self.coherence,
            generation: self.generation,
            source_attribution,
            config_path: None,
        };
        config.validate()?;
        Ok(config)
    }
}
