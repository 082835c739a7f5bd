use std::collections::BTreeMap;

use super::{Config, ConfigSource};

impl Config {
    fn source_of(&self, key: &str) -> &'static str {
        self.source_attribution
            .get(key)
            .unwrap_or(&ConfigSource::Default)
            .as_str()
    }

    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut out = BTreeMap::new();
        let mut add = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                out.insert(key.to_string(), (value, self.source_of(key).to_string()));
            }
        };

        add("viewport", Some(self.viewport().to_string()));
        add("batch_size", Some(self.batch_size().to_string()));
        add("state_batch_size", Some(self.state_batch_size().to_string()));
        add("anchor_attempts", Some(self.anchor_attempts().to_string()));
        add(
            "propagation_attempts",
            Some(self.propagation_attempts().to_string()),
        );
        add("backoff_ms", Some(self.backoff_ms().to_string()));
        add("approval_mode", Some(self.approval_mode().to_string()));
        add("hero_variants", Some(self.hero_variants().to_string()));
        add("lock_ttl_seconds", Some(self.lock_ttl_seconds().to_string()));

        add("style.direction", self.style.direction.clone());
        add("style.primary", self.style.primary.clone());
        add("style.background", self.style.background.clone());
        add("style.text", self.style.text.clone());

        add("coherence.threshold", Some(self.coherence_threshold().to_string()));
        add("coherence.max_passes", Some(self.max_passes().to_string()));
        add("coherence.regen_attempts", Some(self.regen_attempts().to_string()));

        add("generation.provider", Some(self.provider().to_string()));
        add("generation.endpoint", self.generation.endpoint.clone());
        add("generation.api_key_env", self.generation.api_key_env.clone());
        add("generation.model", self.generation.model.clone());
        add("generation.budget", self.generation.budget.map(|b| b.to_string()));
        add(
            "generation.cost_per_image",
            Some(self.cost_per_image().to_string()),
        );

        out
    }
}
