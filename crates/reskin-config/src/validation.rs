use reskin_utils::error::ConfigError;
use reskin_utils::types::Viewport;

use super::Config;

/// `#RGB` or `#RRGGBB`, case-insensitive.
pub fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.trim().strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
    /// Validate configuration values, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, key: &str, msg: &str| {
            if !ok {
                errors.push(format!("{key}: {msg}"));
            }
        };

        if let Some(viewport) = &self.defaults.viewport
            && let Err(e) = viewport.parse::<Viewport>()
        {
            check(false, "viewport", &e);
        }
        if let Some(size) = self.defaults.batch_size {
            check((1..=50).contains(&size), "batch_size", "must be between 1 and 50");
        }
        if let Some(size) = self.defaults.state_batch_size {
            check(
                (1..=50).contains(&size),
                "state_batch_size",
                "must be between 1 and 50",
            );
        }
        if let Some(n) = self.defaults.anchor_attempts {
            check((1..=10).contains(&n), "anchor_attempts", "must be between 1 and 10");
        }
        if let Some(n) = self.defaults.propagation_attempts {
            check(
                (1..=10).contains(&n),
                "propagation_attempts",
                "must be between 1 and 10",
            );
        }
        if let Some(ms) = self.defaults.backoff_ms {
            check(ms <= 60_000, "backoff_ms", "exceeds maximum of 60000 ms");
        }
        if let Some(n) = self.defaults.hero_variants {
            check((1..=8).contains(&n), "hero_variants", "must be between 1 and 8");
        }
        if let Some(ttl) = self.defaults.lock_ttl_seconds {
            check(
                (60..=86_400).contains(&ttl),
                "lock_ttl_seconds",
                "must be between 60 and 86400 seconds",
            );
        }

        let palette = [
            ("style.primary", &self.style.primary),
            ("style.secondary", &self.style.secondary),
            ("style.accent", &self.style.accent),
            ("style.background", &self.style.background),
            ("style.surface", &self.style.surface),
            ("style.text", &self.style.text),
            ("style.muted", &self.style.muted),
            ("style.border", &self.style.border),
            ("style.error", &self.style.error),
            ("style.success", &self.style.success),
            ("style.warning", &self.style.warning),
        ];
        for (key, value) in palette {
            if let Some(color) = value {
                check(
                    is_hex_color(color),
                    key,
                    &format!("'{color}' is not a #RRGGBB color"),
                );
            }
        }
        if let Some(spacing) = &self.style.spacing {
            check(!spacing.is_empty(), "style.spacing", "must not be empty");
            check(
                spacing.windows(2).all(|w| w[0] < w[1]),
                "style.spacing",
                "must be strictly increasing",
            );
        }

        let percent = |v: f64| (0.0..=100.0).contains(&v);
        if let Some(t) = self.coherence.threshold {
            check(percent(t), "coherence.threshold", "must be between 0 and 100");
        }
        if let Some(n) = self.coherence.max_passes {
            check(n <= 10, "coherence.max_passes", "exceeds maximum of 10");
        }
        if let Some(n) = self.coherence.regen_attempts {
            check(
                (1..=5).contains(&n),
                "coherence.regen_attempts",
                "must be between 1 and 5",
            );
        }
        let outlier = self.coherence.outlier_threshold;
        let regenerate = self.coherence.regenerate_threshold;
        if let Some(t) = outlier {
            check(percent(t), "coherence.outlier_threshold", "must be between 0 and 100");
        }
        if let Some(t) = regenerate {
            check(
                percent(t),
                "coherence.regenerate_threshold",
                "must be between 0 and 100",
            );
        }
        if let (Some(o), Some(r)) = (outlier, regenerate) {
            check(
                r >= o,
                "coherence.regenerate_threshold",
                "must not be below outlier_threshold",
            );
        }

        // A missing endpoint is reported when the http backend is constructed.
        if let Some(endpoint) = &self.generation.endpoint {
            check(
                endpoint.starts_with("http://") || endpoint.starts_with("https://"),
                "generation.endpoint",
                "must be an http(s) URL",
            );
        }
        match self.generation.provider.as_deref() {
            Some("stub") | Some("http") | None => {}
            Some(other) => check(
                false,
                "generation.provider",
                &format!("unknown provider '{other}' (expected http or stub)"),
            ),
        }
        if let Some(t) = self.generation.timeout_secs {
            check(
                (5..=600).contains(&t),
                "generation.timeout_secs",
                "must be between 5 and 600 seconds",
            );
        }
        if let Some(c) = self.generation.cost_per_image {
            check(c >= 0.0 && c.is_finite(), "generation.cost_per_image", "must be >= 0");
        }
        if let Some(c) = self.generation.failed_call_cost {
            check(c >= 0.0 && c.is_finite(), "generation.failed_call_cost", "must be >= 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }
}
