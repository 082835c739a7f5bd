use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use reskin_utils::error::ConfigError;

use super::{
    CliArgs, CoherenceSettings, Config, ConfigSource, Defaults, GenerationSettings, StyleSettings,
};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    style: Option<StyleSettings>,
    coherence: Option<CoherenceSettings>,
    generation: Option<GenerationSettings>,
}

/// Move `$src.$field` into `$dst.$field` when set, recording its source.
macro_rules! overlay {
    (
        $dst:ident, $src:ident, $attr:ident, $source:expr,
        $prefix:literal: $($field:ident),+ $(,)?
    ) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
                $attr.insert(format!("{}{}", $prefix, stringify!($field)), $source);
            }
        )+
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover configuration starting from a specific directory.
    ///
    /// Path-driven variant used by tests to avoid depending on the process cwd.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut source_attribution = HashMap::new();

        let mut defaults = Defaults::default();
        let mut style = StyleSettings::default();
        let mut coherence = CoherenceSettings::default();
        let mut generation = GenerationSettings::default();

        for key in [
            "viewport",
            "batch_size",
            "anchor_attempts",
            "propagation_attempts",
            "backoff_ms",
            "approval_mode",
            "hero_variants",
            "lock_ttl_seconds",
            "verbose",
            "coherence.threshold",
            "coherence.max_passes",
            "coherence.regen_attempts",
            "coherence.outlier_threshold",
            "coherence.regenerate_threshold",
            "generation.provider",
            "generation.api_key_env",
            "generation.timeout_secs",
            "generation.cost_per_image",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)?;
            let src = ConfigSource::Config;

            if let Some(file_defaults) = file.defaults {
                overlay!(defaults, file_defaults, source_attribution, src, "":
                    viewport, batch_size, state_batch_size, anchor_attempts,
                    propagation_attempts, backoff_ms, approval_mode, hero_variants,
                    lock_ttl_seconds, verbose);
            }
            if let Some(file_style) = file.style {
                overlay!(style, file_style, source_attribution, src, "style.":
                    direction, primary, secondary, accent, background, surface, text,
                    muted, border, error, success, warning, typography, spacing,
                    border_radius, shadow);
            }
            if let Some(file_coherence) = file.coherence {
                overlay!(coherence, file_coherence, source_attribution, src, "coherence.":
                    threshold, max_passes, regen_attempts, outlier_threshold,
                    regenerate_threshold);
            }
            if let Some(file_generation) = file.generation {
                overlay!(generation, file_generation, source_attribution, src, "generation.":
                    provider, endpoint, api_key_env, model, timeout_secs, budget,
                    cost_per_image, failed_call_cost);
            }
        }

        // Environment overrides the file for the call budget.
        if let Ok(raw) = env::var("RESKIN_GENERATION_BUDGET")
            && !raw.trim().is_empty()
        {
            let budget = raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                key: "RESKIN_GENERATION_BUDGET".to_string(),
                value: raw.clone(),
            })?;
            generation.budget = Some(budget);
            source_attribution.insert("generation.budget".to_string(), ConfigSource::Cli);
        }

        let cli = ConfigSource::Cli;
        let cli_defaults = Defaults {
            viewport: cli_args.viewport.clone(),
            batch_size: cli_args.batch_size,
            state_batch_size: None,
            anchor_attempts: None,
            propagation_attempts: None,
            backoff_ms: None,
            approval_mode: cli_args.approval_mode,
            hero_variants: None,
            lock_ttl_seconds: None,
            verbose: cli_args.verbose,
        };
        overlay!(defaults, cli_defaults, source_attribution, cli, "":
            viewport, batch_size, approval_mode, verbose);

        let cli_coherence = CoherenceSettings {
            threshold: cli_args.threshold,
            max_passes: cli_args.max_passes,
            regen_attempts: None,
            outlier_threshold: None,
            regenerate_threshold: None,
        };
        overlay!(coherence, cli_coherence, source_attribution, cli, "coherence.":
            threshold, max_passes);

        if let Some(budget) = cli_args.budget {
            generation.budget = Some(budget);
            source_attribution.insert("generation.budget".to_string(), cli);
        }
        if cli_args.dry_run {
            generation.provider = Some("stub".to_string());
            source_attribution.insert("generation.provider".to_string(), cli);
        }

        let config = Self {
            defaults,
            style,
            coherence,
            generation,
            source_attribution,
            config_path,
        };

        config.validate()?;
        Ok(config)
    }

    /// Walk up from `start_dir` looking for `.reskin/config.toml`, stopping at a
    /// repository root marker (.git, .hg, .svn) or the filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(".reskin").join("config.toml");
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TomlConfig::default()),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file {}: {e}",
                    path.display()
                ));
            }
        };

        toml::from_str(&content).map_err(|e| {
            anyhow::Error::from(ConfigError::InvalidFile(format!("{}: {e}", path.display())))
        })
    }
}
