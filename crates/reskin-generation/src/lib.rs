//! Image-generation backends for reskin
//!
//! Every provider implements [`GenerationBackend`], so the engines drive any
//! service (or the offline stub) without knowing its wire format. Use
//! [`from_config`] to build the backend named by the `[generation]` section.

mod budgeted_backend;
mod http_backend;
mod http_client;
mod stub_backend;
mod types;

use std::sync::Arc;

pub use budgeted_backend::BudgetedBackend;
pub use http_backend::{HttpImageBackend, from_data_uri, to_data_uri};
pub use reskin_utils::error::GenerationError;
pub use stub_backend::{STUB_IMAGE_BYTES, StubBackend};
pub use types::{
    CostModel, EditRequest, GenerateRequest, GenerationBackend, GenerationOptions,
    GenerationOutput, ImageRef, MAX_REFERENCES,
};

use reskin_config::Config;

/// Construct the backend for a provider name, without the budget wrapper.
///
/// # Errors
///
/// Returns `GenerationError::Unsupported` for unknown providers and
/// `GenerationError::Misconfiguration` for invalid provider settings.
fn construct_backend_for_provider(
    provider: &str,
    config: &Config,
) -> Result<Arc<dyn GenerationBackend>, GenerationError> {
    match provider {
        "stub" => Ok(Arc::new(StubBackend::new(config.viewport()))),
        "http" => Ok(Arc::new(HttpImageBackend::new_from_config(config)?)),
        unknown => Err(GenerationError::Unsupported(format!(
            "Unknown generation provider '{unknown}'. Supported providers: http, stub."
        ))),
    }
}

/// Create a generation backend from configuration.
///
/// When `[generation] budget` is set the backend is wrapped in a
/// [`BudgetedBackend`].
///
/// # Errors
///
/// Returns `GenerationError::Unsupported` if the provider is unknown and
/// `GenerationError::Misconfiguration` if its settings are incomplete.
pub fn from_config(config: &Config) -> Result<Arc<dyn GenerationBackend>, GenerationError> {
    let backend = construct_backend_for_provider(config.provider(), config)?;
    match config.generation.budget {
        Some(limit) => Ok(Arc::new(BudgetedBackend::new(backend, limit))),
        None => Ok(backend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_stub_with_budget() {
        let mut config = Config::minimal_for_testing();
        config.generation.budget = Some(1);
        let backend = from_config(&config).unwrap();
        assert_eq!(backend.name(), "stub");

        let options = GenerationOptions::for_viewport(config.viewport());
        let req = GenerateRequest::new("hero", 1, options);
        assert!(backend.generate(req.clone()).await.is_ok());
        assert!(matches!(
            backend.generate(req).await,
            Err(GenerationError::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let mut config = Config::minimal_for_testing();
        config.generation.provider = Some("carrier-pigeon".to_string());
        assert!(matches!(
            from_config(&config),
            Err(GenerationError::Unsupported(_))
        ));
    }

    #[test]
    fn test_from_config_http_without_endpoint() {
        let mut config = Config::minimal_for_testing();
        config.generation.provider = Some("http".to_string());
        assert!(matches!(
            from_config(&config),
            Err(GenerationError::Misconfiguration(_))
        ));
    }
}
