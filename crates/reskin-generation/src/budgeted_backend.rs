//! Budgeted backend wrapper for generation call limiting
//!
//! Wraps any `GenerationBackend` and enforces a cap on the number of calls made
//! through it during one process.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use reskin_utils::error::GenerationError;

use crate::types::{EditRequest, GenerateRequest, GenerationBackend, GenerationOutput};

/// A wrapper that enforces a limit on generation calls.
///
/// The budget tracks attempted calls, not successful ones: a failed call still
/// consumes its slot, so retry loops cannot bypass the limit.
pub struct BudgetedBackend {
    inner: Arc<dyn GenerationBackend>,
    used: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    pub fn new(inner: Arc<dyn GenerationBackend>, limit: u32) -> Self {
        debug!(limit = limit, provider = inner.name(), "Creating BudgetedBackend");
        Self {
            inner,
            used: AtomicU32::new(0),
            limit,
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.call_count())
    }

    /// Claim a slot before calling the inner backend.
    fn reserve(&self) -> Result<u32, GenerationError> {
        let current = self.used.fetch_add(1, Ordering::SeqCst);
        if current >= self.limit {
            let attempted = current + 1;
            warn!(limit = self.limit, attempted = attempted, "Generation budget exceeded");
            return Err(GenerationError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }
        Ok(current + 1)
    }

    fn log_outcome(&self, call: u32, result: &Result<GenerationOutput, GenerationError>) {
        match result {
            Ok(_) => debug!(call_count = call, limit = self.limit, "Inner backend call succeeded"),
            Err(e) => debug!(
                call_count = call,
                limit = self.limit,
                error = %e,
                "Inner backend call failed (budget slot still consumed)"
            ),
        }
    }
}

#[async_trait]
impl GenerationBackend for BudgetedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let call = self.reserve()?;
        let result = self.inner.generate(request).await;
        self.log_outcome(call, &result);
        result
    }

    async fn edit(&self, request: EditRequest) -> Result<GenerationOutput, GenerationError> {
        let call = self.reserve()?;
        let result = self.inner.edit(request).await;
        self.log_outcome(call, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub_backend::StubBackend;
    use crate::types::GenerationOptions;
    use reskin_utils::types::Viewport;

    struct AlwaysFails;

    #[async_trait]
    impl GenerationBackend for AlwaysFails {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _: GenerateRequest) -> Result<GenerationOutput, GenerationError> {
            Err(GenerationError::ProviderOutage("down".to_string()))
        }

        async fn edit(&self, _: EditRequest) -> Result<GenerationOutput, GenerationError> {
            Err(GenerationError::ProviderOutage("down".to_string()))
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest::new("hero", 1, GenerationOptions::default())
    }

    #[tokio::test]
    async fn test_budget_allows_calls_within_limit() {
        let backend = BudgetedBackend::new(Arc::new(StubBackend::new(Viewport::DESKTOP)), 2);
        assert!(backend.generate(request()).await.is_ok());
        assert!(backend.generate(request()).await.is_ok());
        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.remaining(), 0);

        match backend.generate(request()).await {
            Err(GenerationError::BudgetExceeded { limit, attempted }) => {
                assert_eq!(limit, 2);
                assert_eq!(attempted, 3);
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_calls_consume_budget() {
        let backend = BudgetedBackend::new(Arc::new(AlwaysFails), 1);
        assert!(matches!(
            backend.generate(request()).await,
            Err(GenerationError::ProviderOutage(_))
        ));
        assert!(matches!(
            backend.generate(request()).await,
            Err(GenerationError::BudgetExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_budget_blocks_everything() {
        let backend = BudgetedBackend::new(Arc::new(StubBackend::new(Viewport::DESKTOP)), 0);
        let err = backend.generate(request()).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(backend.name(), "stub");
    }
}
