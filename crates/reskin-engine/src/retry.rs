//! Bounded retry with prompt escalation around one generation item.
//!
//! An attempt fails when the call errors or when the caller rejects the
//! output (for example a pre-validation miss). Retryable errors and rejections
//! consume an attempt and back off `backoff * attempt`; terminal errors stop
//! immediately. Every attempt is charged, successful or not.

use std::future::Future;
use std::time::Duration;

use camino::Utf8Path;
use tracing::{debug, warn};

use reskin_generation::{CostModel, GenerationError, GenerationOutput};
use reskin_utils::atomic_write::write_bytes_atomic;
use reskin_utils::logging::log_attempt_failure;
use reskin_utils::redaction::redact_credentials;

use crate::prompts::EscalationLadder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn pause_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// Why the caller turned down a generated output.
pub trait Rejection {
    fn reason(&self) -> String;

    /// Phrases appended to the next attempt's prompt.
    fn fixes(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_retryable(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub enum RetryFailure<R> {
    Generation(GenerationError),
    Rejected(R),
}

impl<R: Rejection> RetryFailure<R> {
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Generation(e) => redact_credentials(&e.to_string()),
            Self::Rejected(r) => r.reason(),
        }
    }

    /// Terminal generation errors stop the whole phase; everything else is a
    /// per-item failure.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Generation(e) => !e.is_retryable(),
            Self::Rejected(r) => !r.is_retryable(),
        }
    }
}

/// What the attempts of one item cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptLog {
    pub attempts: u32,
    pub cost: f64,
    pub last_prompt: String,
    pub errors: Vec<String>,
}

/// Drive `call` until `accept` takes its output, the attempts run out, or a
/// terminal error occurs.
pub async fn call_with_retry<T, R, F, Fut, A>(
    item: &str,
    policy: &RetryPolicy,
    costs: &CostModel,
    ladder: &mut EscalationLadder,
    mut call: F,
    mut accept: A,
) -> (Result<T, RetryFailure<R>>, AttemptLog)
where
    R: Rejection,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<GenerationOutput, GenerationError>>,
    A: FnMut(GenerationOutput, u32) -> Result<T, R>,
{
    let mut log = AttemptLog::default();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let prompt = ladder.prompt_for(attempt);
        log.attempts = attempt;
        log.last_prompt.clone_from(&prompt);

        let result = call(prompt).await;
        log.cost += costs.charge(&result);

        let failure = match result {
            Ok(output) => match accept(output, attempt) {
                Ok(value) => {
                    debug!(item, attempt, cost = log.cost, "Item accepted");
                    return (Ok(value), log);
                }
                Err(rejection) => {
                    ladder.add_fixes(rejection.fixes());
                    RetryFailure::Rejected(rejection)
                }
            },
            Err(e) => RetryFailure::Generation(e),
        };

        let reason = failure.reason();
        let retryable = !failure.is_terminal();
        log_attempt_failure(item, attempt, retryable, &reason);
        log.errors.push(reason);

        if !retryable || attempt >= policy.max_attempts {
            if retryable {
                warn!(item, attempts = attempt, "Attempts exhausted");
            }
            return (Err(failure), log);
        }

        let pause = policy.pause_after(attempt);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

/// The output could not be stored.
#[derive(Debug)]
pub enum OutputRejected {
    /// The provider answered without an image
    NoImage(String),
    WriteFailed(String),
}

impl Rejection for OutputRejected {
    fn reason(&self) -> String {
        match self {
            Self::NoImage(msg) => msg.clone(),
            Self::WriteFailed(msg) => format!("could not store output: {msg}"),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::NoImage(_))
    }
}

/// Acceptance step shared by the edit-style engines: store the first image.
pub fn store_first_image(output: GenerationOutput, path: &Utf8Path) -> Result<(), OutputRejected> {
    let bytes = output
        .into_first_image()
        .map_err(|e| OutputRejected::NoImage(e.to_string()))?;
    write_bytes_atomic(path, &bytes).map_err(|e| OutputRejected::WriteFailed(format!("{e:#}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reskin_config::Config;
    use std::cell::RefCell;

    use crate::style::StyleContext;

    fn ladder() -> EscalationLadder {
        let style = StyleContext::from_config(&Config::minimal_for_testing()).unwrap();
        EscalationLadder::new("base prompt", &style)
    }

    fn costs() -> CostModel {
        CostModel {
            per_image: 0.04,
            failed_call: 0.02,
        }
    }

    fn image() -> GenerationOutput {
        GenerationOutput::new(vec![vec![1, 2, 3]], "test")
    }

    #[derive(Debug)]
    struct TooSmall;

    impl Rejection for TooSmall {
        fn reason(&self) -> String {
            "too small".to_string()
        }
        fn fixes(&self) -> Vec<String> {
            vec!["render at full size".to_string()]
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let prompts = RefCell::new(Vec::new());
        let mut ladder = ladder();
        let (result, log) = call_with_retry(
            "home",
            &RetryPolicy::new(3, 0),
            &costs(),
            &mut ladder,
            |prompt| {
                prompts.borrow_mut().push(prompt);
                let n = prompts.borrow().len();
                async move {
                    if n < 3 {
                        Err(GenerationError::ProviderOutage("503".to_string()))
                    } else {
                        Ok(image())
                    }
                }
            },
            |_, _| Ok::<_, TooSmall>(()),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(log.attempts, 3);
        assert!((log.cost - (0.02 + 0.02 + 0.04)).abs() < 1e-9);
        assert_eq!(log.errors.len(), 2);
        let prompts = prompts.into_inner();
        assert!(prompts[1].contains("HARD CONSTRAINTS"));
        assert!(prompts[2].contains("MANDATORY"));
    }

    #[tokio::test]
    async fn test_terminal_error_stops_immediately() {
        let mut calls = 0;
        let (result, log) = call_with_retry(
            "home",
            &RetryPolicy::new(3, 0),
            &costs(),
            &mut ladder(),
            |_| {
                calls += 1;
                async { Err(GenerationError::ProviderAuth("401".to_string())) }
            },
            |_, _| Ok::<_, TooSmall>(()),
        )
        .await;

        assert_eq!(calls, 1);
        assert_eq!(log.attempts, 1);
        let failure = result.unwrap_err();
        assert!(failure.is_terminal());
        assert!(matches!(failure, RetryFailure::Generation(GenerationError::ProviderAuth(_))));
    }

    #[tokio::test]
    async fn test_rejections_consume_attempts_and_add_fixes() {
        let mut ladder = ladder();
        let (result, log) = call_with_retry(
            "slot-02",
            &RetryPolicy::new(2, 0),
            &costs(),
            &mut ladder,
            |_| async { Ok(image()) },
            |_, _| Err::<(), _>(TooSmall),
        )
        .await;

        assert!(matches!(result, Err(RetryFailure::Rejected(TooSmall))));
        assert_eq!(log.attempts, 2);
        // both calls succeeded at the service, so both are charged as images
        assert!((log.cost - 0.08).abs() < 1e-9);
        assert_eq!(ladder.fixes(), ["render at full size"]);
        assert!(log.last_prompt.contains("render at full size"));
    }

    #[test]
    fn test_policy() {
        let policy = RetryPolicy::new(0, 250);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.pause_after(2), Duration::from_millis(500));
    }

    #[test]
    fn test_store_first_image() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("out/a.png")).unwrap();
        store_first_image(image(), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let empty = GenerationOutput::new(Vec::new(), "test");
        let err = store_first_image(empty, &path).unwrap_err();
        assert!(err.is_retryable());
    }
}
