//! Structured logging for pipeline runs.
//!
//! Engines log through `tracing`; the CLI installs the subscriber once via
//! [`init_tracing`]. Phase-level helpers keep field names consistent so log lines
//! can be filtered by `project_id` and `phase`.

use std::time::Instant;
use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_credentials;

/// Output format for the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Initialize the global tracing subscriber.
///
/// `RESKIN_LOG` (then `RUST_LOG`) wins when set; otherwise `verbose` selects
/// debug-level output for the reskin crates.
pub fn init_tracing(verbose: bool, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_env("RESKIN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("reskin=debug,reskin_engine=debug,reskin_generation=debug,info")
            } else {
                EnvFilter::try_new("reskin=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match (format, verbose) {
        (LogFormat::Json, _) => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        (LogFormat::Compact, true) => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?,
        (LogFormat::Compact, false) => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?,
    }

    Ok(())
}

/// Span wrapping one phase run.
pub fn phase_span(project_id: &str, phase: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "phase_execution",
        project_id = %project_id,
        phase = %phase,
    )
}

pub fn log_phase_start(project_id: &str, phase: &str) {
    info!(project_id = %project_id, phase = %phase, "Starting phase");
}

pub fn log_phase_complete(project_id: &str, phase: &str, duration_ms: u128) {
    info!(
        project_id = %project_id,
        phase = %phase,
        duration_ms = %duration_ms,
        "Phase completed"
    );
}

/// Log a phase failure. The message is credential-redacted first.
pub fn log_phase_error(project_id: &str, phase: &str, error: &str, duration_ms: u128) {
    let sanitized = redact_credentials(error);
    error!(
        project_id = %project_id,
        phase = %phase,
        duration_ms = %duration_ms,
        error = %sanitized,
        "Phase failed"
    );
}

/// Log a failed generation attempt for one item.
pub fn log_attempt_failure(item: &str, attempt: u32, retryable: bool, error: &str) {
    let sanitized = redact_credentials(error);
    warn!(
        item = %item,
        attempt,
        retryable,
        error = %sanitized,
        "Generation attempt failed"
    );
}

/// Wall-clock timer for a phase, logging completion or failure on finish.
pub struct PhaseTimer {
    project_id: String,
    phase: String,
    started: Instant,
}

impl PhaseTimer {
    pub fn start(project_id: &str, phase: &str) -> Self {
        log_phase_start(project_id, phase);
        Self {
            project_id: project_id.to_string(),
            phase: phase.to_string(),
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub fn complete(self) -> u128 {
        let ms = self.elapsed_ms();
        log_phase_complete(&self.project_id, &self.phase, ms);
        ms
    }

    pub fn fail(self, error: &str) -> u128 {
        let ms = self.elapsed_ms();
        log_phase_error(&self.project_id, &self.phase, error, ms);
        ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_timer_reports_elapsed() {
        let timer = PhaseTimer::start("demo", "anchoring");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.elapsed_ms() >= 1);
        let _ = timer.complete();
    }

    #[test]
    fn test_phase_span_has_metadata() {
        let span = phase_span("demo", "propagation");
        // Disabled spans have no metadata when no subscriber is installed.
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "phase_execution");
        }
    }
}
