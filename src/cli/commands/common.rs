//! Common helpers shared by CLI commands
//!
//! Handle construction, project locking and outcome printing.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::{
    AnchoringOutcome, Config, ExitCode, PhaseSummary, PipelineHandle, ProjectLock, ReskinError,
    StubBackend,
};
use reskin_utils::error::ConfigError;
use reskin_utils::paths::ProjectPaths;
use reskin_utils::types::PhaseStatus;

/// Open the project handle with the configured backend.
pub fn open_handle(project_id: &str, config: &Config) -> Result<PipelineHandle> {
    Ok(PipelineHandle::open(project_id, config.clone())?)
}

/// Handle for commands that only read project state; never calls a provider.
pub fn readonly_handle(project_id: &str, config: &Config) -> Result<PipelineHandle> {
    let backend = Arc::new(StubBackend::new(config.viewport()));
    Ok(PipelineHandle::with_backend(
        ProjectPaths::for_project(project_id),
        project_id,
        config.clone(),
        backend,
    )?)
}

/// Take the project lock for the duration of a mutating command.
pub fn lock_project(handle: &PipelineHandle, force: bool, config: &Config) -> Result<ProjectLock> {
    let lock = ProjectLock::acquire(
        handle.paths().root(),
        handle.project_id(),
        force,
        Some(config.lock_ttl_seconds()),
    )
    .map_err(ReskinError::from)?;
    Ok(lock)
}

/// Command-line paths must be UTF-8 to be recorded in the manifest.
pub fn utf8_path(path: &Path) -> Result<Utf8PathBuf> {
    let utf8 = Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| {
        ReskinError::Config(ConfigError::InvalidValue {
            key: "document".to_string(),
            value: format!("{} is not valid UTF-8", p.display()),
        })
    })?;
    Ok(utf8)
}

/// Print where anchoring stopped and map it to an exit code.
pub fn report_anchoring(outcome: &AnchoringOutcome) -> ExitCode {
    match outcome {
        AnchoringOutcome::AwaitingValidation { gate } => {
            println!("⏸ Anchoring {}", outcome.describe());
            for (i, candidate) in gate.candidates.iter().enumerate() {
                println!("    {}. {candidate}", i + 1);
            }
            println!(
                "  Answer with: reskin gate <select|approve|reject> <project> {}",
                gate.gate_id
            );
            ExitCode::AWAITING_VALIDATION
        }
        AnchoringOutcome::NeedsRegeneration { .. } => {
            println!("✗ Anchoring stopped: {}", outcome.describe());
            println!("  Run `reskin anchor <project>` again to retry with an adjusted prompt");
            ExitCode::PHASE_FAILED
        }
        AnchoringOutcome::AllValidated { .. } => {
            println!("✓ Anchoring: {}", outcome.describe());
            println!(
                "  Run `reskin complete-anchoring <project>` to write the style configuration"
            );
            ExitCode::SUCCESS
        }
        AnchoringOutcome::AlreadyComplete => {
            println!("✓ Anchoring: {}", outcome.describe());
            ExitCode::SUCCESS
        }
    }
}

/// Print a phase status line; a phase left in progress is still success.
pub fn report_summary(summary: &PhaseSummary) -> ExitCode {
    match summary.status {
        PhaseStatus::Complete | PhaseStatus::Skipped => println!("✓ {}", summary.status_line()),
        PhaseStatus::InProgress | PhaseStatus::Pending => println!("… {}", summary.status_line()),
        PhaseStatus::Failed => {
            println!("✗ {}", summary.status_line());
            return ExitCode::PHASE_FAILED;
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PendingGate;
    use reskin_utils::types::PhaseId;

    #[test]
    fn test_gate_outcome_maps_to_awaiting_validation() {
        let outcome = AnchoringOutcome::AwaitingValidation {
            gate: PendingGate::approval(4, "anchors/slot-04-card.png".to_string()),
        };
        assert_eq!(report_anchoring(&outcome), ExitCode::AWAITING_VALIDATION);
        assert_eq!(report_anchoring(&AnchoringOutcome::AlreadyComplete), ExitCode::SUCCESS);
    }

    #[test]
    fn test_failed_summary_maps_to_phase_failed() {
        let failed = PhaseSummary::new(PhaseId::Propagation, PhaseStatus::Failed);
        assert_eq!(report_summary(&failed), ExitCode::PHASE_FAILED);
        let partial = PhaseSummary::new(PhaseId::States, PhaseStatus::InProgress);
        assert_eq!(report_summary(&partial), ExitCode::SUCCESS);
    }
}
