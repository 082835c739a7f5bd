use serde::{Deserialize, Serialize};

use reskin_utils::types::{PhaseId, PhaseStatus};

/// One-line outcome of a phase run, printed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: PhaseId,
    pub status: PhaseStatus,
    pub items_total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PhaseSummary {
    #[must_use]
    pub fn new(phase: PhaseId, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            items_total: 0,
            succeeded: 0,
            failed: 0,
            cost: 0.0,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// `propagation: complete (11/12 succeeded, 1 failed, cost $0.52)`
    #[must_use]
    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{}: {} ({}/{} succeeded, {} failed, cost ${:.2})",
            self.phase, self.status, self.succeeded, self.items_total, self.failed, self.cost
        );
        if let Some(detail) = &self.detail {
            line.push_str(" - ");
            line.push_str(detail);
        }
        line
    }
}
