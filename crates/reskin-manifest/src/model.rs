use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

/// Current manifest schema version
pub const MANIFEST_SCHEMA_VERSION: &str = "1";

/// One project's durable pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version for forward compatibility
    pub schema_version: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub viewport: Viewport,
    /// URL of the application being redesigned
    pub source_url: String,
    /// Every phase in pipeline order
    pub phases: BTreeMap<PhaseId, PhaseState>,
    /// Number of captured screens, known once capture is imported
    #[serde(default)]
    pub total_screens: usize,
    /// Snapshot of the style configuration written at anchoring completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_config: Option<serde_json::Value>,
    /// Validation gate the pipeline is suspended on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_gate: Option<PendingGate>,
}

/// Progress of a single phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Index of the first batch not yet committed
    #[serde(default)]
    pub batch_cursor: usize,
    #[serde(default)]
    pub items_completed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Optional fields applied alongside a status transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseUpdate {
    pub cursor: Option<usize>,
    pub items_completed: Option<usize>,
    pub items_total: Option<usize>,
    pub error: Option<String>,
}

impl PhaseUpdate {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total(items_total: usize) -> Self {
        Self {
            items_total: Some(items_total),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_items_completed(mut self, n: usize) -> Self {
        self.items_completed = Some(n);
        self
    }
}

/// Result of asking whether a phase may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    pub allowed: bool,
    /// Names the first blocking phase and its status when not allowed
    pub reason: Option<String>,
}

/// Kind of human decision a gate asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Pick one of several hero candidates
    HeroSelection,
    /// Approve or reject a single anchor
    AnchorApproval,
}

/// A suspended human-validation point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGate {
    pub gate_id: String,
    pub kind: GateKind,
    /// Anchor slot under review
    pub slot: u8,
    /// Candidate image paths, relative to the project root
    pub candidates: Vec<String>,
    pub opened_at: DateTime<Utc>,
}

impl PendingGate {
    #[must_use]
    pub fn gate_id_for(slot: u8) -> String {
        format!("anchor-{slot:02}")
    }

    #[must_use]
    pub fn hero(candidates: Vec<String>) -> Self {
        Self {
            gate_id: Self::gate_id_for(1),
            kind: GateKind::HeroSelection,
            slot: 1,
            candidates,
            opened_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn approval(slot: u8, candidate: String) -> Self {
        Self {
            gate_id: Self::gate_id_for(slot),
            kind: GateKind::AnchorApproval,
            slot,
            candidates: vec![candidate],
            opened_at: Utc::now(),
        }
    }
}

/// A person's answer to a pending gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GateResponse {
    /// Choose hero candidate `index` (1-based)
    Select { index: usize },
    Approve,
    /// Regenerate with the feedback appended to the prompt
    Reject { feedback: String },
}

impl GateResponse {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Select { index } => format!("select candidate {index}"),
            Self::Approve => "approve".to_string(),
            Self::Reject { feedback } => format!("reject ({feedback})"),
        }
    }
}
