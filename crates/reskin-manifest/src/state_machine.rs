//! Phase ordering and transition rules.
//!
//! Phases run in the fixed order capture → audit → anchoring → propagation →
//! states → coherence → specs. A phase may be `in_progress` or `complete` only
//! while every earlier phase is `complete` or `skipped`.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

use reskin_utils::error::{ManifestError, PhaseError};
use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

use crate::model::{
    Gate, GateKind, GateResponse, MANIFEST_SCHEMA_VERSION, Manifest, PendingGate, PhaseState,
    PhaseUpdate,
};

/// Whether `from → to` is a legal status change.
#[must_use]
pub fn is_legal_transition(from: PhaseStatus, to: PhaseStatus) -> bool {
    use PhaseStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Skipped)
            | (InProgress, InProgress)
            | (InProgress, Complete)
            | (InProgress, Failed)
            | (Failed, InProgress)
    )
}

impl Manifest {
    /// New manifest with every phase pending.
    #[must_use]
    pub fn create(project_id: &str, source_url: &str, viewport: Viewport) -> Self {
        let now = Utc::now();
        let phases: BTreeMap<PhaseId, PhaseState> = PhaseId::all()
            .iter()
            .map(|p| (*p, PhaseState::default()))
            .collect();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            project_id: project_id.to_string(),
            created_at: now,
            updated_at: now,
            viewport,
            source_url: source_url.to_string(),
            phases,
            total_screens: 0,
            style_config: None,
            pending_gate: None,
        }
    }

    #[must_use]
    pub fn status(&self, phase: PhaseId) -> PhaseStatus {
        self.phases
            .get(&phase)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// State of `phase`, or the pending default if the map lacks it.
    #[must_use]
    pub fn phase(&self, phase: PhaseId) -> PhaseState {
        self.phases.get(&phase).cloned().unwrap_or_default()
    }

    fn phase_mut(&mut self, phase: PhaseId) -> &mut PhaseState {
        self.phases.entry(phase).or_default()
    }

    /// Allowed iff every phase strictly before `phase` is complete or skipped.
    #[must_use]
    pub fn can_start(&self, phase: PhaseId) -> Gate {
        match self.first_blocker(phase) {
            None => Gate {
                allowed: true,
                reason: None,
            },
            Some((dep, status)) => Gate {
                allowed: false,
                reason: Some(format!(
                    "{phase} requires {dep} to be complete or skipped (currently {status})"
                )),
            },
        }
    }

    /// `can_start` as a `Result`, naming the first blocking phase.
    pub fn ensure_can_start(&self, phase: PhaseId) -> Result<(), PhaseError> {
        match self.first_blocker(phase) {
            None => Ok(()),
            Some((dependency, status)) => Err(PhaseError::DependencyNotSatisfied {
                phase,
                dependency,
                status,
            }),
        }
    }

    fn first_blocker(&self, phase: PhaseId) -> Option<(PhaseId, PhaseStatus)> {
        phase
            .predecessors()
            .iter()
            .map(|p| (*p, self.status(*p)))
            .find(|(_, status)| !status.is_settled())
    }

    /// Move `phase` to `to`, applying `update`.
    ///
    /// Stamps `started_at` on first entry into `in_progress` and `completed_at`
    /// on `complete` or `failed`. Entering `in_progress` or `complete` requires
    /// every earlier phase to be settled.
    pub fn transition(
        &mut self,
        phase: PhaseId,
        to: PhaseStatus,
        update: PhaseUpdate,
    ) -> Result<(), PhaseError> {
        let from = self.status(phase);
        if !is_legal_transition(from, to) {
            return Err(PhaseError::InvalidTransition { phase, from, to });
        }
        if matches!(to, PhaseStatus::InProgress | PhaseStatus::Complete) {
            self.ensure_can_start(phase)?;
        }

        let now = Utc::now();
        let state = self.phase_mut(phase);
        state.status = to;
        match to {
            PhaseStatus::InProgress => {
                if state.started_at.is_none() {
                    state.started_at = Some(now);
                }
                if from == PhaseStatus::Failed {
                    state.completed_at = None;
                }
            }
            PhaseStatus::Complete => {
                state.completed_at = Some(now);
                state.last_error = None;
            }
            PhaseStatus::Failed => state.completed_at = Some(now),
            PhaseStatus::Skipped | PhaseStatus::Pending => {}
        }

        if let Some(cursor) = update.cursor {
            state.batch_cursor = state.batch_cursor.max(cursor);
        }
        if let Some(n) = update.items_completed {
            state.items_completed = n;
        }
        if let Some(total) = update.items_total {
            state.items_total = Some(total);
        }
        if let Some(error) = update.error {
            state.last_error = Some(error);
        }

        self.updated_at = now;
        debug!(phase = %phase, from = %from, to = %to, "Phase transition");
        Ok(())
    }

    /// First phase that is neither complete nor skipped.
    #[must_use]
    pub fn current_phase(&self) -> Option<PhaseId> {
        PhaseId::all()
            .iter()
            .copied()
            .find(|p| !self.status(*p).is_settled())
    }

    /// Reset `phase` and every later phase to pending.
    ///
    /// A pending gate belongs to anchoring and is dropped when anchoring (or an
    /// earlier phase) is reopened.
    pub fn reopen(&mut self, phase: PhaseId) {
        for p in PhaseId::all().iter().filter(|p| **p >= phase) {
            self.phases.insert(*p, PhaseState::default());
        }
        if phase <= PhaseId::Anchoring {
            self.pending_gate = None;
            self.style_config = None;
        }
        self.updated_at = Utc::now();
        debug!(phase = %phase, "Reopened phase and its successors");
    }

    /// Record batch progress on an in-progress phase. The cursor never decreases.
    pub fn checkpoint(
        &mut self,
        phase: PhaseId,
        cursor: usize,
        items_completed: usize,
    ) -> Result<(), PhaseError> {
        let status = self.status(phase);
        if status != PhaseStatus::InProgress {
            return Err(PhaseError::InvalidTransition {
                phase,
                from: status,
                to: PhaseStatus::InProgress,
            });
        }
        let state = self.phase_mut(phase);
        state.batch_cursor = state.batch_cursor.max(cursor);
        state.items_completed = state.items_completed.max(items_completed);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Suspend the pipeline on `gate`, replacing any earlier gate.
    pub fn suspend_on(&mut self, gate: PendingGate) {
        debug!(gate_id = %gate.gate_id, slot = gate.slot, "Suspending on validation gate");
        self.pending_gate = Some(gate);
        self.updated_at = Utc::now();
    }

    /// Check that `response` answers the pending gate `gate_id`.
    pub fn check_gate_response(
        &self,
        gate_id: &str,
        response: &GateResponse,
    ) -> Result<&PendingGate, ManifestError> {
        let gate = self.pending_gate.as_ref().ok_or(ManifestError::NoPendingGate)?;
        if gate.gate_id != gate_id {
            return Err(ManifestError::GateMismatch {
                pending: gate.gate_id.clone(),
                requested: gate_id.to_string(),
            });
        }
        let invalid = |reason: String| ManifestError::InvalidGateResponse {
            gate_id: gate_id.to_string(),
            reason,
        };
        match (gate.kind, response) {
            (GateKind::HeroSelection, GateResponse::Select { index }) => {
                if *index == 0 || *index > gate.candidates.len() {
                    return Err(invalid(format!(
                        "candidate {index} does not exist (choose 1-{})",
                        gate.candidates.len()
                    )));
                }
            }
            (GateKind::HeroSelection, GateResponse::Approve) => {
                return Err(invalid(
                    "hero selection needs a candidate index, not approve".to_string(),
                ));
            }
            (GateKind::AnchorApproval, GateResponse::Select { .. }) => {
                return Err(invalid(
                    "this gate has a single candidate; approve or reject it".to_string(),
                ));
            }
            (_, GateResponse::Reject { feedback }) if feedback.trim().is_empty() => {
                return Err(invalid("rejection requires feedback".to_string()));
            }
            _ => {}
        }
        Ok(gate)
    }

    /// Clear and return the pending gate `gate_id`.
    pub fn take_gate(&mut self, gate_id: &str) -> Result<PendingGate, ManifestError> {
        let pending = self.pending_gate.as_ref().ok_or(ManifestError::NoPendingGate)?;
        if pending.gate_id != gate_id {
            return Err(ManifestError::GateMismatch {
                pending: pending.gate_id.clone(),
                requested: gate_id.to_string(),
            });
        }
        self.updated_at = Utc::now();
        self.pending_gate.take().ok_or(ManifestError::NoPendingGate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manifest() -> Manifest {
        Manifest::create("demo", "https://app.example.test", Viewport::DESKTOP)
    }

    fn settle(m: &mut Manifest, phase: PhaseId) {
        m.transition(phase, PhaseStatus::InProgress, PhaseUpdate::none())
            .unwrap();
        m.transition(phase, PhaseStatus::Complete, PhaseUpdate::none())
            .unwrap();
    }

    #[test]
    fn test_create_all_pending() {
        let m = manifest();
        assert_eq!(m.phases.len(), 7);
        assert!(m.phases.values().all(|s| s.status == PhaseStatus::Pending));
        assert_eq!(m.current_phase(), Some(PhaseId::Capture));
        assert_eq!(m.schema_version, "1");
    }

    #[test]
    fn test_anchoring_blocked_by_pending_audit() {
        let mut m = manifest();
        settle(&mut m, PhaseId::Capture);

        let gate = m.can_start(PhaseId::Anchoring);
        assert!(!gate.allowed);
        let reason = gate.reason.unwrap();
        assert!(reason.contains("audit"), "{reason}");
        assert!(reason.contains("pending"), "{reason}");

        let err = m
            .transition(PhaseId::Anchoring, PhaseStatus::InProgress, PhaseUpdate::none())
            .unwrap_err();
        assert!(matches!(
            err,
            PhaseError::DependencyNotSatisfied {
                dependency: PhaseId::Audit,
                ..
            }
        ));
    }

    #[test]
    fn test_skipped_predecessor_unblocks() {
        let mut m = manifest();
        settle(&mut m, PhaseId::Capture);
        m.transition(PhaseId::Audit, PhaseStatus::Skipped, PhaseUpdate::none())
            .unwrap();
        assert!(m.can_start(PhaseId::Anchoring).allowed);
        assert_eq!(m.current_phase(), Some(PhaseId::Anchoring));
    }

    #[test]
    fn test_transition_stamps_and_rules() {
        let mut m = manifest();
        m.transition(PhaseId::Capture, PhaseStatus::InProgress, PhaseUpdate::total(12))
            .unwrap();
        let started = m.phase(PhaseId::Capture).started_at.unwrap();

        m.transition(PhaseId::Capture, PhaseStatus::Failed, PhaseUpdate::error("boom"))
            .unwrap();
        let failed = m.phase(PhaseId::Capture);
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.last_error.as_deref(), Some("boom"));

        m.transition(PhaseId::Capture, PhaseStatus::InProgress, PhaseUpdate::none())
            .unwrap();
        assert_eq!(m.phase(PhaseId::Capture).started_at, Some(started));
        assert!(m.phase(PhaseId::Capture).completed_at.is_none());

        m.transition(PhaseId::Capture, PhaseStatus::Complete, PhaseUpdate::none())
            .unwrap();
        let done = m.phase(PhaseId::Capture);
        assert!(done.last_error.is_none());
        assert_eq!(done.items_total, Some(12));

        let err = m
            .transition(PhaseId::Capture, PhaseStatus::InProgress, PhaseUpdate::none())
            .unwrap_err();
        assert!(matches!(err, PhaseError::InvalidTransition { .. }));
    }

    #[test]
    fn test_checkpoint_cursor_is_monotonic() {
        let mut m = manifest();
        m.transition(PhaseId::Capture, PhaseStatus::InProgress, PhaseUpdate::none())
            .unwrap();
        m.checkpoint(PhaseId::Capture, 2, 10).unwrap();
        m.checkpoint(PhaseId::Capture, 1, 5).unwrap();
        let state = m.phase(PhaseId::Capture);
        assert_eq!(state.batch_cursor, 2);
        assert_eq!(state.items_completed, 10);

        assert!(m.checkpoint(PhaseId::Audit, 1, 1).is_err());
    }

    #[test]
    fn test_reopen_resets_later_phases() {
        let mut m = manifest();
        for p in [PhaseId::Capture, PhaseId::Audit, PhaseId::Anchoring] {
            settle(&mut m, p);
        }
        m.suspend_on(PendingGate::approval(3, "anchors/slot-03-list-view.png".into()));

        m.reopen(PhaseId::Audit);
        assert_eq!(m.status(PhaseId::Capture), PhaseStatus::Complete);
        assert_eq!(m.status(PhaseId::Audit), PhaseStatus::Pending);
        assert_eq!(m.status(PhaseId::Anchoring), PhaseStatus::Pending);
        assert!(m.pending_gate.is_none());
    }

    #[test]
    fn test_gate_bookkeeping() {
        let mut m = manifest();
        assert!(matches!(m.take_gate("anchor-01"), Err(ManifestError::NoPendingGate)));

        m.suspend_on(PendingGate::hero(vec!["a".into(), "b".into(), "c".into()]));
        assert!(m.check_gate_response("anchor-01", &GateResponse::Select { index: 3 }).is_ok());
        assert!(m.check_gate_response("anchor-01", &GateResponse::Select { index: 4 }).is_err());
        assert!(m.check_gate_response("anchor-01", &GateResponse::Approve).is_err());
        assert!(
            m.check_gate_response(
                "anchor-01",
                &GateResponse::Reject {
                    feedback: " ".into()
                }
            )
            .is_err()
        );
        assert!(matches!(
            m.check_gate_response("anchor-02", &GateResponse::Approve),
            Err(ManifestError::GateMismatch { .. })
        ));

        let gate = m.take_gate("anchor-01").unwrap();
        assert_eq!(gate.kind, GateKind::HeroSelection);
        assert!(m.pending_gate.is_none());
    }

    #[test]
    fn test_manifest_serde_round_trip() {
        let mut m = manifest();
        settle(&mut m, PhaseId::Capture);
        m.suspend_on(PendingGate::hero(vec!["anchors/hero-candidate-1.png".into()]));
        let json = serde_json::to_string_pretty(&m).unwrap();
        assert!(json.contains("\"capture\""));
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    fn status_strategy() -> impl Strategy<Value = PhaseStatus> {
        prop_oneof![
            Just(PhaseStatus::Pending),
            Just(PhaseStatus::InProgress),
            Just(PhaseStatus::Complete),
            Just(PhaseStatus::Skipped),
            Just(PhaseStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_can_start_matches_ordering_rule(
            statuses in proptest::collection::vec(status_strategy(), 7),
            target in 0usize..7,
        ) {
            let mut m = manifest();
            for (phase, status) in PhaseId::all().iter().zip(&statuses) {
                m.phases.get_mut(phase).unwrap().status = *status;
            }
            let phase = PhaseId::all()[target];
            let expected = statuses[..target].iter().all(|s| s.is_settled());
            prop_assert_eq!(m.can_start(phase).allowed, expected);
            prop_assert_eq!(m.ensure_can_start(phase).is_ok(), expected);
        }

        #[test]
        fn prop_transitions_preserve_ordering_invariant(
            ops in proptest::collection::vec((0usize..7, status_strategy()), 0..40),
        ) {
            let mut m = manifest();
            for (idx, to) in ops {
                let _ = m.transition(PhaseId::all()[idx], to, PhaseUpdate::none());
            }
            for (i, phase) in PhaseId::all().iter().enumerate() {
                let status = m.status(*phase);
                if matches!(status, PhaseStatus::InProgress | PhaseStatus::Complete) {
                    for earlier in &PhaseId::all()[..i] {
                        prop_assert!(m.status(*earlier).is_settled());
                    }
                }
            }
        }
    }
}
