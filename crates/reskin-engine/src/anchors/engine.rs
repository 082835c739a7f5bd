//! Anchor generation with human validation gates.
//!
//! Slots are generated lowest first. Each candidate must pass pre-validation
//! before it reaches a gate; in manual mode the pipeline then suspends until
//! [`PipelineHandle::resolve_gate`] is called.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reskin_config::ApprovalMode;
use reskin_generation::{EditRequest, GenerateRequest, GenerationOutput, ImageRef};
use reskin_manifest::{GateKind, GateResponse, Manifest, PendingGate, PhaseUpdate};
use reskin_utils::atomic_write::write_bytes_atomic;
use reskin_utils::error::{ConfigError, PhaseError, ReskinError};
use reskin_utils::logging::PhaseTimer;
use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

use super::validation::{ValidationCheck, ValidationReport, prevalidate};
use super::{AnchorSet, AnchorType, HERO_SLOT, SLOT_COUNT, SlotDef, slot_def};
use crate::handle::PipelineHandle;
use crate::prompts::{EscalationLadder, anchor_prompt};
use crate::reports::write_report;
use crate::retry::{
    OutputRejected, Rejection, RetryFailure, RetryPolicy, call_with_retry, store_first_image,
};
use crate::style::{StyleConfig, StyleContext};
use crate::summary::PhaseSummary;

/// Where anchoring stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnchoringOutcome {
    /// A person must answer `gate` before anchoring continues
    AwaitingValidation { gate: PendingGate },
    /// Attempts ran out for `slot`; the next run retries it with a prompt
    /// adjusted for `failed_checks`
    NeedsRegeneration {
        slot: u8,
        name: String,
        failed_checks: Vec<ValidationCheck>,
        last_error: Option<String>,
    },
    /// Every slot is validated; call `complete_anchoring`
    AllValidated { validated: usize },
    AlreadyComplete,
}

impl AnchoringOutcome {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::AwaitingValidation { gate } => match gate.kind {
                GateKind::HeroSelection => format!(
                    "awaiting hero selection at gate {} ({} candidates)",
                    gate.gate_id,
                    gate.candidates.len()
                ),
                GateKind::AnchorApproval => format!(
                    "awaiting approval of slot {} at gate {}",
                    gate.slot, gate.gate_id
                ),
            },
            Self::NeedsRegeneration {
                slot,
                name,
                failed_checks,
                last_error,
            } => {
                let mut text = format!("slot {slot} ({name}) needs regeneration");
                if !failed_checks.is_empty() {
                    let checks: Vec<&str> =
                        failed_checks.iter().map(ValidationCheck::as_str).collect();
                    text.push_str(&format!("; failed checks: {}", checks.join(", ")));
                }
                if let Some(err) = last_error {
                    text.push_str(&format!("; last error: {err}"));
                }
                text
            }
            Self::AllValidated { validated } => format!("{validated} anchors validated"),
            Self::AlreadyComplete => "anchoring already complete".to_string(),
        }
    }
}

#[derive(Debug)]
enum AnchorRejected {
    Validation(ValidationReport),
    Output(OutputRejected),
}

impl Rejection for AnchorRejected {
    fn reason(&self) -> String {
        match self {
            Self::Validation(report) => format!("pre-validation failed, {}", report.summary()),
            Self::Output(o) => o.reason(),
        }
    }

    fn fixes(&self) -> Vec<String> {
        match self {
            Self::Validation(report) => report.fix_phrases(),
            Self::Output(_) => Vec::new(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Output(o) => o.is_retryable(),
        }
    }
}

/// Candidates that passed pre-validation, relative to the project root.
struct Accepted {
    candidates: Vec<String>,
    report: ValidationReport,
}

enum SlotResult {
    Candidate(PendingGate),
    Exhausted(AnchoringOutcome),
}

impl PipelineHandle {
    /// Generate anchors until a gate, an exhausted slot, or all 14 validated.
    ///
    /// Returns immediately with the pending gate when one is open.
    ///
    /// # Errors
    ///
    /// Fails before any work on a missing palette or an unsatisfied phase
    /// precondition. A terminal generation error marks anchoring failed and is
    /// returned.
    pub async fn run_anchoring(&self) -> Result<AnchoringOutcome, ReskinError> {
        let mut manifest = self.manifest()?;
        if manifest.status(PhaseId::Anchoring).is_settled() {
            return Ok(AnchoringOutcome::AlreadyComplete);
        }
        if let Some(gate) = &manifest.pending_gate {
            return Ok(AnchoringOutcome::AwaitingValidation { gate: gate.clone() });
        }

        let style = StyleContext::from_config(self.config())?;
        if manifest.status(PhaseId::Anchoring) != PhaseStatus::InProgress {
            manifest.transition(
                PhaseId::Anchoring,
                PhaseStatus::InProgress,
                PhaseUpdate::total(SLOT_COUNT),
            )?;
            self.save(&manifest)?;
        }

        let timer = PhaseTimer::start(self.project_id(), PhaseId::Anchoring.as_str());
        let mut set = AnchorSet::load(self.paths())?;

        loop {
            let Some(slot) = set.next_unvalidated() else {
                timer.complete();
                return Ok(AnchoringOutcome::AllValidated {
                    validated: set.validated_count(),
                });
            };

            let result = self.generate_slot(&mut set, slot, &style, manifest.viewport).await;
            set.save(self.paths())?;

            let gate = match result {
                Ok(SlotResult::Candidate(gate)) => gate,
                Ok(SlotResult::Exhausted(outcome)) => {
                    warn!(project_id = %self.project_id(), slot, "{}", outcome.describe());
                    return Ok(outcome);
                }
                Err(e) => {
                    let reason = e.to_string();
                    manifest.transition(
                        PhaseId::Anchoring,
                        PhaseStatus::Failed,
                        PhaseUpdate::error(reason.clone()),
                    )?;
                    self.save(&manifest)?;
                    timer.fail(&reason);
                    return Err(e);
                }
            };

            match self.config().approval_mode() {
                ApprovalMode::Manual => {
                    info!(
                        project_id = %self.project_id(),
                        gate_id = %gate.gate_id,
                        "Awaiting validation"
                    );
                    manifest.suspend_on(gate.clone());
                    self.save(&manifest)?;
                    return Ok(AnchoringOutcome::AwaitingValidation { gate });
                }
                ApprovalMode::Auto => {
                    let response = match gate.kind {
                        GateKind::HeroSelection => GateResponse::Select { index: 1 },
                        GateKind::AnchorApproval => GateResponse::Approve,
                    };
                    self.apply_response(&mut set, &gate, &response)?;
                    set.save(self.paths())?;
                    self.checkpoint_anchors(&mut manifest, &set)?;
                    debug!(slot = gate.slot, "Gate resolved automatically");
                }
            }
        }
    }

    /// Answer the open gate `gate_id` and continue anchoring.
    ///
    /// Selecting a hero candidate or approving an anchor validates the slot;
    /// rejecting records the feedback and regenerates the slot with it.
    pub async fn resolve_gate(
        &self,
        gate_id: &str,
        response: GateResponse,
    ) -> Result<AnchoringOutcome, ReskinError> {
        let mut manifest = self.manifest()?;
        let gate = manifest.check_gate_response(gate_id, &response)?.clone();

        let mut set = AnchorSet::load(self.paths())?;
        self.apply_response(&mut set, &gate, &response)?;
        set.save(self.paths())?;

        manifest.take_gate(gate_id)?;
        self.checkpoint_anchors(&mut manifest, &set)?;
        info!(
            project_id = %self.project_id(),
            gate_id,
            response = %response.describe(),
            "Gate resolved"
        );

        self.run_anchoring().await
    }

    /// Write the style configuration and complete anchoring.
    ///
    /// # Errors
    ///
    /// `AnchorsIncomplete` (and no style configuration written) unless all 14
    /// slots are validated.
    pub fn complete_anchoring(&self) -> Result<PhaseSummary, ReskinError> {
        let mut manifest = self.manifest()?;
        let set = AnchorSet::load(self.paths())?;
        let cost: f64 = set.anchors.iter().map(|a| a.cost).sum();
        let summary = |status| PhaseSummary {
            items_total: SLOT_COUNT,
            succeeded: set.validated_count(),
            failed: SLOT_COUNT - set.validated_count(),
            cost,
            ..PhaseSummary::new(PhaseId::Anchoring, status)
        };

        if manifest.status(PhaseId::Anchoring) == PhaseStatus::Complete {
            return Ok(summary(PhaseStatus::Complete).with_detail("already complete"));
        }

        let unvalidated = set.unvalidated_slots();
        if !unvalidated.is_empty() {
            return Err(PhaseError::AnchorsIncomplete {
                expected: SLOT_COUNT,
                found: set.validated_count(),
                unvalidated,
            }
            .into());
        }
        manifest.ensure_can_start(PhaseId::Anchoring)?;

        let style = StyleContext::from_config(self.config())?;
        let style_config = StyleConfig::new(&style, manifest.viewport, set.anchors.clone());
        write_report(&self.paths().style_config(), &style_config)?;
        manifest.style_config = Some(
            serde_json::to_value(&style_config)
                .map_err(|e| ReskinError::serialization("style configuration", e))?,
        );

        if manifest.status(PhaseId::Anchoring) != PhaseStatus::InProgress {
            manifest.transition(
                PhaseId::Anchoring,
                PhaseStatus::InProgress,
                PhaseUpdate::total(SLOT_COUNT),
            )?;
        }
        manifest.transition(
            PhaseId::Anchoring,
            PhaseStatus::Complete,
            PhaseUpdate::none().with_items_completed(SLOT_COUNT),
        )?;
        self.save(&manifest)?;
        info!(
            project_id = %self.project_id(),
            cost,
            "Anchoring complete, style configuration written"
        );
        Ok(summary(PhaseStatus::Complete))
    }

    /// Drop validation of `slot` so the next anchoring run generates it again.
    ///
    /// A completed anchoring phase (and everything after it) is reopened.
    pub fn regenerate_anchor(&self, slot: u8) -> Result<(), ReskinError> {
        let def = slot_def(slot).ok_or_else(|| ConfigError::InvalidValue {
            key: "slot".to_string(),
            value: format!("{slot} (expected 1-{SLOT_COUNT})"),
        })?;

        let mut manifest = self.manifest()?;
        if manifest.status(PhaseId::Anchoring).is_settled() {
            manifest.reopen(PhaseId::Anchoring);
        }
        if manifest.pending_gate.as_ref().is_some_and(|g| g.slot == slot) {
            manifest.pending_gate = None;
        }

        let mut set = AnchorSet::load(self.paths())?;
        if let Some(anchor) = set.get_mut(slot) {
            anchor.invalidate();
            anchor.needs_regeneration = false;
        }
        set.save(self.paths())?;
        self.save(&manifest)?;
        info!(
            project_id = %self.project_id(),
            slot,
            name = def.name,
            "Anchor marked for regeneration"
        );
        Ok(())
    }

    fn checkpoint_anchors(
        &self,
        manifest: &mut Manifest,
        set: &AnchorSet,
    ) -> Result<(), ReskinError> {
        let validated = set.validated_count();
        manifest.checkpoint(PhaseId::Anchoring, validated, validated)?;
        self.save(manifest)
    }

    async fn generate_slot(
        &self,
        set: &mut AnchorSet,
        slot: u8,
        style: &StyleContext,
        viewport: Viewport,
    ) -> Result<SlotResult, ReskinError> {
        let def: &SlotDef = slot_def(slot).ok_or_else(|| PhaseError::ExecutionFailed {
            phase: PhaseId::Anchoring,
            reason: format!("unknown anchor slot {slot}"),
        })?;

        let references: Vec<Utf8PathBuf> = set
            .reference_set(slot)
            .iter()
            .filter_map(|a| a.image_path.as_deref())
            .map(|p| self.paths().resolve(p))
            .collect();
        let (feedback, carried_fixes) = match set.get(slot) {
            Some(a) => (
                a.feedback.clone(),
                a.failed_checks.iter().map(|c| c.fix_phrase()).collect::<Vec<_>>(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let prompt = anchor_prompt(def, style, references.len(), &feedback);
        let mut ladder = EscalationLadder::new(prompt, style).with_fixes(carried_fixes);
        let policy = RetryPolicy::new(self.config().anchor_attempts(), self.config().backoff_ms());
        let options = self.generation_options(viewport);
        let item = format!("anchor-{slot:02}-{}", def.name);
        let backend = self.backend();
        debug!(slot, references = references.len(), "Generating anchor");

        let (result, log) = if def.kind == AnchorType::Hero {
            let count = self.config().hero_variants().max(1);
            call_with_retry(
                &item,
                &policy,
                self.costs(),
                &mut ladder,
                move |prompt| {
                    backend.generate(GenerateRequest::new(prompt, count, options.clone()))
                },
                |output, _| self.accept_hero(output, viewport),
            )
            .await
        } else {
            let hero = set
                .get(HERO_SLOT)
                .and_then(|a| a.image_path.as_deref())
                .map(|p| self.paths().resolve(p))
                .unwrap_or_else(|| self.paths().anchor_image(HERO_SLOT, "hero"));
            let refs: Vec<ImageRef> = references.iter().cloned().map(ImageRef::Path).collect();
            let strength = def.kind.strength();
            let output_path = self.paths().anchor_image(slot, def.name);
            let stored = self.paths().relative(&output_path);
            call_with_retry(
                &item,
                &policy,
                self.costs(),
                &mut ladder,
                move |prompt| {
                    backend.edit(EditRequest::new(
                        prompt,
                        ImageRef::Path(hero.clone()),
                        refs.clone(),
                        strength,
                        options.clone(),
                    ))
                },
                |output, _| {
                    store_first_image(output, &output_path).map_err(AnchorRejected::Output)?;
                    let report =
                        prevalidate(&output_path, def.kind, viewport, &references, self.proxy());
                    if report.passed {
                        Ok(Accepted {
                            candidates: vec![stored.clone()],
                            report,
                        })
                    } else {
                        Err(AnchorRejected::Validation(report))
                    }
                },
            )
            .await
        };

        let Some(anchor) = set.get_mut(slot) else {
            return Err(PhaseError::ExecutionFailed {
                phase: PhaseId::Anchoring,
                reason: format!("anchor record has no slot {slot}"),
            }
            .into());
        };
        anchor.attempts += log.attempts;
        anchor.cost += log.cost;
        anchor.prompt = Some(log.last_prompt.clone());

        match result {
            Ok(accepted) => {
                anchor.last_validation = Some(accepted.report);
                anchor.needs_regeneration = false;
                anchor.failed_checks.clear();
                let gate = if def.kind == AnchorType::Hero {
                    PendingGate::hero(accepted.candidates)
                } else {
                    let candidate = accepted.candidates.into_iter().next().unwrap_or_default();
                    anchor.image_path = Some(candidate.clone());
                    PendingGate::approval(slot, candidate)
                };
                Ok(SlotResult::Candidate(gate))
            }
            Err(failure) if failure.is_terminal() => match failure {
                RetryFailure::Generation(e) => Err(e.into()),
                RetryFailure::Rejected(r) => Err(PhaseError::ExecutionFailed {
                    phase: PhaseId::Anchoring,
                    reason: format!("slot {slot}: {}", r.reason()),
                }
                .into()),
            },
            Err(failure) => {
                let last_error = failure.reason();
                anchor.needs_regeneration = true;
                if let RetryFailure::Rejected(AnchorRejected::Validation(report)) = failure {
                    anchor.failed_checks = report.failed_checks();
                    anchor.last_validation = Some(report);
                }
                Ok(SlotResult::Exhausted(AnchoringOutcome::NeedsRegeneration {
                    slot,
                    name: def.name.to_string(),
                    failed_checks: anchor.failed_checks.clone(),
                    last_error: Some(last_error),
                }))
            }
        }
    }

    /// Store every hero candidate; the ones passing pre-validation are offered.
    fn accept_hero(
        &self,
        output: GenerationOutput,
        viewport: Viewport,
    ) -> Result<Accepted, AnchorRejected> {
        let mut passing: Vec<(String, ValidationReport)> = Vec::new();
        let mut first_failure = None;
        for (i, bytes) in output.images.iter().enumerate() {
            let path = self.paths().hero_candidate(i + 1);
            write_bytes_atomic(&path, bytes).map_err(|e| {
                AnchorRejected::Output(OutputRejected::WriteFailed(format!("{e:#}")))
            })?;
            let report = prevalidate(&path, AnchorType::Hero, viewport, &[], self.proxy());
            if report.passed {
                passing.push((self.paths().relative(&path), report));
            } else if first_failure.is_none() {
                first_failure = Some(report);
            }
        }

        if passing.is_empty() {
            return Err(match first_failure {
                Some(report) => AnchorRejected::Validation(report),
                None => AnchorRejected::Output(OutputRejected::NoImage(format!(
                    "{} returned no hero candidates",
                    output.provider
                ))),
            });
        }
        let report = passing[0].1.clone();
        Ok(Accepted {
            candidates: passing.into_iter().map(|(path, _)| path).collect(),
            report,
        })
    }

    fn apply_response(
        &self,
        set: &mut AnchorSet,
        gate: &PendingGate,
        response: &GateResponse,
    ) -> Result<(), ReskinError> {
        let paths = self.paths();
        let anchor = set.get_mut(gate.slot).ok_or_else(|| PhaseError::ExecutionFailed {
            phase: PhaseId::Anchoring,
            reason: format!("gate {} names unknown slot {}", gate.gate_id, gate.slot),
        })?;

        match response {
            GateResponse::Select { index } => {
                let candidate = index
                    .checked_sub(1)
                    .and_then(|i| gate.candidates.get(i))
                    .ok_or_else(|| PhaseError::ExecutionFailed {
                        phase: PhaseId::Anchoring,
                        reason: format!("gate {} has no candidate {index}", gate.gate_id),
                    })?;
                let bytes = std::fs::read(paths.resolve(candidate))?;
                let dest = paths.anchor_image(gate.slot, &anchor.name);
                write_bytes_atomic(&dest, &bytes)
                    .map_err(|e| ReskinError::write_failed(&dest, &e))?;
                anchor.image_path = Some(paths.relative(&dest));
                anchor.mark_validated();
            }
            GateResponse::Approve => anchor.mark_validated(),
            GateResponse::Reject { feedback } => {
                anchor.feedback.push(feedback.trim().to_string());
                anchor.invalidate();
            }
        }
        Ok(())
    }
}
