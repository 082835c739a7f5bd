//! Bounded convergence loop over every propagated screen and state variant.
//!
//! Each pass scores all items against the validated anchors. The loop ends
//! converged, exhausted (pass budget spent) or stalled (outliers remain but
//! none is bad enough to regenerate); it never runs more than `max_passes`
//! regeneration rounds.

use camino::Utf8PathBuf;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use reskin_config::Config;
use reskin_manifest::PhaseUpdate;
use reskin_utils::error::{PhaseError, ReskinError};
use reskin_utils::logging::PhaseTimer;
use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

use crate::handle::PipelineHandle;
use crate::prompts::{EscalationLadder, screen_prompt, state_prompt};
use crate::propagation::{PropagationReport, RestyleJob};
use crate::reports::{append_record, read_records, read_report, rewrite_records, write_report};
use crate::retry::RetryPolicy;
use crate::scoring::{CoherenceItem, OutlierReason};
use crate::states::{StateKind, StatesReport};
use crate::style::StyleContext;
use crate::summary::PhaseSummary;

/// Strength used for every regeneration
pub const REGENERATION_STRENGTH: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoherencePolicy {
    /// Overall score (0-100) at which the set counts as converged
    pub threshold: f64,
    pub max_passes: u32,
    /// Deviation at which an item is reported as an outlier
    pub outlier_threshold: f64,
    /// Deviation at which an outlier is regenerated
    pub regenerate_threshold: f64,
    pub regen_attempts: u32,
}

impl CoherencePolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.coherence_threshold(),
            max_passes: config.max_passes(),
            outlier_threshold: config.outlier_threshold(),
            regenerate_threshold: config.regenerate_threshold(),
            regen_attempts: config.regen_attempts(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceOutcome {
    Converged,
    /// Pass budget spent with the score still under the threshold
    Exhausted,
    /// Under the threshold, but no outlier bad enough to regenerate
    Stalled,
}

impl fmt::Display for CoherenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Stalled => "stalled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassDecision {
    Finish(CoherenceOutcome),
    Regenerate,
}

/// `100 - mean(scores)`; 100 for an empty set.
#[must_use]
pub fn overall_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 100.0;
    }
    100.0 - scores.iter().sum::<f64>() / scores.len() as f64
}

/// What to do after scoring pass `pass` (0-based).
#[must_use]
pub fn decide(
    overall: f64,
    pass: u32,
    policy: &CoherencePolicy,
    any_must_regenerate: bool,
) -> PassDecision {
    if overall >= policy.threshold {
        PassDecision::Finish(CoherenceOutcome::Converged)
    } else if pass >= policy.max_passes {
        PassDecision::Finish(CoherenceOutcome::Exhausted)
    } else if !any_must_regenerate {
        PassDecision::Finish(CoherenceOutcome::Stalled)
    } else {
        PassDecision::Regenerate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierInfo {
    pub item_id: String,
    pub screen_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateKind>,
    pub score: f64,
    pub reasons: Vec<OutlierReason>,
    pub recommendations: Vec<String>,
    pub regenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass: u32,
    pub overall_score: f64,
    pub items: usize,
    pub outliers: Vec<OutlierInfo>,
    pub regenerated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerationRecord {
    pub item_id: String,
    pub screen_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateKind>,
    pub pass: u32,
    pub reason: String,
    pub success: bool,
    pub attempts: u32,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub items: usize,
    pub passes: Vec<PassSummary>,
    pub overall_score: f64,
    pub outcome: CoherenceOutcome,
    pub threshold: f64,
    pub max_passes: u32,
    pub unresolved: Vec<OutlierInfo>,
    pub regenerations: Vec<RegenerationRecord>,
    pub total_cost: f64,
}

impl CoherenceReport {
    #[must_use]
    pub fn summary(&self) -> PhaseSummary {
        let failed = self.unresolved.len().min(self.items);
        PhaseSummary {
            items_total: self.items,
            succeeded: self.items - failed,
            failed,
            cost: self.total_cost,
            ..PhaseSummary::new(PhaseId::Coherence, PhaseStatus::Complete)
        }
        .with_detail(format!(
            "{} at {:.1} after {} pass(es)",
            self.outcome,
            self.overall_score,
            self.passes.len()
        ))
    }
}

/// Every screen and variant the loop reviews, screens first.
fn collect_items(
    handle: &PipelineHandle,
    screens: &PropagationReport,
    states: &StatesReport,
) -> Vec<CoherenceItem> {
    let paths = handle.paths();
    let screen_items = screens.screens.iter().map(|s| CoherenceItem {
        item_id: s.screen_id.clone(),
        screen_id: s.screen_id.clone(),
        state: None,
        screen_type: s.screen_type,
        path: paths.resolve(&s.output_path),
        success: s.success,
        attempts: s.attempts,
        strength: s.strength,
    });
    let state_items = states.variants.iter().map(|v| CoherenceItem {
        item_id: v.item_id(),
        screen_id: v.screen_id.clone(),
        state: Some(v.state),
        screen_type: v.screen_type,
        path: paths.resolve(&v.output_path),
        success: v.success,
        attempts: v.attempts,
        strength: v.strength,
    });
    screen_items.chain(state_items).collect()
}

/// Inputs of one regeneration, resolved before the concurrent calls start.
struct RegenerationTarget {
    outlier: OutlierInfo,
    prompt: String,
    base: Utf8PathBuf,
    output: Utf8PathBuf,
}

impl PipelineHandle {
    /// Run the convergence loop and complete the coherence phase.
    ///
    /// Unresolved outliers are a degraded success, not an error.
    pub async fn run_coherence(&self) -> Result<CoherenceReport, ReskinError> {
        let phase = PhaseId::Coherence;
        let mut manifest = self.manifest()?;
        let report_path = self.paths().coherence_report();

        if manifest.status(phase) == PhaseStatus::Complete {
            return read_report(&report_path)?.ok_or_else(|| {
                PhaseError::MissingInput {
                    phase,
                    input: "coherence report".to_string(),
                }
                .into()
            });
        }
        manifest.ensure_can_start(phase)?;

        let policy = CoherencePolicy::from_config(self.config());
        let viewport = manifest.viewport;
        let anchors = self.validated_anchor_paths()?;
        if anchors.is_empty() {
            return Err(PhaseError::NoValidatedAnchors { phase }.into());
        }
        let style = self.load_style()?;
        let mut screens: PropagationReport =
            read_report(&self.paths().propagation_report())?.unwrap_or_default();
        let mut states: StatesReport =
            read_report(&self.paths().states_report())?.unwrap_or_default();
        let item_count = screens.screens.len() + states.variants.len();
        let pass_log = self.paths().coherence_pass_log();
        let regeneration_log = self.paths().regeneration_log();

        if manifest.status(phase) == PhaseStatus::Failed {
            manifest.reopen(phase);
        }
        let start_pass = if manifest.status(phase) == PhaseStatus::InProgress {
            u32::try_from(manifest.phase(phase).batch_cursor).unwrap_or(u32::MAX)
        } else {
            0
        };

        // Records past the committed cursor belong to a pass that never checkpointed.
        let passes: Vec<PassSummary> = read_records(&pass_log)?;
        let mut passes: Vec<PassSummary> =
            passes.into_iter().filter(|p| p.pass < start_pass).collect();
        let regenerations: Vec<RegenerationRecord> = read_records(&regeneration_log)?;
        let mut regenerations: Vec<RegenerationRecord> =
            regenerations.into_iter().filter(|r| r.pass < start_pass).collect();
        rewrite_records(&pass_log, &passes)?;
        rewrite_records(&regeneration_log, &regenerations)?;

        if manifest.status(phase) == PhaseStatus::InProgress {
            info!(
                project_id = %self.project_id(),
                pass = start_pass,
                regenerations = regenerations.len(),
                "Resuming coherence"
            );
        } else {
            manifest.transition(phase, PhaseStatus::InProgress, PhaseUpdate::total(item_count))?;
            self.save(&manifest)?;
        }
        let timer = PhaseTimer::start(self.project_id(), phase.as_str());

        let mut pass = start_pass;
        let (outcome, overall, unresolved) = loop {
            let items = collect_items(self, &screens, &states);
            let mut scores = Vec::with_capacity(items.len());
            let mut outliers = Vec::new();
            for item in &items {
                let assessment = self.scorer().assess(item, &anchors);
                scores.push(assessment.score);
                if assessment.score >= policy.outlier_threshold {
                    outliers.push(OutlierInfo {
                        item_id: item.item_id.clone(),
                        screen_id: item.screen_id.clone(),
                        state: item.state,
                        score: assessment.score,
                        reasons: assessment.reasons,
                        recommendations: assessment.recommendations,
                        regenerate: assessment.score >= policy.regenerate_threshold,
                    });
                }
            }
            let overall = overall_score(&scores);
            let must_regenerate = outliers.iter().any(|o| o.regenerate);
            debug!(pass, overall, outliers = outliers.len(), "Coherence pass scored");

            let mut summary = PassSummary {
                pass,
                overall_score: overall,
                items: items.len(),
                outliers: outliers.clone(),
                regenerated: 0,
            };

            match decide(overall, pass, &policy, must_regenerate) {
                PassDecision::Finish(outcome) => {
                    passes.push(summary);
                    let unresolved = if outcome == CoherenceOutcome::Converged {
                        Vec::new()
                    } else {
                        outliers
                    };
                    break (outcome, overall, unresolved);
                }
                PassDecision::Regenerate => {
                    let targets: Vec<RegenerationTarget> = outliers
                        .into_iter()
                        .filter(|o| o.regenerate)
                        .filter_map(|o| self.regeneration_target(o, &screens, &states, &style))
                        .collect();
                    let records = join_all(
                        targets
                            .iter()
                            .map(|t| self.regenerate(t, pass, &style, &anchors, viewport, &policy)),
                    )
                    .await;

                    for record in records {
                        apply_regeneration(&record, &mut screens, &mut states, self);
                        append_record(&regeneration_log, &record)?;
                        regenerations.push(record);
                    }
                    summary.regenerated = targets.len();
                    append_record(&pass_log, &summary)?;
                    passes.push(summary);

                    screens.refresh_summary();
                    states.refresh_summary();
                    write_report(&self.paths().propagation_report(), &screens)?;
                    write_report(&self.paths().states_report(), &states)?;
                    pass += 1;
                    manifest.checkpoint(phase, pass as usize, regenerations.len())?;
                    self.save(&manifest)?;
                    info!(
                        project_id = %self.project_id(),
                        pass,
                        overall,
                        "Coherence pass regenerated outliers"
                    );
                }
            }
        };

        let report = CoherenceReport {
            items: item_count,
            passes,
            overall_score: overall,
            outcome,
            threshold: policy.threshold,
            max_passes: policy.max_passes,
            unresolved,
            total_cost: regenerations.iter().map(|r| r.cost).sum(),
            regenerations,
        };
        write_report(&report_path, &report)?;

        manifest.transition(
            phase,
            PhaseStatus::Complete,
            PhaseUpdate::none().with_items_completed(item_count),
        )?;
        self.save(&manifest)?;
        if outcome != CoherenceOutcome::Converged {
            warn!(
                project_id = %self.project_id(),
                outcome = %outcome,
                unresolved = report.unresolved.len(),
                "Coherence finished without converging"
            );
        }
        timer.complete();
        Ok(report)
    }

    fn regeneration_target(
        &self,
        outlier: OutlierInfo,
        screens: &PropagationReport,
        states: &StatesReport,
        style: &StyleContext,
    ) -> Option<RegenerationTarget> {
        let paths = self.paths();
        match outlier.state {
            None => {
                let screen = screens.screens.iter().find(|s| s.screen_id == outlier.screen_id)?;
                Some(RegenerationTarget {
                    prompt: screen_prompt(
                        &screen.name,
                        screen.screen_type,
                        style,
                        &screen.improvements,
                    ),
                    base: Utf8PathBuf::from(&screen.original_path),
                    output: paths.resolve(&screen.output_path),
                    outlier,
                })
            }
            Some(state) => {
                let variant = states
                    .variants
                    .iter()
                    .find(|v| v.screen_id == outlier.screen_id && v.state == state)?;
                Some(RegenerationTarget {
                    prompt: state_prompt(&variant.screen_name, state, style),
                    base: paths.resolve(&variant.base_path),
                    output: paths.resolve(&variant.output_path),
                    outlier,
                })
            }
        }
    }

    async fn regenerate(
        &self,
        target: &RegenerationTarget,
        pass: u32,
        style: &StyleContext,
        anchors: &[Utf8PathBuf],
        viewport: Viewport,
        policy: &CoherencePolicy,
    ) -> RegenerationRecord {
        let outlier = &target.outlier;
        let ladder = EscalationLadder::new(target.prompt.clone(), style)
            .with_fixes(outlier.recommendations.clone());
        let reasons: Vec<&str> = outlier.reasons.iter().map(OutlierReason::as_str).collect();

        let result = self
            .restyle(RestyleJob {
                item: outlier.item_id.clone(),
                base: target.base.clone(),
                output: target.output.clone(),
                strength: REGENERATION_STRENGTH,
                ladder,
                policy: RetryPolicy::new(policy.regen_attempts, self.config().backoff_ms()),
                references: anchors,
                viewport,
            })
            .await;

        RegenerationRecord {
            item_id: outlier.item_id.clone(),
            screen_id: outlier.screen_id.clone(),
            state: outlier.state,
            pass,
            reason: format!("score {:.1}: {}", outlier.score, reasons.join(", ")),
            success: result.success,
            attempts: result.attempts,
            cost: result.cost,
            error: result.error,
        }
    }
}

/// Fold a successful regeneration into its screen or variant record.
fn apply_regeneration(
    record: &RegenerationRecord,
    screens: &mut PropagationReport,
    states: &mut StatesReport,
    handle: &PipelineHandle,
) {
    if !record.success {
        return;
    }
    match record.state {
        None => {
            if let Some(screen) =
                screens.screens.iter_mut().find(|s| s.screen_id == record.screen_id)
            {
                screen.success = true;
                screen.attempts += record.attempts;
                screen.cost += record.cost;
                screen.strength = REGENERATION_STRENGTH;
                screen.error = None;
                screen.output_path = handle
                    .paths()
                    .relative(&handle.paths().propagated_screen(&screen.screen_id));
            }
        }
        Some(state) => {
            if let Some(variant) = states
                .variants
                .iter_mut()
                .find(|v| v.screen_id == record.screen_id && v.state == state)
            {
                variant.success = true;
                variant.attempts += record.attempts;
                variant.cost += record.cost;
                variant.strength = REGENERATION_STRENGTH;
                variant.error = None;
                variant.output_path = handle
                    .paths()
                    .relative(&handle.paths().state_variant(&variant.screen_id, state.as_str()));
            }
        }
    }
}
