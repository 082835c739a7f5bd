//! State variants (loading, empty, error, success) of propagated screens.
//!
//! Batches the same way propagation does, with one unit per successful
//! screen and state, in screen order then state order.

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};
use tracing::{debug, info};

use reskin_manifest::PhaseUpdate;
use reskin_utils::error::{PhaseError, ReskinError};
use reskin_utils::logging::PhaseTimer;
use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

use crate::classify::ScreenType;
use crate::handle::PipelineHandle;
use crate::prompts::{EscalationLadder, state_prompt};
use crate::propagation::{PropagatedScreen, PropagationReport, RestyleJob};
use crate::reports::{read_report, write_report};
use crate::retry::RetryPolicy;
use crate::style::StyleContext;
use crate::summary::PhaseSummary;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Loading,
    Empty,
    Error,
    Success,
}

impl StateKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Empty => "empty",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    #[must_use]
    pub const fn strength(&self) -> f64 {
        match self {
            Self::Loading | Self::Success => 0.50,
            Self::Empty | Self::Error => 0.55,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariant {
    pub screen_id: String,
    pub screen_name: String,
    pub screen_type: ScreenType,
    pub state: StateKind,
    /// The propagated screen this variant was edited from
    pub base_path: String,
    pub output_path: String,
    pub success: bool,
    pub attempts: u32,
    pub cost: f64,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub batch: usize,
}

impl StateVariant {
    #[must_use]
    pub fn item_id(&self) -> String {
        format!("{}-{}", self.screen_id, self.state)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatesTotals {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_cost: f64,
    pub success_rate_by_state: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatesReport {
    pub variants: Vec<StateVariant>,
    pub summary: StatesTotals,
}

impl StatesReport {
    pub fn refresh_summary(&mut self) {
        let mut by_state: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for v in &self.variants {
            let entry = by_state.entry(v.state.to_string()).or_default();
            entry.0 += 1;
            if v.success {
                entry.1 += 1;
            }
        }
        let succeeded = self.variants.iter().filter(|v| v.success).count();
        self.summary = StatesTotals {
            total: self.variants.len(),
            succeeded,
            failed: self.variants.len() - succeeded,
            total_cost: self.variants.iter().map(|v| v.cost).sum(),
            success_rate_by_state: by_state
                .into_iter()
                .map(|(s, (n, ok))| (s, ok as f64 / n as f64))
                .collect(),
        };
    }
}

impl PipelineHandle {
    /// Generate every state variant of every successfully propagated screen.
    pub async fn run_states(&self) -> Result<PhaseSummary, ReskinError> {
        self.run_states_limited(None).await
    }

    /// Generate at most `max_batches` more batches of state variants.
    ///
    /// # Errors
    ///
    /// `NoValidatedAnchors`, or `NoSuccessfulScreens` when propagation left
    /// nothing to build variants from.
    pub async fn run_states_limited(
        &self,
        max_batches: Option<usize>,
    ) -> Result<PhaseSummary, ReskinError> {
        let phase = PhaseId::States;
        let mut manifest = self.manifest()?;
        let report_path = self.paths().states_report();

        if manifest.status(phase) == PhaseStatus::Complete {
            let report: StatesReport = read_report(&report_path)?.unwrap_or_default();
            return Ok(states_summary(&report, PhaseStatus::Complete, report.summary.total)
                .with_detail("already complete"));
        }
        manifest.ensure_can_start(phase)?;

        let anchors = self.validated_anchor_paths()?;
        if anchors.is_empty() {
            return Err(PhaseError::NoValidatedAnchors { phase }.into());
        }
        let propagated: PropagationReport =
            read_report(&self.paths().propagation_report())?.unwrap_or_default();
        let units: Vec<(&PropagatedScreen, StateKind)> = propagated
            .successful()
            .flat_map(|screen| StateKind::iter().map(move |state| (screen, state)))
            .collect();
        if units.is_empty() {
            return Err(PhaseError::NoSuccessfulScreens { phase }.into());
        }
        let style = self.load_style()?;

        if manifest.status(phase) == PhaseStatus::Failed {
            manifest.reopen(phase);
        }
        let total = units.len();
        if manifest.status(phase) != PhaseStatus::InProgress {
            manifest.transition(phase, PhaseStatus::InProgress, PhaseUpdate::total(total))?;
            self.save(&manifest)?;
        }

        let timer = PhaseTimer::start(self.project_id(), phase.as_str());
        let batch_size = self.config().state_batch_size().max(1);
        let batch_count = total.div_ceil(batch_size);
        let cursor = manifest.phase(phase).batch_cursor;

        let mut report: StatesReport = read_report(&report_path)?.unwrap_or_default();
        report.variants.retain(|v| v.batch < cursor);

        let viewport = manifest.viewport;
        let policy = self.propagation_policy();
        let mut ran = 0;
        for (batch, chunk) in units.chunks(batch_size).enumerate().skip(cursor) {
            if max_batches.is_some_and(|max| ran >= max) {
                break;
            }
            debug!(batch, variants = chunk.len(), "Generating state batch");
            let results = join_all(chunk.iter().map(|(screen, state)| {
                self.generate_variant(screen, *state, batch, &style, &anchors, viewport, policy)
            }))
            .await;
            report.variants.extend(results);
            report.refresh_summary();

            write_report(&report_path, &report)?;
            manifest.checkpoint(phase, batch + 1, report.variants.len())?;
            self.save(&manifest)?;
            info!(
                project_id = %self.project_id(),
                batch = batch + 1,
                of = batch_count,
                succeeded = report.summary.succeeded,
                "State batch committed"
            );
            ran += 1;
        }

        let committed = manifest.phase(phase).batch_cursor;
        if committed < batch_count {
            return Ok(states_summary(&report, PhaseStatus::InProgress, total)
                .with_detail(format!("{committed} of {batch_count} batches committed")));
        }

        manifest.transition(
            phase,
            PhaseStatus::Complete,
            PhaseUpdate::none().with_items_completed(report.variants.len()),
        )?;
        self.save(&manifest)?;
        timer.complete();
        Ok(states_summary(&report, PhaseStatus::Complete, total))
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_variant(
        &self,
        screen: &PropagatedScreen,
        state: StateKind,
        batch: usize,
        style: &StyleContext,
        anchors: &[Utf8PathBuf],
        viewport: Viewport,
        policy: RetryPolicy,
    ) -> StateVariant {
        let base = self.paths().resolve(&screen.output_path);
        let output = self.paths().state_variant(&screen.screen_id, state.as_str());
        let ladder = EscalationLadder::new(state_prompt(&screen.name, state, style), style);

        let result = self
            .restyle(RestyleJob {
                item: format!("{}-{state}", screen.screen_id),
                base,
                output: output.clone(),
                strength: state.strength(),
                ladder,
                policy,
                references: anchors,
                viewport,
            })
            .await;

        StateVariant {
            screen_id: screen.screen_id.clone(),
            screen_name: screen.name.clone(),
            screen_type: screen.screen_type,
            state,
            base_path: screen.output_path.clone(),
            output_path: self.paths().relative(&output),
            success: result.success,
            attempts: result.attempts,
            cost: result.cost,
            strength: state.strength(),
            error: result.error,
            batch,
        }
    }
}

fn states_summary(report: &StatesReport, status: PhaseStatus, total: usize) -> PhaseSummary {
    PhaseSummary {
        items_total: total,
        succeeded: report.summary.succeeded,
        failed: report.summary.failed,
        cost: report.summary.total_cost,
        ..PhaseSummary::new(PhaseId::States, status)
    }
}
