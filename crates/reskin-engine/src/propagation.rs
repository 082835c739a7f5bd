//! Style propagation onto captured screens in checkpointed batches.
//!
//! Batches are fixed-size slices of the capture order. A batch is committed
//! when its records are in `propagation/report.json` and the manifest cursor
//! has moved past it; a restart resumes at the first uncommitted batch and
//! drops any records a half-finished batch left behind.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use reskin_generation::{EditRequest, ImageRef};
use reskin_manifest::PhaseUpdate;
use reskin_utils::error::{PhaseError, ReskinError};
use reskin_utils::logging::PhaseTimer;
use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

use crate::classify::{ScreenType, classify};
use crate::handle::PipelineHandle;
use crate::inputs::{AuditDocument, CaptureDocument, CapturedScreen};
use crate::prompts::{EscalationLadder, screen_prompt};
use crate::reports::{read_report, write_report};
use crate::retry::{RetryPolicy, call_with_retry, store_first_image};
use crate::style::{StyleConfig, StyleContext};
use crate::summary::PhaseSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedScreen {
    pub screen_id: String,
    pub name: String,
    pub screen_type: ScreenType,
    pub original_path: String,
    /// Relative to the project root
    pub output_path: String,
    pub success: bool,
    pub attempts: u32,
    pub cost: f64,
    pub strength: f64,
    pub improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub batch: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationTotals {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_cost: f64,
    /// Fraction of screens of each type that succeeded
    pub success_rate_by_type: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationReport {
    pub screens: Vec<PropagatedScreen>,
    pub summary: PropagationTotals,
}

impl PropagationReport {
    pub fn refresh_summary(&mut self) {
        let mut by_type: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for screen in &self.screens {
            let entry = by_type.entry(screen.screen_type.to_string()).or_default();
            entry.0 += 1;
            if screen.success {
                entry.1 += 1;
            }
        }
        let succeeded = self.screens.iter().filter(|s| s.success).count();
        self.summary = PropagationTotals {
            total: self.screens.len(),
            succeeded,
            failed: self.screens.len() - succeeded,
            total_cost: self.screens.iter().map(|s| s.cost).sum(),
            success_rate_by_type: by_type
                .into_iter()
                .map(|(t, (n, ok))| (t, ok as f64 / n as f64))
                .collect(),
        };
    }

    pub fn successful(&self) -> impl Iterator<Item = &PropagatedScreen> {
        self.screens.iter().filter(|s| s.success)
    }
}

/// One edit call sequence: base image in, restyled image at `output`.
pub(crate) struct RestyleJob<'a> {
    pub item: String,
    pub base: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub strength: f64,
    pub ladder: EscalationLadder,
    pub policy: RetryPolicy,
    pub references: &'a [Utf8PathBuf],
    pub viewport: Viewport,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RestyleResult {
    pub success: bool,
    pub attempts: u32,
    pub cost: f64,
    pub error: Option<String>,
}

impl PipelineHandle {
    /// Edit `job.base` with the anchor references until an image is stored.
    ///
    /// Failures (terminal ones included) are recorded in the result, never
    /// returned, so one item cannot abort its batch.
    pub(crate) async fn restyle(&self, job: RestyleJob<'_>) -> RestyleResult {
        let RestyleJob {
            item,
            base,
            output,
            strength,
            mut ladder,
            policy,
            references,
            viewport,
        } = job;
        let backend = self.backend();
        let options = self.generation_options(viewport);
        let refs: Vec<ImageRef> = references.iter().cloned().map(ImageRef::Path).collect();

        let (result, log) = call_with_retry(
            &item,
            &policy,
            self.costs(),
            &mut ladder,
            move |prompt| {
                backend.edit(EditRequest::new(
                    prompt,
                    ImageRef::Path(base.clone()),
                    refs.clone(),
                    strength,
                    options.clone(),
                ))
            },
            |out, _| store_first_image(out, &output),
        )
        .await;

        RestyleResult {
            success: result.is_ok(),
            attempts: log.attempts,
            cost: log.cost,
            error: result.err().map(|f| f.reason()),
        }
    }

    /// Palette and direction for downstream phases: the written style
    /// configuration when anchoring completed, else the config.
    pub(crate) fn load_style(&self) -> Result<StyleContext, ReskinError> {
        match read_report::<StyleConfig>(&self.paths().style_config())? {
            Some(style_config) => Ok(StyleContext::from(&style_config)),
            None => Ok(StyleContext::from_config(self.config())?),
        }
    }

    /// Propagate the style onto every captured screen.
    pub async fn run_propagation(&self) -> Result<PhaseSummary, ReskinError> {
        self.run_propagation_limited(None).await
    }

    /// Propagate at most `max_batches` more batches.
    ///
    /// Stopping early leaves the phase in progress; the next call resumes at
    /// the first uncommitted batch.
    ///
    /// # Errors
    ///
    /// `NoValidatedAnchors` or `MissingInput` before any work, and
    /// `NoSuccessfulScreens` (phase marked failed) when every screen failed.
    pub async fn run_propagation_limited(
        &self,
        max_batches: Option<usize>,
    ) -> Result<PhaseSummary, ReskinError> {
        let phase = PhaseId::Propagation;
        let mut manifest = self.manifest()?;
        let report_path = self.paths().propagation_report();

        if manifest.status(phase) == PhaseStatus::Complete {
            let report: PropagationReport = read_report(&report_path)?.unwrap_or_default();
            return Ok(propagation_summary(&report, PhaseStatus::Complete, report.summary.total)
                .with_detail("already complete"));
        }
        manifest.ensure_can_start(phase)?;

        let anchors = self.validated_anchor_paths()?;
        if anchors.is_empty() {
            return Err(PhaseError::NoValidatedAnchors { phase }.into());
        }
        let captures = CaptureDocument::load(&self.paths().captures())?.ok_or_else(|| {
            PhaseError::MissingInput {
                phase,
                input: "capture document".to_string(),
            }
        })?;
        let audit = AuditDocument::load(&self.paths().audit())?.unwrap_or_default();
        let style = self.load_style()?;

        if manifest.status(phase) == PhaseStatus::Failed {
            manifest.reopen(phase);
        }
        let total = captures.screens.len();
        if manifest.status(phase) != PhaseStatus::InProgress {
            manifest.transition(phase, PhaseStatus::InProgress, PhaseUpdate::total(total))?;
            self.save(&manifest)?;
        }

        let timer = PhaseTimer::start(self.project_id(), phase.as_str());
        let batch_size = self.config().batch_size().max(1);
        let batch_count = total.div_ceil(batch_size);
        let cursor = manifest.phase(phase).batch_cursor;

        let mut report: PropagationReport = read_report(&report_path)?.unwrap_or_default();
        report.screens.retain(|s| s.batch < cursor);

        let viewport = manifest.viewport;
        let mut ran = 0;
        for (batch, chunk) in captures.screens.chunks(batch_size).enumerate().skip(cursor) {
            if max_batches.is_some_and(|max| ran >= max) {
                break;
            }
            debug!(batch, screens = chunk.len(), "Propagating batch");
            let results = join_all(chunk.iter().map(|screen| {
                self.propagate_screen(screen, batch, &style, &audit, &anchors, viewport)
            }))
            .await;
            report.screens.extend(results);
            report.refresh_summary();

            write_report(&report_path, &report)?;
            manifest.checkpoint(phase, batch + 1, report.screens.len())?;
            self.save(&manifest)?;
            info!(
                project_id = %self.project_id(),
                batch = batch + 1,
                of = batch_count,
                succeeded = report.summary.succeeded,
                "Batch committed"
            );
            ran += 1;
        }

        let committed = manifest.phase(phase).batch_cursor;
        if committed < batch_count {
            return Ok(propagation_summary(&report, PhaseStatus::InProgress, total)
                .with_detail(format!("{committed} of {batch_count} batches committed")));
        }

        if report.summary.succeeded == 0 {
            let reason = format!("none of {total} screens propagated");
            manifest.transition(phase, PhaseStatus::Failed, PhaseUpdate::error(reason.clone()))?;
            self.save(&manifest)?;
            timer.fail(&reason);
            return Err(PhaseError::NoSuccessfulScreens { phase }.into());
        }

        manifest.transition(
            phase,
            PhaseStatus::Complete,
            PhaseUpdate::none().with_items_completed(report.screens.len()),
        )?;
        self.save(&manifest)?;
        timer.complete();
        Ok(propagation_summary(&report, PhaseStatus::Complete, total))
    }

    async fn propagate_screen(
        &self,
        screen: &CapturedScreen,
        batch: usize,
        style: &StyleContext,
        audit: &AuditDocument,
        anchors: &[Utf8PathBuf],
        viewport: Viewport,
    ) -> PropagatedScreen {
        let screen_type = classify(screen);
        let improvements = audit.improvements_for(&screen.id);
        let output = self.paths().propagated_screen(&screen.id);
        let prompt = screen_prompt(&screen.name, screen_type, style, &improvements);
        let ladder = EscalationLadder::new(prompt, style);

        let result = self
            .restyle(RestyleJob {
                item: screen.id.clone(),
                base: Utf8PathBuf::from(&screen.source_path),
                output: output.clone(),
                strength: screen_type.strength(),
                ladder,
                policy: self.propagation_policy(),
                references: anchors,
                viewport,
            })
            .await;

        PropagatedScreen {
            screen_id: screen.id.clone(),
            name: screen.name.clone(),
            screen_type,
            original_path: screen.source_path.clone(),
            output_path: self.paths().relative(&output),
            success: result.success,
            attempts: result.attempts,
            cost: result.cost,
            strength: screen_type.strength(),
            improvements,
            error: result.error,
            batch,
        }
    }
}

fn propagation_summary(
    report: &PropagationReport,
    status: PhaseStatus,
    total: usize,
) -> PhaseSummary {
    PhaseSummary {
        items_total: total,
        succeeded: report.summary.succeeded,
        failed: report.summary.failed,
        cost: report.summary.total_cost,
        ..PhaseSummary::new(PhaseId::Propagation, status)
    }
}
