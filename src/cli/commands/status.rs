//! Status command implementation
//!
//! Handles `reskin status` and `reskin status --json`. Reads the manifest and
//! the phase reports; never takes the project lock.

use anyhow::Result;
use serde::Serialize;

use super::common::readonly_handle;
use super::json_emit::emit_status_json;

use crate::engine::reports::read_report;
use crate::{
    AnchorSet, CoherenceReport, Config, ExitCode, Manifest, PendingGate, PhaseId, PhaseStatus,
    PipelineHandle, PropagationReport, ProjectLock, StatesReport,
};

/// One phase row of the status output.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseStatusRow {
    pub phase: PhaseId,
    pub status: PhaseStatus,
    pub batch_cursor: usize,
    pub items_completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Generation spend recorded in the phase reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostBreakdown {
    pub anchoring: f64,
    pub propagation: f64,
    pub states: f64,
    pub coherence: f64,
    pub total: f64,
}

/// Output of `reskin status --json`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub project_id: String,
    pub source_url: String,
    pub viewport: String,
    pub total_screens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<PhaseId>,
    pub phases: Vec<PhaseStatusRow>,
    pub validated_anchors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_gate: Option<PendingGate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coherence_score: Option<f64>,
    pub costs: CostBreakdown,
    /// PID of the process holding the project lock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<u32>,
}

/// Execute the status command
pub fn execute_status_command(project_id: &str, json: bool, config: &Config) -> Result<ExitCode> {
    let handle = readonly_handle(project_id, config)?;

    if !handle.paths().manifest().is_file() {
        if json {
            println!("{{}}");
        } else {
            println!("Status for project: {project_id}");
            println!("  Status: No project found");
            println!("  Directory: {} (does not exist)", handle.paths().root());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let output = build_status(&handle)?;
    if json {
        println!("{}", emit_status_json(&output)?);
    } else {
        print_status(&output);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn build_status(handle: &PipelineHandle) -> Result<StatusOutput> {
    let manifest: Manifest = handle.manifest()?;
    let paths = handle.paths();
    let anchors = AnchorSet::load(paths)?;
    let propagation: Option<PropagationReport> = read_report(&paths.propagation_report())?;
    let states: Option<StatesReport> = read_report(&paths.states_report())?;
    let coherence: Option<CoherenceReport> = read_report(&paths.coherence_report())?;

    let mut costs = CostBreakdown {
        anchoring: anchors.anchors.iter().map(|a| a.cost).sum(),
        propagation: propagation.as_ref().map_or(0.0, |r| r.summary.total_cost),
        states: states.as_ref().map_or(0.0, |r| r.summary.total_cost),
        coherence: coherence.as_ref().map_or(0.0, |r| r.total_cost),
        total: 0.0,
    };
    costs.total = costs.anchoring + costs.propagation + costs.states + costs.coherence;

    let phases = PhaseId::all()
        .iter()
        .map(|phase| {
            let state = manifest.phase(*phase);
            PhaseStatusRow {
                phase: *phase,
                status: state.status,
                batch_cursor: state.batch_cursor,
                items_completed: state.items_completed,
                items_total: state.items_total,
                last_error: state.last_error,
            }
        })
        .collect();

    let locked_by = ProjectLock::inspect(paths.root()).ok().flatten().map(|info| info.pid);

    Ok(StatusOutput {
        project_id: manifest.project_id.clone(),
        source_url: manifest.source_url.clone(),
        viewport: manifest.viewport.to_string(),
        total_screens: manifest.total_screens,
        current_phase: manifest.current_phase(),
        phases,
        validated_anchors: anchors.validated_count(),
        pending_gate: manifest.pending_gate,
        coherence_score: coherence.map(|r| r.overall_score),
        costs,
        locked_by,
    })
}

fn print_status(output: &StatusOutput) {
    println!("Status for project: {}", output.project_id);
    if !output.source_url.is_empty() {
        println!("  Source: {}", output.source_url);
    }
    println!("  Viewport: {}", output.viewport);
    println!("  Screens: {}", output.total_screens);
    println!();

    for row in &output.phases {
        let marker = match row.status {
            PhaseStatus::Complete => "✓",
            PhaseStatus::Skipped => "-",
            PhaseStatus::InProgress => "…",
            PhaseStatus::Failed => "✗",
            PhaseStatus::Pending => " ",
        };
        let mut line = format!("  {marker} {:<12} {}", row.phase.as_str(), row.status);
        if let Some(total) = row.items_total {
            line.push_str(&format!(" ({}/{total})", row.items_completed));
        }
        if row.status == PhaseStatus::InProgress && row.batch_cursor > 0 {
            line.push_str(&format!(", {} batches committed", row.batch_cursor));
        }
        println!("{line}");
        if let Some(err) = &row.last_error {
            println!("      Error: {err}");
        }
    }

    println!();
    println!("  Anchors validated: {}/14", output.validated_anchors);
    if let Some(gate) = &output.pending_gate {
        println!("  Pending gate: {} (slot {})", gate.gate_id, gate.slot);
    }
    if let Some(score) = output.coherence_score {
        println!("  Coherence score: {score:.1}");
    }
    println!("  Cost: ${:.2}", output.costs.total);
    if let Some(pid) = output.locked_by {
        println!("  Locked by PID {pid}");
    }
}
