//! Anchoring commands
//!
//! `anchor`, the `gate` subcommands and `complete-anchoring`.

use anyhow::Result;
use serde::Serialize;

use super::common::{lock_project, open_handle, readonly_handle, report_anchoring, report_summary};
use super::json_emit::emit_gate_json;

use crate::{AnchorSet, Config, ExitCode, GateKind, GateResponse, PendingGate};

/// Generate and validate anchors until a gate or a failing slot.
pub async fn execute_anchor_command(
    project_id: &str,
    regenerate: Option<u8>,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    if let Some(slot) = regenerate {
        handle.regenerate_anchor(slot)?;
        println!("↻ Slot {slot} invalidated; regenerating");
    }

    let outcome = handle.run_anchoring().await?;
    Ok(report_anchoring(&outcome))
}

/// Pending gate as shown by `reskin gate show --json`.
#[derive(Debug, Serialize)]
pub struct GateView {
    pub project_id: String,
    pub pending_gate: Option<PendingGate>,
    pub validated_anchors: usize,
}

pub fn execute_gate_show_command(
    project_id: &str,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = readonly_handle(project_id, config)?;
    let manifest = handle.manifest()?;
    let set = AnchorSet::load(handle.paths())?;

    let view = GateView {
        project_id: project_id.to_string(),
        pending_gate: manifest.pending_gate,
        validated_anchors: set.validated_count(),
    };

    if json {
        println!("{}", emit_gate_json(&view)?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(gate) = &view.pending_gate else {
        println!(
            "No pending gate for '{project_id}' ({} anchors validated)",
            view.validated_anchors
        );
        return Ok(ExitCode::SUCCESS);
    };

    let slot_name = set.get(gate.slot).map_or("", |a| a.name.as_str());
    println!("Gate {} (slot {} {slot_name})", gate.gate_id, gate.slot);
    println!("  Opened: {}", gate.opened_at.to_rfc3339());
    for (i, candidate) in gate.candidates.iter().enumerate() {
        println!("    {}. {}", i + 1, handle.paths().resolve(candidate));
    }
    match gate.kind {
        GateKind::HeroSelection => {
            println!("\n  Choose: reskin gate select {project_id} {} <N>", gate.gate_id);
        }
        GateKind::AnchorApproval => {
            println!("\n  Approve: reskin gate approve {project_id} {}", gate.gate_id);
            println!(
                "  Reject:  reskin gate reject {project_id} {} --feedback \"...\"",
                gate.gate_id
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Answer the pending gate and continue anchoring.
pub async fn execute_gate_response_command(
    project_id: &str,
    gate_id: &str,
    response: GateResponse,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    println!("✓ Gate {gate_id}: {}", response.describe());
    let outcome = handle.resolve_gate(gate_id, response).await?;
    Ok(report_anchoring(&outcome))
}

pub fn execute_complete_anchoring_command(
    project_id: &str,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    let summary = handle.complete_anchoring()?;
    let code = report_summary(&summary);
    println!("  Style configuration: {}", handle.paths().style_config());
    Ok(code)
}
