//! Batched phase commands and `run`
//!
//! Each command holds the project lock for its whole duration; batches already
//! committed by an interrupted command are not redone.

use anyhow::Result;

use super::common::{lock_project, open_handle, report_anchoring, report_summary};

use crate::{Config, ExitCode};

pub async fn execute_propagate_command(
    project_id: &str,
    max_batches: Option<usize>,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    let summary = handle.run_propagation_limited(max_batches).await?;
    let code = report_summary(&summary);
    println!("  Report: {}", handle.paths().propagation_report());
    Ok(code)
}

pub async fn execute_states_command(
    project_id: &str,
    max_batches: Option<usize>,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    let summary = handle.run_states_limited(max_batches).await?;
    let code = report_summary(&summary);
    println!("  Report: {}", handle.paths().states_report());
    Ok(code)
}

pub async fn execute_coherence_command(
    project_id: &str,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    let report = handle.run_coherence().await?;
    let code = report_summary(&report.summary());
    for pass in &report.passes {
        println!(
            "  pass {}: score {:.1}, {} outliers, {} regenerated",
            pass.pass,
            pass.overall_score,
            pass.outliers.len(),
            pass.regenerated
        );
    }
    if !report.unresolved.is_empty() {
        let ids: Vec<&str> = report.unresolved.iter().map(|o| o.item_id.as_str()).collect();
        println!("  Unresolved: {}", ids.join(", "));
    }
    println!("  Report: {}", handle.paths().coherence_report());
    Ok(code)
}

/// Run every remaining core phase in order.
pub async fn execute_run_command(
    project_id: &str,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;

    let report = handle.run().await?;
    let mut code = ExitCode::SUCCESS;
    for summary in &report.summaries {
        let phase_code = report_summary(summary);
        if !phase_code.is_success() {
            code = phase_code;
        }
    }
    if let Some(halted) = &report.halted {
        code = report_anchoring(halted);
    }
    if code.is_success() && report.summaries.is_empty() && report.halted.is_none() {
        println!("✓ Nothing to do: every core phase is settled");
    }
    Ok(code)
}
