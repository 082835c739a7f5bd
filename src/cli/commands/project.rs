//! Project lifecycle commands
//!
//! `init`, the capture and audit imports, `record`, `skip` and `reopen`.

use anyhow::Result;
use std::path::Path;

use super::common::{lock_project, open_handle, utf8_path};

use crate::{Config, ExitCode, PhaseId};

/// Create a project with every phase pending.
pub fn execute_init_command(
    project_id: &str,
    source_url: Option<&str>,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;
    let manifest = handle.init(source_url.unwrap_or_default())?;

    println!("✓ Initialized project '{project_id}'");
    println!("  Directory: {}", handle.paths().root());
    println!("  Viewport: {}", manifest.viewport);
    println!("\n  Next: reskin import-captures {project_id} <captures.json>");
    Ok(ExitCode::SUCCESS)
}

pub fn execute_import_captures_command(
    project_id: &str,
    document: &Path,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let document = utf8_path(document)?;
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;
    let doc = handle.import_captures(&document)?;

    println!("✓ Imported {} captured screens into '{project_id}'", doc.screens.len());
    Ok(ExitCode::SUCCESS)
}

pub fn execute_import_audit_command(
    project_id: &str,
    document: &Path,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let document = utf8_path(document)?;
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;
    let doc = handle.import_audit(&document)?;

    println!(
        "✓ Imported audit for {} screens ({} global improvements)",
        doc.screens.len(),
        doc.global.len()
    );
    Ok(ExitCode::SUCCESS)
}

pub fn execute_record_command(
    project_id: &str,
    phase: PhaseId,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;
    handle.record_external(phase)?;

    println!("✓ Recorded {phase} as complete");
    Ok(ExitCode::SUCCESS)
}

pub fn execute_skip_command(
    project_id: &str,
    phase: PhaseId,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;
    handle.skip(phase)?;

    println!("✓ Skipped {phase}");
    Ok(ExitCode::SUCCESS)
}

pub fn execute_reopen_command(
    project_id: &str,
    phase: PhaseId,
    force: bool,
    config: &Config,
) -> Result<ExitCode> {
    let handle = open_handle(project_id, config)?;
    let _lock = lock_project(&handle, force, config)?;
    let manifest = handle.reopen(phase)?;

    let reset: Vec<&str> = PhaseId::all()
        .iter()
        .filter(|p| p.index() >= phase.index())
        .map(PhaseId::as_str)
        .collect();
    println!("✓ Reopened {}", reset.join(", "));
    if let Some(current) = manifest.current_phase() {
        println!("  Current phase: {current}");
    }
    Ok(ExitCode::SUCCESS)
}
