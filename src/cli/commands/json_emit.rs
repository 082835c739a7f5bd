//! JSON emit functions for CLI output
//!
//! CLI JSON is emitted as canonical JSON (JCS, RFC 8785) so identical project
//! state prints identical bytes.

use anyhow::{Context, Result};

use super::anchor::GateView;
use super::status::StatusOutput;
use crate::emit_jcs;

/// Emit status output as canonical JSON
pub fn emit_status_json(output: &StatusOutput) -> Result<String> {
    emit_jcs(output).context("Failed to emit status JSON")
}

/// Emit the pending gate as canonical JSON
pub fn emit_gate_json(view: &GateView) -> Result<String> {
    emit_jcs(view).context("Failed to emit gate JSON")
}
