//! CLI command implementations (facade).
//!
//! Re-exports the command surface used by `run.rs` and the CLI tests.
//! Implementations live in `commands/*`; every handler returns the exit code
//! for a finished command and leaves error printing to `run.rs`.

mod anchor;
mod common;
mod json_emit;
mod pipeline;
mod project;
mod status;

pub use anchor::{
    GateView, execute_anchor_command, execute_complete_anchoring_command,
    execute_gate_response_command, execute_gate_show_command,
};
pub use pipeline::{
    execute_coherence_command, execute_propagate_command, execute_run_command,
    execute_states_command,
};
pub use project::{
    execute_import_audit_command, execute_import_captures_command, execute_init_command,
    execute_record_command, execute_reopen_command, execute_skip_command,
};
pub use status::{StatusOutput, build_status, execute_status_command};
