//! Project manifest for reskin
//!
//! The manifest is the single source of truth for pipeline progress: phase
//! statuses, batch cursors, and the validation gate the pipeline is waiting on.
//! It is an explicit value that callers mutate through the state-machine
//! methods and then persist with [`ManifestStore::save`].

mod model;
mod state_machine;
mod store;

pub use model::{
    Gate, GateKind, GateResponse, MANIFEST_SCHEMA_VERSION, Manifest, PendingGate, PhaseState,
    PhaseUpdate,
};
pub use state_machine::is_legal_transition;
pub use store::ManifestStore;
