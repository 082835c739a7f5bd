//! reskin - checkpointed screen-redesign pipeline
//!
//! Takes captured screens of an existing application and restyles them through an
//! image-generation service: 14 validated anchor images fix the visual language,
//! propagation applies it to every screen in checkpointed batches, state variants
//! cover loading/empty/error/success, and a bounded coherence loop regenerates the
//! worst outliers.
//!
//! reskin can be used in two ways:
//! - **CLI**: the `reskin` binary
//! - **Library**: drive a project through [`PipelineHandle`]
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! reskin init shop --source-url https://shop.example.test
//! reskin import-captures shop captures/screens.json
//! reskin import-audit shop audit/findings.json
//!
//! # Generate anchors; stops at each validation gate
//! reskin anchor shop
//! reskin gate select shop anchor-01 2
//! reskin gate approve shop anchor-02
//!
//! # Everything that remains, offline
//! reskin run shop --dry-run
//! reskin status shop --json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use reskin::{Config, PipelineHandle};
//!
//! # async fn demo() -> Result<(), reskin::ReskinError> {
//! let handle = PipelineHandle::open("shop", Config::minimal_for_testing())?;
//! handle.init("https://shop.example.test")?;
//! handle.import_captures(Utf8Path::new("captures/screens.json"))?;
//! let report = handle.run().await?;
//! if let Some(halted) = &report.halted {
//!     println!("{}", halted.describe());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Persisted layout
//!
//! Each project lives under `$RESKIN_HOME/projects/<id>/` (default `.reskin`).
//! Reports are written as JCS (RFC 8785) canonical JSON so identical state gives
//! identical bytes.

pub mod cli;

/// Phase identifiers, in pipeline order.
pub use reskin_utils::types::{PhaseId, PhaseStatus, Viewport};

/// Configuration with discovery and precedence: CLI > config file > defaults.
pub use reskin_config::{ApprovalMode, CliArgs, Config, ConfigBuilder};

/// Library-level error type and the CLI exit codes it maps to.
pub use reskin_utils::error::ReskinError;
pub use reskin_utils::exit_codes::ExitCode;

pub use reskin_utils::canonicalization::emit_jcs;

pub use reskin_engine::{
    AnchorSet, AnchoringOutcome, CoherenceOutcome, CoherenceReport, PhaseSummary, PipelineHandle,
    PropagationReport, RunReport, StatesReport,
};
pub use reskin_generation::{GenerationBackend, StubBackend};
pub use reskin_lock::ProjectLock;
pub use reskin_manifest::{GateKind, GateResponse, Manifest, PendingGate};

/// Engine internals: scoring seams, reports and prompts. Not covered by
/// semver stability guarantees.
#[doc(hidden)]
pub mod engine {
    pub use reskin_engine::*;
}
