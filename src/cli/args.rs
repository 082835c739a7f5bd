//! CLI argument definitions and parsing structures
//!
//! Defines the `reskin` command line with clap derive: global override flags
//! and one subcommand per pipeline operation.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use reskin_config::ApprovalMode;
use reskin_utils::types::PhaseId;

/// reskin - checkpointed screen-redesign pipeline
#[derive(Parser, Debug)]
#[command(name = "reskin")]
#[command(about = "Restyle captured application screens through an image-generation service")]
#[command(long_about = r#"
reskin takes the captured screens of an existing application and restyles them:
14 validated style anchors fix the visual language, propagation applies it to
every screen in checkpointed batches, state variants cover loading, empty, error
and success, and a bounded coherence loop regenerates the worst outliers.

EXAMPLES:
  # Create a project and import the capture and audit documents
  reskin init shop --source-url https://shop.example.test
  reskin import-captures shop captures/screens.json
  reskin import-audit shop audit/findings.json

  # Generate anchors; stops at each validation gate
  reskin anchor shop
  reskin gate show shop
  reskin gate select shop anchor-01 2
  reskin gate reject shop anchor-03 --feedback "buttons need more contrast"

  # Run everything that remains without calling the provider
  reskin run shop --dry-run

  # Inspect progress
  reskin status shop --json

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .reskin/config.toml
  Use --config to specify an explicit config file path

PHASES:
  capture → audit → anchoring → propagation → states → coherence → specs
  Capture and audit are imported; specs is recorded by downstream tooling.
  Every batch is checkpointed, so an interrupted command resumes where it stopped.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines instead of the compact format
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Take over a project lock held by another process
    #[arg(long, global = true)]
    pub force: bool,

    /// Use the offline stub backend instead of the configured provider
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Target viewport, WIDTHxHEIGHT (e.g. 1440x900)
    #[arg(long, global = true)]
    pub viewport: Option<String>,

    /// Screens per propagation batch
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Gate handling: manual (suspend for a person) or auto (approve pre-validated anchors)
    #[arg(long, global = true)]
    pub approval_mode: Option<ApprovalMode>,

    /// Maximum coherence regeneration passes
    #[arg(long, global = true)]
    pub max_passes: Option<u32>,

    /// Coherence score at which the loop stops
    #[arg(long, global = true)]
    pub threshold: Option<f64>,

    /// Cap on generation calls for this command
    #[arg(long, global = true)]
    pub budget: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new project with every phase pending
    Init {
        /// Project identifier
        id: String,

        /// URL of the application being redesigned
        #[arg(long)]
        source_url: Option<String>,
    },

    /// Import the capture document (ordered screen list) and complete capture
    ImportCaptures {
        /// Project identifier
        id: String,

        /// Path to the capture JSON document
        document: PathBuf,
    },

    /// Import the audit document (improvements per screen) and complete audit
    ImportAudit {
        /// Project identifier
        id: String,

        /// Path to the audit JSON document
        document: PathBuf,
    },

    /// Mark an externally run phase (capture, audit, specs) complete
    Record {
        /// Project identifier
        id: String,

        /// Phase to record
        phase: PhaseId,
    },

    /// Generate and validate anchors until a gate, a failing slot, or all 14 validated
    Anchor {
        /// Project identifier
        id: String,

        /// Invalidate one slot (1-14) and regenerate it
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=14))]
        regenerate: Option<u8>,
    },

    /// Inspect or answer the pending validation gate
    #[command(subcommand)]
    Gate(GateCommands),

    /// Write the style configuration and complete anchoring
    CompleteAnchoring {
        /// Project identifier
        id: String,
    },

    /// Restyle every captured screen in checkpointed batches
    Propagate(BatchedPhaseArgs),

    /// Generate loading, empty, error and success variants of propagated screens
    States(BatchedPhaseArgs),

    /// Score every item and regenerate outliers until coherent or out of passes
    Coherence {
        /// Project identifier
        id: String,
    },

    /// Run every remaining core phase until a gate, a failure, or completion
    Run {
        /// Project identifier
        id: String,
    },

    /// Show project progress
    Status {
        /// Project identifier
        id: String,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Skip a pending phase so later phases may start
    Skip {
        /// Project identifier
        id: String,

        /// Phase to skip
        phase: PhaseId,
    },

    /// Reset a phase and every later phase to pending
    Reopen {
        /// Project identifier
        id: String,

        /// First phase to reset
        phase: PhaseId,
    },
}

#[derive(Args, Debug)]
pub struct BatchedPhaseArgs {
    /// Project identifier
    pub id: String,

    /// Stop after this many batches (the rest resume on the next run)
    #[arg(long)]
    pub max_batches: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum GateCommands {
    /// Show the pending gate and its candidates
    Show {
        /// Project identifier
        id: String,

        /// Output as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Choose a hero candidate (1-based)
    Select {
        /// Project identifier
        id: String,
        /// Gate identifier, e.g. anchor-01
        gate_id: String,
        /// Candidate number
        index: usize,
    },

    /// Approve the anchor under review
    Approve {
        /// Project identifier
        id: String,
        /// Gate identifier, e.g. anchor-05
        gate_id: String,
    },

    /// Reject the anchor under review and regenerate it with feedback
    Reject {
        /// Project identifier
        id: String,
        /// Gate identifier, e.g. anchor-05
        gate_id: String,
        /// What to change in the next attempt
        #[arg(long)]
        feedback: String,
    },
}

impl Commands {
    /// Operation name used in error reports.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::ImportCaptures { .. } => "import-captures",
            Self::ImportAudit { .. } => "import-audit",
            Self::Record { .. } => "record",
            Self::Anchor { .. } => "anchor",
            Self::Gate(_) => "gate",
            Self::CompleteAnchoring { .. } => "complete-anchoring",
            Self::Propagate(_) => "propagate",
            Self::States(_) => "states",
            Self::Coherence { .. } => "coherence",
            Self::Run { .. } => "run",
            Self::Status { .. } => "status",
            Self::Skip { .. } => "skip",
            Self::Reopen { .. } => "reopen",
        }
    }
}

/// Build the clap command (for completions and parser tests).
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
