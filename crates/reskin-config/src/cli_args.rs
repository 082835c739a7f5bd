use std::path::PathBuf;

use crate::model::ApprovalMode;

/// Overrides taken from the command line. `None` leaves the file/default value.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub viewport: Option<String>,
    pub batch_size: Option<usize>,
    pub approval_mode: Option<ApprovalMode>,
    pub max_passes: Option<u32>,
    pub threshold: Option<f64>,
    pub budget: Option<u32>,
    /// Use the stub backend instead of the configured provider
    pub dry_run: bool,
}
