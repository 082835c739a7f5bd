use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{EnumIter, IntoEnumIterator};

/// Phase identifiers for the redesign pipeline.
///
/// Phases execute in a fixed order; the declaration order of the variants *is* that
/// order, so `Ord` compares pipeline position.
///
/// ```text
/// Capture → Audit → Anchoring → Propagation → States → Coherence → Specs
/// ```
///
/// `Capture`, `Audit` and `Specs` are run by external collaborators; the pipeline only
/// records their outcome. The remaining four are executed by the engine.
///
/// # Example
///
/// ```rust
/// use reskin_utils::types::PhaseId;
///
/// assert_eq!(PhaseId::Anchoring.as_str(), "anchoring");
/// assert!(PhaseId::Audit < PhaseId::Anchoring);
/// assert_eq!(PhaseId::Anchoring.predecessors(), &[PhaseId::Capture, PhaseId::Audit]);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    /// Screen capture (external): produces the ordered screen list.
    Capture,
    /// UX audit (external): produces improvement strings per screen.
    Audit,
    /// Generation and validation of the 14 style anchors.
    Anchoring,
    /// Style transfer onto every captured screen.
    Propagation,
    /// Loading/empty/error/success variants per propagated screen.
    States,
    /// Outlier detection and regeneration passes.
    Coherence,
    /// Documentation export (external, downstream consumer).
    Specs,
}

const ALL_PHASES: [PhaseId; 7] = [
    PhaseId::Capture,
    PhaseId::Audit,
    PhaseId::Anchoring,
    PhaseId::Propagation,
    PhaseId::States,
    PhaseId::Coherence,
    PhaseId::Specs,
];

impl PhaseId {
    /// Canonical lowercase name used in the manifest, reports and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Audit => "audit",
            Self::Anchoring => "anchoring",
            Self::Propagation => "propagation",
            Self::States => "states",
            Self::Coherence => "coherence",
            Self::Specs => "specs",
        }
    }

    /// All phases in pipeline order.
    #[must_use]
    pub const fn all() -> &'static [PhaseId; 7] {
        &ALL_PHASES
    }

    /// Position of this phase in the fixed order (0-based).
    #[must_use]
    pub fn index(&self) -> usize {
        Self::iter().position(|p| p == *self).unwrap_or(0)
    }

    /// Every phase strictly before this one.
    #[must_use]
    pub fn predecessors(&self) -> &'static [PhaseId] {
        &ALL_PHASES[..self.index()]
    }

    /// Whether the phase is executed by the engine rather than recorded from outside.
    #[must_use]
    pub const fn is_core(&self) -> bool {
        matches!(
            self,
            Self::Anchoring | Self::Propagation | Self::States | Self::Coherence
        )
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = Self::iter().map(|p| p.as_str()).collect();
                format!("unknown phase '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Lifecycle status of one phase in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Skipped,
    Failed,
}

impl PhaseStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// `complete` or `skipped`: satisfies a successor's precondition.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target viewport of the redesign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const DESKTOP: Viewport = Viewport {
        width: 1440,
        height: 900,
    };

    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Smallest acceptable generated image: half the viewport on each side.
    #[must_use]
    pub const fn minimum_dimensions(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::DESKTOP
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("viewport '{s}' must look like WIDTHxHEIGHT"))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| format!("viewport width '{w}' is not a number"))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| format!("viewport height '{h}' is not a number"))?;
        if width == 0 || height == 0 {
            return Err(format!("viewport '{s}' must have non-zero dimensions"));
        }
        Ok(Self { width, height })
    }
}

/// Where an effective configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Cli,
    Config,
    Programmatic,
    Default,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Config => "config",
            Self::Programmatic => "programmatic",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
