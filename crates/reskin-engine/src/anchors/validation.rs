//! Automatic checks an anchor image must pass before a person sees it.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

use reskin_utils::imaging::read_dimensions;
use reskin_utils::types::Viewport;

use super::AnchorType;
use crate::scoring::SimilarityProxy;

pub const MIN_FILE_SIZE: u64 = 10 * 1024;
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Minimum score (0-100) for the image to pass
pub const PASS_SCORE: u32 = 70;
pub const CONSISTENCY_MIN_SIMILARITY: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    FileExists,
    Dimensions,
    FileSize,
    Consistency,
}

impl ValidationCheck {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileExists => "file_exists",
            Self::Dimensions => "dimensions",
            Self::FileSize => "file_size",
            Self::Consistency => "consistency",
        }
    }

    /// Prompt phrase that addresses this check failing.
    #[must_use]
    pub const fn fix_phrase(&self) -> &'static str {
        match self {
            Self::FileExists => "return exactly one complete image",
            Self::Dimensions => "render at the full target viewport resolution",
            Self::FileSize => {
                "render a detailed, full-fidelity image, not a blank or minimal canvas"
            }
            Self::Consistency => {
                "match the reference images exactly in color, corner radius, shadow and typography"
            }
        }
    }
}

impl fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: ValidationCheck,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// round(100 * passed / total)
    pub score: u32,
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    fn from_checks(checks: Vec<CheckResult>) -> Self {
        let total = checks.len().max(1);
        let passed_count = checks.iter().filter(|c| c.passed).count();
        let score = ((passed_count as f64 * 100.0) / total as f64).round() as u32;
        Self {
            score,
            passed: score >= PASS_SCORE,
            checks,
        }
    }

    #[must_use]
    pub fn failed_checks(&self) -> Vec<ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.check)
            .collect()
    }

    #[must_use]
    pub fn fix_phrases(&self) -> Vec<String> {
        self.failed_checks()
            .iter()
            .map(|c| c.fix_phrase().to_string())
            .collect()
    }

    /// `score 50: dimensions (400x300, need 720x450), file_size (...)`
    #[must_use]
    pub fn summary(&self) -> String {
        let failed: Vec<String> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{} ({})", c.check, c.detail))
            .collect();
        if failed.is_empty() {
            format!("score {}", self.score)
        } else {
            format!("score {}: {}", self.score, failed.join(", "))
        }
    }
}

/// Run every check for an anchor of `kind` stored at `path`.
///
/// `references` are the image paths of the anchor's reference set; the
/// consistency check is skipped for the hero.
pub fn prevalidate(
    path: &Utf8Path,
    kind: AnchorType,
    viewport: Viewport,
    references: &[Utf8PathBuf],
    proxy: &dyn SimilarityProxy,
) -> ValidationReport {
    let bytes = std::fs::read(path).ok();
    let mut checks = Vec::with_capacity(4);

    checks.push(CheckResult {
        check: ValidationCheck::FileExists,
        passed: bytes.is_some(),
        detail: if bytes.is_some() {
            "present".to_string()
        } else {
            format!("{path} not found")
        },
    });

    let (min_w, min_h) = viewport.minimum_dimensions();
    let dims = bytes.as_deref().and_then(read_dimensions);
    checks.push(CheckResult {
        check: ValidationCheck::Dimensions,
        passed: dims.is_some_and(|(w, h)| w >= min_w && h >= min_h),
        detail: match dims {
            Some((w, h)) => format!("{w}x{h}, need at least {min_w}x{min_h}"),
            None => "unreadable image header".to_string(),
        },
    });

    let size = bytes.as_ref().map_or(0, |b| b.len() as u64);
    checks.push(CheckResult {
        check: ValidationCheck::FileSize,
        passed: (MIN_FILE_SIZE..=MAX_FILE_SIZE).contains(&size),
        detail: format!("{size} bytes"),
    });

    if kind != AnchorType::Hero {
        let similarity = if bytes.is_some() {
            proxy.similarity(path, references)
        } else {
            0.0
        };
        checks.push(CheckResult {
            check: ValidationCheck::Consistency,
            passed: similarity >= CONSISTENCY_MIN_SIMILARITY,
            detail: format!("similarity {similarity:.0}"),
        });
    }

    ValidationReport::from_checks(checks)
}
