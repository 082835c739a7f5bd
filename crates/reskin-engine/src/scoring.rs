//! Deviation scoring for the coherence loop.
//!
//! Scoring is pluggable: [`DeviationScorer`] rates one generated item against
//! the validated anchors, and [`SimilarityProxy`] supplies the file-level
//! similarity both the scorer and anchor pre-validation use. The defaults are
//! heuristics over attempt counts, edit strengths and file statistics; they
//! are not a pixel comparison.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use reskin_utils::imaging::read_dimensions;

use crate::classify::ScreenType;
use crate::states::StateKind;

/// Strength the variance term is measured against
pub const NEUTRAL_STRENGTH: f64 = 0.60;
const RETRY_PENALTY_PER_ATTEMPT: f64 = 10.0;
const RETRY_PENALTY_CAP: f64 = 30.0;

/// Similarity of a candidate image to a set of references, 0-100.
pub trait SimilarityProxy: Send + Sync {
    fn similarity(&self, candidate: &Utf8Path, references: &[Utf8PathBuf]) -> f64;
}

/// Compares file sizes: `100 * min/max` of the candidate size and the mean
/// reference size. 100 without references, 0 for an unreadable candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSizeProxy;

impl SimilarityProxy for FileSizeProxy {
    fn similarity(&self, candidate: &Utf8Path, references: &[Utf8PathBuf]) -> f64 {
        let sizes: Vec<f64> = references
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len() as f64)
            .collect();
        if sizes.is_empty() {
            return 100.0;
        }
        let Ok(meta) = std::fs::metadata(candidate) else {
            return 0.0;
        };
        let candidate_size = meta.len() as f64;
        let mean = sizes.iter().sum::<f64>() / sizes.len() as f64;
        let (lo, hi) = if candidate_size < mean {
            (candidate_size, mean)
        } else {
            (mean, candidate_size)
        };
        if hi <= 0.0 { 100.0 } else { 100.0 * lo / hi }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    ColorDrift,
    StyleInconsistency,
    LayoutDeviation,
    ComponentMismatch,
    SpacingVariance,
    TypographyInconsistency,
}

impl OutlierReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ColorDrift => "color_drift",
            Self::StyleInconsistency => "style_inconsistency",
            Self::LayoutDeviation => "layout_deviation",
            Self::ComponentMismatch => "component_mismatch",
            Self::SpacingVariance => "spacing_variance",
            Self::TypographyInconsistency => "typography_inconsistency",
        }
    }

    #[must_use]
    pub const fn fix_phrase(&self) -> &'static str {
        match self {
            Self::ColorDrift => "use the exact palette colors from the reference anchors",
            Self::StyleInconsistency => "match the visual style of the reference anchors exactly",
            Self::LayoutDeviation => "keep the original layout and element positions",
            Self::ComponentMismatch => "use the same button, card and input designs as the anchors",
            Self::SpacingVariance => "follow the spacing scale and render at the target viewport",
            Self::TypographyInconsistency => "use the anchor type scale, fonts and weights",
        }
    }
}

impl fmt::Display for OutlierReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated screen or state variant under review.
#[derive(Debug, Clone, PartialEq)]
pub struct CoherenceItem {
    /// `<screen>` or `<screen>-<state>`
    pub item_id: String,
    pub screen_id: String,
    pub state: Option<StateKind>,
    pub screen_type: ScreenType,
    pub path: Utf8PathBuf,
    pub success: bool,
    pub attempts: u32,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviationAssessment {
    /// 0-100, higher is worse
    pub score: f64,
    pub reasons: Vec<OutlierReason>,
    pub recommendations: Vec<String>,
}

impl DeviationAssessment {
    #[must_use]
    pub fn new(score: f64, mut reasons: Vec<OutlierReason>) -> Self {
        reasons.sort();
        reasons.dedup();
        let recommendations = reasons.iter().map(|r| r.fix_phrase().to_string()).collect();
        Self {
            score: score.clamp(0.0, 100.0),
            reasons,
            recommendations,
        }
    }
}

/// Rates how far one item deviates from the anchor set.
pub trait DeviationScorer: Send + Sync {
    /// `anchors` are the image paths of the validated anchors.
    fn assess(&self, item: &CoherenceItem, anchors: &[Utf8PathBuf]) -> DeviationAssessment;
}

/// Default scorer.
///
/// `(retry penalty + strength variance + proxy deviation) * type multiplier`,
/// clamped to 0-100, where the retry penalty is 10 per extra attempt (cap 30),
/// the variance is `|strength - 0.60| * 100` and the proxy deviation is
/// `(100 - similarity) * 0.5`. Failed items score 100.
pub struct HeuristicScorer {
    proxy: Arc<dyn SimilarityProxy>,
}

impl HeuristicScorer {
    #[must_use]
    pub fn new(proxy: Arc<dyn SimilarityProxy>) -> Self {
        Self { proxy }
    }
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new(Arc::new(FileSizeProxy))
    }
}

impl DeviationScorer for HeuristicScorer {
    fn assess(&self, item: &CoherenceItem, anchors: &[Utf8PathBuf]) -> DeviationAssessment {
        if !item.success || !item.path.is_file() {
            return DeviationAssessment::new(100.0, vec![OutlierReason::StyleInconsistency]);
        }

        let retry_penalty = (f64::from(item.attempts.saturating_sub(1)) * RETRY_PENALTY_PER_ATTEMPT)
            .min(RETRY_PENALTY_CAP);
        let strength_variance = (item.strength - NEUTRAL_STRENGTH).abs() * 100.0;
        let proxy_deviation = (100.0 - self.proxy.similarity(&item.path, anchors)) * 0.5;
        let score = (retry_penalty + strength_variance + proxy_deviation)
            * item.screen_type.deviation_multiplier();

        let mut reasons = Vec::new();
        if proxy_deviation >= 20.0 {
            reasons.push(OutlierReason::ColorDrift);
            reasons.push(OutlierReason::StyleInconsistency);
        }
        if proxy_deviation >= 35.0 {
            reasons.push(OutlierReason::TypographyInconsistency);
        }
        if retry_penalty >= 20.0 {
            reasons.push(OutlierReason::ComponentMismatch);
        }
        if strength_variance >= 10.0 {
            reasons.push(OutlierReason::LayoutDeviation);
        }
        if dimensions_differ(&item.path, anchors) {
            reasons.push(OutlierReason::SpacingVariance);
        }
        DeviationAssessment::new(score, reasons)
    }
}

fn dimensions_differ(candidate: &Utf8Path, anchors: &[Utf8PathBuf]) -> bool {
    let dims = |p: &Utf8Path| std::fs::read(p).ok().and_then(|b| read_dimensions(&b));
    let Some(reference) = anchors.first().and_then(|p| dims(p.as_path())) else {
        return false;
    };
    dims(candidate).is_some_and(|d| d != reference)
}
