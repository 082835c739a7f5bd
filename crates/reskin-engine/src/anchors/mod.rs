//! The fourteen style anchors and the progressive reference rule.
//!
//! Slot 1 (hero) is generated from text alone. Every later slot is an edit of
//! the hero guided by the validated anchors in lower slots, so references only
//! ever accumulate.

mod engine;
mod validation;

pub use engine::AnchoringOutcome;
pub use validation::{
    CONSISTENCY_MIN_SIMILARITY, CheckResult, MAX_FILE_SIZE, MIN_FILE_SIZE, PASS_SCORE,
    ValidationCheck, ValidationReport, prevalidate,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use reskin_generation::MAX_REFERENCES;
use reskin_utils::atomic_write::write_file_atomic;
use reskin_utils::error::ReskinError;
use reskin_utils::paths::ProjectPaths;

pub const SLOT_COUNT: usize = 14;
pub const HERO_SLOT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorType {
    Hero,
    Screen,
    Component,
    Typography,
    State,
    Iconography,
}

impl AnchorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Screen => "screen",
            Self::Component => "component",
            Self::Typography => "typography",
            Self::State => "state",
            Self::Iconography => "iconography",
        }
    }

    #[must_use]
    pub const fn strength(&self) -> f64 {
        match self {
            Self::Hero => 0.70,
            Self::Screen => 0.65,
            Self::Iconography => 0.60,
            Self::Typography | Self::State => 0.55,
            Self::Component => 0.50,
        }
    }
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed definition of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDef {
    pub slot: u8,
    pub kind: AnchorType,
    pub name: &'static str,
    pub description: &'static str,
}

pub const SLOTS: [SlotDef; SLOT_COUNT] = [
    SlotDef {
        slot: 1,
        kind: AnchorType::Hero,
        name: "hero",
        description: "The flagship screen of the product in the new style.",
    },
    SlotDef {
        slot: 2,
        kind: AnchorType::Screen,
        name: "dashboard",
        description: "A dashboard with summary metrics, a chart and a recent-activity panel.",
    },
    SlotDef {
        slot: 3,
        kind: AnchorType::Screen,
        name: "list-view",
        description: "A data list with a toolbar, filters, rows and pagination.",
    },
    SlotDef {
        slot: 4,
        kind: AnchorType::Screen,
        name: "detail-view",
        description: "A record detail page with header, sections and related items.",
    },
    SlotDef {
        slot: 5,
        kind: AnchorType::Screen,
        name: "form",
        description: "A multi-field form with labels, help text, validation and actions.",
    },
    SlotDef {
        slot: 6,
        kind: AnchorType::Component,
        name: "buttons",
        description: "Primary, secondary, tertiary and destructive buttons in every size and \
            state.",
    },
    SlotDef {
        slot: 7,
        kind: AnchorType::Component,
        name: "form-controls",
        description: "Text inputs, selects, checkboxes, radios, toggles and sliders with focus and \
            error states.",
    },
    SlotDef {
        slot: 8,
        kind: AnchorType::Component,
        name: "cards",
        description: "Content, metric and media cards with headers, footers and actions.",
    },
    SlotDef {
        slot: 9,
        kind: AnchorType::Component,
        name: "navigation",
        description: "Top bar, sidebar, tabs, breadcrumbs and pagination.",
    },
    SlotDef {
        slot: 10,
        kind: AnchorType::Typography,
        name: "type-scale",
        description: "The full type scale from display heading to caption.",
    },
    SlotDef {
        slot: 11,
        kind: AnchorType::State,
        name: "loading-state",
        description: "Skeleton loaders and spinners inside a content area.",
    },
    SlotDef {
        slot: 12,
        kind: AnchorType::State,
        name: "empty-state",
        description: "An empty collection with illustration, message and call to action.",
    },
    SlotDef {
        slot: 13,
        kind: AnchorType::State,
        name: "error-state",
        description: "An inline error banner and a failed-load panel with retry.",
    },
    SlotDef {
        slot: 14,
        kind: AnchorType::Iconography,
        name: "icon-set",
        description: "Twenty-four interface icons covering navigation, actions and status.",
    },
];

#[must_use]
pub fn slot_def(slot: u8) -> Option<&'static SlotDef> {
    SLOTS.iter().find(|d| d.slot == slot)
}

/// One anchor slot and everything known about its current image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub slot: u8,
    pub kind: AnchorType,
    pub name: String,
    pub description: String,
    /// Relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validation: Option<ValidationReport>,
    /// Reviewer feedback, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub needs_regeneration: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_checks: Vec<ValidationCheck>,
}

impl Anchor {
    #[must_use]
    pub fn from_def(def: &SlotDef) -> Self {
        Self {
            slot: def.slot,
            kind: def.kind,
            name: def.name.to_string(),
            description: def.description.to_string(),
            image_path: None,
            validated: false,
            validated_at: None,
            prompt: None,
            attempts: 0,
            cost: 0.0,
            last_validation: None,
            feedback: Vec::new(),
            needs_regeneration: false,
            failed_checks: Vec::new(),
        }
    }

    pub fn mark_validated(&mut self) {
        self.validated = true;
        self.validated_at = Some(Utc::now());
        self.needs_regeneration = false;
        self.failed_checks.clear();
    }

    /// Drop validation so the slot is generated again.
    pub fn invalidate(&mut self) {
        self.validated = false;
        self.validated_at = None;
    }
}

/// All fourteen slots, persisted as `anchors/anchors.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSet {
    pub anchors: Vec<Anchor>,
}

impl Default for AnchorSet {
    fn default() -> Self {
        Self {
            anchors: SLOTS.iter().map(Anchor::from_def).collect(),
        }
    }
}

impl AnchorSet {
    /// Load the record, or a fresh set when none exists yet.
    pub fn load(paths: &ProjectPaths) -> Result<Self, ReskinError> {
        let path = paths.anchors_record();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let set: Self =
                    serde_json::from_str(&content).map_err(|e| ReskinError::corrupted(&path, e))?;
                if set.anchors.len() != SLOT_COUNT {
                    return Err(ReskinError::corrupted(
                        &path,
                        format!("lists {} anchors, expected {SLOT_COUNT}", set.anchors.len()),
                    ));
                }
                Ok(set)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ReskinError::Io(e)),
        }
    }

    pub fn save(&self, paths: &ProjectPaths) -> Result<(), ReskinError> {
        let path = paths.anchors_record();
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| ReskinError::serialization("anchor record", e))?;
        json.push('\n');
        write_file_atomic(&path, &json).map_err(|e| ReskinError::write_failed(&path, &e))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, slot: u8) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.slot == slot)
    }

    pub fn get_mut(&mut self, slot: u8) -> Option<&mut Anchor> {
        self.anchors.iter_mut().find(|a| a.slot == slot)
    }

    pub fn validated(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter().filter(|a| a.validated)
    }

    #[must_use]
    pub fn validated_count(&self) -> usize {
        self.validated().count()
    }

    #[must_use]
    pub fn unvalidated_slots(&self) -> Vec<u8> {
        self.anchors
            .iter()
            .filter(|a| !a.validated)
            .map(|a| a.slot)
            .collect()
    }

    /// Lowest slot still waiting for a validated image.
    #[must_use]
    pub fn next_unvalidated(&self) -> Option<u8> {
        self.unvalidated_slots().into_iter().min()
    }

    /// Validated anchors with a lower slot than `slot`, at most
    /// [`MAX_REFERENCES`]. Empty for the hero.
    #[must_use]
    pub fn reference_set(&self, slot: u8) -> Vec<&Anchor> {
        let mut refs: Vec<&Anchor> = self
            .validated()
            .filter(|a| a.slot < slot && a.image_path.is_some())
            .collect();
        refs.sort_by_key(|a| a.slot);
        refs.truncate(MAX_REFERENCES);
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn validate(set: &mut AnchorSet, slot: u8) {
        let anchor = set.get_mut(slot).unwrap();
        anchor.image_path = Some(format!("anchors/slot-{slot:02}-{}.png", anchor.name));
        anchor.mark_validated();
    }

    #[test]
    fn test_slot_table() {
        assert_eq!(SLOTS.len(), 14);
        for (i, def) in SLOTS.iter().enumerate() {
            assert_eq!(usize::from(def.slot), i + 1);
        }
        assert_eq!(slot_def(1).unwrap().kind, AnchorType::Hero);
        assert_eq!(slot_def(7).unwrap().name, "form-controls");
        assert_eq!(slot_def(14).unwrap().kind, AnchorType::Iconography);
        assert!(slot_def(0).is_none());
        assert!(slot_def(15).is_none());
    }

    #[test]
    fn test_strengths() {
        assert_eq!(AnchorType::Hero.strength(), 0.70);
        assert_eq!(AnchorType::Screen.strength(), 0.65);
        assert_eq!(AnchorType::Iconography.strength(), 0.60);
        assert_eq!(AnchorType::Component.strength(), 0.50);
        assert_eq!(AnchorType::Typography.strength(), 0.55);
        assert_eq!(AnchorType::State.strength(), 0.55);
    }

    #[test]
    fn test_hero_has_no_references() {
        let mut set = AnchorSet::default();
        assert!(set.reference_set(1).is_empty());
        validate(&mut set, 1);
        assert!(set.reference_set(1).is_empty());
        assert_eq!(set.reference_set(2).len(), 1);
    }

    #[test]
    fn test_unvalidated_anchors_are_not_references() {
        let mut set = AnchorSet::default();
        validate(&mut set, 1);
        validate(&mut set, 3);
        let refs: Vec<u8> = set.reference_set(5).iter().map(|a| a.slot).collect();
        assert_eq!(refs, vec![1, 3]);
        assert_eq!(set.next_unvalidated(), Some(2));
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let paths = ProjectPaths::new(root);
        assert_eq!(AnchorSet::load(&paths).unwrap(), AnchorSet::default());

        let mut set = AnchorSet::default();
        validate(&mut set, 1);
        set.get_mut(2).unwrap().feedback.push("more contrast".to_string());
        set.save(&paths).unwrap();
        assert_eq!(AnchorSet::load(&paths).unwrap(), set);
    }

    proptest! {
        #[test]
        fn prop_references_are_validated_and_lower(
            validated in proptest::collection::btree_set(1u8..=14, 0..=14),
            slot in 1u8..=14,
        ) {
            let mut set = AnchorSet::default();
            for s in &validated {
                validate(&mut set, *s);
            }
            let refs = set.reference_set(slot);
            prop_assert!(refs.len() <= MAX_REFERENCES);
            prop_assert!(refs.iter().all(|a| a.validated && a.slot < slot));
            let expected = validated.iter().filter(|s| **s < slot).count();
            prop_assert_eq!(refs.len(), expected);
        }

        #[test]
        fn prop_references_grow_with_slot(
            validated in proptest::collection::btree_set(1u8..=14, 0..=14),
        ) {
            let mut set = AnchorSet::default();
            for s in &validated {
                validate(&mut set, *s);
            }
            for slot in 2u8..=14 {
                let lower: Vec<u8> = set.reference_set(slot - 1).iter().map(|a| a.slot).collect();
                let upper: Vec<u8> = set.reference_set(slot).iter().map(|a| a.slot).collect();
                prop_assert!(lower.iter().all(|s| upper.contains(s)));
            }
        }
    }

    #[test]
    fn test_damaged_record_is_reported_as_corrupted() {
        let temp = tempfile::TempDir::new().unwrap();
        let paths = ProjectPaths::new(
            camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap(),
        );
        assert_eq!(AnchorSet::load(&paths).unwrap().validated_count(), 0);

        std::fs::create_dir_all(paths.anchors_dir()).unwrap();
        std::fs::write(paths.anchors_record(), "{not json").unwrap();
        let err = AnchorSet::load(&paths).unwrap_err();
        assert!(matches!(err, ReskinError::ArtifactCorrupted { .. }), "{err:?}");

        std::fs::write(paths.anchors_record(), r#"{"anchors": []}"#).unwrap();
        let err = AnchorSet::load(&paths).unwrap_err();
        assert!(err.to_string().contains("lists 0 anchors, expected 14"), "{err}");
    }

    #[test]
    fn test_unwritable_record_is_a_write_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let paths = ProjectPaths::new(
            camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap(),
        );
        // a directory where the record file belongs
        std::fs::create_dir_all(paths.anchors_record()).unwrap();

        let err = AnchorSet::default().save(&paths).unwrap_err();
        assert!(matches!(err, ReskinError::ArtifactWriteFailed { .. }), "{err:?}");
    }
}
