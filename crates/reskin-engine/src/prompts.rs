//! Prompt templates and the retry escalation ladder.

use crate::anchors::{AnchorType, SlotDef};
use crate::classify::ScreenType;
use crate::states::StateKind;
use crate::style::StyleContext;

/// Prompt text for each attempt of one item.
///
/// Attempt 1 sends the base prompt. Attempt 2 adds hard palette and style
/// constraints. Attempt 3 and later restate everything as mandatory and spell
/// out the fix phrases collected so far.
#[derive(Debug, Clone)]
pub struct EscalationLadder {
    base: String,
    constraints: String,
    fixes: Vec<String>,
}

impl EscalationLadder {
    #[must_use]
    pub fn new(base: impl Into<String>, style: &StyleContext) -> Self {
        Self {
            base: base.into(),
            constraints: style.constraint_line(),
            fixes: Vec::new(),
        }
    }

    /// Seed fix phrases that apply from the first attempt.
    #[must_use]
    pub fn with_fixes<I, S>(mut self, fixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_fixes(fixes);
        self
    }

    pub fn add_fixes<I, S>(&mut self, fixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fix in fixes {
            let fix = fix.into();
            if !fix.trim().is_empty() && !self.fixes.contains(&fix) {
                self.fixes.push(fix);
            }
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn fixes(&self) -> &[String] {
        &self.fixes
    }

    /// Prompt for `attempt` (1-based).
    #[must_use]
    pub fn prompt_for(&self, attempt: u32) -> String {
        let mut prompt = self.base.clone();
        match attempt {
            0 | 1 => {
                if !self.fixes.is_empty() {
                    prompt.push_str("\n\nCorrections: ");
                    prompt.push_str(&self.fixes.join("; "));
                    prompt.push('.');
                }
            }
            2 => {
                prompt.push_str("\n\nHARD CONSTRAINTS: ");
                prompt.push_str(&self.constraints);
                if !self.fixes.is_empty() {
                    prompt.push_str("\nCorrections: ");
                    prompt.push_str(&self.fixes.join("; "));
                    prompt.push('.');
                }
            }
            _ => {
                prompt.push_str("\n\nMANDATORY: ");
                prompt.push_str(&self.constraints);
                for fix in &self.fixes {
                    prompt.push_str("\nMANDATORY FIX: ");
                    prompt.push_str(fix);
                }
            }
        }
        prompt
    }
}

fn anchor_type_guidance(kind: AnchorType) -> &'static str {
    match kind {
        AnchorType::Hero => {
            "This is the defining style reference: a complete, polished application screen that \
                sets color usage, density, typography and component shapes for everything that \
                follows."
        }
        AnchorType::Screen => {
            "Render a full application screen with realistic content and the established layout \
                grid."
        }
        AnchorType::Component => {
            "Render a component sheet on a neutral surface showing every variant and interactive \
                state side by side."
        }
        AnchorType::Typography => {
            "Render a type specimen: headings, body, captions, labels and numerals with sizes and \
                weights annotated."
        }
        AnchorType::State => {
            "Render the interface state within a realistic screen frame so it reads in context."
        }
        AnchorType::Iconography => {
            "Render a grid of interface icons with consistent stroke weight, corner treatment and \
                optical size."
        }
    }
}

/// Base prompt for an anchor slot.
#[must_use]
pub fn anchor_prompt(
    def: &SlotDef,
    style: &StyleContext,
    reference_count: usize,
    feedback: &[String],
) -> String {
    let mut prompt = format!(
        "Design the {} anchor for a {} redesign. {} {}",
        def.name,
        style.direction,
        def.description,
        anchor_type_guidance(def.kind)
    );
    prompt.push_str(&format!(
        "\nPalette: {}. Typography: {}. Corner radius {}, {} shadows, spacing scale {:?} px.",
        style.palette.describe(),
        style.typography,
        style.border_radius,
        style.shadow,
        style.spacing
    ));
    if reference_count > 0 {
        prompt.push_str(&format!(
            "\nMatch the visual language of the {reference_count} reference image(s) exactly: same \
                colors, corner radii, shadows, type and icon style."
        ));
    }
    if !feedback.is_empty() {
        prompt.push_str("\nReviewer feedback to address: ");
        prompt.push_str(&feedback.join("; "));
    }
    prompt
}

fn screen_type_guidance(screen_type: ScreenType) -> &'static str {
    match screen_type {
        ScreenType::Dashboard => {
            "Keep every widget and metric in place; restyle cards, charts and headers."
        }
        ScreenType::List => {
            "Keep row order and columns; restyle rows, headers, filters and pagination."
        }
        ScreenType::Detail => {
            "Keep the information hierarchy; restyle sections, labels and actions."
        }
        ScreenType::Form => {
            "Keep every field, label and its order exactly; restyle inputs, validation and buttons."
        }
        ScreenType::Settings => {
            "Keep every setting and grouping; restyle toggles, sections and navigation."
        }
        ScreenType::Auth => {
            "Keep the fields and flow; restyle the card, inputs and primary action."
        }
        ScreenType::Landing => {
            "Restyle the hero, sections and calls to action with the strongest brand expression."
        }
        ScreenType::Modal => {
            "Keep the dialog content and actions; restyle the overlay, panel and buttons."
        }
        ScreenType::Empty => {
            "Restyle the empty state with an illustration and a clear call to action."
        }
        ScreenType::Error => "Restyle the error message, explanation and recovery action.",
        ScreenType::Generic => "Keep the content and layout; restyle every element consistently.",
    }
}

/// Base prompt for restyling one captured screen.
#[must_use]
pub fn screen_prompt(
    screen_name: &str,
    screen_type: ScreenType,
    style: &StyleContext,
    improvements: &[String],
) -> String {
    let mut prompt = format!(
        "Apply the {} style to this {} screen \"{screen_name}\". {}",
        style.direction,
        screen_type,
        screen_type_guidance(screen_type)
    );
    if !improvements.is_empty() {
        prompt.push_str("\nApply these UX improvements:");
        for item in improvements {
            prompt.push_str("\n- ");
            prompt.push_str(item);
        }
    }
    prompt.push_str("\nUse only the palette: ");
    prompt.push_str(&style.palette.describe());
    prompt.push('.');
    prompt
}

fn state_guidance(state: StateKind) -> &'static str {
    match state {
        StateKind::Loading => {
            "Show the loading state: skeleton placeholders with a subtle shimmer where content \
                will appear."
        }
        StateKind::Empty => {
            "Show the empty state: a friendly illustration, a short explanation and a primary call \
                to action."
        }
        StateKind::Error => {
            "Show the error state: an inline error message near the failed content with a retry \
                affordance."
        }
        StateKind::Success => {
            "Show the success state: a confirmation message with a check mark and the next action."
        }
    }
}

/// Base prompt for one state variant of a propagated screen.
#[must_use]
pub fn state_prompt(screen_name: &str, state: StateKind, style: &StyleContext) -> String {
    format!(
        "Turn the screen \"{screen_name}\" into its {state} variant in the {} style. {} Keep the \
            surrounding layout, navigation and palette ({}) unchanged.",
        style.direction,
        state_guidance(state),
        style.palette.describe()
    )
}
