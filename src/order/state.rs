//! Order state machine steps: which answer the conversation is waiting for.

use serde::{Deserialize, Serialize};

/// The steps of the order conversation.
///
/// Linear: AwaitingMaterial → AwaitingSize → AwaitingFormat → AwaitingFont →
/// AwaitingPersonalText → AwaitingBackground → AwaitingPhoto →
/// AwaitingConfirmation → Completed. Formats without text leave
/// AwaitingFormat straight for AwaitingPhoto or AwaitingConfirmation.
/// Material and size may end the conversation early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStep {
    AwaitingMaterial,
    AwaitingSize,
    AwaitingFormat,
    AwaitingFont,
    AwaitingPersonalText,
    AwaitingBackground,
    AwaitingPhoto,
    AwaitingConfirmation,
    Completed,
}

impl OrderStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OrderStep) -> bool {
        use OrderStep::*;
        matches!(
            (self, target),
            (AwaitingMaterial, AwaitingSize)
                | (AwaitingMaterial, Completed)
                | (AwaitingSize, AwaitingFormat)
                | (AwaitingSize, Completed)
                | (AwaitingFormat, AwaitingFont)
                | (AwaitingFormat, AwaitingPhoto)
                | (AwaitingFormat, AwaitingConfirmation)
                | (AwaitingFont, AwaitingPersonalText)
                | (AwaitingPersonalText, AwaitingBackground)
                | (AwaitingBackground, AwaitingPhoto)
                | (AwaitingPhoto, AwaitingConfirmation)
                | (AwaitingConfirmation, Completed)
        )
    }

    /// Whether the conversation is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for OrderStep {
    fn default() -> Self {
        Self::AwaitingMaterial
    }
}

impl std::fmt::Display for OrderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingMaterial => "awaiting_material",
            Self::AwaitingSize => "awaiting_size",
            Self::AwaitingFormat => "awaiting_format",
            Self::AwaitingFont => "awaiting_font",
            Self::AwaitingPersonalText => "awaiting_personal_text",
            Self::AwaitingBackground => "awaiting_background",
            Self::AwaitingPhoto => "awaiting_photo",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}
