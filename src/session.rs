//! Bar session state machine
//!
//! Idle → Visible → {Processing | Translating | Speaking} → (Result | ErrorFlash) → Idle
//!
//! The phase is a single enum value, so the bar can never be processing,
//! translating and speaking at the same time. [`transition`] is the whole
//! table; the orchestrator owns the only mutable copy.

use crate::input::Point;
use crate::selection::SelectionEvent;
use crate::gesture::GestureKind;
use serde::{Deserialize, Serialize};

/// What produced a result or an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "id", rename_all = "snake_case")]
pub enum Origin {
    Translate,
    Action(String),
}

/// Phase of one bar session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BarPhase {
    /// No bar
    #[default]
    Idle,

    /// Bar shown, nothing running
    Visible,

    /// Custom action running (per-button spinner)
    Processing { action_id: String },

    /// Translation running
    Translating,

    /// Selection being read aloud
    Speaking,

    /// Processed text shown with copy / apply / discard
    Result { text: String, origin: Origin },

    /// Failure shown on the originating button until the flash expires
    ErrorFlash { origin: Origin },
}

/// Inputs to the phase table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// A new selection was accepted
    Show,
    StartAction(String),
    StartTranslate,
    StartSpeaking,
    /// Playback finished or was stopped
    SpeechEnded,
    Succeeded(String),
    Failed,
    /// Work was abandoned without a result (e.g. send not confirmed)
    Cancelled,
    /// Flash an error without running anything (provider unavailable)
    Flash(Origin),
    Dismiss,
}

impl BarPhase {
    /// Check if in idle state
    pub fn is_idle(&self) -> bool {
        matches!(self, BarPhase::Idle)
    }

    /// Check if the busy slot is taken
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            BarPhase::Processing { .. } | BarPhase::Translating | BarPhase::Speaking
        )
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self, BarPhase::Speaking)
    }

    /// Phases from which the user can start something new
    pub fn accepts_picks(&self) -> bool {
        matches!(self, BarPhase::Visible) || self.is_busy()
    }

    pub fn name(&self) -> &'static str {
        match self {
            BarPhase::Idle => "idle",
            BarPhase::Visible => "visible",
            BarPhase::Processing { .. } => "processing",
            BarPhase::Translating => "translating",
            BarPhase::Speaking => "speaking",
            BarPhase::Result { .. } => "result",
            BarPhase::ErrorFlash { .. } => "error",
        }
    }
}

impl std::fmt::Display for BarPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarPhase::Idle => write!(f, "Idle"),
            BarPhase::Visible => write!(f, "Visible"),
            BarPhase::Processing { action_id } => write!(f, "Processing ({})", action_id),
            BarPhase::Translating => write!(f, "Translating"),
            BarPhase::Speaking => write!(f, "Speaking"),
            BarPhase::Result { text, .. } => {
                // Use chars() to handle multi-byte UTF-8 characters
                write!(f, "Result ({} chars)", text.chars().count())
            }
            BarPhase::ErrorFlash { origin } => match origin {
                Origin::Translate => write!(f, "Error (translate)"),
                Origin::Action(id) => write!(f, "Error ({})", id),
            },
        }
    }
}

/// The phase table. `None` means the event does not apply and is ignored.
pub fn transition(phase: &BarPhase, event: PhaseEvent) -> Option<BarPhase> {
    use BarPhase as P;
    use PhaseEvent as E;

    match (phase, event) {
        (_, E::Show) => Some(P::Visible),
        (_, E::Dismiss) => Some(P::Idle),

        (p, E::StartAction(action_id)) if p.accepts_picks() => Some(P::Processing { action_id }),
        (p, E::StartTranslate) if p.accepts_picks() => Some(P::Translating),
        (p, E::StartSpeaking) if p.accepts_picks() && !p.is_speaking() => Some(P::Speaking),
        (p, E::Flash(origin)) if p.accepts_picks() => Some(P::ErrorFlash { origin }),

        (P::Speaking, E::SpeechEnded) => Some(P::Visible),
        (p, E::Cancelled) if p.is_busy() => Some(P::Visible),

        (P::Processing { action_id }, E::Succeeded(text)) => Some(P::Result {
            text,
            origin: Origin::Action(action_id.clone()),
        }),
        (P::Translating, E::Succeeded(text)) => Some(P::Result {
            text,
            origin: Origin::Translate,
        }),
        (P::Processing { action_id }, E::Failed) => Some(P::ErrorFlash {
            origin: Origin::Action(action_id.clone()),
        }),
        (P::Translating, E::Failed) => Some(P::ErrorFlash {
            origin: Origin::Translate,
        }),

        _ => None,
    }
}

/// Live state for one resolved selection
#[derive(Debug, Clone)]
pub struct BarSession {
    pub selection: SelectionEvent,
    pub phase: BarPhase,
}

impl BarSession {
    pub fn new(selection: SelectionEvent) -> Self {
        Self {
            selection,
            phase: BarPhase::Visible,
        }
    }

    /// Apply `event`; returns whether the phase changed
    pub fn apply(&mut self, event: PhaseEvent) -> bool {
        match transition(&self.phase, event) {
            Some(next) => {
                tracing::debug!("Bar: {} -> {}", self.phase, next);
                self.phase = next;
                true
            }
            None => false,
        }
    }
}

/// Kind of a bar button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Builtin,
    Custom,
}

/// One action button as the renderer should draw it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonView {
    pub id: String,
    pub label: String,
    pub kind: ButtonKind,
    /// False when the provider behind it is unavailable
    pub enabled: bool,
}

/// Pending confirmation shown in the bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalView {
    pub id: String,
    pub action_id: String,
    pub prompt: String,
}

/// Immutable projection of the session handed to renderers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarView {
    pub visible: bool,
    pub phase: String,
    pub selected_text: Option<String>,
    pub point: Option<Point>,
    pub gesture: Option<GestureKind>,
    pub processed_text: Option<String>,
    pub active_action_id: Option<String>,
    pub error_action_id: Option<String>,
    pub is_translating: bool,
    pub is_translate_error: bool,
    pub is_speaking: bool,
    pub buttons: Vec<ButtonView>,
    pub approval: Option<ApprovalView>,
}

impl BarView {
    /// View of "no bar"
    pub fn hidden() -> Self {
        Self {
            phase: BarPhase::Idle.name().to_string(),
            ..Default::default()
        }
    }

    pub fn project(
        session: Option<&BarSession>,
        buttons: &[ButtonView],
        approval: Option<ApprovalView>,
    ) -> Self {
        let Some(session) = session else {
            return Self::hidden();
        };
        let phase = &session.phase;

        let (processed_text, active_action_id, error_action_id, is_translate_error) = match phase {
            BarPhase::Processing { action_id } => (None, Some(action_id.clone()), None, false),
            BarPhase::Result { text, .. } => (Some(text.clone()), None, None, false),
            BarPhase::ErrorFlash {
                origin: Origin::Action(id),
            } => (None, None, Some(id.clone()), false),
            BarPhase::ErrorFlash {
                origin: Origin::Translate,
            } => (None, None, None, true),
            _ => (None, None, None, false),
        };

        Self {
            visible: !phase.is_idle(),
            phase: phase.name().to_string(),
            selected_text: Some(session.selection.text().to_string()),
            point: Some(session.selection.point()),
            gesture: Some(session.selection.gesture()),
            processed_text,
            active_action_id,
            error_action_id,
            is_translating: matches!(phase, BarPhase::Translating),
            is_translate_error,
            is_speaking: phase.is_speaking(),
            buttons: buttons.to_vec(),
            approval,
        }
    }

    /// Number of busy flags set (never more than one)
    pub fn busy_flags(&self) -> usize {
        [
            self.active_action_id.is_some(),
            self.is_translating,
            self.is_speaking,
        ]
        .into_iter()
        .filter(|b| *b)
        .count()
    }
}
