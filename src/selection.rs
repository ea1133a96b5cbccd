//! Selection resolution
//!
//! Given an accepted gesture, find out what text is selected:
//! 1. nothing if this tool owns the focused element (our own result views)
//! 2. the accessibility probe, unless the selection stamp shows the text was
//!    already selected before the gesture began
//! 3. the synthesized-copy fallback, for explicit gestures and for drags
//!    where the window did not move (Ctrl+Shift+C in terminals)
//!
//! Both strategies apply the same gesture-aware minimum length.

use crate::clipboard::{ClipboardCapture, KeyCombo};
use crate::gesture::{Gesture, GestureKind};
use crate::input::Point;
use crate::probe::{AccessibilityTextProbe, AccessibilityTree};
use serde::Serialize;
use std::sync::Arc;

/// A resolved selection, produced once per accepted gesture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionEvent {
    text: String,
    point: Point,
    gesture: GestureKind,
}

impl SelectionEvent {
    pub fn new(text: impl Into<String>, point: Point, gesture: GestureKind) -> Self {
        Self {
            text: text.into(),
            point,
            gesture,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn gesture(&self) -> GestureKind {
        self.gesture
    }
}

/// CJK ideographs, kana and hangul carry a word in a single character
fn is_ideographic(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // Hiragana, Katakana
        | 0x3100..=0x312F    // Bopomofo
        | 0x3400..=0x4DBF    // CJK Extension A
        | 0x4E00..=0x9FFF    // CJK Unified Ideographs
        | 0xAC00..=0xD7AF    // Hangul syllables
        | 0xF900..=0xFAFF    // CJK Compatibility Ideographs
        | 0x20000..=0x2FA1F  // CJK Extensions B-F, Compatibility Supplement
    )
}

/// Minimum accepted length (in characters) for `text` selected by `kind`
pub fn min_length_for(text: &str, kind: GestureKind, default_min: usize) -> usize {
    if text.chars().any(is_ideographic) {
        1
    } else if kind.is_explicit() {
        2
    } else {
        default_min
    }
}

/// Composes the probe and the clipboard fallback
pub struct SelectionDetectionEngine<T> {
    probe: Arc<AccessibilityTextProbe<T>>,
    capture: Option<Arc<ClipboardCapture>>,
    min_length: usize,
    terminal_apps: Vec<String>,
}

impl<T: AccessibilityTree> SelectionDetectionEngine<T> {
    /// `capture = None` disables the clipboard fallback
    pub fn new(
        probe: Arc<AccessibilityTextProbe<T>>,
        capture: Option<Arc<ClipboardCapture>>,
        min_length: usize,
    ) -> Self {
        Self {
            probe,
            capture,
            min_length: min_length.max(1),
            terminal_apps: Vec::new(),
        }
    }

    /// Apps (case-insensitive) whose copy shortcut is Ctrl+Shift+C
    pub fn with_terminal_apps(mut self, apps: &[String]) -> Self {
        self.terminal_apps = apps.iter().map(|a| a.to_lowercase()).collect();
        self
    }

    pub fn probe(&self) -> &Arc<AccessibilityTextProbe<T>> {
        &self.probe
    }

    /// Resolve the selected text for `gesture`; `None` is a silent miss
    pub async fn resolve(&self, gesture: Gesture) -> Option<SelectionEvent> {
        if self.probe.focus_owned_by_current_process().await {
            tracing::debug!("Focused element belongs to hoverbar, not resolving");
            return None;
        }

        let point = self
            .probe
            .pointer_location()
            .await
            .unwrap_or(gesture.location);

        if let Some(text) = self.probe.selected_text().await {
            if self.predates(&gesture).await {
                tracing::debug!("Selection unchanged since the press, ignoring it");
            } else if self.long_enough(&text, gesture.kind) {
                tracing::debug!("Selection via accessibility ({} chars)", text.chars().count());
                return Some(SelectionEvent::new(text, point, gesture.kind));
            }
            tracing::debug!("Accessibility selection too short");
        }

        if !Self::fallback_allowed(&gesture) {
            tracing::debug!("Clipboard fallback not allowed for {:?}", gesture.kind);
            return None;
        }
        let capture = self.capture.as_ref()?;

        let text = capture.capture_with(self.copy_combo().await).await?;
        if !self.long_enough(&text, gesture.kind) {
            tracing::debug!("Copied selection too short");
            return None;
        }

        tracing::debug!("Selection via clipboard ({} chars)", text.chars().count());
        tracing::trace!("Selected text: {:?}", text);
        Some(SelectionEvent::new(text, point, gesture.kind))
    }

    /// The selection buffer still holds what it held at the press
    async fn predates(&self, gesture: &Gesture) -> bool {
        match gesture.selection_stamp {
            Some(before) => self.probe.selection_stamp().await == Some(before),
            None => false,
        }
    }

    async fn copy_combo(&self) -> KeyCombo {
        match self.probe.frontmost_app().await {
            Some(app) if self.terminal_apps.contains(&app.app_id.to_lowercase()) => {
                KeyCombo::TerminalCopy
            }
            _ => KeyCombo::Copy,
        }
    }

    fn fallback_allowed(gesture: &Gesture) -> bool {
        match gesture.kind {
            GestureKind::MultiClick | GestureKind::SelectAll | GestureKind::Manual => true,
            GestureKind::Drag => !gesture.window_moved,
        }
    }

    fn long_enough(&self, text: &str, kind: GestureKind) -> bool {
        text.chars().count() >= min_length_for(text, kind, self.min_length)
    }
}
