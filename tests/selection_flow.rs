//! Selection resolution through the public API: desktop tree first, then the
//! synthesized-copy fallback, with the clipboard put back every time.

use hoverbar::clipboard::{
    CaptureSettings, ClipboardBackend, ClipboardCapture, ClipboardEntry, ClipboardSnapshot,
    KeyCombo, KeySynth, SecureInputFlag, SelectionReplacer,
};
use hoverbar::error::ClipboardError;
use hoverbar::gesture::{Gesture, GestureKind};
use hoverbar::input::Point;
use hoverbar::probe::{
    AccessibilityTextProbe, AccessibilityTree, AppInfo, ElementInfo, ElementRef, Role,
};
use hoverbar::selection::SelectionDetectionEngine;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const OWN_PID: u32 = 100;
const APP_PID: u32 = 200;

/// One focused text area in another app
struct Tree {
    app_id: &'static str,
    selection: Option<String>,
    /// Fingerprint of the primary selection
    stamp: Option<u64>,
    secure: bool,
}

#[async_trait::async_trait]
impl AccessibilityTree for Tree {
    async fn is_trusted(&self, _prompt: bool) -> bool {
        true
    }

    async fn frontmost_app(&self) -> Option<AppInfo> {
        Some(AppInfo {
            app_id: self.app_id.to_string(),
            pid: APP_PID,
        })
    }

    async fn focused_element(&self) -> Option<ElementRef> {
        Some(ElementRef(1))
    }

    async fn element_at(&self, _point: Point) -> Option<ElementRef> {
        Some(ElementRef(1))
    }

    async fn element_info(&self, _element: ElementRef) -> Option<ElementInfo> {
        let mut info = ElementInfo::new(Role::TextArea);
        info.selected_text = self.selection.clone();
        info.value_settable = true;
        info.pid = Some(APP_PID);
        Some(info)
    }

    async fn parent(&self, _element: ElementRef) -> Option<ElementRef> {
        None
    }

    async fn selection_stamp(&self) -> Option<u64> {
        self.stamp
    }

    async fn window_origin(&self, _pid: u32) -> Option<Point> {
        None
    }

    async fn is_secure_input_active(&self) -> bool {
        self.secure
    }
}

#[derive(Default)]
struct Clipboard {
    entries: Mutex<Vec<ClipboardEntry>>,
    changes: Mutex<u64>,
}

impl Clipboard {
    fn holding(entries: Vec<ClipboardEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(entries),
            changes: Mutex::new(0),
        })
    }

    fn contents(&self) -> Vec<ClipboardEntry> {
        self.entries.lock().unwrap().clone()
    }

    fn set(&self, entries: Vec<ClipboardEntry>) {
        *self.entries.lock().unwrap() = entries;
        *self.changes.lock().unwrap() += 1;
    }
}

#[async_trait::async_trait]
impl ClipboardBackend for Clipboard {
    async fn change_count(&self) -> Result<u64, ClipboardError> {
        Ok(*self.changes.lock().unwrap())
    }

    async fn snapshot(&self) -> Result<ClipboardSnapshot, ClipboardError> {
        Ok(ClipboardSnapshot {
            entries: self.contents(),
            change_count: *self.changes.lock().unwrap(),
        })
    }

    async fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<(), ClipboardError> {
        self.set(snapshot.entries.clone());
        Ok(())
    }

    async fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        Ok(self
            .contents()
            .into_iter()
            .find(|e| e.format.starts_with("text/plain"))
            .map(|e| String::from_utf8_lossy(&e.bytes).to_string()))
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.set(vec![text_entry(text)]);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// The focused app: copies its selection, records what gets pasted
struct App {
    clipboard: Arc<Clipboard>,
    selection: Option<String>,
    sent: Mutex<Vec<KeyCombo>>,
    pasted: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl KeySynth for App {
    async fn send(&self, combo: KeyCombo) -> Result<(), ClipboardError> {
        self.sent.lock().unwrap().push(combo);
        match combo {
            KeyCombo::Copy | KeyCombo::TerminalCopy => {
                if let Some(text) = &self.selection {
                    self.clipboard.set(vec![text_entry(text)]);
                }
            }
            KeyCombo::Paste => {
                let text = self.clipboard.read_text().await?.unwrap_or_default();
                self.pasted.lock().unwrap().push(text);
            }
            KeyCombo::Cut => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "app"
    }
}

struct Secure(bool);

#[async_trait::async_trait]
impl SecureInputFlag for Secure {
    async fn is_active(&self) -> bool {
        self.0
    }
}

fn text_entry(text: &str) -> ClipboardEntry {
    ClipboardEntry {
        format: "text/plain;charset=utf-8".to_string(),
        bytes: text.as_bytes().to_vec(),
    }
}

fn user_clipboard() -> Vec<ClipboardEntry> {
    vec![
        text_entry("user's own clipboard"),
        ClipboardEntry {
            format: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        },
    ]
}

struct World {
    engine: SelectionDetectionEngine<Tree>,
    capture: Arc<ClipboardCapture>,
    clipboard: Arc<Clipboard>,
    app: Arc<App>,
}

fn world(tree_selection: Option<&str>, app_selection: Option<&str>, secure: bool) -> World {
    world_in(EDITOR, tree_selection, app_selection, None, secure)
}

const EDITOR: &str = "org.example.editor";

fn world_in(
    app_id: &'static str,
    tree_selection: Option<&str>,
    app_selection: Option<&str>,
    stamp: Option<u64>,
    secure: bool,
) -> World {
    let clipboard = Clipboard::holding(user_clipboard());
    let app = Arc::new(App {
        clipboard: clipboard.clone(),
        selection: app_selection.map(str::to_string),
        sent: Mutex::new(Vec::new()),
        pasted: Mutex::new(Vec::new()),
    });
    let capture = Arc::new(ClipboardCapture::new(
        clipboard.clone(),
        app.clone(),
        Arc::new(Secure(secure)),
        CaptureSettings {
            poll_attempts: 3,
            poll_interval: Duration::from_millis(10),
            paste_settle: Duration::from_millis(5),
        },
    ));
    let probe = Arc::new(AccessibilityTextProbe::with_pid(
        Tree {
            app_id,
            selection: tree_selection.map(str::to_string),
            stamp,
            secure,
        },
        8,
        OWN_PID,
    ));
    let engine = SelectionDetectionEngine::new(probe, Some(capture.clone()), 3)
        .with_terminal_apps(&["foot".to_string(), "Alacritty".to_string()]);

    World {
        engine,
        capture,
        clipboard,
        app,
    }
}

fn gesture(kind: GestureKind) -> Gesture {
    Gesture {
        kind,
        location: Point::new(40.0, 60.0),
        window_moved: false,
        selection_stamp: None,
    }
}

#[tokio::test]
async fn tree_selection_never_touches_the_clipboard() {
    let w = world(Some("  selected in the tree  "), Some("ignored"), false);

    let event = w.engine.resolve(gesture(GestureKind::Drag)).await.unwrap();
    assert_eq!(event.text(), "selected in the tree");
    assert_eq!(event.gesture(), GestureKind::Drag);
    assert!(w.app.sent.lock().unwrap().is_empty());
    assert_eq!(w.clipboard.contents(), user_clipboard());
}

#[tokio::test]
async fn copy_fallback_restores_every_entry() {
    let w = world(None, Some("copied from a web view"), false);

    let event = w
        .engine
        .resolve(gesture(GestureKind::MultiClick))
        .await
        .unwrap();
    assert_eq!(event.text(), "copied from a web view");
    assert_eq!(*w.app.sent.lock().unwrap(), vec![KeyCombo::Copy]);
    assert_eq!(w.clipboard.contents(), user_clipboard());
}

#[tokio::test]
async fn nothing_selected_is_a_silent_miss() {
    let w = world(None, None, false);

    assert!(w.engine.resolve(gesture(GestureKind::SelectAll)).await.is_none());
    assert_eq!(w.clipboard.contents(), user_clipboard());
}

#[tokio::test]
async fn secure_input_blocks_synthesized_copy() {
    let w = world(None, Some("password"), true);

    assert!(w.engine.resolve(gesture(GestureKind::Manual)).await.is_none());
    assert!(w.app.sent.lock().unwrap().is_empty());
    assert_eq!(w.clipboard.contents(), user_clipboard());
}

#[tokio::test]
async fn window_drag_skips_the_fallback() {
    let w = world(None, Some("title bar text"), false);
    let drag = Gesture {
        window_moved: true,
        ..gesture(GestureKind::Drag)
    };

    assert!(w.engine.resolve(drag).await.is_none());
    assert!(w.app.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn short_drag_selection_is_rejected() {
    let w = world(Some("ab"), Some("ab"), false);

    assert!(w.engine.resolve(gesture(GestureKind::Drag)).await.is_none());
    // A deliberate gesture accepts two characters
    let event = w
        .engine
        .resolve(gesture(GestureKind::MultiClick))
        .await
        .unwrap();
    assert_eq!(event.text(), "ab");
}

#[tokio::test]
async fn single_ideograph_is_enough() {
    let w = world(Some("字"), None, false);

    let event = w.engine.resolve(gesture(GestureKind::Drag)).await.unwrap();
    assert_eq!(event.text(), "字");
}

#[tokio::test]
async fn replacing_the_selection_pastes_then_restores() {
    let w = world(Some("old text"), None, false);

    w.capture.replace_selection("new text").await.unwrap();
    assert_eq!(*w.app.pasted.lock().unwrap(), vec!["new text".to_string()]);
    assert_eq!(w.clipboard.contents(), user_clipboard());
}

#[tokio::test]
async fn leftover_selection_does_not_reopen_the_bar() {
    // "foo bar" was selected earlier; the user now drags a slider
    let w = world_in(EDITOR, Some("foo bar"), None, Some(41), false);
    let drag = Gesture {
        selection_stamp: Some(41),
        ..gesture(GestureKind::Drag)
    };

    assert!(w.engine.resolve(drag).await.is_none());
    assert_eq!(w.clipboard.contents(), user_clipboard());
}

#[tokio::test]
async fn terminals_copy_with_shift() {
    let w = world_in("foot", None, Some("tail -f log"), None, false);

    let event = w
        .engine
        .resolve(gesture(GestureKind::MultiClick))
        .await
        .unwrap();
    assert_eq!(event.text(), "tail -f log");
    let sent = w.app.sent.lock().unwrap().clone();
    assert_eq!(sent, vec![KeyCombo::TerminalCopy]);
    assert!(!sent.contains(&KeyCombo::Copy));
    assert_eq!(w.clipboard.contents(), user_clipboard());
}
