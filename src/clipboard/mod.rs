//! Clipboard capture and replacement
//!
//! When the accessibility probe finds nothing, the selection can still be
//! read by synthesizing a copy and looking at the clipboard. The user's own
//! clipboard must survive that: every capture snapshots all entries first
//! and restores them afterwards, on every exit path.
//!
//! Replacing a selection works the same way with a paste instead of a copy.
//!
//! Backends:
//! - `wayland`: wl-clipboard (`wl-paste` / `wl-copy`)
//! - `keys`: ydotool (uinput) with wtype (virtual keyboard) as fallback.
//!   Both use their own input device, so the user's held modifiers never
//!   leak into the synthesized combo.

pub mod keys;
pub mod wayland;

use crate::error::ClipboardError;
use std::sync::Arc;
use std::time::Duration;

/// One clipboard representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEntry {
    /// MIME type / pasteboard type
    pub format: String,
    pub bytes: Vec<u8>,
}

/// Everything on the clipboard at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    pub entries: Vec<ClipboardEntry>,
    pub change_count: u64,
}

impl ClipboardSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// System clipboard access
#[async_trait::async_trait]
pub trait ClipboardBackend: Send + Sync {
    /// Counter (or fingerprint) that changes whenever the contents change
    async fn change_count(&self) -> Result<u64, ClipboardError>;

    async fn snapshot(&self) -> Result<ClipboardSnapshot, ClipboardError>;

    /// Put `snapshot` back verbatim; an empty snapshot clears the clipboard
    async fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<(), ClipboardError>;

    async fn read_text(&self) -> Result<Option<String>, ClipboardError>;

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Called right before a synthesized copy. Backends whose change counter
    /// is a content fingerprint put a marker on the clipboard here, so copying
    /// text identical to the current contents still registers as a change.
    async fn arm(&self) -> Result<(), ClipboardError> {
        Ok(())
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Key combinations the clipboard layer synthesizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCombo {
    Copy,
    /// Ctrl+Shift+C, for terminals where Ctrl+C is an interrupt
    TerminalCopy,
    Paste,
    Cut,
}

/// Synthesizes key combinations through a private input device
#[async_trait::async_trait]
pub trait KeySynth: Send + Sync {
    async fn send(&self, combo: KeyCombo) -> Result<(), ClipboardError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// OS secure-input state (password field focused)
#[async_trait::async_trait]
pub trait SecureInputFlag: Send + Sync {
    async fn is_active(&self) -> bool;
}

/// Replaces the current selection in the focused app
#[async_trait::async_trait]
pub trait SelectionReplacer: Send + Sync {
    async fn replace_selection(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Timing knobs for capture and replacement
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub paste_settle: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_attempts: 5,
            poll_interval: Duration::from_millis(100),
            paste_settle: Duration::from_millis(150),
        }
    }
}

impl From<&crate::config::SelectionConfig> for CaptureSettings {
    fn from(config: &crate::config::SelectionConfig) -> Self {
        Self {
            poll_attempts: config.poll_attempts.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            paste_settle: Duration::from_millis(config.paste_settle_ms),
        }
    }
}

/// Puts a snapshot back when the operation ends, however it ends.
///
/// The normal path awaits [`RestoreGuard::restore`]. If the owning future is
/// dropped first (task aborted by a newer gesture), `Drop` hands the restore
/// to the runtime.
struct RestoreGuard {
    pending: Option<(Arc<dyn ClipboardBackend>, ClipboardSnapshot)>,
}

impl RestoreGuard {
    fn new(backend: Arc<dyn ClipboardBackend>, snapshot: ClipboardSnapshot) -> Self {
        Self {
            pending: Some((backend, snapshot)),
        }
    }

    async fn restore(mut self) {
        if let Some((backend, snapshot)) = self.pending.take() {
            restore_logged(backend.as_ref(), &snapshot).await;
        }
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        let Some((backend, snapshot)) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Clipboard operation cancelled, restoring in background");
                handle.spawn(async move {
                    restore_logged(backend.as_ref(), &snapshot).await;
                });
            }
            Err(_) => tracing::warn!("No runtime to restore the clipboard on"),
        }
    }
}

async fn restore_logged(backend: &dyn ClipboardBackend, snapshot: &ClipboardSnapshot) {
    if let Err(e) = backend.restore(snapshot).await {
        tracing::warn!("Failed to restore clipboard via {}: {}", backend.name(), e);
    }
}

/// Synthesized copy / paste with snapshot-and-restore around it
pub struct ClipboardCapture {
    backend: Arc<dyn ClipboardBackend>,
    keys: Arc<dyn KeySynth>,
    secure: Arc<dyn SecureInputFlag>,
    settings: CaptureSettings,
}

impl ClipboardCapture {
    pub fn new(
        backend: Arc<dyn ClipboardBackend>,
        keys: Arc<dyn KeySynth>,
        secure: Arc<dyn SecureInputFlag>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            backend,
            keys,
            secure,
            settings,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ClipboardBackend> {
        &self.backend
    }

    pub fn keys(&self) -> &Arc<dyn KeySynth> {
        &self.keys
    }

    /// Read the current selection by synthesizing a copy.
    ///
    /// Returns the trimmed text, or `None` when nothing changed, secure input
    /// is active, or anything failed. The clipboard is restored either way.
    pub async fn capture_via_synthetic_copy(&self) -> Option<String> {
        self.capture_with(KeyCombo::Copy).await
    }

    /// [`Self::capture_via_synthetic_copy`] with an explicit copy combo
    pub async fn capture_with(&self, combo: KeyCombo) -> Option<String> {
        let snapshot = match self.backend.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Clipboard snapshot failed, skipping capture: {}", e);
                return None;
            }
        };

        if self.secure.is_active().await {
            tracing::info!("Secure input is active, not synthesizing copy");
            return None;
        }

        let guard = RestoreGuard::new(self.backend.clone(), snapshot);
        let text = self.copy_and_read(combo).await;
        guard.restore().await;

        let text = text?.trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    async fn copy_and_read(&self, combo: KeyCombo) -> Option<String> {
        if let Err(e) = self.backend.arm().await {
            tracing::debug!("Failed to arm clipboard: {}", e);
        }
        let baseline = match self.backend.change_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Clipboard change counter unavailable: {}", e);
                return None;
            }
        };

        if let Err(e) = self.keys.send(combo).await {
            tracing::warn!("Synthesized copy via {} failed: {}", self.keys.name(), e);
            return None;
        }

        for attempt in 1..=self.settings.poll_attempts {
            tokio::time::sleep(self.settings.poll_interval).await;
            match self.backend.change_count().await {
                Ok(count) if count != baseline => {
                    tracing::trace!("Clipboard changed after {} poll(s)", attempt);
                    return match self.backend.read_text().await {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Reading copied text failed: {}", e);
                            None
                        }
                    };
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Clipboard poll failed: {}", e),
            }
        }

        tracing::debug!("Clipboard did not change after synthesized copy");
        None
    }
}

#[async_trait::async_trait]
impl SelectionReplacer for ClipboardCapture {
    async fn replace_selection(&self, text: &str) -> Result<(), ClipboardError> {
        let snapshot = self.backend.snapshot().await?;

        if self.secure.is_active().await {
            return Err(ClipboardError::SecureInput);
        }

        let guard = RestoreGuard::new(self.backend.clone(), snapshot);
        let result = self.paste(text).await;
        guard.restore().await;
        result
    }
}

impl ClipboardCapture {
    async fn paste(&self, text: &str) -> Result<(), ClipboardError> {
        self.backend.write_text(text).await?;
        self.keys.send(KeyCombo::Paste).await?;
        // Let the target app read the clipboard before it is restored
        tokio::time::sleep(self.settings.paste_settle).await;
        tracing::debug!("Replaced selection ({} chars)", text.chars().count());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory clipboard and key synthesizer for unit tests

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryClipboard {
        pub entries: Mutex<Vec<ClipboardEntry>>,
        pub counter: Mutex<u64>,
    }

    impl MemoryClipboard {
        pub fn with(entries: Vec<ClipboardEntry>) -> Self {
            Self {
                entries: Mutex::new(entries),
                counter: Mutex::new(7),
            }
        }

        pub fn set(&self, entries: Vec<ClipboardEntry>) {
            *self.entries.lock().unwrap() = entries;
            *self.counter.lock().unwrap() += 1;
        }

        pub fn contents(&self) -> Vec<ClipboardEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    pub fn text_entry(text: &str) -> ClipboardEntry {
        ClipboardEntry {
            format: "text/plain;charset=utf-8".to_string(),
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[async_trait::async_trait]
    impl ClipboardBackend for MemoryClipboard {
        async fn change_count(&self) -> Result<u64, ClipboardError> {
            Ok(*self.counter.lock().unwrap())
        }

        async fn snapshot(&self) -> Result<ClipboardSnapshot, ClipboardError> {
            Ok(ClipboardSnapshot {
                entries: self.contents(),
                change_count: *self.counter.lock().unwrap(),
            })
        }

        async fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<(), ClipboardError> {
            self.set(snapshot.entries.clone());
            Ok(())
        }

        async fn read_text(&self) -> Result<Option<String>, ClipboardError> {
            Ok(self
                .contents()
                .iter()
                .find(|e| e.format.starts_with("text/plain"))
                .and_then(|e| String::from_utf8(e.bytes.clone()).ok()))
        }

        async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
            self.set(vec![text_entry(text)]);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }

    /// Plays the focused app: copy puts `selection` on the clipboard
    pub struct FakeApp {
        pub clipboard: Arc<MemoryClipboard>,
        pub selection: Mutex<Option<String>>,
        pub pasted: Mutex<Vec<String>>,
        pub sent: Mutex<Vec<KeyCombo>>,
    }

    impl FakeApp {
        pub fn new(clipboard: Arc<MemoryClipboard>, selection: Option<&str>) -> Self {
            Self {
                clipboard,
                selection: Mutex::new(selection.map(str::to_string)),
                pasted: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl KeySynth for FakeApp {
        async fn send(&self, combo: KeyCombo) -> Result<(), ClipboardError> {
            self.sent.lock().unwrap().push(combo);
            match combo {
                KeyCombo::Copy | KeyCombo::TerminalCopy | KeyCombo::Cut => {
                    if let Some(text) = self.selection.lock().unwrap().clone() {
                        self.clipboard.set(vec![text_entry(&text)]);
                    }
                }
                KeyCombo::Paste => {
                    let text = clipboard_text(&self.clipboard);
                    self.pasted.lock().unwrap().push(text);
                }
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn clipboard_text(clipboard: &MemoryClipboard) -> String {
        clipboard
            .contents()
            .first()
            .map(|e| String::from_utf8_lossy(&e.bytes).into_owned())
            .unwrap_or_default()
    }

    pub struct Secure(pub bool);

    #[async_trait::async_trait]
    impl SecureInputFlag for Secure {
        async fn is_active(&self) -> bool {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn capture(clipboard: Arc<MemoryClipboard>, app: Arc<FakeApp>, secure: bool) -> ClipboardCapture {
        ClipboardCapture::new(clipboard, app, Arc::new(Secure(secure)), CaptureSettings::default())
    }

    fn prior_states() -> Vec<Vec<ClipboardEntry>> {
        vec![
            Vec::new(),
            vec![text_entry("user data")],
            vec![
                ClipboardEntry {
                    format: "text/html".to_string(),
                    bytes: b"<b>bold</b>".to_vec(),
                },
                text_entry("bold"),
                ClipboardEntry {
                    format: "image/png".to_string(),
                    bytes: vec![0x89, b'P', b'N', b'G', 0, 0, 0xff],
                },
            ],
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_restores_prior_clipboard() {
        for prior in prior_states() {
            let clipboard = Arc::new(MemoryClipboard::with(prior.clone()));
            let app = Arc::new(FakeApp::new(clipboard.clone(), Some("  selected words \n")));

            let text = capture(clipboard.clone(), app.clone(), false)
                .capture_via_synthetic_copy()
                .await;

            assert_eq!(text.as_deref(), Some("selected words"));
            assert_eq!(clipboard.contents(), prior);
            assert_eq!(*app.sent.lock().unwrap(), vec![KeyCombo::Copy]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_without_change_returns_none() {
        for prior in prior_states() {
            let clipboard = Arc::new(MemoryClipboard::with(prior.clone()));
            let app = Arc::new(FakeApp::new(clipboard.clone(), None));

            let text = capture(clipboard.clone(), app, false)
                .capture_via_synthetic_copy()
                .await;

            assert_eq!(text, None);
            assert_eq!(clipboard.contents(), prior);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_rejects_whitespace() {
        let clipboard = Arc::new(MemoryClipboard::with(vec![text_entry("keep")]));
        let app = Arc::new(FakeApp::new(clipboard.clone(), Some(" \t\n")));

        let text = capture(clipboard.clone(), app, false)
            .capture_via_synthetic_copy()
            .await;
        assert_eq!(text, None);
        assert_eq!(clipboard.contents(), vec![text_entry("keep")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secure_input_aborts_before_copy() {
        let clipboard = Arc::new(MemoryClipboard::with(vec![text_entry("keep")]));
        let app = Arc::new(FakeApp::new(clipboard.clone(), Some("password")));

        let capture = capture(clipboard.clone(), app.clone(), true);
        assert_eq!(capture.capture_via_synthetic_copy().await, None);
        assert!(app.sent.lock().unwrap().is_empty());
        assert!(matches!(
            capture.replace_selection("x").await,
            Err(ClipboardError::SecureInput)
        ));
        assert_eq!(clipboard.contents(), vec![text_entry("keep")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_capture_still_restores() {
        let clipboard = Arc::new(MemoryClipboard::with(vec![text_entry("original")]));
        let app = Arc::new(FakeApp::new(clipboard.clone(), Some("selection")));
        let capture = Arc::new(capture(clipboard.clone(), app, false));

        let task = {
            let capture = capture.clone();
            tokio::spawn(async move { capture.capture_via_synthetic_copy().await })
        };
        // Let the copy land, then abort mid-poll
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clipboard.contents(), vec![text_entry("selection")]);
        task.abort();
        let _ = task.await;
        tokio::task::yield_now().await;

        assert_eq!(clipboard.contents(), vec![text_entry("original")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_selection_pastes_and_restores() {
        let prior = prior_states().pop().unwrap();
        let clipboard = Arc::new(MemoryClipboard::with(prior.clone()));
        let app = Arc::new(FakeApp::new(clipboard.clone(), Some("hello")));

        capture(clipboard.clone(), app.clone(), false)
            .replace_selection("HELLO")
            .await
            .unwrap();

        assert_eq!(*app.pasted.lock().unwrap(), vec!["HELLO".to_string()]);
        assert_eq!(clipboard.contents(), prior);
    }
}
