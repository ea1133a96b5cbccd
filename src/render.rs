//! Bar renderers
//!
//! The orchestrator hands every new [`BarView`] to a [`BarRenderer`]. The
//! overlay window itself lives outside this crate; it reads views from the
//! local service (fed by [`WatchRenderer`]) or from the state file.

use crate::session::BarView;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Receives immutable view-models; owns no state of its own
pub trait BarRenderer: Send + Sync {
    fn render(&self, view: &BarView);
}

/// Publishes the latest view on a watch channel
pub struct WatchRenderer {
    tx: watch::Sender<BarView>,
}

impl WatchRenderer {
    pub fn new() -> (Self, watch::Receiver<BarView>) {
        let (tx, rx) = watch::channel(BarView::hidden());
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<BarView> {
        self.tx.subscribe()
    }
}

impl BarRenderer for WatchRenderer {
    fn render(&self, view: &BarView) {
        self.tx.send_replace(view.clone());
    }
}

/// Writes the view as JSON for external integrations (Waybar, scripts)
pub struct StateFileRenderer {
    path: PathBuf,
}

impl StateFileRenderer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the state file on shutdown
    pub fn cleanup(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove state file: {}", e);
            }
        }
    }
}

impl BarRenderer for StateFileRenderer {
    fn render(&self, view: &BarView) {
        // The selection itself stays out of the file
        let redacted = BarView {
            selected_text: None,
            processed_text: None,
            approval: None,
            ..view.clone()
        };

        let json = match serde_json::to_string(&redacted) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize bar state: {}", e);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create state file directory: {}", e);
                return;
            }
        }

        if let Err(e) = std::fs::write(&self.path, &json) {
            tracing::warn!("Failed to write state file: {}", e);
        } else {
            tracing::trace!("State file updated: {}", view.phase);
        }
    }
}

/// Forwards each view to several renderers
pub struct FanOut(pub Vec<Arc<dyn BarRenderer>>);

impl BarRenderer for FanOut {
    fn render(&self, view: &BarView) {
        for renderer in &self.0 {
            renderer.render(view);
        }
    }
}
