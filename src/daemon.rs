//! Daemon module - main event loop
//!
//! Wires the input source, gesture classifier, selection engine and the
//! orchestrator together, and handles signals for external control.

use crate::actions::DesktopActions;
use crate::clipboard::keys::{KeySynthChain, KeyTool, WtypeKeys, YdotoolKeys};
use crate::clipboard::wayland::WaylandClipboard;
use crate::clipboard::{CaptureSettings, ClipboardBackend, ClipboardCapture, KeySynth};
use crate::config::Config;
use crate::error::{HoverbarError, Result};
use crate::gesture::{Debouncer, Gesture, GestureClassifier, GesturePolicy};
use crate::input::{self, InputEvent, Key, Point};
use crate::notification::{self, PermissionWarning};
use crate::orchestrator::{Collaborators, Intent, Orchestrator, OrchestratorHandle};
use crate::probe::desktop::DesktopTree;
use crate::probe::AccessibilityTextProbe;
use crate::providers::openai::OpenAiCompatible;
use crate::providers::playback::RodioPlayer;
use crate::providers::ConfigSettings;
use crate::render::{BarRenderer, FanOut, StateFileRenderer, WatchRenderer};
use crate::script::ScriptRunner;
use crate::selection::SelectionDetectionEngine;
use crate::service;
use pidlock::Pidlock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Where the bar appears when triggered without a pointer position
const FALLBACK_LOCATION: Point = Point { x: 0.0, y: 0.0 };

type Engine = SelectionDetectionEngine<DesktopTree>;

/// Write PID file for external control via signals
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Remove PID file on shutdown
fn cleanup_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

fn signal_handler(kind: SignalKind, name: &str) -> Result<tokio::signal::unix::Signal> {
    signal(kind).map_err(|e| {
        HoverbarError::Config(format!("Failed to set up {} handler: {}", name, e))
    })
}

/// Resolve `gesture` and hand any selection to the orchestrator
async fn resolve_and_show(engine: Arc<Engine>, handle: OrchestratorHandle, gesture: Gesture) {
    match engine.resolve(gesture).await {
        Some(event) => {
            if !handle.selection(event).await {
                tracing::warn!("Orchestrator stopped, dropping selection");
            }
        }
        None => tracing::trace!("No selection for {:?}", gesture.kind),
    }
}

/// Main daemon that owns the platform components
pub struct Daemon {
    config: Config,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pid_file_path: None,
        }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting hoverbar daemon");

        // Single instance check
        let lock_path = Config::runtime_dir().join("daemon.lock");
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path_str = lock_path.to_string_lossy().to_string();
        let mut pidlock = Pidlock::new(&lock_path_str);
        if pidlock.acquire().is_err() {
            return Err(HoverbarError::Config(
                "Another hoverbar daemon is already running".to_string(),
            ));
        }

        self.pid_file_path = write_pid_file();

        let mut sigusr1 = signal_handler(SignalKind::user_defined1(), "SIGUSR1")?;
        let mut sigusr2 = signal_handler(SignalKind::user_defined2(), "SIGUSR2")?;
        let mut sigterm = signal_handler(SignalKind::terminate(), "SIGTERM")?;

        // Desktop tree probe
        let probe = Arc::new(AccessibilityTextProbe::with_pid(
            DesktopTree::new().with_secure_apps(&self.config.gesture.ignored_apps),
            self.config.selection.probe_depth,
            std::process::id(),
        ));
        if !probe.is_trusted(true).await {
            notification::warn(&PermissionWarning::AccessibilityUntrusted).await;
        }

        // Clipboard and key synthesis
        if !WaylandClipboard::is_available() {
            tracing::warn!("wl-clipboard not found, clipboard actions will fail");
        }
        let clipboard: Arc<dyn ClipboardBackend> = Arc::new(WaylandClipboard::new());
        if !YdotoolKeys.is_available().await && !WtypeKeys.is_available().await {
            notification::warn(&PermissionWarning::NoKeySynthesis).await;
        }
        let keys: Arc<dyn KeySynth> = Arc::new(KeySynthChain::default());
        let capture = Arc::new(ClipboardCapture::new(
            clipboard.clone(),
            keys.clone(),
            probe.clone(),
            CaptureSettings::from(&self.config.selection),
        ));

        let engine = Arc::new(
            SelectionDetectionEngine::new(
                probe.clone(),
                self.config
                    .selection
                    .clipboard_fallback
                    .then(|| capture.clone()),
                self.config.selection.min_length,
            )
            .with_terminal_apps(&self.config.selection.terminal_apps),
        );
        tracing::info!(
            "Selection: min length {}, clipboard fallback {}",
            self.config.selection.min_length,
            if self.config.selection.clipboard_fallback { "on" } else { "off" }
        );

        // Renderers
        let (watch_renderer, views) = WatchRenderer::new();
        let mut renderers: Vec<Arc<dyn BarRenderer>> = vec![Arc::new(watch_renderer)];
        let state_renderer = self.config.resolve_state_file().map(|path| {
            tracing::info!("State file: {:?}", path);
            Arc::new(StateFileRenderer::new(path))
        });
        if let Some(ref renderer) = state_renderer {
            renderers.push(renderer.clone());
        }

        // Providers
        let provider = Arc::new(OpenAiCompatible::from_config(&self.config.provider));
        tracing::info!(
            "Provider: {} (model {})",
            self.config.provider.endpoint,
            self.config.provider.model
        );

        let collaborators = Collaborators {
            settings: Arc::new(ConfigSettings::new(self.config.clone())),
            llm: provider.clone(),
            translator: provider.clone(),
            speech: provider,
            player: Arc::new(RodioPlayer::new()),
            replacer: capture,
            system: Arc::new(DesktopActions::new(clipboard, keys)),
            focus: probe.clone(),
            scripts: ScriptRunner::from_config(&self.config.script),
            renderer: Arc::new(FanOut(renderers)),
        };

        let (handle, commands) = OrchestratorHandle::channel(16);
        let shutdown = CancellationToken::new();
        let orchestrator_task = tokio::spawn(
            Orchestrator::new(collaborators).run(commands, shutdown.clone()),
        );

        let service_handle = if self.config.service.enabled {
            match service::start(&self.config.service, views.clone(), handle.clone()).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!("Bar service disabled: {}", e);
                    None
                }
            }
        } else {
            tracing::info!("Bar service disabled in config");
            None
        };

        // Global input
        let mut source = if self.config.gesture.enabled {
            match input::create_source(self.config.gesture.double_click_ms) {
                Ok(source) => Some(source),
                Err(e) => {
                    notification::warn(&PermissionWarning::InputMonitoring(e.to_string())).await;
                    None
                }
            }
        } else {
            tracing::info!("Gesture detection disabled, use 'hoverbar trigger' to show the bar");
            None
        };

        let mut input_rx = match source.as_mut() {
            Some(source) => match source.start().await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    notification::warn(&PermissionWarning::InputMonitoring(e.to_string())).await;
                    None
                }
            },
            None => None,
        };

        let mut classifier = GestureClassifier::new(GesturePolicy::from_config(&self.config.gesture)?);
        let mut debouncer = Debouncer::new();

        tracing::info!("Ready");

        loop {
            tokio::select! {
                Some(event) = async {
                    match &mut input_rx {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match event {
                        InputEvent::PointerDown { location, click_count, at, .. } => {
                            // A new press supersedes whatever was about to resolve
                            debouncer.cancel();
                            let env = probe.press_snapshot().await;
                            classifier.pointer_down(location, click_count, at, &env);
                        }
                        InputEvent::PointerUp { location, click_count, modifiers, .. } => {
                            let pointer = probe.pointer_location().await.unwrap_or(location);
                            let env = probe.environment(pointer).await;
                            if let Some(gesture) = classifier.pointer_up(location, click_count, modifiers, &env) {
                                let gesture = Gesture { location: pointer, ..gesture };
                                let delay = classifier.policy().debounce_for(gesture.kind);
                                debouncer.schedule(
                                    delay,
                                    resolve_and_show(engine.clone(), handle.clone(), gesture),
                                );
                            }
                        }
                        InputEvent::KeyDown { key: Key::Escape, .. } => {
                            if views.borrow().visible {
                                tracing::debug!("Escape pressed, dismissing bar");
                                handle.intent(Intent::Dismiss).await;
                            }
                        }
                        InputEvent::KeyDown { key, modifiers, pointer, .. } => {
                            let pointer = probe.pointer_location().await.unwrap_or(pointer);
                            let env = probe.environment(pointer).await;
                            if let Some(gesture) = classifier.key_down(key, modifiers, pointer, &env) {
                                let delay = classifier.policy().debounce_for(gesture.kind);
                                debouncer.schedule(
                                    delay,
                                    resolve_and_show(engine.clone(), handle.clone(), gesture),
                                );
                            }
                        }
                    }
                }

                // Handle SIGUSR1 - show the bar for the current selection
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (trigger)");
                    let point = probe.pointer_location().await.unwrap_or(FALLBACK_LOCATION);
                    debouncer.schedule(
                        Duration::ZERO,
                        resolve_and_show(engine.clone(), handle.clone(), Gesture::manual(point)),
                    );
                }

                // Handle SIGUSR2 - dismiss the bar
                _ = sigusr2.recv() => {
                    tracing::debug!("Received SIGUSR2 (dismiss)");
                    debouncer.cancel();
                    handle.intent(Intent::Dismiss).await;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Cleanup
        debouncer.cancel();
        if let Some(mut source) = source {
            if let Err(e) = source.stop().await {
                tracing::warn!("Failed to stop input source: {}", e);
            }
        }

        shutdown.cancel();
        if let Err(e) = orchestrator_task.await {
            tracing::warn!("Orchestrator task join error: {}", e);
        }

        if let Some(service_handle) = service_handle {
            service_handle.shutdown().await;
        }

        if let Some(ref renderer) = state_renderer {
            renderer.cleanup();
        }

        if let Some(ref path) = self.pid_file_path {
            cleanup_pid_file(path);
        }

        if let Err(e) = pidlock.release() {
            tracing::debug!("Failed to release daemon lock: {:?}", e);
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }
}
