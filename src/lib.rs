//! Hoverbar: a floating action bar for text selected anywhere on the desktop
//!
//! This library provides the core functionality for:
//! - Classifying global pointer/keyboard gestures (drag, multi-click, Ctrl+A)
//! - Reading the selection from the desktop tree, with a synthesized-copy
//!   fallback that always puts the user's clipboard back
//! - Running built-in, LLM and sandboxed-script actions on the selection
//! - Driving the bar through its phases and publishing view-models
//!
//! # Architecture
//!
//! ```text
//!          ┌──────────────┐   gesture    ┌──────────────┐  SelectionEvent
//!          │ EventSource  │ ───────────▶ │  Classifier  │ ─────────┐
//!          │ (evdev/rdev) │              │ + Debouncer  │          │
//!          └──────────────┘              └──────────────┘          ▼
//!                                                          ┌──────────────┐
//!          ┌──────────────┐   miss       ┌──────────────┐  │  Selection   │
//!          │  Clipboard   │ ◀─────────── │  Text probe  │◀─│   engine     │
//!          │  capture     │              │ (desktop)    │  └──────────────┘
//!          └──────────────┘              └──────────────┘          │
//!                                                                  ▼
//!   overlay ──POST /v1/intent──▶ ┌─────────────────────────────────────────┐
//!                                │              Orchestrator               │
//!   SIGUSR1/SIGUSR2 (daemon) ──▶ │  BarSession ─ phases ─ timers ─ tasks   │
//!                                └─────────────────────────────────────────┘
//!                                   │            │              │
//!                                   ▼            ▼              ▼
//!                            ┌───────────┐ ┌───────────┐ ┌──────────────┐
//!                            │ Providers │ │  Scripts  │ │  Renderers   │
//!                            │ LLM / TTS │ │  (boa)    │ │ watch / file │
//!                            └───────────┘ └───────────┘ └──────────────┘
//! ```

pub mod actions;
pub mod approval;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gesture;
pub mod input;
pub mod notification;
pub mod orchestrator;
pub mod probe;
pub mod providers;
pub mod render;
pub mod script;
pub mod selection;
pub mod service;
pub mod session;
pub mod setup;

pub use cli::{Cli, Commands, SetupAction};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{HoverbarError, Result};
pub use orchestrator::{Intent, Orchestrator, OrchestratorHandle};
pub use selection::{SelectionDetectionEngine, SelectionEvent};
