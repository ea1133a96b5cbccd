//! Error types for hoverbar
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.
//!
//! Selection resolution itself never errors: probes fail closed and a miss
//! is an `Option::None`. The enums here cover the boundaries that can fail
//! for real (input devices, clipboard tools, providers, scripts).

use thiserror::Error;

/// Top-level error type for the hoverbar application
#[derive(Error, Debug)]
pub enum HoverbarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the global input event source
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input monitoring is not permitted. Grant accessibility / input monitoring access to the terminal or app running hoverbar.")]
    PermissionDenied,

    #[error("Cannot access input device: {0}. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("No pointer or keyboard input devices found")]
    NoDevices,

    #[error("Global event listener failed: {0}")]
    Listener(String),

    #[error("Unknown modifier name: '{0}'. Use one of: shift, ctrl, alt, meta")]
    UnknownModifier(String),
}

/// Errors related to clipboard access and synthesized key combos
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("wl-copy/wl-paste not found in PATH. Install wl-clipboard via your package manager.")]
    WlClipboardNotFound,

    #[error("ydotool not found in PATH. Install via your package manager.")]
    YdotoolNotFound,

    #[error("ydotool daemon not running.\n  Start with: systemctl --user start ydotool\n  Enable at boot: systemctl --user enable ydotool")]
    YdotoolNotRunning,

    #[error("Secure input is active; refusing to synthesize key events")]
    SecureInput,

    #[error("Clipboard command failed: {0}")]
    CommandFailed(String),

    #[error("Key synthesis failed: {0}")]
    KeySynthFailed(String),

    #[error("All key synthesis methods failed. Ensure ydotool or wtype is available.")]
    AllMethodsFailed,
}

/// Errors returned by LLM / translation / speech providers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Provider returned an empty result")]
    EmptyResult,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Playback error: {0}")]
    Playback(String),
}

/// Fixed error taxonomy of the sandboxed script runner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script is empty")]
    MissingScript,

    #[error("Syntax error: {0}")]
    SyntaxError(String),

    #[error("Script must define a function `transform(text)` taking one argument")]
    MissingTransform,

    #[error("transform() must return a string")]
    InvalidReturnType,

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Script timed out")]
    Timeout,
}

/// Errors from the send-confirmation gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("Another request is already awaiting confirmation for action '{0}'")]
    AlreadyPending(String),

    #[error("No pending request with id {0}")]
    UnknownRequest(String),
}

/// Result type alias using HoverbarError
pub type Result<T> = std::result::Result<T, HoverbarError>;
