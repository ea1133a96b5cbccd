//! Desktop notifications for things the user has to fix
//!
//! - Linux: notify-send (libnotify)
//! - macOS: osascript
//!
//! Used at startup when hoverbar is missing a permission or a tool, so the
//! problem is visible without reading logs. Best-effort: failures are logged.

use std::process::Stdio;
use tokio::process::Command;

/// A startup problem that degrades selection detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionWarning {
    /// The accessibility / desktop tree cannot be queried
    AccessibilityUntrusted,
    /// Global input events cannot be read
    InputMonitoring(String),
    /// No way to synthesize copy/paste
    NoKeySynthesis,
}

impl PermissionWarning {
    pub fn title(&self) -> &'static str {
        match self {
            PermissionWarning::AccessibilityUntrusted => "Hoverbar: accessibility unavailable",
            PermissionWarning::InputMonitoring(_) => "Hoverbar: input monitoring unavailable",
            PermissionWarning::NoKeySynthesis => "Hoverbar: clipboard fallback disabled",
        }
    }

    pub fn body(&self) -> String {
        match self {
            PermissionWarning::AccessibilityUntrusted => {
                if cfg!(target_os = "macos") {
                    "Grant Accessibility access in System Settings > Privacy & Security.".to_string()
                } else {
                    "Install wl-clipboard and run under Hyprland or Sway to read selections."
                        .to_string()
                }
            }
            PermissionWarning::InputMonitoring(detail) => detail.clone(),
            PermissionWarning::NoKeySynthesis => {
                "Install ydotool (and start ydotoold) or wtype to read selections via copy."
                    .to_string()
            }
        }
    }
}

/// Log and show a warning
pub async fn warn(warning: &PermissionWarning) {
    tracing::warn!("{}: {}", warning.title(), warning.body());
    send(warning.title(), &warning.body()).await;
}

/// Send a desktop notification with the given title and body.
pub async fn send(title: &str, body: &str) {
    #[cfg(target_os = "linux")]
    send_linux(title, body).await;

    #[cfg(target_os = "macos")]
    send_macos(title, body).await;

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::debug!("Notifications not supported on this platform");
        let _ = (title, body);
    }
}

#[cfg(target_os = "linux")]
async fn send_linux(title: &str, body: &str) {
    let result = Command::new("notify-send")
        .args(["--app-name=Hoverbar", "--expire-time=6000", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

#[cfg(target_os = "macos")]
async fn send_macos(title: &str, body: &str) {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        escape_applescript(body),
        escape_applescript(title)
    );

    let result = Command::new("osascript")
        .args(["-e", &script])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
