//! Synthesized key combinations
//!
//! Fallback chain:
//! 1. ydotool - uinput device owned by ydotoold, requires the daemon
//! 2. wtype - Wayland virtual keyboard, no daemon needed
//!
//! Both press their own modifier on their own device, so whatever the user
//! is physically holding does not change the combo.

use super::{KeyCombo, KeySynth};
use crate::error::ClipboardError;
use std::process::Stdio;
use tokio::process::Command;

/// Linux input event codes
const KEY_LEFTCTRL: u16 = 29;
const KEY_LEFTSHIFT: u16 = 42;
const KEY_X: u16 = 45;
const KEY_C: u16 = 46;
const KEY_V: u16 = 47;

fn letter(combo: KeyCombo) -> char {
    match combo {
        KeyCombo::Copy | KeyCombo::TerminalCopy => 'c',
        KeyCombo::Paste => 'v',
        KeyCombo::Cut => 'x',
    }
}

fn keycode(combo: KeyCombo) -> u16 {
    match combo {
        KeyCombo::Copy | KeyCombo::TerminalCopy => KEY_C,
        KeyCombo::Paste => KEY_V,
        KeyCombo::Cut => KEY_X,
    }
}

fn with_shift(combo: KeyCombo) -> bool {
    matches!(combo, KeyCombo::TerminalCopy)
}

/// `ydotool key` arguments for Ctrl(+Shift)+<combo>
fn ydotool_args(combo: KeyCombo) -> Vec<String> {
    let mut held = vec![KEY_LEFTCTRL];
    if with_shift(combo) {
        held.push(KEY_LEFTSHIFT);
    }
    let key = keycode(combo);

    let mut args = vec!["key".to_string()];
    args.extend(held.iter().map(|k| format!("{}:1", k)));
    args.push(format!("{}:1", key));
    args.push(format!("{}:0", key));
    args.extend(held.iter().rev().map(|k| format!("{}:0", k)));
    args
}

/// `wtype` arguments for Ctrl(+Shift)+<combo>
fn wtype_args(combo: KeyCombo) -> Vec<String> {
    let held: &[&str] = if with_shift(combo) {
        &["ctrl", "shift"]
    } else {
        &["ctrl"]
    };

    let mut args = Vec::new();
    for m in held {
        args.push("-M".to_string());
        args.push(m.to_string());
    }
    args.push("-k".to_string());
    args.push(letter(combo).to_string());
    for m in held.iter().rev() {
        args.push("-m".to_string());
        args.push(m.to_string());
    }
    args
}

/// A key synthesizer that may be missing on this system
#[async_trait::async_trait]
pub trait KeyTool: KeySynth {
    async fn is_available(&self) -> bool;
}

/// ydotool-based key synthesis
#[derive(Debug, Default)]
pub struct YdotoolKeys;

#[async_trait::async_trait]
impl KeySynth for YdotoolKeys {
    async fn send(&self, combo: KeyCombo) -> Result<(), ClipboardError> {
        let output = Command::new("ydotool")
            .args(ydotool_args(combo))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ClipboardError::YdotoolNotFound
                } else {
                    ClipboardError::KeySynthFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            if stderr.contains("socket") || stderr.contains("connect") || stderr.contains("daemon")
            {
                return Err(ClipboardError::YdotoolNotRunning);
            }

            return Err(ClipboardError::KeySynthFailed(stderr.to_string()));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ydotool"
    }
}

#[async_trait::async_trait]
impl KeyTool for YdotoolKeys {
    async fn is_available(&self) -> bool {
        if which::which("ydotool").is_err() {
            return false;
        }

        // ydotool type "" succeeds quickly if the daemon is running
        Command::new("ydotool")
            .args(["type", ""])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// wtype-based key synthesis
#[derive(Debug, Default)]
pub struct WtypeKeys;

#[async_trait::async_trait]
impl KeySynth for WtypeKeys {
    async fn send(&self, combo: KeyCombo) -> Result<(), ClipboardError> {
        let output = Command::new("wtype")
            .args(wtype_args(combo))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ClipboardError::KeySynthFailed(format!("wtype: {}", e)))?;

        if !output.status.success() {
            return Err(ClipboardError::KeySynthFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "wtype"
    }
}

#[async_trait::async_trait]
impl KeyTool for WtypeKeys {
    async fn is_available(&self) -> bool {
        std::env::var_os("WAYLAND_DISPLAY").is_some() && which::which("wtype").is_ok()
    }
}

/// Tries each tool in order until one succeeds
pub struct KeySynthChain {
    tools: Vec<Box<dyn KeyTool>>,
}

impl KeySynthChain {
    pub fn new(tools: Vec<Box<dyn KeyTool>>) -> Self {
        Self { tools }
    }
}

impl Default for KeySynthChain {
    fn default() -> Self {
        Self::new(vec![Box::new(YdotoolKeys), Box::new(WtypeKeys)])
    }
}

#[async_trait::async_trait]
impl KeySynth for KeySynthChain {
    async fn send(&self, combo: KeyCombo) -> Result<(), ClipboardError> {
        for tool in &self.tools {
            if !tool.is_available().await {
                tracing::debug!("{} not available, trying next", tool.name());
                continue;
            }

            match tool.send(combo).await {
                Ok(()) => {
                    tracing::debug!("Sent {:?} via {}", combo, tool.name());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}, trying next", tool.name(), e);
                }
            }
        }

        Err(ClipboardError::AllMethodsFailed)
    }

    fn name(&self) -> &'static str {
        "key chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_ydotool_args() {
        assert_eq!(ydotool_args(KeyCombo::Copy), ["key", "29:1", "46:1", "46:0", "29:0"]);
        assert_eq!(ydotool_args(KeyCombo::Paste), ["key", "29:1", "47:1", "47:0", "29:0"]);
        assert_eq!(ydotool_args(KeyCombo::Cut), ["key", "29:1", "45:1", "45:0", "29:0"]);
        assert_eq!(
            ydotool_args(KeyCombo::TerminalCopy),
            ["key", "29:1", "42:1", "46:1", "46:0", "42:0", "29:0"]
        );
    }

    #[test]
    fn test_wtype_args() {
        assert_eq!(wtype_args(KeyCombo::Copy), ["-M", "ctrl", "-k", "c", "-m", "ctrl"]);
        assert_eq!(
            wtype_args(KeyCombo::TerminalCopy),
            ["-M", "ctrl", "-M", "shift", "-k", "c", "-m", "shift", "-m", "ctrl"]
        );
    }

    struct Scripted {
        available: bool,
        fails: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl KeySynth for Scripted {
        async fn send(&self, _combo: KeyCombo) -> Result<(), ClipboardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                Err(ClipboardError::KeySynthFailed("nope".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[async_trait::async_trait]
    impl KeyTool for Scripted {
        async fn is_available(&self) -> bool {
            self.available
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = KeySynthChain::new(vec![
            Box::new(Scripted { available: false, fails: false, calls: calls.clone() }),
            Box::new(Scripted { available: true, fails: true, calls: calls.clone() }),
            Box::new(Scripted { available: true, fails: false, calls: calls.clone() }),
        ]);

        chain.send(KeyCombo::Copy).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chain_all_failed() {
        let chain = KeySynthChain::new(vec![Box::new(Scripted {
            available: true,
            fails: true,
            calls: Arc::new(AtomicUsize::new(0)),
        })]);
        assert!(matches!(
            chain.send(KeyCombo::Paste).await,
            Err(ClipboardError::AllMethodsFailed)
        ));
    }
}
