//! wl-clipboard backend
//!
//! Uses `wl-paste --list-types` / `wl-paste --type` to snapshot every offered
//! MIME type and `wl-copy` to write. Wayland has no clipboard change counter,
//! so the counter here is a fingerprint of the offered types and the text
//! payload; [`ClipboardBackend::arm`] puts a unique marker on the clipboard
//! so that re-copying identical text still changes it.
//!
//! `wl-copy` serves a single MIME type per invocation. A multi-format
//! snapshot is restored through its most faithful entry (images first, then
//! UTF-8 text, then whatever was offered first).
//!
//! Requires: wl-clipboard package installed

use super::{ClipboardBackend, ClipboardEntry, ClipboardSnapshot};
use crate::error::ClipboardError;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const TEXT_TYPES: [&str; 4] = [
    "text/plain;charset=utf-8",
    "text/plain",
    "UTF8_STRING",
    "STRING",
];

/// Clipboard access through wl-clipboard
#[derive(Debug, Default)]
pub struct WaylandClipboard;

impl WaylandClipboard {
    pub fn new() -> Self {
        Self
    }

    pub fn is_available() -> bool {
        which::which("wl-paste").is_ok() && which::which("wl-copy").is_ok()
    }

    async fn list_types(&self) -> Result<Vec<String>, ClipboardError> {
        let output = paste_command(&["--list-types"]).await?;
        // wl-paste exits non-zero when the clipboard is empty
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn read_type(&self, mime: &str) -> Result<Option<Vec<u8>>, ClipboardError> {
        let output = paste_command(&["--no-newline", "--type", mime]).await?;
        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }

    async fn copy(&self, args: &[&str], bytes: Option<&[u8]>) -> Result<(), ClipboardError> {
        let mut child = Command::new("wl-copy")
            .args(args)
            .stdin(if bytes.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ClipboardError::WlClipboardNotFound
                } else {
                    ClipboardError::CommandFailed(e.to_string())
                }
            })?;

        if let (Some(bytes), Some(mut stdin)) = (bytes, child.stdin.take()) {
            stdin
                .write_all(bytes)
                .await
                .map_err(|e| ClipboardError::CommandFailed(e.to_string()))?;

            // Close stdin to signal EOF
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ClipboardError::CommandFailed(e.to_string()))?;

        if !status.success() {
            return Err(ClipboardError::CommandFailed(
                "wl-copy exited with error".to_string(),
            ));
        }
        Ok(())
    }
}

async fn paste_command(args: &[&str]) -> Result<std::process::Output, ClipboardError> {
    Command::new("wl-paste")
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ClipboardError::WlClipboardNotFound
            } else {
                ClipboardError::CommandFailed(e.to_string())
            }
        })
}

/// Entry `wl-copy` should re-offer for a snapshot
fn restore_entry(snapshot: &ClipboardSnapshot) -> Option<&ClipboardEntry> {
    snapshot
        .entries
        .iter()
        .find(|e| e.format.starts_with("image/"))
        .or_else(|| {
            TEXT_TYPES
                .iter()
                .find_map(|t| snapshot.entries.iter().find(|e| e.format == *t))
        })
        .or_else(|| snapshot.entries.first())
}

/// Preferred text type among the offered ones
fn text_type(types: &[String]) -> Option<&'static str> {
    TEXT_TYPES
        .iter()
        .copied()
        .find(|t| types.iter().any(|x| x == t))
}

fn fingerprint(types: &[String], text: Option<&[u8]>) -> u64 {
    let mut hasher = DefaultHasher::new();
    types.hash(&mut hasher);
    text.hash(&mut hasher);
    hasher.finish()
}

#[async_trait::async_trait]
impl ClipboardBackend for WaylandClipboard {
    async fn change_count(&self) -> Result<u64, ClipboardError> {
        let types = self.list_types().await?;
        let text = match text_type(&types) {
            Some(mime) => self.read_type(mime).await?,
            None => None,
        };
        Ok(fingerprint(&types, text.as_deref()))
    }

    async fn snapshot(&self) -> Result<ClipboardSnapshot, ClipboardError> {
        let types = self.list_types().await?;
        let mut entries = Vec::with_capacity(types.len());
        let mut text = None;

        for format in &types {
            let Some(bytes) = self.read_type(format).await? else {
                continue;
            };
            if text.is_none() && TEXT_TYPES.contains(&format.as_str()) {
                text = Some(bytes.clone());
            }
            entries.push(ClipboardEntry {
                format: format.clone(),
                bytes,
            });
        }

        tracing::trace!("Clipboard snapshot: {} entries", entries.len());
        Ok(ClipboardSnapshot {
            change_count: fingerprint(&types, text.as_deref()),
            entries,
        })
    }

    async fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<(), ClipboardError> {
        match restore_entry(snapshot) {
            Some(entry) => {
                self.copy(&["--type", entry.format.as_str()], Some(&entry.bytes))
                    .await
            }
            None => self.copy(&["--clear"], None).await,
        }
    }

    async fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        let types = self.list_types().await?;
        let Some(mime) = text_type(&types) else {
            return Ok(None);
        };
        Ok(self
            .read_type(mime)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.copy(&["--type", "text/plain;charset=utf-8"], Some(text.as_bytes()))
            .await
    }

    async fn arm(&self) -> Result<(), ClipboardError> {
        let marker = format!("hoverbar-{}", uuid::Uuid::new_v4());
        self.write_text(&marker).await
    }

    fn name(&self) -> &'static str {
        "wl-clipboard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(format: &str, bytes: &[u8]) -> ClipboardEntry {
        ClipboardEntry {
            format: format.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_restore_entry_prefers_images() {
        let snapshot = ClipboardSnapshot {
            entries: vec![
                entry("text/html", b"<img>"),
                entry("text/plain;charset=utf-8", b"alt"),
                entry("image/png", b"\x89PNG"),
            ],
            change_count: 0,
        };
        assert_eq!(restore_entry(&snapshot).unwrap().format, "image/png");
    }

    #[test]
    fn test_restore_entry_prefers_utf8_text() {
        let snapshot = ClipboardSnapshot {
            entries: vec![
                entry("text/html", b"<b>x</b>"),
                entry("STRING", b"x"),
                entry("text/plain;charset=utf-8", b"x"),
            ],
            change_count: 0,
        };
        assert_eq!(
            restore_entry(&snapshot).unwrap().format,
            "text/plain;charset=utf-8"
        );
    }

    #[test]
    fn test_restore_entry_empty() {
        assert!(restore_entry(&ClipboardSnapshot::default()).is_none());

        let other = ClipboardSnapshot {
            entries: vec![entry("application/x-custom", b"\0\x01")],
            change_count: 0,
        };
        assert_eq!(restore_entry(&other).unwrap().format, "application/x-custom");
    }

    #[test]
    fn test_fingerprint_tracks_text_and_types() {
        let types = vec!["text/plain".to_string()];
        let a = fingerprint(&types, Some(b"one"));
        assert_eq!(a, fingerprint(&types, Some(b"one")));
        assert_ne!(a, fingerprint(&types, Some(b"two")));
        assert_ne!(a, fingerprint(&[], Some(b"one")));
    }
}
