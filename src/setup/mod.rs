//! Setup module for hoverbar installation and configuration
//!
//! Provides subcommands for:
//! - writing the default config
//! - checking tools and permissions the daemon needs
//! - systemd service installation

pub mod systemd;

use crate::clipboard::keys::{KeyTool, WtypeKeys, YdotoolKeys};
use crate::clipboard::wayland::WaylandClipboard;
use crate::config::Config;
use crate::probe::desktop::Compositor;

/// Display server type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayServer {
    Wayland,
    X11,
    Unknown,
}

impl std::fmt::Display for DisplayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayServer::Wayland => write!(f, "Wayland"),
            DisplayServer::X11 => write!(f, "X11"),
            DisplayServer::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Check if user is in a specific group
pub fn user_in_group(group: &str) -> bool {
    std::process::Command::new("groups")
        .output()
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .split_whitespace()
                .any(|g| g == group)
        })
        .unwrap_or(false)
}

/// Get the hoverbar binary path for the service file
pub fn get_hoverbar_path() -> String {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "hoverbar".to_string())
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("  \x1b[32m✓\x1b[0m {}", msg);
}

/// Print a failure message
pub fn print_failure(msg: &str) {
    println!("  \x1b[31m✗\x1b[0m {}", msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("  \x1b[34mℹ\x1b[0m {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  \x1b[33m⚠\x1b[0m {}", msg);
}

/// Detect the current display server
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        return DisplayServer::Wayland;
    }
    if std::env::var("DISPLAY").is_ok() {
        return DisplayServer::X11;
    }
    DisplayServer::Unknown
}

/// Write the default config if none exists
pub async fn run_setup() -> anyhow::Result<()> {
    println!("Hoverbar Setup\n");
    println!("==============\n");

    match Config::default_path() {
        Some(config_path) if config_path.exists() => {
            print_success(&format!("Config file: {:?}", config_path));
        }
        Some(config_path) => {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_path, crate::config::DEFAULT_CONFIG)?;
            print_success(&format!("Created: {:?}", config_path));
        }
        None => print_warning("Could not determine the config directory"),
    }

    println!("\n---");
    println!("\x1b[32m✓ Setup complete!\x1b[0m");
    println!();
    println!("Next steps:");
    println!("  1. Set your API key: export OPENAI_API_KEY=... (or edit [provider])");
    println!("  2. Start the daemon: hoverbar daemon\n");
    println!("Optional:");
    println!("  hoverbar setup check    - Verify system configuration");
    println!("  hoverbar setup systemd  - Install as systemd service");

    Ok(())
}

/// Run system checks (shows red X for failures)
pub async fn run_checks(config: &Config) -> anyhow::Result<()> {
    println!("Hoverbar System Check\n");
    println!("=====================\n");

    let mut all_ok = true;

    println!("Config:");
    match Config::default_path() {
        Some(path) if path.exists() => print_success(&format!("Config file: {:?}", path)),
        Some(path) => {
            print_info(&format!("No config file at {:?}, using defaults", path));
            println!("       Run: hoverbar setup");
        }
        None => print_warning("Could not determine the config directory"),
    }
    if config.actions.is_empty() {
        print_info("No custom actions configured");
    } else {
        print_success(&format!("{} custom action(s)", config.actions.len()));
    }

    println!("\nInput:");
    if !config.gesture.enabled {
        print_info("Gesture detection disabled (trigger only)");
    } else if user_in_group("input") {
        print_success("User is in 'input' group (global pointer events available)");
    } else {
        print_failure("User is not in 'input' group (gestures unavailable)");
        println!("       To enable: sudo usermod -aG input $USER && logout");
        all_ok = false;
    }

    println!("\nDesktop:");
    let display = detect_display_server();
    match display {
        DisplayServer::Wayland => print_success("Wayland session"),
        other => {
            print_warning(&format!("{} session (selection probe expects Wayland)", other));
        }
    }
    match Compositor::detect() {
        Some(compositor) => print_success(&format!("Compositor: {:?}", compositor)),
        None => {
            print_warning("Unsupported compositor (Hyprland or Sway needed for window info)");
        }
    }

    println!("\nClipboard:");
    if WaylandClipboard::is_available() {
        print_success("wl-clipboard installed");
    } else {
        print_failure("wl-clipboard not found");
        println!("       Install wl-clipboard via your package manager");
        all_ok = false;
    }

    let ydotool = YdotoolKeys.is_available().await;
    let wtype = WtypeKeys.is_available().await;
    if ydotool {
        print_success("ydotool available (copy/paste synthesis)");
    }
    if wtype {
        print_success("wtype available (copy/paste synthesis)");
    }
    if !ydotool && !wtype {
        if config.selection.clipboard_fallback {
            print_failure("No key synthesis tool, clipboard fallback will not work");
            println!("       Install ydotool (and start ydotoold) or wtype");
            all_ok = false;
        } else {
            print_info("No key synthesis tool (clipboard fallback is disabled anyway)");
        }
    }

    println!("\nProvider:");
    println!("  Endpoint: {}", config.provider.endpoint);
    if config.provider.api_key().is_some() {
        print_success("API key found");
    } else if config.provider.is_local() {
        print_success("Local endpoint, no API key needed");
    } else {
        print_warning(&format!(
            "No API key (set ${}), LLM, translate and speak will show an error",
            config.provider.api_key_env
        ));
    }

    println!("\n---");
    if all_ok {
        println!("\x1b[32m✓ All checks passed!\x1b[0m");
    } else {
        println!("\x1b[31m✗ Some checks failed.\x1b[0m Please fix the issues above.");
    }

    Ok(())
}
