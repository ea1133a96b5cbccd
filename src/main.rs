//! Hoverbar - floating action bar for selected text
//!
//! Run with `hoverbar` or `hoverbar daemon` to start the daemon.
//! Use `hoverbar setup` to write a default config and check dependencies.
//! Use `hoverbar trigger` / `hoverbar dismiss` from compositor keybindings.

use clap::Parser;
use hoverbar::cli::{Cli, Commands, SetupAction};
use hoverbar::config::{self, Config};
use hoverbar::script::ScriptRunner;
use hoverbar::session::BarView;
use hoverbar::{daemon, setup};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("hoverbar={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if cli.no_gestures {
        config.gesture.enabled = false;
    }
    if cli.no_clipboard_fallback {
        config.selection.clipboard_fallback = false;
    }
    if let Some(port) = cli.port {
        config.service.port = port;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }
        Commands::Setup { action } => match action {
            None => setup::run_setup().await?,
            Some(SetupAction::Check) => setup::run_checks(&config).await?,
            Some(SetupAction::Systemd { uninstall, status }) => {
                if status {
                    setup::systemd::status().await?;
                } else if uninstall {
                    setup::systemd::uninstall().await?;
                } else {
                    setup::systemd::install().await?;
                }
            }
        },
        Commands::Config => {
            show_config(&config)?;
        }
        Commands::Status { follow, format } => {
            run_status(&config, follow, &format)?;
        }
        Commands::Trigger => {
            send_signal(Signal::Trigger)?;
        }
        Commands::Dismiss => {
            send_signal(Signal::Dismiss)?;
        }
        Commands::RunScript {
            file,
            text,
            timeout_ms,
        } => {
            run_script(&config, &file, &text, timeout_ms).await?;
        }
    }

    Ok(())
}

/// Show current configuration, with the inline API key masked
fn show_config(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some("********".to_string());
    }

    println!("Current Configuration\n");
    println!("=====================\n");
    println!("{}", toml::to_string_pretty(&shown)?);

    println!("---");
    match Config::default_path() {
        Some(path) if path.exists() => println!("Config file: {:?}", path),
        Some(path) => println!("Config file: {:?} (not found, using defaults)", path),
        None => println!("Config file: (not found)"),
    }
    if let Some(state) = config.resolve_state_file() {
        println!("State file: {:?}", state);
    }
    println!("Runtime dir: {:?}", Config::runtime_dir());

    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Trigger,
    Dismiss,
}

/// Signal the running daemon through its PID file
fn send_signal(which: Signal) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;

    let pid_path = Config::runtime_dir().join("pid");
    let pid: i32 = std::fs::read_to_string(&pid_path)
        .map_err(|_| anyhow::anyhow!("Daemon is not running (no PID file at {:?})", pid_path))?
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Corrupt PID file at {:?}", pid_path))?;

    let signal = match which {
        Signal::Trigger => NixSignal::SIGUSR1,
        Signal::Dismiss => NixSignal::SIGUSR2,
    };

    kill(Pid::from_raw(pid), signal)
        .map_err(|e| anyhow::anyhow!("Failed to signal daemon (pid {}): {}", pid, e))?;
    tracing::debug!("Sent {:?} to pid {}", signal, pid);
    Ok(())
}

/// Run a script action once and print its output
async fn run_script(
    config: &Config,
    file: &Path,
    text: &str,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let script = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read script {:?}: {}", file, e))?;

    let runner = ScriptRunner::from_config(&config.script);
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| runner.timeout());

    let output = runner.run(&script, text, timeout).await?;
    println!("{}", output);
    Ok(())
}

/// Read the state file; a missing file means the daemon is not running
fn read_view(path: &Path) -> Option<BarView> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(view) => Some(view),
        Err(e) => {
            tracing::debug!("Unreadable state file: {}", e);
            None
        }
    }
}

fn state_name(view: Option<&BarView>) -> String {
    view.map_or_else(|| "stopped".to_string(), |v| v.phase.clone())
}

/// Format state as JSON for Waybar consumption
fn format_state_json(view: Option<&BarView>) -> String {
    let state = state_name(view);
    let (text, tooltip) = match state.as_str() {
        "idle" => ("", "Hoverbar ready"),
        "visible" => ("▤", "Bar shown"),
        "processing" | "translating" => ("…", "Working..."),
        "speaking" => ("🔊", "Speaking"),
        "result" => ("✓", "Result ready"),
        "error" => ("!", "Action failed"),
        "stopped" => ("", "Hoverbar not running"),
        _ => ("?", "Unknown state"),
    };

    serde_json::json!({
        "text": text,
        "class": state,
        "tooltip": tooltip,
    })
    .to_string()
}

fn print_state(view: Option<&BarView>, format: &str) {
    if format == "json" {
        println!("{}", format_state_json(view));
    } else {
        println!("{}", state_name(view));
    }
}

/// Run the status command - show current bar state
fn run_status(config: &Config, follow: bool, format: &str) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is disabled.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    let view = read_view(&state_path);
    print_state(view.as_ref(), format);
    if !follow {
        return Ok(());
    }

    // Follow mode: watch for changes
    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::{channel, RecvTimeoutError};

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // Watch the parent directory (file may not exist yet)
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    let mut last = state_name(view.as_ref());

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                let view = read_view(&state_path);
                let state = state_name(view.as_ref());
                if state != last {
                    print_state(view.as_ref(), format);
                    last = state;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !state_path.exists() && last != "stopped" {
                    print_state(None, format);
                    last = "stopped".to_string();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_for_missing_daemon() {
        let json: serde_json::Value = serde_json::from_str(&format_state_json(None)).unwrap();
        assert_eq!(json["class"], "stopped");
    }

    #[test]
    fn test_status_reads_phase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        std::fs::write(&path, r#"{"visible":true,"phase":"speaking"}"#).unwrap();

        let view = read_view(&path);
        assert_eq!(state_name(view.as_ref()), "speaking");
        assert!(format_state_json(view.as_ref()).contains("Speaking"));
    }
}
