// Command-line interface definitions for hoverbar
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hoverbar")]
#[command(author, version, about = "Floating action bar for text selected anywhere on the desktop")]
#[command(long_about = "
Hoverbar watches for text selections anywhere on the desktop and shows a
small bar of actions next to them: copy, search, translate, speak, and your
own LLM prompts or sandboxed scripts.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Install wl-clipboard, and ydotool or wtype for the copy fallback
  4. Run: hoverbar setup (writes a default config and checks tools)
  5. Run: hoverbar (to start the daemon)

USAGE:
  Drag-select, double-click or press Ctrl+A in a text field. The bar appears
  at the pointer. Bind `hoverbar trigger` to a key to show it on demand.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable automatic gesture detection (trigger only)
    #[arg(long)]
    pub no_gestures: bool,

    /// Disable the synthesized-copy fallback
    #[arg(long)]
    pub no_clipboard_fallback: bool,

    /// Override the bar service port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Setup and installation utilities
    Setup {
        #[command(subcommand)]
        action: Option<SetupAction>,
    },

    /// Show current configuration
    Config,

    /// Show the bar state (for Waybar/polybar integration)
    Status {
        /// Continuously output state changes (for Waybar exec)
        #[arg(long)]
        follow: bool,

        /// Output format: "text" (default) or "json" (for Waybar)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show the bar for the current selection (send SIGUSR1 to daemon)
    Trigger,

    /// Hide the bar (send SIGUSR2 to daemon)
    Dismiss,

    /// Run a script action against some text, outside the daemon
    RunScript {
        /// Script file defining `function transform(input)`
        file: std::path::PathBuf,

        /// Input text
        text: String,

        /// Override the configured time budget
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum SetupAction {
    /// Verify tools, permissions and configuration
    Check,

    /// Install hoverbar as a systemd user service
    Systemd {
        /// Uninstall the service instead of installing
        #[arg(long)]
        uninstall: bool,

        /// Show service status
        #[arg(long)]
        status: bool,
    },
}
