//! Systemd user service management for hoverbar

use super::{get_hoverbar_path, print_failure, print_info, print_success};
use std::path::PathBuf;
use tokio::process::Command;

const SERVICE_NAME: &str = "hoverbar.service";

/// Get the systemd user service directory
fn service_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().join("systemd/user"))
        .unwrap_or_else(|| PathBuf::from("~/.config/systemd/user"))
}

fn service_path() -> PathBuf {
    service_dir().join(SERVICE_NAME)
}

/// Generate the systemd service file content
fn generate_service_file(binary: &str) -> String {
    format!(
        r#"[Unit]
Description=Hoverbar selection action bar
PartOf=graphical-session.target
After=graphical-session.target

[Service]
Type=simple
ExecStart={binary} daemon
Restart=on-failure
RestartSec=5

# Ensure we have access to the display
Environment=XDG_RUNTIME_DIR=%t

[Install]
WantedBy=graphical-session.target
"#
    )
}

async fn systemctl(args: &[&str]) -> bool {
    Command::new("systemctl")
        .arg("--user")
        .args(args)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Install the systemd user service
pub async fn install() -> anyhow::Result<()> {
    println!("Installing hoverbar systemd service...\n");

    let service_dir = service_dir();
    let service_path = service_path();

    std::fs::create_dir_all(&service_dir)?;
    std::fs::write(&service_path, generate_service_file(&get_hoverbar_path()))?;
    print_success(&format!("Created: {:?}", service_path));

    println!("\nReloading systemd...");
    if !systemctl(&["daemon-reload"]).await {
        print_failure("Failed to reload systemd daemon");
        return Ok(());
    }
    print_success("Systemd daemon reloaded");

    println!("\nEnabling and starting service...");
    if systemctl(&["enable", "--now", SERVICE_NAME]).await {
        print_success("Service enabled and started");
    } else {
        print_failure("Failed to start service");
        println!("    Check logs with: journalctl --user -u hoverbar");
    }

    println!("\n---");
    println!("Useful commands:");
    println!("  systemctl --user status hoverbar   # Check status");
    println!("  systemctl --user restart hoverbar  # Restart");
    println!("  journalctl --user -u hoverbar -f   # View logs");

    Ok(())
}

/// Uninstall the systemd user service
pub async fn uninstall() -> anyhow::Result<()> {
    println!("Uninstalling hoverbar systemd service...\n");

    systemctl(&["disable", "--now", SERVICE_NAME]).await;
    print_success("Service stopped and disabled");

    let service_path = service_path();
    if service_path.exists() {
        std::fs::remove_file(&service_path)?;
        print_success(&format!("Removed: {:?}", service_path));
    } else {
        print_info("Service file not found (already removed?)");
    }

    systemctl(&["daemon-reload"]).await;
    println!("\n---");
    println!("Service uninstalled.");
    Ok(())
}

/// Show the service status
pub async fn status() -> anyhow::Result<()> {
    let output = Command::new("systemctl")
        .args(["--user", "status", SERVICE_NAME])
        .output()
        .await?;

    println!("{}", String::from_utf8_lossy(&output.stdout));
    if !output.stderr.is_empty() {
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_file_runs_daemon() {
        let unit = generate_service_file("/usr/local/bin/hoverbar");
        assert!(unit.contains("ExecStart=/usr/local/bin/hoverbar daemon"));
        assert!(unit.contains("WantedBy=graphical-session.target"));
    }
}
