//! Development tasks for hoverbar
//!
//! Usage:
//!   cargo xtask install     Install release binary to /usr/local/bin (requires sudo)
//!   cargo xtask uninstall   Remove binary from /usr/local/bin (requires sudo)
//!   cargo xtask dist        Build release binary for distribution
//!   cargo xtask man         Generate man pages into target/man

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const INSTALL_PATH: &str = "/usr/local/bin/hoverbar";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(command) = args.first() else {
        print_help();
        return ExitCode::SUCCESS;
    };

    let result = match command.as_str() {
        "install" => install(),
        "uninstall" => uninstall(),
        "dist" => dist(),
        "man" => man(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
hoverbar development tasks

Usage: cargo xtask <COMMAND>

Commands:
  install    Build release binary and install to /usr/local/bin (requires sudo)
  uninstall  Remove hoverbar from /usr/local/bin (requires sudo)
  dist       Build optimized release binary for distribution
  man        Generate man pages (copied to target/man)
"#
    );
}

/// Get the project root directory
fn project_root() -> PathBuf {
    let dir = env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .or_else(|_| env::current_dir())
        .unwrap_or_else(|_| PathBuf::from("."));

    // xtask is in a subdirectory, go up one level
    dir.parent().unwrap_or(&dir).to_path_buf()
}

fn cargo_release(root: &Path, envs: &[(&str, &str)]) -> anyhow::Result<PathBuf> {
    let status = Command::new("cargo")
        .args(["build", "--release"])
        .envs(envs.iter().copied())
        .current_dir(root)
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let binary = root.join("target/release/hoverbar");
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    Ok(binary)
}

/// Build release binary and install to /usr/local/bin
fn install() -> anyhow::Result<()> {
    println!("==> Building release binary...");
    let binary = cargo_release(&project_root(), &[])?;

    println!("==> Installing to {}...", INSTALL_PATH);
    let status = Command::new("sudo")
        .arg("install")
        .arg("-Dm755")
        .arg(&binary)
        .arg(INSTALL_PATH)
        .status()?;

    if !status.success() {
        anyhow::bail!("Install failed (sudo required)");
    }

    println!("==> Installed successfully!");
    let _ = Command::new(INSTALL_PATH).arg("--version").status();
    Ok(())
}

/// Remove hoverbar from /usr/local/bin
fn uninstall() -> anyhow::Result<()> {
    println!("==> Removing {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .args(["rm", "-f", INSTALL_PATH])
        .status()?;

    if !status.success() {
        anyhow::bail!("Uninstall failed (sudo required)");
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Build optimized release binary for distribution
fn dist() -> anyhow::Result<()> {
    println!("==> Building distribution binary...");
    let binary = cargo_release(&project_root(), &[])?;
    println!("==> Built: {:?}", binary);

    let _ = Command::new("ls").arg("-lh").arg(&binary).status();
    let _ = Command::new(&binary).arg("--version").status();
    Ok(())
}

/// Force man page generation and copy the pages somewhere predictable
fn man() -> anyhow::Result<()> {
    let root = project_root();
    println!("==> Generating man pages...");
    cargo_release(&root, &[("HOVERBAR_GEN_MANPAGES", "1")])?;

    let build_dir = root.join("target/release/build");
    let target = root.join("target/man");
    std::fs::create_dir_all(&target)?;

    let mut copied = 0;
    for entry in std::fs::read_dir(&build_dir)? {
        let man_dir = entry?.path().join("out/man");
        if !man_dir.is_dir() {
            continue;
        }
        for page in std::fs::read_dir(&man_dir)? {
            let page = page?.path();
            if let Some(name) = page.file_name() {
                std::fs::copy(&page, target.join(name))?;
                copied += 1;
            }
        }
    }

    if copied == 0 {
        anyhow::bail!("No man pages found under {:?}", build_dir);
    }
    println!("==> {} page(s) in {:?}", copied, target);
    Ok(())
}
