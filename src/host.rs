//! Helpers for running commands on the host system.
//!
//! Inside a Flatpak sandbox desktop tools (`gsettings`, `systemctl`,
//! `xrandr`, ...) are not visible, so they are routed through
//! `flatpak-spawn --host`.
//!
//! The async variants are used inside a pipeline run: their children are
//! killed when the future is dropped, so the run's timeout also bounds them.
//! The blocking [`run_checked`] serves the one-off `--install` path.

use std::process::Output;

/// Flatpak creates `/.flatpak-info` inside the sandbox.
pub fn is_flatpak() -> bool {
    std::path::Path::new("/.flatpak-info").exists()
}

fn host_command(cmd: &str, args: &[&str]) -> std::process::Command {
    let mut command = if is_flatpak() {
        let mut command = std::process::Command::new("flatpak-spawn");
        command.arg("--host").arg(cmd);
        command
    } else {
        std::process::Command::new(cmd)
    };
    command.args(args);
    command
}

fn check(cmd: &str, args: &[&str], output: Output) -> Result<Output, String> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(format!(
            "{cmd} {} failed: {}",
            args.first().unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// Runs `cmd` to completion, failing with its stderr if it exits non-zero.
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<Output, String> {
    let output = host_command(cmd, args)
        .output()
        .map_err(|e| format!("Failed to run {cmd}: {e}"))?;
    check(cmd, args, output)
}

/// Runs `cmd` to completion; the child is killed if the future is dropped.
pub async fn run_host_command(cmd: &str, args: &[&str]) -> std::io::Result<Output> {
    tokio::process::Command::from(host_command(cmd, args))
        .kill_on_drop(true)
        .output()
        .await
}

/// Async [`run_checked`] with the same kill-on-drop behavior.
pub async fn run_host_checked(cmd: &str, args: &[&str]) -> Result<Output, String> {
    let output = run_host_command(cmd, args)
        .await
        .map_err(|e| format!("Failed to run {cmd}: {e}"))?;
    check(cmd, args, output)
}

/// Starts `cmd` in the background and leaves it running.
pub fn spawn_host_command(cmd: &str) -> std::io::Result<tokio::process::Child> {
    tokio::process::Command::from(host_command(cmd, &[])).spawn()
}
