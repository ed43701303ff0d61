//! # Recurring Job Registration
//!
//! Registers the binary to run unattended: hourly, and shortly after the
//! user logs in. The pipeline itself never schedules anything; these jobs
//! just invoke `bing-background --silent`.
//!
//! - Linux: a systemd user service + timer in `~/.config/systemd/user/`
//! - Windows: two Task Scheduler entries created with `schtasks`

use std::path::{Path, PathBuf};

use crate::host::run_checked;

/// Name shared by the systemd units and the scheduled tasks.
pub const JOB_NAME: &str = "bing-background";

/// External scheduler the binary registers itself with.
pub trait RecurringJob {
    fn install(&self, executable: &Path, working_dir: &Path) -> Result<(), String>;
    fn remove(&self) -> Result<(), String>;
    fn exists(&self) -> bool;
}

/// Returns the scheduler for this platform.
pub fn system_job() -> Result<Box<dyn RecurringJob>, String> {
    if cfg!(windows) {
        Ok(Box::new(TaskScheduler))
    } else {
        SystemdTimer::user().map(|t| Box::new(t) as Box<dyn RecurringJob>)
    }
}

/// systemd `--user` service and timer.
#[derive(Debug, Clone)]
pub struct SystemdTimer {
    unit_dir: PathBuf,
    /// Reload and enable through `systemctl`; off when only writing files.
    manage: bool,
}

impl SystemdTimer {
    pub fn user() -> Result<Self, String> {
        let home = dirs::home_dir().ok_or("Could not find home directory")?;
        Ok(Self {
            manage: true,
            ..Self::in_dir(home.join(".config/systemd/user"))
        })
    }

    /// Writes units into `unit_dir` without calling `systemctl`.
    pub fn in_dir(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            manage: false,
        }
    }

    fn service_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{JOB_NAME}.service"))
    }

    fn timer_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{JOB_NAME}.timer"))
    }

    fn systemctl(&self, args: &[&str]) -> Result<(), String> {
        if !self.manage {
            return Ok(());
        }
        let mut full = vec!["--user"];
        full.extend_from_slice(args);
        run_checked("systemctl", &full).map(drop)
    }
}

/// Quotes a path for an `ExecStart=` / `WorkingDirectory=` line.
fn systemd_quote(path: &Path) -> String {
    let s = path.display().to_string();
    if s.contains(char::is_whitespace) || s.contains('"') {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s
    }
}

pub(crate) fn service_unit(executable: &Path, working_dir: &Path) -> String {
    format!(
        r#"[Unit]
Description=Set the Bing image of the day as the desktop background
After=network-online.target graphical-session.target
Wants=network-online.target

[Service]
Type=oneshot
ExecStart={} --silent
WorkingDirectory={}
"#,
        systemd_quote(executable),
        systemd_quote(working_dir)
    )
}

pub(crate) fn timer_unit() -> String {
    format!(
        r#"[Unit]
Description=Hourly Bing background update

[Timer]
OnCalendar=hourly
OnStartupSec=1min
Persistent=true
Unit={JOB_NAME}.service

[Install]
WantedBy=timers.target
"#
    )
}

impl RecurringJob for SystemdTimer {
    fn install(&self, executable: &Path, working_dir: &Path) -> Result<(), String> {
        std::fs::create_dir_all(&self.unit_dir)
            .map_err(|e| format!("Failed to create systemd directory: {e}"))?;

        std::fs::write(self.service_path(), service_unit(executable, working_dir))
            .map_err(|e| format!("Failed to write service file: {e}"))?;
        std::fs::write(self.timer_path(), timer_unit())
            .map_err(|e| format!("Failed to write timer file: {e}"))?;

        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", "--now", &format!("{JOB_NAME}.timer")])?;
        tracing::info!(dir = %self.unit_dir.display(), "systemd timer installed");
        Ok(())
    }

    fn remove(&self) -> Result<(), String> {
        if let Err(e) = self.systemctl(&["disable", "--now", &format!("{JOB_NAME}.timer")]) {
            tracing::warn!(error = %e, "disabling timer failed");
        }

        for path in [self.timer_path(), self.service_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(format!("Failed to remove {}: {e}", path.display())),
            }
        }

        self.systemctl(&["daemon-reload"])?;
        tracing::info!("systemd timer removed");
        Ok(())
    }

    fn exists(&self) -> bool {
        self.timer_path().exists() && self.service_path().exists()
    }
}

/// Windows Task Scheduler via `schtasks.exe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskScheduler;

const LOGON_TASK: &str = "bing-background logon";

/// `schtasks /Create` arguments for the hourly and logon tasks.
///
/// schtasks has no working-directory option; the binary resolves its
/// paths from the config file, not the current directory.
pub(crate) fn schtasks_create_args(executable: &Path) -> [Vec<String>; 2] {
    let action = format!("\"{}\" --silent", executable.display());
    let base = |name: &str| {
        vec![
            "/Create".to_string(),
            "/F".to_string(),
            "/TN".to_string(),
            name.to_string(),
            "/TR".to_string(),
            action.clone(),
        ]
    };

    let mut hourly = base(JOB_NAME);
    hourly.extend(["/SC", "HOURLY"].map(String::from));

    let mut logon = base(LOGON_TASK);
    logon.extend(["/SC", "ONLOGON", "/DELAY", "0001:00"].map(String::from));

    [hourly, logon]
}

impl RecurringJob for TaskScheduler {
    fn install(&self, executable: &Path, _working_dir: &Path) -> Result<(), String> {
        for args in schtasks_create_args(executable) {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            run_checked("schtasks", &args)?;
        }
        tracing::info!("scheduled tasks installed");
        Ok(())
    }

    fn remove(&self) -> Result<(), String> {
        for name in [JOB_NAME, LOGON_TASK] {
            run_checked("schtasks", &["/Delete", "/F", "/TN", name])?;
        }
        tracing::info!("scheduled tasks removed");
        Ok(())
    }

    fn exists(&self) -> bool {
        run_checked("schtasks", &["/Query", "/TN", JOB_NAME]).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_remove_units() {
        let dir = tempfile::tempdir().unwrap();
        let timer = SystemdTimer::in_dir(dir.path().join("systemd/user"));
        assert!(!timer.exists());

        timer
            .install(Path::new("/opt/bing background/bin"), Path::new("/opt/bing background"))
            .unwrap();
        assert!(timer.exists());

        let service = std::fs::read_to_string(timer.service_path()).unwrap();
        assert!(service.contains("ExecStart=\"/opt/bing background/bin\" --silent"));
        assert!(service.contains("WorkingDirectory=\"/opt/bing background\""));

        timer.remove().unwrap();
        assert!(!timer.exists());
        // second removal is a no-op
        timer.remove().unwrap();
    }

    #[test]
    fn timer_runs_hourly_and_after_login() {
        let unit = timer_unit();
        assert!(unit.contains("OnCalendar=hourly"));
        assert!(unit.contains("OnStartupSec=1min"));
        assert!(unit.contains("Unit=bing-background.service"));
    }

    #[test]
    fn plain_paths_are_not_quoted() {
        assert_eq!(systemd_quote(Path::new("/usr/bin/bing-background")), "/usr/bin/bing-background");
    }

    #[test]
    fn schtasks_arguments() {
        let [hourly, logon] = schtasks_create_args(Path::new(r"C:\Tools\bing-background.exe"));
        assert!(hourly.ends_with(&["/SC".to_string(), "HOURLY".to_string()]));
        assert!(logon.contains(&"ONLOGON".to_string()));
        assert!(hourly.contains(&r#""C:\Tools\bing-background.exe" --silent"#.to_string()));
    }
}
