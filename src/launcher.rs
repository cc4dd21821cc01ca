use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use tracing::{debug, error, info};

/// Launch lifecycle per invocation. There is no timeout, cancellation or
/// retry; a new launch can only start once the previous one finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    IDLE,
    LAUNCHING,
    SUCCEEDED,
    FAILED,
}

#[derive(Debug)]
pub struct LaunchOutcome {
    pub identifier: String,
    pub result: Result<String, String>,
}

/// Runs the external plot script on a worker thread and hands the outcome
/// back to the event loop through a channel.
pub struct Launcher {
    tx: Sender<LaunchOutcome>,
    rx: Receiver<LaunchOutcome>,
}

impl Launcher {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    /// Fire-and-collect: spawns the script with the identifier as its sole
    /// argument. Completion is delivered via `poll()`.
    pub fn launch(&self, script: &Path, identifier: &str) {
        let tx = self.tx.clone();
        let script = script.to_path_buf();
        let identifier = identifier.to_string();
        thread::spawn(move || {
            let result = Self::run_script(&script, &identifier);
            // The receiver only disappears when the app is shutting down
            let _ = tx.send(LaunchOutcome { identifier, result });
        });
    }

    pub fn poll(&self) -> Option<LaunchOutcome> {
        self.rx.try_recv().ok()
    }

    fn run_script(script: &Path, identifier: &str) -> Result<String, String> {
        debug!("Running {} {}", script.display(), identifier);
        let output = Command::new(script)
            .arg(identifier)
            .output()
            .map_err(|e| format!("Failed to run {}: {}", script.display(), e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(format!(
                "{} exited with {}: {}",
                script.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

pub fn log_outcome(outcome: &LaunchOutcome) {
    match &outcome.result {
        Ok(stdout) => {
            info!("Plot script finished for {}", outcome.identifier);
            if !stdout.trim().is_empty() {
                info!("Plot output: {}", stdout.trim());
            }
        }
        Err(e) => error!("Plot script failed for {}: {}", outcome.identifier, e),
    }
}

pub fn script_for_platform(windows: bool) -> PathBuf {
    if windows {
        PathBuf::from("run.bat")
    } else {
        PathBuf::from("./run.sh")
    }
}

pub fn platform_script() -> PathBuf {
    script_for_platform(cfg!(windows))
}
