//! External command helper for modules

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::{debug, warn};

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `cmd` and capture its output
///
/// # Errors
/// Returns [`Error::Command`] when the command exits with a non-zero status (or is killed by
/// a signal, reported as exit code -1), and [`Error::Io`] when it cannot be spawned at all.
pub fn run_command<S: AsRef<str>>(cmd: &[S]) -> Result<ProcessOutput> {
    let cmd: Vec<String> = cmd.iter().map(|s| s.as_ref().to_string()).collect();

    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| Error::hard("Cannot run an empty command"))?;

    debug!("running command: {}", cmd.join(" "));

    let output = Command::new(program).args(args).output()?;

    let captured = ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !output.status.success() {
        warn!(
            "command '{}' exited with code {}: {}",
            cmd.join(" "),
            captured.exit_code,
            captured.stderr.trim()
        );
        return Err(Error::Command {
            cmd,
            output: captured,
        });
    }

    debug!("command returned {} bytes of output", captured.stdout.len());

    Ok(captured)
}
