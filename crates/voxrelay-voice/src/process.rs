use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Why an external tool invocation failed.
#[derive(Debug)]
pub(crate) enum ProcessFailure {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
    Exit(Output),
}

impl ProcessFailure {
    /// Renders the failure for an error message, naming the tool.
    pub(crate) fn describe(&self, tool: &str) -> String {
        match self {
            ProcessFailure::Spawn(e) => format!("Failed to spawn {}: {}", tool, e),
            ProcessFailure::Wait(e) => format!("Failed to wait for {}: {}", tool, e),
            ProcessFailure::TimedOut(t) => {
                format!("{} timed out after {} seconds", tool, t.as_secs())
            }
            ProcessFailure::Exit(output) => format!(
                "{} failed ({}): {}",
                tool,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }
}

/// Runs `command` to completion, capturing stdout and stderr.
///
/// The child is killed if `timeout` elapses first.
pub(crate) async fn run(mut command: Command, timeout: Duration) -> Result<Output, ProcessFailure> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(ProcessFailure::Spawn)?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProcessFailure::TimedOut(timeout))?
        .map_err(ProcessFailure::Wait)?;

    if !output.status.success() {
        return Err(ProcessFailure::Exit(output));
    }
    Ok(output)
}
