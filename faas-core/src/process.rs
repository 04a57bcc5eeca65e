//! Deadline-bounded invocation of external commands. Shared by the image
//! builder and the sandbox runner.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time;

use crate::error::Error;

/// Outcome of a command that ran to completion before its deadline.
pub struct CommandOutput {
    pub success: bool,
    /// Captured stdout followed by stderr, lossily decoded.
    pub combined: String,
}

/// Run `command` to completion or until `deadline` elapses.
///
/// On expiry the child is killed and reaped before [`Error::Timeout`] is
/// returned; a process handle is never left behind on any path.
pub async fn run_with_deadline(
    mut command: Command,
    deadline: Duration,
) -> Result<CommandOutput, Error> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn()?;

    match time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            success: output.status.success(),
            combined: combine(&output.stdout, &output.stderr),
        }),
        Ok(Err(err)) => Err(err.into()),
        // Dropping the cancelled wait future drops the child, and
        // kill_on_drop terminates and reaps it.
        Err(_) => Err(Error::Timeout(deadline.as_secs())),
    }
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(stderr));
    combined
}
