use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Build a command whose child is killed if the caller stops waiting on it.
pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    cmd
}

fn describe(cmd: &Command) -> String {
    let inner = cmd.as_std();
    std::iter::once(inner.get_program())
        .chain(inner.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` to completion, capturing stdout and stderr.
pub async fn output(cmd: &mut Command, timeout: Duration) -> Result<Output, ExecError> {
    let program = describe(cmd);
    debug!(command = %program, "running");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|source| ExecError::Spawn { program, source }),
        Err(_) => Err(ExecError::TimedOut { program, timeout }),
    }
}

/// Run `cmd` to completion with its output streamed to our own stdout/stderr.
pub async fn status(cmd: &mut Command, timeout: Duration) -> Result<ExitStatus, ExecError> {
    let program = describe(cmd);
    debug!(command = %program, "running");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    match tokio::time::timeout(timeout, cmd.status()).await {
        Ok(result) => result.map_err(|source| ExecError::Spawn { program, source }),
        Err(_) => Err(ExecError::TimedOut { program, timeout }),
    }
}
