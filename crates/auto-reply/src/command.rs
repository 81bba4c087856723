//! Timeout-bound external command execution.

use std::{process::Stdio, time::Duration};

use {
    tokio::{
        io::{AsyncRead, AsyncReadExt},
        process::Command,
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

use crate::{Error, Result};

/// How long to wait for output pipes to drain after a timeout kill.
/// Grandchildren can keep the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured outcome of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code when the process exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal reported by the OS, if any.
    pub signal: Option<i32>,
    /// We force-killed the process because the timeout elapsed.
    pub killed: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        !self.killed && self.exit_code == Some(0)
    }

    pub fn timed_out(&self) -> bool {
        self.killed && self.signal.is_none()
    }
}

/// Run `argv` with stdin inherited and stdout/stderr captured.
///
/// The process is force-killed once `timeout` elapses; that sets `killed`
/// and leaves `signal` unset. No retries.
pub async fn run_command(argv: &[String], timeout: Duration) -> Result<CommandResult> {
    let (program, args) = argv.split_first().ok_or(Error::EmptyCommand)?;

    debug!(program, args = ?args, timeout_secs = timeout.as_secs(), "running command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let (status, killed) = tokio::select! {
        status = child.wait() => (Some(status?), false),
        _ = tokio::time::sleep(timeout) => {
            warn!(program, timeout_secs = timeout.as_secs(), "command timed out, killing");
            if let Err(e) = child.kill().await {
                warn!(program, error = %e, "failed to kill timed out command");
            }
            (None, true)
        },
    };

    let stdout = collect(stdout, killed).await;
    let stderr = collect(stderr, killed).await;

    let (exit_code, signal) = match status {
        Some(status) => (status.code(), exit_signal(&status)),
        None => (None, None),
    };

    debug!(
        program,
        ?exit_code,
        ?signal,
        killed,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "command finished"
    );

    Ok(CommandResult {
        stdout,
        stderr,
        exit_code,
        signal,
        killed,
    })
}

fn spawn_reader<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>, killed: bool) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    let bytes = if killed {
        match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                handle.abort();
                Vec::new()
            },
        }
    } else {
        handle.await.unwrap_or_default()
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = run_command(&argv(&["sh", "-c", "echo out; echo err >&2"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.killed);
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let result = run_command(&argv(&["sh", "-c", "exit 3"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.signal, None);
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let start = std::time::Instant::now();
        let result = run_command(&argv(&["sleep", "5"]), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(result.killed);
        assert!(result.timed_out());
        assert_eq!(result.signal, None);
        assert_eq!(result.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn external_signal_is_not_a_timeout() {
        let result = run_command(&argv(&["sh", "-c", "kill -TERM $$"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!result.killed);
        assert_eq!(result.signal, Some(15));
        assert!(!result.timed_out());
        assert!(!result.success());
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        assert!(matches!(
            run_command(&[], Duration::from_secs(1)).await,
            Err(Error::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = run_command(
            &argv(&["relay-definitely-not-a-real-binary"]),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }
}
