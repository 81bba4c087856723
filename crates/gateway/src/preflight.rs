//! Local port checks before the webhook server starts.

use std::{io::ErrorKind, time::Duration};

use {
    tokio::net::TcpListener,
    tracing::{debug, warn},
};

use crate::error::{BringUpError, Result};

const LSOF_TIMEOUT: Duration = Duration::from_secs(3);

/// Bind `bind:port` and release it immediately.
///
/// A conflict becomes [`BringUpError::PortInUse`] naming the current
/// listener when it can be found; any other failure is
/// [`BringUpError::Bind`].
pub async fn preflight_port(bind: &str, port: u16) -> Result<()> {
    let addr = format!("{bind}:{port}");
    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            drop(listener);
            debug!(addr = %addr, "port is free");
            Ok(())
        },
        Err(e) => Err(classify_bind_error(addr, port, e).await),
    }
}

pub(crate) async fn classify_bind_error(
    addr: String,
    port: u16,
    source: std::io::Error,
) -> BringUpError {
    if source.kind() == ErrorKind::AddrInUse {
        let holder = describe_listener(port)
            .await
            .unwrap_or_else(|| "listener unknown".to_string());
        warn!(port, holder = %holder, "port already in use");
        BringUpError::PortInUse { port, holder }
    } else {
        BringUpError::Bind { addr, source }
    }
}

/// Best effort: ask `lsof` who listens on `port`.
async fn describe_listener(port: u16) -> Option<String> {
    let output = tokio::time::timeout(
        LSOF_TIMEOUT,
        tokio::process::Command::new("lsof")
            .args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    parse_lsof(&String::from_utf8_lossy(&output.stdout))
}

/// `COMMAND PID USER ...` header plus one line per socket; report the first.
fn parse_lsof(stdout: &str) -> Option<String> {
    let line = stdout.lines().skip(1).find(|l| !l.trim().is_empty())?;
    let mut fields = line.split_whitespace();
    let command = fields.next()?;
    match fields.next() {
        Some(pid) => Some(format!("{command} (pid {pid})")),
        None => Some(command.to_string()),
    }
}
