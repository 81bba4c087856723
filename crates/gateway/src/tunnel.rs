//! Public ingress for the webhook server.
//!
//! - **Tailscale**: shells out to `tailscale funnel|serve --bg` and reads the
//!   node's DNS name from `tailscale status --json`.
//! - **Static**: a fixed public URL (ngrok, a reverse proxy, ...).

use std::{process::Output, time::Duration};

use {
    async_trait::async_trait,
    relay_channels::{Error, Result, Tunnel},
    relay_config::TunnelMode,
    tracing::{debug, info},
};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

// ── Tailscale ────────────────────────────────────────────────────────────────

pub struct TailscaleTunnel {
    mode: TunnelMode,
    port: u16,
    binary: String,
}

impl TailscaleTunnel {
    pub fn new(mode: TunnelMode, port: u16) -> Self {
        Self {
            mode,
            port,
            binary: "tailscale".into(),
        }
    }

    /// Use another `tailscale` executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        let cmd = format!("{} {}", self.binary, args.join(" "));
        debug!(cmd = %cmd, "running tailscale command");
        let child = tokio::process::Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(COMMAND_TIMEOUT, child)
            .await
            .map_err(|_| {
                Error::unavailable(format!(
                    "`{cmd}` timed out after {}s; run it in a terminal to see what it needs",
                    COMMAND_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| Error::external(format!("failed to run `{cmd}`"), e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::unavailable(format!(
                "`{cmd}` failed: {}",
                stderr.trim()
            )));
        }
        Ok(output)
    }

    async fn expose(&self) -> Result<()> {
        let verb = match self.mode {
            TunnelMode::Funnel => "funnel",
            TunnelMode::Serve => "serve",
            TunnelMode::Off => return Ok(()),
        };
        let target = format!("http://127.0.0.1:{}", self.port);
        let output = self.run(&[verb, "--bg", "--yes", &target]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        info!(port = self.port, mode = verb, stdout = %stdout.trim(), "tailscale ingress enabled");
        Ok(())
    }
}

#[async_trait]
impl Tunnel for TailscaleTunnel {
    async fn resolve_public_hostname(&self) -> Result<String> {
        self.expose().await?;
        let output = self.run(&["status", "--json"]).await?;
        let status: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        dns_name(&status)
            .ok_or_else(|| Error::unavailable("tailscale status has no Self.DNSName; is the node logged in?"))
    }
}

/// `Self.DNSName` without the trailing root dot.
fn dns_name(status: &serde_json::Value) -> Option<String> {
    status
        .pointer("/Self/DNSName")
        .and_then(|v| v.as_str())
        .map(|s| s.trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty())
}

// ── Static ───────────────────────────────────────────────────────────────────

pub struct StaticTunnel {
    public_url: String,
}

impl StaticTunnel {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
        }
    }
}

#[async_trait]
impl Tunnel for StaticTunnel {
    /// The configured URL's origin (`https://host[:port]`). Any path on it
    /// is dropped; the webhook path is appended by bring-up.
    async fn resolve_public_hostname(&self) -> Result<String> {
        let url = url::Url::parse(&self.public_url).map_err(|e| {
            Error::invalid_input(format!("webhook.public_url {:?}: {e}", self.public_url))
        })?;
        if url.host_str().is_none() {
            return Err(Error::invalid_input(format!(
                "webhook.public_url {:?} has no host",
                self.public_url
            )));
        }
        Ok(url.origin().ascii_serialization())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_name_trims_root_dot() {
        let status = serde_json::json!({"Self": {"DNSName": "relay.tail1234.ts.net."}});
        assert_eq!(dns_name(&status).as_deref(), Some("relay.tail1234.ts.net"));
        assert_eq!(dns_name(&serde_json::json!({"Self": {"DNSName": ""}})), None);
        assert_eq!(dns_name(&serde_json::json!({})), None);
    }

    #[tokio::test]
    async fn static_tunnel_returns_origin() {
        let tunnel = StaticTunnel::new("https://abc.ngrok.app/some/path");
        assert_eq!(
            tunnel.resolve_public_hostname().await.unwrap(),
            "https://abc.ngrok.app"
        );
        assert!(matches!(
            StaticTunnel::new("not a url").resolve_public_hostname().await,
            Err(Error::InvalidInput { .. })
        ));
    }

    #[cfg(unix)]
    fn fake_tailscale(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tailscale");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tailscale_enables_funnel_then_reads_dns_name() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls");
        let bin = fake_tailscale(
            dir.path(),
            &format!(
                r#"echo "$@" >> {log}
if [ "$1" = status ]; then echo '{{"Self":{{"DNSName":"relay.tail1.ts.net."}}}}'; fi"#,
                log = log.display()
            ),
        );

        let tunnel = TailscaleTunnel::new(TunnelMode::Funnel, 42873).with_binary(bin);
        assert_eq!(
            tunnel.resolve_public_hostname().await.unwrap(),
            "relay.tail1.ts.net"
        );
        let calls = std::fs::read_to_string(log).unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            ["funnel --bg --yes http://127.0.0.1:42873", "status --json"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tailscale_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_tailscale(dir.path(), "echo 'funnel not enabled' >&2; exit 1");
        let err = TailscaleTunnel::new(TunnelMode::Funnel, 1)
            .with_binary(bin)
            .resolve_public_hostname()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("funnel not enabled"));
    }
}
