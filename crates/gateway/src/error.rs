/// Why webhook bring-up failed.
#[derive(Debug, thiserror::Error)]
pub enum BringUpError {
    /// Another process already listens on the port.
    #[error("port {port} is already in use ({holder})")]
    PortInUse { port: u16, holder: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve a public hostname: {message}")]
    Tunnel { message: String },

    /// Configuration error: nothing to register the callback with.
    #[error("no inbound callback strategy is configured")]
    NoStrategy,

    /// Every strategy ran and none read back the intended URL.
    #[error("no strategy verified the inbound callback {url}: {}", .attempts.join("; "))]
    CallbackUnverified { url: String, attempts: Vec<String> },

    /// No strategy got as far as a read-back because the provider kept
    /// failing.
    #[error("provider rejected every callback update ({}): {source}", .attempts.join("; "))]
    Provider {
        attempts: Vec<String>,
        #[source]
        source: relay_channels::Error,
    },
}

impl BringUpError {
    #[must_use]
    pub fn tunnel(message: impl std::fmt::Display) -> Self {
        Self::Tunnel {
            message: message.to_string(),
        }
    }

    /// Local resource conflicts and configuration errors. These end the
    /// process and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PortInUse { .. } | Self::Bind { .. } | Self::NoStrategy
        )
    }

    /// Remote-side failures that repeating the whole sequence may clear.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// What the operator should try next.
    pub fn remedy(&self) -> String {
        match self {
            Self::PortInUse { port, .. } => format!(
                "stop the process holding port {port} or set webhook.port to a free port"
            ),
            Self::Bind { .. } => {
                "check webhook.bind; it must be an address of this machine".to_string()
            },
            Self::Tunnel { .. } => "make sure `tailscale up` succeeded and Funnel is enabled for \
                                    this node, or set webhook.public_url"
                .to_string(),
            Self::NoStrategy => "configure twilio.sender_sid or twilio.messaging_service_sid, \
                                 or make sure twilio.from is an incoming number on this account"
                .to_string(),
            Self::CallbackUnverified { .. } => "set the inbound webhook URL in the Twilio \
                                                console, or configure twilio.sender_sid / \
                                                twilio.messaging_service_sid"
                .to_string(),
            Self::Provider { .. } => {
                "check the Twilio credentials and that the sender belongs to this account"
                    .to_string()
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BringUpError>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let in_use = BringUpError::PortInUse {
            port: 42873,
            holder: "node (pid 7)".into(),
        };
        assert!(in_use.is_fatal());
        assert!(!in_use.is_retryable());
        assert_eq!(
            in_use.to_string(),
            "port 42873 is already in use (node (pid 7))"
        );
        assert!(in_use.remedy().contains("42873"));

        let unverified = BringUpError::CallbackUnverified {
            url: "https://h/webhook".into(),
            attempts: vec!["a: read back x".into(), "b: read back y".into()],
        };
        assert!(unverified.is_retryable());
        assert!(unverified.to_string().ends_with("a: read back x; b: read back y"));

        assert!(BringUpError::tunnel("tailscale not running").is_retryable());
        assert!(BringUpError::NoStrategy.is_fatal());
    }
}
