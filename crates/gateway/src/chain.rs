//! Ordered inbound-callback registration with read-back verification.

use {
    relay_channels::{CallbackStrategy, HttpMethod},
    tracing::{debug, info, warn},
};

use crate::error::{BringUpError, Result};

/// Try `strategies` in order until one reads back `url`. Returns the name of
/// the strategy that verified.
///
/// Unconfigured strategies are skipped. A failed write or a mismatched
/// read-back moves on to the next strategy.
pub async fn register_callback(
    strategies: &[Box<dyn CallbackStrategy>],
    url: &str,
    method: HttpMethod,
) -> Result<String> {
    let mut attempts = Vec::new();
    let mut read_back_any = false;
    let mut last_error = None;

    for strategy in strategies {
        let name = strategy.name();
        if !strategy.is_configured() {
            debug!(strategy = name, "skipping unconfigured callback strategy");
            continue;
        }

        if let Err(e) = strategy.apply(url, method).await {
            warn!(strategy = name, error = %e, "callback update failed");
            attempts.push(format!("{name}: update failed: {e}"));
            last_error = Some(e);
            continue;
        }

        match strategy.read_back().await {
            Ok(Some(current)) if same_url(&current, url) => {
                info!(strategy = name, url, "inbound callback verified");
                return Ok(name.to_string());
            },
            Ok(Some(current)) => {
                read_back_any = true;
                warn!(strategy = name, expected = url, actual = %current, "callback read-back mismatch");
                attempts.push(format!("{name}: read back {current}"));
            },
            Ok(None) => {
                read_back_any = true;
                warn!(strategy = name, "callback read-back returned nothing");
                attempts.push(format!("{name}: read back nothing"));
            },
            Err(e) => {
                warn!(strategy = name, error = %e, "callback read-back failed");
                attempts.push(format!("{name}: read-back failed: {e}"));
                last_error = Some(e);
            },
        }
    }

    match last_error {
        Some(source) if !read_back_any => Err(BringUpError::Provider { attempts, source }),
        _ if attempts.is_empty() => Err(BringUpError::NoStrategy),
        _ => Err(BringUpError::CallbackUnverified {
            url: url.to_string(),
            attempts,
        }),
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}
