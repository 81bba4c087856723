//! Poll ingestion: fetch new inbound messages on an interval and hand them
//! to the reply dispatcher in creation order.

use std::{sync::Arc, time::Duration};

use {
    chrono::{DateTime, Utc},
    relay_auto_reply::ReplyDispatcher,
    relay_channels::{DedupWindow, InboundFilter, MessagingProvider},
    relay_common::types::InboundMessage,
    relay_config::PollConfig,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// How far back the first fetch looks.
    pub lookback: Duration,
    pub dedup_capacity: usize,
    /// Only messages addressed here; defaults to the provider's own number.
    pub to: Option<String>,
    /// Stop after this many iterations. `None` runs until cancelled.
    pub max_iterations: Option<u64>,
}

impl PollOptions {
    pub fn from_config(cfg: &PollConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_seconds),
            lookback: Duration::from_secs(cfg.lookback_minutes.saturating_mul(60)),
            dedup_capacity: cfg.dedup_capacity,
            to: None,
            max_iterations: None,
        }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

/// Fetch boundary plus a bounded window of already-dispatched ids.
///
/// Lives only in memory: a restart may re-dispatch messages inside the
/// lookback window.
#[derive(Debug)]
pub struct Watermark {
    since: DateTime<Utc>,
    seen: DedupWindow,
}

impl Watermark {
    pub fn new(since: DateTime<Utc>, dedup_capacity: usize) -> Self {
        Self {
            since,
            seen: DedupWindow::new(dedup_capacity),
        }
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Sort `batch` by creation time, drop ids already seen, record the
    /// rest and advance `since`. Returns the new messages in order.
    pub fn observe(&mut self, mut batch: Vec<InboundMessage>) -> Vec<InboundMessage> {
        batch.sort_by_key(|m| m.created_at);
        batch
            .into_iter()
            .filter(|m| {
                if !self.seen.insert(&m.id) {
                    debug!(id = %m.id, "skipping already seen message");
                    return false;
                }
                if m.created_at > self.since {
                    self.since = m.created_at;
                }
                true
            })
            .collect()
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub iterations: u64,
    pub dispatched: u64,
    pub fetch_errors: u64,
}

/// Poll `provider` until `cancel` fires or `max_iterations` is reached.
///
/// Dispatch is fire-and-forget: the loop never waits on replies, but the
/// shared queue still runs them one at a time in submission order. Fetch
/// errors are logged and the next iteration tries again.
pub async fn run_poll_loop(
    provider: Arc<dyn MessagingProvider>,
    dispatcher: ReplyDispatcher,
    opts: PollOptions,
    cancel: CancellationToken,
) -> PollStats {
    let lookback =
        chrono::Duration::from_std(opts.lookback).unwrap_or_else(|_| chrono::Duration::zero());
    let mut watermark = Watermark::new(Utc::now() - lookback, opts.dedup_capacity);
    let mut stats = PollStats::default();

    info!(
        interval_secs = opts.interval.as_secs(),
        since = %watermark.since(),
        "starting poll loop"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let filter = InboundFilter {
            to: opts.to.clone(),
            created_after: Some(watermark.since()),
            limit: None,
        };
        match provider.list_inbound(&filter).await {
            Ok(batch) => {
                for msg in watermark.observe(batch) {
                    info!(
                        id = %msg.id,
                        from = %msg.from,
                        created_at = %msg.created_at,
                        body = %preview(&msg.body),
                        "inbound message"
                    );
                    drop(dispatcher.submit(msg));
                    stats.dispatched += 1;
                }
            },
            Err(e) => {
                stats.fetch_errors += 1;
                warn!(error = %e, "failed to fetch inbound messages");
            },
        }

        stats.iterations += 1;
        if opts.max_iterations.is_some_and(|max| stats.iterations >= max) {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(opts.interval) => {},
        }
    }

    info!(
        iterations = stats.iterations,
        dispatched = stats.dispatched,
        fetch_errors = stats.fetch_errors,
        "poll loop stopped"
    );
    stats
}

fn preview(body: &str) -> String {
    const MAX: usize = 80;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
