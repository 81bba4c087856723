//! Reply resolution: inbound message + config → optional reply.

use std::{panic::AssertUnwindSafe, path::PathBuf, sync::Arc, time::Duration};

use {
    futures::{FutureExt, future::BoxFuture},
    relay_channels::gating::is_allowed,
    relay_common::types::{InboundMessage, ReplyPayload},
    relay_config::{
        ConfigSource, ReplyConfig, ReplyMode, SessionConfig, default_session_store_path,
        expand_home,
    },
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    command::run_command,
    session::resolve_session,
    template::{MsgContext, TemplateVars, render},
};

/// Fired once, before any reply latency, when a reply is going to be
/// generated. Failures are logged and ignored.
pub type OnReplyStart = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

const MEDIA_DIRECTIVE: &str = "MEDIA:";

/// Turns inbound messages into replies according to the current config.
pub struct ReplyResolver {
    config: Arc<dyn ConfigSource>,
}

impl ReplyResolver {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }

    /// Resolve a reply for `msg`. Never fails: every error degrades to `None`.
    pub async fn resolve(
        &self,
        msg: &InboundMessage,
        on_reply_start: Option<OnReplyStart>,
    ) -> Option<ReplyPayload> {
        match self.try_resolve(msg, on_reply_start).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(id = %msg.id, from = %msg.from, error = %e, "reply resolution failed");
                None
            },
        }
    }

    async fn try_resolve(
        &self,
        msg: &InboundMessage,
        on_reply_start: Option<OnReplyStart>,
    ) -> Result<Option<ReplyPayload>> {
        let inbound = self.config.load();

        if !is_allowed(&msg.from, &inbound.allow_from) {
            info!(from = %msg.from, "sender not in allowlist, ignoring");
            return Ok(None);
        }
        let Some(reply) = inbound.reply else {
            debug!(id = %msg.id, "no reply configured");
            return Ok(None);
        };

        let mut ctx = MsgContext::from_message(msg);
        let mut session_is_new = None;
        if let Some(session) = &reply.session {
            let store = session_store_path(session);
            match resolve_session(session, &store, &msg.from, &msg.body, now_ms()).await {
                Ok(res) => {
                    ctx.body_stripped = res.body_stripped;
                    ctx.session_id = Some(res.session_id);
                    ctx.is_new_session = Some(res.is_new_session);
                    session_is_new = Some(res.is_new_session);
                },
                Err(e) => {
                    warn!(store = %store.display(), error = %e, "session store update failed, continuing without session");
                },
            }
        }

        ctx.body = ctx.body_stripped.clone();
        if let Some(prefix) = &reply.body_prefix {
            let prefix = render(prefix, &ctx.vars());
            ctx.body = format!("{prefix}{}", ctx.body_stripped);
        }
        let vars = ctx.vars();

        match reply.mode {
            ReplyMode::Text => {
                fire_reply_start(on_reply_start).await;
                Ok(text_reply(&reply, &vars))
            },
            ReplyMode::Command => {
                fire_reply_start(on_reply_start).await;
                let session = reply.session.as_ref().zip(session_is_new);
                let argv = build_argv(&reply, &vars, session);
                command_reply(&argv, reply.timeout_seconds).await
            },
        }
    }
}

fn session_store_path(session: &SessionConfig) -> PathBuf {
    session
        .store
        .as_deref()
        .map(expand_home)
        .unwrap_or_else(default_session_store_path)
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

async fn fire_reply_start(callback: Option<OnReplyStart>) {
    let Some(callback) = callback else {
        return;
    };
    match AssertUnwindSafe(async move { callback().await })
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {},
        Ok(Err(e)) => debug!(error = %e, "reply start callback failed"),
        Err(_) => warn!("reply start callback panicked"),
    }
}

fn text_reply(reply: &ReplyConfig, vars: &TemplateVars) -> Option<ReplyPayload> {
    let text = reply
        .text
        .as_deref()
        .map(|t| render(t, vars))
        .filter(|t| !t.trim().is_empty());
    let media_urls = reply
        .media_url
        .as_deref()
        .map(|t| render(t, vars).trim().to_string())
        .filter(|u| !u.is_empty())
        .into_iter()
        .collect();
    let payload = ReplyPayload { text, media_urls };
    (!payload.is_empty()).then_some(payload)
}

/// Render the command argv, splicing in the prompt template and session args.
///
/// `session` carries the session config and whether the session is new.
pub fn build_argv(
    reply: &ReplyConfig,
    vars: &TemplateVars,
    session: Option<(&SessionConfig, bool)>,
) -> Vec<String> {
    let mut argv: Vec<String> = reply.command.iter().map(|a| render(a, vars)).collect();

    if let Some(template) = &reply.template {
        let prompt = render(template, vars);
        let at = argv.len().min(1);
        argv.insert(at, prompt);
    }

    if let Some((session, is_new)) = session {
        let templates = if is_new || session.session_arg_resume.is_empty() {
            &session.session_arg_new
        } else {
            &session.session_arg_resume
        };
        let args: Vec<String> = templates.iter().map(|a| render(a, vars)).collect();
        if !args.is_empty() {
            if session.session_arg_before_body && argv.len() > 1 {
                let at = argv.len() - 1;
                argv.splice(at..at, args);
            } else {
                argv.extend(args);
            }
        }
    }

    argv
}

async fn command_reply(argv: &[String], timeout_seconds: u64) -> Result<Option<ReplyPayload>> {
    let started = std::time::Instant::now();
    let result = run_command(argv, Duration::from_secs(timeout_seconds)).await?;
    let elapsed_ms = started.elapsed().as_millis();

    if result.timed_out() {
        warn!(
            program = argv.first().map(String::as_str),
            timeout_seconds, elapsed_ms, "reply command timed out"
        );
        return Ok(None);
    }
    if !result.success() {
        warn!(
            program = argv.first().map(String::as_str),
            exit_code = ?result.exit_code,
            signal = ?result.signal,
            stderr = %result.stderr.trim(),
            elapsed_ms,
            "reply command failed"
        );
        return Ok(None);
    }

    let (text, media_urls) = split_media_directives(&result.stdout);
    info!(
        program = argv.first().map(String::as_str),
        elapsed_ms,
        text_len = text.len(),
        media = media_urls.len(),
        "reply command finished"
    );

    let payload = ReplyPayload {
        text: (!text.is_empty()).then_some(text),
        media_urls,
    };
    Ok((!payload.is_empty()).then_some(payload))
}

/// Pull `MEDIA:<url-or-path>` lines out of command output.
///
/// Returns the remaining text (trimmed) and the collected media references.
pub fn split_media_directives(stdout: &str) -> (String, Vec<String>) {
    let mut media = Vec::new();
    let mut lines = Vec::new();
    for line in stdout.lines() {
        match line.trim_start().strip_prefix(MEDIA_DIRECTIVE) {
            Some(target) => {
                let target = target.trim();
                if !target.is_empty() {
                    media.push(target.to_string());
                }
            },
            None => lines.push(line),
        }
    }
    (lines.join("\n").trim().to_string(), media)
}
