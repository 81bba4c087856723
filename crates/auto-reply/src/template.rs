//! `{{Name}}` placeholder substitution over a message context.

use std::{collections::HashMap, sync::LazyLock};

use {regex::Regex, relay_common::types::InboundMessage};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap()
});

/// Template variables by name.
pub type TemplateVars = HashMap<String, String>;

/// Replace every `{{ Name }}` with the matching value.
///
/// Single pass: substituted values are never re-expanded. Unknown names
/// render as the empty string. Anything that doesn't match the placeholder
/// grammar is left as literal text.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Per-message templating context. Built fresh for every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgContext {
    /// Effective body: reset-stripped body with the body prefix applied.
    pub body: String,
    /// Body with any reset trigger removed.
    pub body_stripped: String,
    pub raw_body: String,
    pub from: String,
    pub to: String,
    pub message_sid: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub media_path: Option<String>,
    pub session_id: Option<String>,
    pub is_new_session: Option<bool>,
}

impl MsgContext {
    pub fn from_message(msg: &InboundMessage) -> Self {
        let media = msg.first_media();
        Self {
            body: msg.body.clone(),
            body_stripped: msg.body.clone(),
            raw_body: msg.body.clone(),
            from: msg.from.clone(),
            to: msg.to.clone(),
            message_sid: msg.id.clone(),
            media_url: media.map(|m| m.source.as_str().to_string()),
            media_type: media.and_then(|m| m.content_type.clone()),
            media_path: media
                .filter(|m| !m.source.is_url())
                .map(|m| m.source.as_str().to_string()),
            session_id: None,
            is_new_session: None,
        }
    }

    pub fn vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("Body".into(), self.body.clone());
        vars.insert("BodyStripped".into(), self.body_stripped.clone());
        vars.insert("RawBody".into(), self.raw_body.clone());
        vars.insert("From".into(), self.from.clone());
        vars.insert("To".into(), self.to.clone());
        vars.insert("MessageSid".into(), self.message_sid.clone());
        let optional = [
            ("MediaUrl", &self.media_url),
            ("MediaType", &self.media_type),
            ("MediaPath", &self.media_path),
            ("SessionId", &self.session_id),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                vars.insert(name.into(), value.clone());
            }
        }
        if let Some(is_new) = self.is_new_session {
            vars.insert("IsNewSession".into(), is_new.to_string());
        }
        vars
    }
}
