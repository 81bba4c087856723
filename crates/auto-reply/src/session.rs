//! Per-sender conversation sessions persisted in a single JSON file.
//!
//! The store maps a session key to `{session_id, updated_at}`. It is written
//! on every resolved message so the idle clock tracks the last activity.
//! Deleting the file simply restarts every conversation.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {
    relay_common::address::normalize_address,
    relay_config::{SessionConfig, SessionScope},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{Result, error::Context};

/// A stored conversation identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}

/// Session key → entry.
pub type SessionMap = HashMap<String, SessionEntry>;

/// Outcome of resolving the session for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResolution {
    pub key: String,
    pub session_id: String,
    pub is_new_session: bool,
    /// Body with the reset trigger removed (unchanged when none matched).
    pub body_stripped: String,
}

/// Load the store. A missing or corrupt file is an empty map.
pub async fn load_store(path: &Path) -> SessionMap {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SessionMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "session store unreadable, starting empty");
            return SessionMap::new();
        },
    };
    match serde_json::from_str(&data) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "session store corrupt, starting empty");
            SessionMap::new()
        },
    }
}

/// Persist the store, creating parent directories as needed.
///
/// Writes to a sibling temp file and renames it into place so a crash never
/// leaves a truncated store behind.
pub async fn save_store(path: &Path, map: &SessionMap) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating session store directory {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(map).context("serializing session store")?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("writing session store {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing session store {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Key under which a sender's session is stored.
pub fn derive_session_key(scope: SessionScope, from: &str) -> String {
    match scope {
        SessionScope::Global => "global".into(),
        SessionScope::PerSender => normalize_address(from).unwrap_or_else(|| "unknown".into()),
    }
}

/// Match `body` against reset triggers in order.
///
/// Returns the remainder after the trigger (empty on exact match), or
/// `None` when no trigger applies.
pub fn match_reset_trigger(body: &str, triggers: &[String]) -> Option<String> {
    let body = body.trim();
    triggers
        .iter()
        .filter(|t| !t.is_empty())
        .find_map(|trigger| {
            if body == trigger {
                return Some(String::new());
            }
            body.strip_prefix(trigger.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
                .map(|rest| rest.trim().to_string())
        })
}

/// Resolve and persist the session for a message received at `now_ms`.
pub async fn resolve_session(
    config: &SessionConfig,
    store_path: &Path,
    from: &str,
    body: &str,
    now_ms: u64,
) -> Result<SessionResolution> {
    let reset = match_reset_trigger(body, &config.reset_triggers);
    let key = derive_session_key(config.scope, from);

    let mut store = load_store(store_path).await;
    let idle_ms = config.idle_minutes.saturating_mul(60_000);
    let fresh = store
        .get(&key)
        .filter(|entry| now_ms.saturating_sub(entry.updated_at) <= idle_ms);

    let (session_id, is_new_session) = match (reset.is_some(), fresh) {
        (false, Some(entry)) => (entry.session_id.clone(), false),
        _ => (uuid::Uuid::new_v4().to_string(), true),
    };

    store.insert(key.clone(), SessionEntry {
        session_id: session_id.clone(),
        updated_at: now_ms,
    });
    save_store(store_path, &store).await?;

    debug!(key, session_id, is_new_session, "session resolved");

    Ok(SessionResolution {
        key,
        session_id,
        is_new_session,
        body_stripped: reset.unwrap_or_else(|| body.to_string()),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn config() -> SessionConfig {
        SessionConfig {
            reset_triggers: vec!["/new".into()],
            idle_minutes: 10,
            ..Default::default()
        }
    }

    const MINUTE: u64 = 60_000;

    #[rstest]
    #[case("/new hello", Some("hello"))]
    #[case("/new", Some(""))]
    #[case("  /new  ", Some(""))]
    #[case("/newer", None)]
    #[case("hello /new", None)]
    #[case("hello", None)]
    fn reset_trigger_matching(#[case] body: &str, #[case] expected: Option<&str>) {
        let triggers = vec!["/new".to_string()];
        assert_eq!(match_reset_trigger(body, &triggers).as_deref(), expected);
    }

    #[test]
    fn triggers_are_scanned_in_order() {
        let triggers = vec!["/reset".to_string(), "/re".to_string()];
        assert_eq!(
            match_reset_trigger("/re set", &triggers).as_deref(),
            Some("set")
        );
        assert_eq!(match_reset_trigger("/reset", &triggers).as_deref(), Some(""));
    }

    #[test]
    fn session_keys() {
        assert_eq!(derive_session_key(SessionScope::Global, "+1555"), "global");
        assert_eq!(
            derive_session_key(SessionScope::PerSender, "whatsapp:+1555"),
            "+1555"
        );
        assert_eq!(derive_session_key(SessionScope::PerSender, ""), "unknown");
    }

    #[tokio::test]
    async fn reuses_fresh_session_and_refreshes_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let cfg = config();

        let first = resolve_session(&cfg, &path, "+1555", "hi", 0).await.unwrap();
        assert!(first.is_new_session);
        assert_eq!(first.body_stripped, "hi");

        let second = resolve_session(&cfg, &path, "+1555", "again", 9 * MINUTE)
            .await
            .unwrap();
        assert!(!second.is_new_session);
        assert_eq!(second.session_id, first.session_id);

        // Write-on-every-message: 9 + 10 minutes is still within the window.
        let third = resolve_session(&cfg, &path, "+1555", "still", 19 * MINUTE)
            .await
            .unwrap();
        assert_eq!(third.session_id, first.session_id);

        let stored = load_store(&path).await;
        assert_eq!(stored["+1555"].updated_at, 19 * MINUTE);
    }

    #[tokio::test]
    async fn idle_entry_is_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut store = SessionMap::new();
        store.insert("+1555".into(), SessionEntry {
            session_id: "old".into(),
            updated_at: 0,
        });
        save_store(&path, &store).await.unwrap();

        let res = resolve_session(&config(), &path, "+1555", "hi", 10 * MINUTE + 1)
            .await
            .unwrap();
        assert!(res.is_new_session);
        assert_ne!(res.session_id, "old");
    }

    #[tokio::test]
    async fn reset_trigger_forces_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let cfg = config();
        let first = resolve_session(&cfg, &path, "+1555", "hi", 0).await.unwrap();

        let reset = resolve_session(&cfg, &path, "+1555", "/new hello", MINUTE)
            .await
            .unwrap();
        assert!(reset.is_new_session);
        assert_eq!(reset.body_stripped, "hello");
        assert_ne!(reset.session_id, first.session_id);
    }

    #[tokio::test]
    async fn senders_are_isolated_unless_global() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let cfg = config();
        let a = resolve_session(&cfg, &path, "+1", "hi", 0).await.unwrap();
        let b = resolve_session(&cfg, &path, "+2", "hi", 0).await.unwrap();
        assert_ne!(a.session_id, b.session_id);

        let global = SessionConfig {
            scope: SessionScope::Global,
            ..config()
        };
        let path = dir.path().join("global.json");
        let a = resolve_session(&global, &path, "+1", "hi", 0).await.unwrap();
        let b = resolve_session(&global, &path, "+2", "hi", 0).await.unwrap();
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(b.key, "global");
    }

    #[tokio::test]
    async fn corrupt_store_recovers_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        assert!(load_store(&path).await.is_empty());
        let res = resolve_session(&config(), &path, "+1555", "hi", 0).await.unwrap();
        assert!(res.is_new_session);
        assert_eq!(load_store(&path).await.len(), 1);
    }

    #[tokio::test]
    async fn save_failure_names_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let err = save_store(&blocker.join("sessions.json"), &SessionMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Message { .. }));
        assert!(err.to_string().contains("session store directory"), "{err}");
        assert!(err.to_string().contains("not-a-dir"), "{err}");
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("sessions.json");
        save_store(&path, &SessionMap::new()).await.unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
    }
}
