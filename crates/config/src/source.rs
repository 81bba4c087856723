use std::{
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use tracing::warn;

use crate::{loader::load_config, schema::InboundConfig};

/// Supplies the inbound reply settings. Read once per resolution.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> InboundConfig;
}

/// A fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource(pub InboundConfig);

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> InboundConfig {
        self.0.clone()
    }
}

/// Re-reads the config file on every call so edits apply without a restart.
///
/// A read or parse failure keeps serving the last good config.
pub struct FileConfigSource {
    path: PathBuf,
    last_good: Mutex<Option<InboundConfig>>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> InboundConfig {
        let mut last = self.last_good.lock().unwrap_or_else(PoisonError::into_inner);
        match load_config(&self.path) {
            Ok(cfg) => {
                *last = Some(cfg.inbound.clone());
                cfg.inbound
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "config reload failed, keeping last good");
                last.clone().unwrap_or_default()
            },
        }
    }
}
