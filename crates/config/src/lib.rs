//! Configuration loading, validation, and env substitution.
//!
//! Config files: `relay.toml`, `relay.yaml`, or `relay.json`
//! Searched in `./` then `~/.config/relay/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod source;
pub mod template;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, data_dir, default_session_store_path, discover_and_load, expand_home,
        find_config_file, load_config, load_or_discover, write_default_config,
    },
    schema::{
        InboundConfig, MediaConfig, PollConfig, RelayConfig, ReplyConfig, ReplyMode,
        SessionConfig, SessionScope, TunnelMode, TwilioConfig, WebConfig, WebhookConfig,
    },
    source::{ConfigSource, FileConfigSource, StaticConfigSource},
    validate::{Diagnostic, Severity, Subsystem, ValidationResult, validate},
};
