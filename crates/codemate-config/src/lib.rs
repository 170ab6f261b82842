//! codemate server configuration.
//!
//! TOML-based configuration with full validation. All config sections use
//! defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use codemate_config::{load_config, config_to_json};
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BackendConfig, BackendProvider, CodemateConfig, ConversationConfig, LoggingConfig,
    RateLimitConfig, ServerConfig, SessionConfig, ToolsConfig, CONFIG_SCHEMA_VERSION,
};

use codemate_common::ConfigError;
use std::path::Path;

/// Load and validate the server config.
///
/// With `path` set, that file must exist. Otherwise the platform default
/// path is used and a commented template is created there if missing.
pub fn load_config(path: Option<&Path>) -> Result<CodemateConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &CodemateConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
