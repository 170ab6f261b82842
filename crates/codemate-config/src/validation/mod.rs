//! Full configuration validation.
//!
//! Each section has its own check; this orchestrator calls them all and
//! collects errors into a single `ConfigError`.

mod helpers;
mod sections;


use crate::schema::CodemateConfig;
use codemate_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CodemateConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_server(&mut errors, config);
    sections::validate_backend(&mut errors, config);
    sections::validate_rate_limit(&mut errors, config);
    sections::validate_conversation(&mut errors, config);
    sections::validate_session(&mut errors, config);
    sections::validate_tools(&mut errors, config);
    sections::validate_logging(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
