//! Per-section validators.

use crate::schema::CodemateConfig;

use super::helpers::{validate_not_empty, validate_range, validate_range_f64};

pub(crate) fn validate_server(errors: &mut Vec<String>, config: &CodemateConfig) {
    validate_not_empty(errors, "server.host", &config.server.host);
    validate_range(errors, "server.port", config.server.port as u64, 1, 65535);
}

pub(crate) fn validate_backend(errors: &mut Vec<String>, config: &CodemateConfig) {
    validate_not_empty(errors, "backend.model", &config.backend.model);
    validate_not_empty(errors, "backend.api_key_env", &config.backend.api_key_env);
    validate_range(
        errors,
        "backend.max_tokens",
        config.backend.max_tokens as u64,
        1,
        1_048_576,
    );
    validate_range_f64(
        errors,
        "backend.temperature",
        config.backend.temperature,
        0.0,
        2.0,
    );
}

pub(crate) fn validate_rate_limit(errors: &mut Vec<String>, config: &CodemateConfig) {
    let rl = &config.rate_limit;
    validate_range(
        errors,
        "rate_limit.requests_per_window",
        rl.requests_per_window as u64,
        1,
        10_000,
    );
    validate_range(errors, "rate_limit.window_secs", rl.window_secs, 1, 86_400);
    validate_range(
        errors,
        "rate_limit.max_concurrent",
        rl.max_concurrent as u64,
        1,
        64,
    );
    validate_range(
        errors,
        "rate_limit.max_attempts",
        rl.max_attempts as u64,
        1,
        10,
    );
    validate_range(
        errors,
        "rate_limit.base_backoff_secs",
        rl.base_backoff_secs,
        0,
        600,
    );
}

pub(crate) fn validate_conversation(errors: &mut Vec<String>, config: &CodemateConfig) {
    validate_range(
        errors,
        "conversation.history_window",
        config.conversation.history_window as u64,
        1,
        1000,
    );
}

pub(crate) fn validate_session(errors: &mut Vec<String>, config: &CodemateConfig) {
    validate_range(
        errors,
        "session.max_steps",
        config.session.max_steps as u64,
        1,
        100,
    );
}

pub(crate) fn validate_tools(errors: &mut Vec<String>, config: &CodemateConfig) {
    validate_range(
        errors,
        "tools.timeout_secs",
        config.tools.timeout_secs,
        0,
        86_400,
    );
    if let Some(url) = &config.tools.web_search_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "tools.web_search_url = {url} must be an http(s) URL"
            ));
        }
    }
}

pub(crate) fn validate_logging(errors: &mut Vec<String>, config: &CodemateConfig) {
    validate_not_empty(errors, "logging.level", &config.logging.level);
}
