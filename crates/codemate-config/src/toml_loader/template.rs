//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# codemate server configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# host = "127.0.0.1"
# port = 3001

[backend]
# provider = "gemini"
# model = "gemini-2.0-flash"
# max_tokens = 8192            # 1-1048576
# temperature = 0.7            # 0.0-2.0
# api_key_env = "GEMINI_API_KEY"
# system_prompt = "You are a coding assistant ..."

[rate_limit]
# Shared by every connected session.
# requests_per_window = 10     # 1-10000
# window_secs = 60
# max_concurrent = 1           # 1-64
# max_attempts = 3             # 1-10, first try included
# base_backoff_secs = 5        # delay = 2^attempt * base when the backend gives no hint

[conversation]
# history_window = 20          # messages sent to the backend per turn
# log_dir = "/var/log/codemate/conversations"

[session]
# max_steps = 10               # backend round trips per user turn

[tools]
# timeout_secs = 300           # 0 waits forever for the executor
# web_search_url = "https://api.duckduckgo.com/"

[logging]
# level = "codemate=info"      # RUST_LOG and --log-level take precedence
"##
    .to_string()
}
