//! Configuration schema types for the codemate server.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the server ships with.

mod backend;
mod limits;
mod server;
mod system;

pub use backend::*;
pub use limits::*;
pub use server::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the server.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodemateConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub rate_limit: RateLimitConfig,
    pub conversation: ConversationConfig,
    pub session: SessionConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}
