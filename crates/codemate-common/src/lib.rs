pub mod errors;
pub mod id;
pub mod plan;
pub mod protocol;

pub use errors::{ConfigError, ProtocolError};
pub use id::{new_id, SessionId, ToolId};
pub use plan::{Plan, PlanStatus, Task, TaskStatus};
pub use protocol::{
    Command, CommandPayload, Envelope, ErrorPayload, LlmResponsePayload, MessageType, Payload,
    PlanDataPayload, ToolCallPayload, ToolDefinition, ToolRegistrationPayload, ToolResultPayload,
    UserInputPayload,
};
