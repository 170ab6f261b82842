//! Wire protocol spoken over a session's WebSocket.
//!
//! Every frame is a JSON envelope `{id, type, payload, timestamp}`. The
//! `type` tag fully determines the payload shape ([`Payload`] is adjacently
//! tagged on `type`/`payload`). Decoding still checks the tag by hand first so
//! the three failure modes (bad JSON, unknown tag, bad payload) stay
//! distinguishable for error reporting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::id::new_id;
use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    UserInput,
    ToolCall,
    ToolResult,
    LlmResponse,
    Error,
    Command,
    PlanData,
    ToolRegistration,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::UserInput => "user_input",
            MessageType::ToolCall => "tool_call",
            MessageType::ToolResult => "tool_result",
            MessageType::LlmResponse => "llm_response",
            MessageType::Error => "error",
            MessageType::Command => "command",
            MessageType::PlanData => "plan_data",
            MessageType::ToolRegistration => "tool_registration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_input" => Some(MessageType::UserInput),
            "tool_call" => Some(MessageType::ToolCall),
            "tool_result" => Some(MessageType::ToolResult),
            "llm_response" => Some(MessageType::LlmResponse),
            "error" => Some(MessageType::Error),
            "command" => Some(MessageType::Command),
            "plan_data" => Some(MessageType::PlanData),
            "tool_registration" => Some(MessageType::ToolRegistration),
            _ => None,
        }
    }

    /// Whether a client is allowed to send this type to the server.
    pub fn is_client_originated(&self) -> bool {
        matches!(
            self,
            MessageType::UserInput
                | MessageType::ToolResult
                | MessageType::Command
                | MessageType::ToolRegistration
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputPayload {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub name: String,
    pub args: Value,
    #[serde(rename = "toolId")]
    pub tool_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    #[serde(rename = "toolId")]
    pub tool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResultPayload {
    pub fn success(tool_id: impl Into<String>, result: Value) -> Self {
        Self {
            tool_id: tool_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse the two optional fields into one outcome.
    ///
    /// `error` wins when both are present. A payload carrying neither (JSON
    /// `null` counts as absent) is rejected.
    pub fn outcome(&self) -> Result<Result<Value, String>, ProtocolError> {
        match (&self.result, &self.error) {
            (_, Some(err)) => Ok(Err(err.clone())),
            (Some(value), None) => Ok(Ok(value.clone())),
            (None, None) => Err(ProtocolError::InvalidPayload {
                kind: MessageType::ToolResult.as_str().to_string(),
                reason: "neither result nor error is set".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponsePayload {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Clear,
    Compact,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Clear => "clear",
            Command::Compact => "compact",
        }
    }

    /// Accepts the bare name or the slash form typed in the client.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('/') {
            "clear" => Some(Command::Clear),
            "compact" => Some(Command::Compact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub command: String,
}

impl CommandPayload {
    pub fn parsed(&self) -> Option<Command> {
        Command::parse(&self.command)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDataPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub plan: Plan,
}

/// A callable operation advertised to the reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRegistrationPayload {
    pub tools: Vec<ToolDefinition>,
}

/// Typed payload, tagged on the wire by the envelope's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    UserInput(UserInputPayload),
    ToolCall(ToolCallPayload),
    ToolResult(ToolResultPayload),
    LlmResponse(LlmResponsePayload),
    Error(ErrorPayload),
    Command(CommandPayload),
    PlanData(PlanDataPayload),
    ToolRegistration(ToolRegistrationPayload),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::UserInput(_) => MessageType::UserInput,
            Payload::ToolCall(_) => MessageType::ToolCall,
            Payload::ToolResult(_) => MessageType::ToolResult,
            Payload::LlmResponse(_) => MessageType::LlmResponse,
            Payload::Error(_) => MessageType::Error,
            Payload::Command(_) => MessageType::Command,
            Payload::PlanData(_) => MessageType::PlanData,
            Payload::ToolRegistration(_) => MessageType::ToolRegistration,
        }
    }

    /// Decode the payload of a frame whose tag is already known to be valid.
    fn decode(kind: MessageType, payload: Value) -> Result<Self, ProtocolError> {
        let tagged = serde_json::json!({ "type": kind.as_str(), "payload": payload });
        serde_json::from_value(tagged).map_err(|e| ProtocolError::InvalidPayload {
            kind: kind.as_str().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Untyped frame as it appears on the wire.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    id: &'a str,
    #[serde(flatten)]
    payload: &'a Payload,
    timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: String,
    pub timestamp: i64,
    pub payload: Payload,
}

impl Envelope {
    /// Wrap a payload with a fresh id and the current time.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: new_id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn user_input(content: impl Into<String>) -> Self {
        Self::new(Payload::UserInput(UserInputPayload {
            content: content.into(),
        }))
    }

    pub fn llm_response(content: impl Into<String>) -> Self {
        Self::new(Payload::LlmResponse(LlmResponsePayload {
            content: content.into(),
        }))
    }

    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::new(Payload::Error(ErrorPayload {
            message: message.into(),
            code: code.map(str::to_string),
        }))
    }

    pub fn protocol_error(err: &ProtocolError) -> Self {
        Self::error(err.to_string(), Some(err.code()))
    }

    pub fn tool_call(tool_id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self::new(Payload::ToolCall(ToolCallPayload {
            name: name.into(),
            args,
            tool_id: tool_id.into(),
        }))
    }

    pub fn tool_result(payload: ToolResultPayload) -> Self {
        Self::new(Payload::ToolResult(payload))
    }

    pub fn command(command: Command) -> Self {
        Self::new(Payload::Command(CommandPayload {
            command: command.as_str().to_string(),
        }))
    }

    pub fn plan_data(session_id: impl Into<String>, plan: Plan) -> Self {
        Self::new(Payload::PlanData(PlanDataPayload {
            session_id: session_id.into(),
            plan,
        }))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let kind = MessageType::parse(&wire.kind)
            .ok_or_else(|| ProtocolError::UnknownType(wire.kind.clone()))?;
        let payload = Payload::decode(kind, wire.payload)?;
        Ok(Self {
            id: wire.id,
            timestamp: wire.timestamp,
            payload,
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let wire = OutgoingEnvelope {
            id: &self.id,
            payload: &self.payload,
            timestamp: self.timestamp,
        };
        serde_json::to_string(&wire).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
