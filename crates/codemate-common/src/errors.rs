use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Errors raised while decoding or routing a wire envelope.
///
/// None of these are fatal to a session: the dispatcher reports them back to
/// the sender as an `error` envelope carrying [`ProtocolError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("unexpected tool result for id {0}")]
    UnexpectedToolResult(String),

    #[error("unexpected message type from client: {0}")]
    UnexpectedType(String),

    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Stable machine-readable code sent in `ErrorPayload::code`.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "malformed_envelope",
            ProtocolError::UnknownType(_) => "unknown_type",
            ProtocolError::InvalidPayload { .. } => "invalid_payload",
            ProtocolError::UnexpectedToolResult(_) => "unexpected_tool_result",
            ProtocolError::UnexpectedType(_) => "unexpected_type",
            ProtocolError::Encode(_) => "encode_failed",
        }
    }
}
