//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a message).
    ///
    /// The connection that produced the bytes is treated as broken and
    /// torn down.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The opcode is reserved for the connection lifecycle protocol and
    /// may not be sent by application code.
    #[error("opcode {0:?} is reserved for the control protocol")]
    ReservedOpcode(String),
}
