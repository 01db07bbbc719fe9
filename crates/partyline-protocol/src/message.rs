//! The wire message record and the reserved control opcodes.

use serde::{Deserialize, Serialize};

#[cfg(feature = "json")]
use serde::de::DeserializeOwned;

#[cfg(feature = "json")]
use crate::ProtocolError;

/// Opcode a client sends to the host right before closing its socket.
///
/// Reserved: the host reacts by unregistering the peer, and [`Message::is_control`]
/// keeps application traffic off this opcode.
pub const CLIENT_EXIT: &str = "CLIENT_EXIT";

/// Opcode the host broadcasts to every client right before tearing the
/// session down.
///
/// Reserved: clients react by closing their own session.
pub const SRV_SHUTDOWN: &str = "SRV_SHUTDOWN";

/// One message on the bus: an opcode classifying its purpose and an
/// opaque string payload.
///
/// Immutable once constructed; a message lives for a single
/// send/receive round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Tag classifying the message. A small reserved subset
    /// ([`CLIENT_EXIT`], [`SRV_SHUTDOWN`]) drives the connection
    /// lifecycle and is rejected on the send path.
    pub op_code: String,
    /// Application-defined content. Often itself JSON, via
    /// [`with_payload`](Message::with_payload).
    pub payload: String,
}

impl Message {
    /// Creates a message from an opcode and a string payload.
    pub fn new(op_code: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            op_code: op_code.into(),
            payload: payload.into(),
        }
    }

    /// The notification a client sends before disconnecting.
    pub fn client_exit() -> Self {
        Self::new(CLIENT_EXIT, "")
    }

    /// The notification a host broadcasts before shutting down.
    pub fn server_shutdown() -> Self {
        Self::new(SRV_SHUTDOWN, "")
    }

    /// Returns `true` if this message's opcode is reserved for the
    /// connection lifecycle protocol.
    pub fn is_control(&self) -> bool {
        matches!(self.op_code.as_str(), CLIENT_EXIT | SRV_SHUTDOWN)
    }

    /// Creates a message whose payload is the JSON serialization of
    /// `payload`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if `payload` cannot be
    /// serialized.
    #[cfg(feature = "json")]
    pub fn with_payload<T: Serialize>(
        op_code: impl Into<String>,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let json = serde_json::to_string(payload).map_err(ProtocolError::Encode)?;
        Ok(Self::new(op_code, json))
    }

    /// Parses the payload as JSON into `T`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the payload is not valid
    /// JSON for `T`.
    #[cfg(feature = "json")]
    pub fn read_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_str(&self.payload).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stores_op_code_and_payload() {
        let msg = Message::new("score", "42");
        assert_eq!(msg.op_code, "score");
        assert_eq!(msg.payload, "42");
    }

    #[test]
    fn test_is_control_true_for_reserved_opcodes() {
        assert!(Message::client_exit().is_control());
        assert!(Message::server_shutdown().is_control());
    }

    #[test]
    fn test_is_control_false_for_application_opcodes() {
        assert!(!Message::new("msg", "hello").is_control());
        // Only exact matches are reserved.
        assert!(!Message::new("client_exit", "").is_control());
        assert!(!Message::new("SRV_SHUTDOWN2", "").is_control());
    }

    #[test]
    fn test_control_constructors_have_empty_payload() {
        assert_eq!(Message::client_exit().payload, "");
        assert_eq!(Message::server_shutdown().payload, "");
    }
}
