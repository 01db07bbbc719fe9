//! Unified error type for the Partyline façade.

use partyline_protocol::ProtocolError;
use partyline_transport::TransportError;

/// Top-level error wrapping the layer-specific errors.
///
/// The `#[from]` variants let `?` convert sub-crate errors
/// automatically, so applications deal with one error type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A transport-level error (bind, connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, reserved opcode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The operation requires a started session.
    #[error("session not started")]
    NotStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::FrameTooLarge(1 << 30);
        let session_err: SessionError = err.into();
        assert!(matches!(session_err, SessionError::Transport(_)));
        assert!(session_err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::ReservedOpcode("SRV_SHUTDOWN".into());
        let session_err: SessionError = err.into();
        assert!(matches!(session_err, SessionError::Protocol(_)));
        assert!(session_err.to_string().contains("reserved"));
    }
}
