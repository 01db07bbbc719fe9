/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding a listener (or resolving the local address) failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// An outbound connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Receiving data failed, or the remote closed mid-frame.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// A frame exceeded [`MAX_FRAME_LEN`](crate::MAX_FRAME_LEN).
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),
}
