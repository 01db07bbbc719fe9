//! Framing: 4-byte big-endian length prefix + payload bytes.
//!
//! TCP is a byte stream; frames restore message boundaries so partial
//! and coalesced reads reassemble cleanly instead of corrupting message
//! edges.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

const LEN_SIZE: usize = 4;

/// Upper bound on a single frame's payload, in bytes.
pub const MAX_FRAME_LEN: usize = 100 * 1024;

/// Writes one frame: length prefix followed by the payload.
///
/// # Errors
/// [`TransportError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_LEN`]; [`TransportError::Send`] on socket errors.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await.map_err(TransportError::Send)?;
    writer
        .write_all(payload)
        .await
        .map_err(TransportError::Send)?;
    writer.flush().await.map_err(TransportError::Send)?;
    Ok(())
}

/// Reads one frame, blocking until it is complete.
///
/// Returns `Ok(None)` on a clean close at a frame boundary (the peer
/// shut down in between messages). EOF in the middle of a frame is a
/// [`TransportError::Receive`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LEN_SIZE];
    // First byte read separately: a zero-length read here means the
    // remote closed cleanly, not a truncated frame.
    let n = reader
        .read(&mut len_buf[..1])
        .await
        .map_err(TransportError::Receive)?;
    if n == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut len_buf[1..])
        .await
        .map_err(TransportError::Receive)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    // Fresh buffer per frame: receive buffers are never shared between
    // concurrent loops.
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(TransportError::Receive)?;
    Ok(Some(payload))
}
