//! Length-prefixed framing for TCP streams.
//!
//! Every packet on the wire is a length-prefixed frame:
//!
//! ```text
//! +-------------------+-------------------+-----------------+
//! | length (2 bytes)  | packet id (2)     | payload         |
//! | u16 big-endian    | u16 big-endian    |                 |
//! +-------------------+-------------------+-----------------+
//! ```
//!
//! The length covers the packet id and payload but not the prefix itself, so
//! a frame body is at most [`MAX_FRAME_LEN`] bytes. The framing layer treats
//! the body as opaque; [`Packet`](crate::Packet) owns the id and payload.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Largest frame body a 16-bit length prefix can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The body does not fit a 16-bit length prefix.
    #[error("frame size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual body size.
        size: usize,
        /// The largest allowed body.
        max: usize,
    },

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn closed_or_io(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read a single length-prefixed frame from the stream and return its body.
///
/// Returns [`FrameError::ConnectionClosed`] if the peer closes the connection
/// before the frame is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await.map_err(closed_or_io)?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut body).await.map_err(closed_or_io)?;
    }
    Ok(body)
}

/// Write a single frame body, prefixed with its big-endian length.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), FrameError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: MAX_FRAME_LEN,
        });
    }

    writer.write_all(&(body.len() as u16).to_be_bytes()).await?;
    if !body.is_empty() {
        writer.write_all(body).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_single_frame_roundtrip() {
        let (mut client, mut server) = duplex(8192);
        write_frame(&mut client, b"hello world").await.unwrap();
        let received = read_frame(&mut server).await.unwrap();
        assert_eq!(received, b"hello world");
    }

    #[tokio::test]
    async fn test_back_to_back_frames_dont_merge() {
        let (mut client, mut server) = duplex(8192);
        write_frame(&mut client, b"aaa").await.unwrap();
        write_frame(&mut client, b"bbb").await.unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap(), b"aaa");
        assert_eq!(read_frame(&mut server).await.unwrap(), b"bbb");
    }

    #[tokio::test]
    async fn test_partial_read_resumes_correctly() {
        let (mut client, mut server) = duplex(8);
        let body = vec![0xABu8; 300];
        let expected = body.clone();

        let write_task = tokio::spawn(async move {
            write_frame(&mut client, &body).await.unwrap();
        });

        let received = read_frame(&mut server).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_largest_frame_accepted_and_larger_rejected() {
        let (mut client, mut server) = duplex(1 << 17);
        let body = vec![1u8; MAX_FRAME_LEN];
        write_frame(&mut client, &body).await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap().len(), MAX_FRAME_LEN);

        let too_big = vec![1u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            write_frame(&mut client, &too_big).await,
            Err(FrameError::PayloadTooLarge { size, .. }) if size == MAX_FRAME_LEN + 1
        ));
    }

    #[tokio::test]
    async fn test_length_prefix_is_big_endian() {
        let (mut client, mut server) = duplex(8192);
        client.write_all(&[0x00, 0x05]).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        client.flush().await.unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_connection_closed_during_length_read() {
        let (client, mut server) = duplex(8192);
        drop(client);
        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_frame() {
        let (mut client, mut server) = duplex(8192);
        client.write_all(&[0x00, 0x10, 1, 2, 3]).await.unwrap();
        drop(client);
        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameError::ConnectionClosed)
        ));
    }
}
