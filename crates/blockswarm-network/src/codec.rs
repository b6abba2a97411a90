//! # Frame Codec
//!
//! Length-prefixed framing for bincode payloads:
//!
//! ```text
//! ┌─────────┬──────────────────┬──────────────────────┐
//! │ version │ length (u32, BE) │ bincode payload      │
//! │ 1 byte  │ 4 bytes          │ `length` bytes       │
//! └─────────┴──────────────────┴──────────────────────┘
//! ```
//!
//! The header is validated before the payload buffer is allocated, so a
//! hostile length cannot force a large allocation.

use crate::error::NetworkError;
use crate::message::PROTOCOL_VERSION;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Version byte plus big-endian length
pub const HEADER_LEN: usize = 5;

/// Encode `message` into a complete frame
pub fn encode_frame<T: Serialize>(message: &T, max_frame_size: usize) -> Result<Vec<u8>, NetworkError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > max_frame_size {
        return Err(NetworkError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_size,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one frame and flush
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_frame_size: usize) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message, max_frame_size)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode its payload
pub async fn read_frame<R, T>(reader: &mut R, max_frame_size: usize) -> Result<T, NetworkError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_closed(reader, &mut header).await?;

    if header[0] != PROTOCOL_VERSION {
        return Err(NetworkError::UnsupportedVersion(header[0]));
    }

    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if length > max_frame_size {
        return Err(NetworkError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; length];
    read_exact_or_closed(reader, &mut payload).await?;

    Ok(bincode::deserialize(&payload)?)
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), NetworkError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(NetworkError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PeerRequest, PeerResponse};
    use tokio::io::duplex;

    const MAX: usize = 1024;

    #[tokio::test]
    async fn test_frame_over_duplex() {
        let (mut client, mut server) = duplex(4096);
        let requester = "127.0.0.1:9001".parse().unwrap();

        write_frame(&mut client, &PeerRequest::block(requester, 5), MAX)
            .await
            .unwrap();
        let decoded: PeerRequest = read_frame(&mut server, MAX).await.unwrap();

        assert_eq!(decoded, PeerRequest::block(requester, 5));
    }

    #[test]
    fn test_header_layout() {
        let frame = encode_frame(&PeerResponse::Inventory(vec![1, 2]), MAX).unwrap();
        assert_eq!(frame[0], PROTOCOL_VERSION);
        let length = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(length, frame.len() - HEADER_LEN);
    }

    #[tokio::test]
    async fn test_rejects_wrong_version() {
        let mut frame = encode_frame(&PeerRequest::List, MAX).unwrap();
        frame[0] = 9;

        let mut reader = &frame[..];
        let result: Result<PeerRequest, _> = read_frame(&mut reader, MAX).await;
        assert!(matches!(result, Err(NetworkError::UnsupportedVersion(9))));
    }

    #[tokio::test]
    async fn test_rejects_oversized_length_before_reading_payload() {
        let mut frame = vec![PROTOCOL_VERSION];
        frame.extend_from_slice(&u32::MAX.to_be_bytes());

        let mut reader = &frame[..];
        let result: Result<PeerRequest, _> = read_frame(&mut reader, MAX).await;
        assert!(matches!(result, Err(NetworkError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let big = PeerResponse::Block(vec![0u8; MAX + 1]);
        assert!(matches!(
            encode_frame(&big, MAX),
            Err(NetworkError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let frame = encode_frame(&PeerResponse::Inventory(vec![1, 2, 3]), MAX).unwrap();
        let mut reader = &frame[..frame.len() - 2];
        let result: Result<PeerResponse, _> = read_frame(&mut reader, MAX).await;
        assert!(matches!(result, Err(NetworkError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_codec_error() {
        let mut frame = vec![PROTOCOL_VERSION];
        frame.extend_from_slice(&4u32.to_be_bytes());
        frame.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);

        let mut reader = &frame[..];
        let result: Result<PeerRequest, _> = read_frame(&mut reader, MAX).await;
        let err = result.unwrap_err();
        assert!(matches!(err, NetworkError::Codec(_)));
        assert!(err.is_protocol_violation());
    }
}
