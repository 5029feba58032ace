//! Length-prefixed framing.
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────┐
//! │ len: u32 (LE, 4 B)   │ body: `len` bytes           │
//! └──────────────────────┴─────────────────────────────┘
//! ```
//!
//! The prefix is little-endian and always equals the exact length of the
//! body that follows. Readers never hand out a body until all of it has
//! been buffered; short reads are looped over, and only a zero-length read
//! (end of stream) ends the frame early.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Codec, Envelope, ProtocolError};

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Default upper bound for a frame body: 64 KiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Encodes an envelope into one complete frame.
///
/// The envelope is serialized first, so the output buffer is allocated
/// once at its final size and the body is copied into it exactly once.
pub fn encode_frame<C: Codec>(codec: &C, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let body = codec.encode(envelope)?;
    let prefix = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&prefix.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads one frame body from `reader`.
///
/// Returns:
/// - `Ok(Some(body))` once the prefix and the full body have arrived.
/// - `Ok(None)` if the stream ended cleanly *before* the first prefix byte,
///   i.e. the peer hung up between frames.
///
/// # Errors
/// - [`ProtocolError::ConnectionClosed`] if the stream ends inside the
///   prefix or inside the body.
/// - [`ProtocolError::FrameTooLarge`] if the prefix exceeds `max_len`. The
///   body is not read; the stream is no longer on a frame boundary.
/// - [`ProtocolError::Io`] for any other read failure.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let received = read_full(reader, &mut header).await?;
    if received == 0 {
        return Ok(None);
    }
    if received < HEADER_LEN {
        return Err(ProtocolError::ConnectionClosed {
            received,
            expected: HEADER_LEN,
        });
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len];
    let received = read_full(reader, &mut body).await?;
    if received < len {
        return Err(ProtocolError::ConnectionClosed {
            received,
            expected: len,
        });
    }
    Ok(Some(body))
}

/// Writes an already-encoded frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Fills `buf` from `reader`, looping over short reads.
///
/// Returns how many bytes were read; less than `buf.len()` only when the
/// stream hit end-of-data first.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ChatMessage, JsonCodec, PacketType, SessionId};

    fn chat_envelope(content: &str) -> Envelope {
        JsonCodec
            .wrap(&ChatMessage {
                sender_id: SessionId(3),
                content: content.into(),
            })
            .unwrap()
    }

    #[test]
    fn test_encode_frame_prefix_equals_body_len() {
        let frame = encode_frame(&JsonCodec, &chat_envelope("hi")).unwrap();
        let prefix = u32::from_le_bytes(frame[..HEADER_LEN].try_into().unwrap());
        assert_eq!(prefix as usize, frame.len() - HEADER_LEN);
    }

    #[test]
    fn test_encode_frame_body_is_the_encoded_envelope() {
        let envelope = chat_envelope("hi");
        let frame = encode_frame(&JsonCodec, &envelope).unwrap();
        let standalone = JsonCodec.encode(&envelope).unwrap();
        assert_eq!(&frame[HEADER_LEN..], standalone.as_slice());
    }

    #[test]
    fn test_encode_frame_has_no_spare_capacity() {
        let frame = encode_frame(&JsonCodec, &chat_envelope("exact")).unwrap();
        assert_eq!(frame.capacity(), frame.len());
    }

    #[test]
    fn test_encode_frame_prefix_is_little_endian() {
        let envelope = Envelope {
            packet_type: PacketType::Unknown(5),
            payload: vec![0; 300],
        };
        let frame = encode_frame(&JsonCodec, &envelope).unwrap();
        let body_len = frame.len() - HEADER_LEN;
        assert_eq!(frame[0], (body_len & 0xFF) as u8);
        assert_eq!(frame[1], ((body_len >> 8) & 0xFF) as u8);
    }

    #[tokio::test]
    async fn test_read_frame_whole_frame() {
        let envelope = chat_envelope("hello");
        let frame = encode_frame(&JsonCodec, &envelope).unwrap();
        let mut reader = frame.as_slice();

        let body = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .expect("one frame");

        assert_eq!(JsonCodec.decode_envelope(&body).unwrap(), envelope);
        // Nothing over-read, nothing left behind.
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_read_frame_two_frames_back_to_back() {
        let first = chat_envelope("one");
        let second = chat_envelope("two");
        let mut bytes = encode_frame(&JsonCodec, &first).unwrap();
        bytes.extend(encode_frame(&JsonCodec, &second).unwrap());
        let mut reader = bytes.as_slice();

        let a = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap().unwrap();
        let b = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap().unwrap();
        let end = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap();

        assert_eq!(JsonCodec.decode_envelope(&a).unwrap(), first);
        assert_eq!(JsonCodec.decode_envelope(&b).unwrap(), second);
        assert!(end.is_none(), "clean EOF at a boundary is Ok(None)");
    }

    #[tokio::test]
    async fn test_read_frame_empty_stream_returns_none() {
        let mut reader: &[u8] = &[];
        let result = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_short_header_returns_connection_closed() {
        let mut reader: &[u8] = &[10, 0];
        let result = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(
            result,
            Err(ProtocolError::ConnectionClosed {
                received: 2,
                expected: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body_returns_connection_closed() {
        // Prefix says 10, only 6 body bytes ever arrive.
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{\"typ");
        bytes.push(b'e');
        let mut reader = bytes.as_slice();

        let result = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await;

        assert!(
            matches!(
                result,
                Err(ProtocolError::ConnectionClosed {
                    received: 6,
                    expected: 10
                })
            ),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn test_read_frame_oversized_prefix_returns_frame_too_large() {
        let bytes = (1024u32 * 1024).to_le_bytes();
        let mut reader = bytes.as_slice();
        let result = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge {
                len: 1_048_576,
                max: DEFAULT_MAX_FRAME_LEN
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_zero_length_body() {
        let bytes = 0u32.to_le_bytes();
        let mut reader = bytes.as_slice();
        let body = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(body, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_write_frame_then_read_frame_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let envelope = chat_envelope("over the pipe");
        let frame = encode_frame(&JsonCodec, &envelope).unwrap();

        let writer = tokio::spawn(async move {
            write_frame(&mut client, &frame).await.unwrap();
        });
        let body = read_frame(&mut server, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        writer.await.unwrap();

        assert_eq!(JsonCodec.decode_envelope(&body).unwrap(), envelope);
    }
}
