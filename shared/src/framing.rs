// Length-delimited framing for the player channel.
//
// Wire format: a 4-byte big-endian payload length, then the payload. Payloads
// are UTF-8 JSON. A read only returns once the whole frame has arrived, so
// fragmented or coalesced TCP segments never split or merge messages.
//
// MAX_FRAME_SIZE bounds the allocation a bogus length prefix can trigger. The
// largest legitimate frame is a grid reply or a snapshot with a long win
// history, both far below the limit.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame payload in bytes
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Writes one frame and flushes the writer
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    writer.write_u32(len as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one complete frame
///
/// Returns `UnexpectedEof` when the peer closes the stream, including a clean
/// close between frames, and `InvalidData` for an oversized length prefix.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Serializes `value` as JSON and writes it as one frame
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

/// Reads one frame and decodes it as JSON
///
/// Decode failures surface as `InvalidData`. Callers that must tell transport
/// failures apart from bad payloads should use [`read_frame`] instead.
pub async fn read_json<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}
