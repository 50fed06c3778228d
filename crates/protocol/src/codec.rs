//! Line-delimited JSON encoding for host messages
//!
//! Each message is a single JSON document followed by `\n`. Readers refuse
//! lines longer than [`MAX_LINE_SIZE`] to prevent memory exhaustion from a
//! misbehaving host.
//!
//! # Line Format
//!
//! ```text
//! {"id":1,"method":"poll","params":[]}\n
//! ```

use crate::error::{ProtocolError, Result};
use crate::messages::{HostRequest, HostResponse};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed line size (1 MiB)
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Encode a value as one newline-terminated JSON line
///
/// # Example
/// ```
/// use protocol::{HostRequest, encode_line};
///
/// let req = HostRequest::new(1, "poll", vec![]);
/// let line = encode_line(&req).unwrap();
/// assert!(line.ends_with(b"\n"));
/// ```
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;

    if bytes.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLarge {
            size: bytes.len(),
            max: MAX_LINE_SIZE,
        });
    }

    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one JSON line (trailing whitespace tolerated)
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim_end()).map_err(ProtocolError::from)
}

/// Decode a host request, mapping parse failures to [`ProtocolError::MalformedRequest`]
///
/// # Example
/// ```
/// use protocol::decode_request;
///
/// let req = decode_request(r#"{"id":7,"method":"get","params":["1-2-0"]}"#).unwrap();
/// assert_eq!(req.method, "get");
/// assert!(decode_request("not json").is_err());
/// ```
pub fn decode_request(line: &str) -> Result<HostRequest> {
    serde_json::from_str(line.trim_end())
        .map_err(|e| ProtocolError::MalformedRequest(e.to_string()))
}

/// Decode a host response
pub fn decode_response(line: &str) -> Result<HostResponse> {
    decode_line(line)
}

/// Write one encoded line to a writer
pub fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let bytes = encode_line(value)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one line from a buffered reader
///
/// Returns `Ok(None)` at end of input. The returned string has its line
/// terminator removed. An oversized line is consumed through its terminator
/// before [`ProtocolError::LineTooLarge`] is returned, so the next call
/// starts at the following line.
pub fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut bytes = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_SIZE as u64 + 1)
        .read_until(b'\n', &mut bytes)?;

    if is_oversized(&bytes, read) {
        skip_line(reader)?;
        return Err(too_large(read));
    }

    finish_line(bytes, read)
}

fn skip_line<R: BufRead>(reader: &mut R) -> Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }

        match buf.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Async: Write one encoded line to an async writer
#[cfg(feature = "async")]
pub async fn write_line_async<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode_line(value)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Async: Read one line from an async buffered reader
///
/// Returns `Ok(None)` at end of input. Oversized lines are skipped through
/// their terminator, as in [`read_line`].
#[cfg(feature = "async")]
pub async fn read_line_async<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_SIZE as u64 + 1)
        .read_until(b'\n', &mut bytes)
        .await?;

    if is_oversized(&bytes, read) {
        skip_line_async(reader).await?;
        return Err(too_large(read));
    }

    finish_line(bytes, read)
}

#[cfg(feature = "async")]
async fn skip_line_async<R>(reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }

        match buf.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

fn is_oversized(bytes: &[u8], read: usize) -> bool {
    bytes.last() != Some(&b'\n') && read > MAX_LINE_SIZE
}

fn too_large(read: usize) -> ProtocolError {
    ProtocolError::LineTooLarge {
        size: read,
        max: MAX_LINE_SIZE,
    }
}

fn finish_line(mut bytes: Vec<u8>, read: usize) -> Result<Option<String>> {
    if read == 0 {
        return Ok(None);
    }

    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }

    Ok(Some(String::from_utf8(bytes)?))
}
