//! # RESP2 Request Framing and Reply Reading
//!
//! Purpose: Carry commands to the server as RESP arrays and read back exactly
//! one reply frame, whose text payload is the JSON reply.
//!
//! ## Design Principles
//! 1. **One Frame Per Call**: No pipelining; a read consumes one whole frame.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk payloads are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::{self, BufRead, Read};

use crate::error::{ClientError, ClientResult};

/// Upper bound on array slots reserved ahead of reading their elements.
const MAX_PREALLOC: i64 = 64;

/// One RESP reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+...` status line; JSON-mode servers may send replies this way.
    Simple(Vec<u8>),
    /// `-...` error line.
    Error(Vec<u8>),
    /// `:123`.
    Integer(i64),
    /// `$...` bulk string, `None` for the null bulk.
    Bulk(Option<Vec<u8>>),
    /// `*...` array.
    Array(Vec<Frame>),
}

impl Frame {
    /// Returns the JSON payload carried by a text frame.
    pub fn into_payload(self) -> Option<Vec<u8>> {
        match self {
            Frame::Simple(text) | Frame::Bulk(Some(text)) => Some(text),
            _ => None,
        }
    }
}

/// Encodes `command` and its arguments as a RESP array of bulk strings.
pub fn encode_command(command: &str, args: &[&str], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice((args.len() + 1).to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for part in std::iter::once(command).chain(args.iter().copied()) {
        out.push(b'$');
        out.extend_from_slice(part.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(part.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one frame from the buffered reader.
///
/// A clean end of stream before the first byte of a frame is reported as
/// `ConnectionClosed`; anywhere else it is a protocol error.
pub fn read_frame<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Frame> {
    if !read_line(reader, line_buf)? {
        return Err(ClientError::ConnectionClosed);
    }
    read_frame_body(reader, line_buf)
}

fn read_nested<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Frame> {
    if !read_line(reader, line_buf)? {
        return Err(ClientError::Protocol);
    }
    read_frame_body(reader, line_buf)
}

fn read_frame_body<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Frame> {
    let (&tag, rest) = line_buf.split_first().ok_or(ClientError::Protocol)?;
    match tag {
        b'+' => Ok(Frame::Simple(rest.to_vec())),
        b'-' => Ok(Frame::Error(rest.to_vec())),
        b':' => Ok(Frame::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            let mut items = Vec::with_capacity(len.clamp(0, MAX_PREALLOC) as usize);
            for _ in 0..len {
                items.push(read_nested(reader, line_buf)?);
            }
            Ok(Frame::Array(items))
        }
        _ => Err(ClientError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<Frame> {
    if len < 0 {
        return Ok(Frame::Bulk(None));
    }
    // Grow with the bytes actually received; the header length is untrusted.
    let mut data = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if (data.len() as u64) < len as u64 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if &crlf != b"\r\n" {
        return Err(ClientError::Protocol);
    }
    Ok(Frame::Bulk(Some(data)))
}

/// Reads one CRLF-terminated line into `buf`, without the terminator.
/// Returns `false` on end of stream.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(true)
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::Protocol)
}
