//! # RESP2 Framing
//!
//! Purpose: Encode the handful of commands the client issues and parse the
//! replies the store sends back.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes until the client
//!    decodes them as UTF-8.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::BufRead;

use kvlink_common::FailureCause;

/// Result type for wire-level work. Converted into `StoreError` by `?`.
pub type WireResult<T> = Result<T, FailureCause>;

/// Largest bulk string accepted, matching the server-side default limit.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// RESP reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style replies.
    Simple(Vec<u8>),
    /// -ERR ... replies.
    Error(Vec<u8>),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays; a null array decodes as empty.
    Array(Vec<RespValue>),
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    push_header(out, b'*', args.len());
    for arg in args {
        push_header(out, b'$', arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> WireResult<RespValue> {
    read_line(reader, line_buf)?;
    let Some((&tag, body)) = line_buf.split_first() else {
        return Err(protocol("empty reply line"));
    };

    match tag {
        b'+' => Ok(RespValue::Simple(body.to_vec())),
        b'-' => Ok(RespValue::Error(body.to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(body)?)),
        b'$' => {
            let len = parse_i64(body)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(body)?;
            read_array(reader, len, line_buf)
        }
        other => Err(protocol(format!("unknown reply type byte 0x{other:02x}"))),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> WireResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    if len > MAX_BULK_LEN {
        return Err(protocol(format!("bulk length {len} exceeds limit")));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != *b"\r\n" {
        return Err(protocol("bulk string not terminated by CRLF"));
    }
    Ok(RespValue::Bulk(Some(data)))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> WireResult<RespValue> {
    if len <= 0 {
        return Ok(RespValue::Array(Vec::new()));
    }

    let mut items = Vec::with_capacity(len.min(1024) as usize);
    for _ in 0..len {
        items.push(read_response(reader, line_buf)?);
    }
    Ok(RespValue::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> WireResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(FailureCause::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(protocol("reply line not terminated by CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> WireResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| protocol(format!("invalid integer {:?}", String::from_utf8_lossy(data))))
}

fn push_header(out: &mut Vec<u8>, tag: u8, len: usize) {
    out.push(tag);
    // Digits go through a stack buffer so framing never allocates.
    let mut digits = [0u8; 20];
    let mut pos = digits.len();
    let mut value = len;
    loop {
        pos -= 1;
        digits[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    out.extend_from_slice(&digits[pos..]);
    out.extend_from_slice(b"\r\n");
}

fn protocol(message: impl Into<String>) -> FailureCause {
    FailureCause::Protocol(message.into())
}
