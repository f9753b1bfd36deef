// https://redis.io/docs/reference/protocol-spec/#sending-commands-to-a-redis-server

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error as ThisError;

use crate::command::Command;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

/// Longest header line (`*<count>` or `$<len>`) accepted before a terminator must appear.
const MAX_LINE_LEN: usize = 64 * 1024;

pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;
pub const DEFAULT_MAX_MULTIBULK_LEN: usize = 1024 * 1024;

/// Sanity ceilings applied while decoding. A declared length above either one is treated as
/// corruption rather than as a frame that has not fully arrived yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Limits {
    pub max_bulk_len: usize,
    pub max_multibulk_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_multibulk_len: DEFAULT_MAX_MULTIBULK_LEN,
        }
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ProtocolError {
    #[error("Protocol error: expected '{expected}', got '{}'", char::from(*.actual))]
    InvalidMarker { expected: char, actual: u8 },
    #[error("Protocol error: invalid multibulk length")]
    InvalidMultibulkLength,
    #[error("Protocol error: invalid bulk length")]
    InvalidBulkLength,
    #[error("Protocol error: expected CRLF after bulk payload")]
    MissingTerminator,
    #[error("Protocol error: too big header line")]
    LineTooLong,
}

/// Decodes every command fully present in `buf` using the default [`Limits`].
///
/// See [`decode_with_limits`].
pub fn decode(buf: &[u8]) -> Result<(Vec<Command>, &[u8]), ProtocolError> {
    decode_with_limits(buf, &Limits::default())
}

/// Decodes every command fully present in `buf`, in arrival order, and returns them together with
/// the unconsumed suffix. The suffix is the start of a command that has not fully arrived yet; the
/// caller must keep it and prepend it to the bytes handed to the next call.
///
/// A truncated trailing command is never an error. Structural corruption is, and the stream can't
/// be resynchronized after it. Use a [`Decoder`] to avoid parsing the truncated command again on
/// the next call.
pub fn decode_with_limits<'a>(
    buf: &'a [u8],
    limits: &Limits,
) -> Result<(Vec<Command>, &'a [u8]), ProtocolError> {
    let mut commands = Vec::new();
    let mut rest = buf;

    loop {
        let mut decoder = Decoder::new(*limits);
        let mut cursor = rest;
        match decoder.next_command(&mut cursor)? {
            Some(command) => {
                commands.push(command);
                rest = cursor;
            }
            None => {
                // Hand back the whole unfinished command, header included.
                if !decoder.is_partial() {
                    rest = cursor;
                }
                break;
            }
        }
    }

    Ok((commands, rest))
}

/// Streaming multibulk decoder.
///
/// Unlike [`decode_with_limits`], a command cut short by the end of the buffer is not handed back
/// as bytes: the decoder keeps its declared element count and the elements that already arrived,
/// and the returned suffix only starts at the first element still missing. Bytes are scanned once
/// however the stream is split.
#[derive(Debug, Default)]
pub struct Decoder {
    limits: Limits,
    partial: Option<Partial>,
}

#[derive(Debug)]
struct Partial {
    expected: usize,
    args: Vec<Bytes>,
}

impl Decoder {
    pub fn new(limits: Limits) -> Decoder {
        Decoder {
            limits,
            partial: None,
        }
    }

    /// Decodes as many commands as `buf` completes. The returned suffix must be prepended to the
    /// next buffer.
    pub fn decode<'a>(
        &mut self,
        buf: &'a [u8],
    ) -> Result<(Vec<Command>, &'a [u8]), ProtocolError> {
        let mut commands = Vec::new();
        let mut rest = buf;

        while let Some(command) = self.next_command(&mut rest)? {
            commands.push(command);
        }

        Ok((commands, rest))
    }

    /// True while a command has its header, and possibly some elements, decoded but not all of
    /// them.
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    // *<number-of-elements>\r\n$<length>\r\n<data>\r\n...
    //
    // `src` is advanced past every header and element consumed, even when the command is not
    // complete yet.
    fn next_command(&mut self, src: &mut &[u8]) -> Result<Option<Command>, ProtocolError> {
        loop {
            if self.partial.is_none() {
                let mut cursor = *src;
                let count = match read_header(&mut cursor, b'*')? {
                    Some(line) => parse_length(line).ok_or(ProtocolError::InvalidMultibulkLength)?,
                    None => return Ok(None),
                };

                if count > self.limits.max_multibulk_len {
                    return Err(ProtocolError::InvalidMultibulkLength);
                }

                *src = cursor;
                // `*0\r\n` is consumed without producing a command.
                if count == 0 {
                    continue;
                }

                self.partial = Some(Partial {
                    expected: count,
                    // Cap the up-front allocation, the count is client controlled.
                    args: Vec::with_capacity(count.min(64)),
                });
            }

            let Some(partial) = self.partial.as_mut() else {
                return Ok(None);
            };

            while partial.args.len() < partial.expected {
                match read_bulk(src, &self.limits)? {
                    Some(arg) => partial.args.push(arg),
                    None => return Ok(None),
                }
            }

            return Ok(self
                .partial
                .take()
                .map(|partial| Command::from_args(partial.args)));
        }
    }
}

/// Reads one `$<len>\r\n<data>\r\n` element. `src` is only advanced when all of it is there.
fn read_bulk(src: &mut &[u8], limits: &Limits) -> Result<Option<Bytes>, ProtocolError> {
    let mut cursor = *src;

    let len = match read_header(&mut cursor, b'$')? {
        Some(line) => parse_length(line).ok_or(ProtocolError::InvalidBulkLength)?,
        None => return Ok(None),
    };

    if len > limits.max_bulk_len {
        return Err(ProtocolError::InvalidBulkLength);
    }

    if cursor.len() < len + CRLF.len() {
        return Ok(None);
    }

    if &cursor[len..len + CRLF.len()] != CRLF {
        return Err(ProtocolError::MissingTerminator);
    }

    let arg = Bytes::copy_from_slice(&cursor[..len]);
    *src = &cursor[len + CRLF.len()..];
    Ok(Some(arg))
}

/// Reads a `<marker><digits>\r\n` line and returns the digits. `None` means the line has not fully
/// arrived.
fn read_header<'a>(src: &mut &'a [u8], marker: u8) -> Result<Option<&'a [u8]>, ProtocolError> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };

    if first != marker {
        return Err(ProtocolError::InvalidMarker {
            expected: char::from(marker),
            actual: first,
        });
    }

    match find_crlf(&src[1..]) {
        Some(end) => {
            let line = &src[1..1 + end];
            *src = &src[1 + end + CRLF.len()..];
            Ok(Some(line))
        }
        None if src.len() > MAX_LINE_LEN => Err(ProtocolError::LineTooLong),
        None => Ok(None),
    }
}

/// Parses a non-negative ASCII decimal. A sign, an empty line or any other byte is rejected.
fn parse_length(line: &[u8]) -> Option<usize> {
    if line.is_empty() || line.len() > 19 {
        return None;
    }

    line.iter().try_fold(0usize, |acc, b| match b {
        b'0'..=b'9' => acc.checked_mul(10)?.checked_add(usize::from(b - b'0')),
        _ => None,
    })
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF.len()).position(|window| window == CRLF)
}

// Encoders. Each one appends exactly one self-describing value to `dst` and never reads it back.

/// `+<text>\r\n`. Line breaks inside `text` are written as spaces.
pub fn append_simple(dst: &mut BytesMut, text: &str) {
    append_line(dst, b'+', text);
}

/// `-<text>\r\n`. Line breaks inside `text` are written as spaces.
pub fn append_error(dst: &mut BytesMut, text: &str) {
    append_line(dst, b'-', text);
}

// Simple strings and errors end at the first CRLF, so the text must not contain one.
fn append_line(dst: &mut BytesMut, marker: u8, text: &str) {
    dst.put_u8(marker);
    dst.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    dst.extend_from_slice(CRLF);
}

/// `:<n>\r\n`
pub fn append_integer(dst: &mut BytesMut, n: i64) {
    dst.put_u8(b':');
    dst.extend_from_slice(n.to_string().as_bytes());
    dst.extend_from_slice(CRLF);
}

/// `$<len>\r\n<bytes>\r\n`
pub fn append_bulk(dst: &mut BytesMut, bytes: &[u8]) {
    dst.put_u8(b'$');
    dst.extend_from_slice(bytes.len().to_string().as_bytes());
    dst.extend_from_slice(CRLF);
    dst.extend_from_slice(bytes);
    dst.extend_from_slice(CRLF);
}

pub fn append_bulk_string(dst: &mut BytesMut, s: &str) {
    append_bulk(dst, s.as_bytes());
}

/// The RESP2 null bulk string, `$-1\r\n`.
pub fn append_null(dst: &mut BytesMut) {
    dst.extend_from_slice(b"$-1\r\n");
}

/// `*<count>\r\n`. The `count` children must be appended right after it.
pub fn append_array(dst: &mut BytesMut, count: usize) {
    dst.put_u8(b'*');
    dst.extend_from_slice(count.to_string().as_bytes());
    dst.extend_from_slice(CRLF);
}
