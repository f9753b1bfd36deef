// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use std::str;
use thiserror::Error as ThisError;

use crate::codec::{self, CRLF};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    /// Invalid message encoding.
    #[error("{0}")]
    Other(crate::Error),
}

/// A typed reply value. Requests are decoded by [`codec::decode`] instead, a `Frame` is what the
/// server sends back.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Shorthand for a bulk reply built from anything that converts into `Bytes`.
    pub fn bulk(value: impl Into<Bytes>) -> Self {
        Frame::Bulk(value.into())
    }

    /// Parses one reply frame. This is the client side of the protocol, the server only needs it
    /// to check what it wrote.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let line = get_line(src)?;
                Ok(Frame::Simple(to_string(line)?))
            }
            DataType::SimpleError => {
                let line = get_line(src)?;
                Ok(Frame::Error(to_string(line)?))
            }
            DataType::Integer => {
                let line = get_line(src)?;
                Ok(Frame::Integer(to_integer(line)?))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = to_integer(get_line(src)?)?;
                if length == -1 {
                    return Ok(Frame::Null);
                }

                let length = usize::try_from(length)
                    .map_err(|_| "protocol error; invalid bulk length")?;
                if src.remaining() < length + CRLF.len() {
                    return Err(Error::Incomplete);
                }

                let buf: &[u8] = *src.get_ref();
                let start = src.position() as usize;
                if &buf[start + length..start + length + CRLF.len()] != CRLF {
                    return Err("protocol error; missing CRLF after bulk".into());
                }
                let data = Bytes::copy_from_slice(&buf[start..start + length]);
                src.advance(length + CRLF.len());

                Ok(Frame::Bulk(data))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                let length = to_integer(get_line(src)?)?;
                if length == -1 {
                    return Ok(Frame::Null);
                }

                let length = usize::try_from(length)
                    .map_err(|_| "protocol error; invalid array length")?;
                let mut frames = Vec::with_capacity(length.min(64));
                for _ in 0..length {
                    frames.push(Self::parse(src)?);
                }

                Ok(Frame::Array(frames))
            }
            DataType::Null => {
                get_line(src)?;
                Ok(Frame::Null)
            }
        }
    }

    /// Appends the wire form of the frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => codec::append_simple(dst, s),
            Frame::Error(s) => codec::append_error(dst, s),
            Frame::Integer(i) => codec::append_integer(dst, *i),
            Frame::Bulk(bytes) => codec::append_bulk(dst, bytes),
            Frame::Null => codec::append_null(dst),
            Frame::Array(arr) => {
                codec::append_array(dst, arr.len());
                for frame in arr {
                    frame.write_to(dst);
                }
            }
        }
    }

    pub fn serialize(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.write_to(&mut dst);
        dst.freeze()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf[start..]
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn to_string(line: &[u8]) -> Result<String, Error> {
    str::from_utf8(line)
        .map(|s| s.to_string())
        .map_err(|_| "protocol error; invalid frame format".into())
}

fn to_integer(line: &[u8]) -> Result<i64, Error> {
    str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| "protocol error; invalid integer".into())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
    // RESP3 null. Only accepted when reading, replies use the RESP2 null bulk string.
    Null, // '_'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            b'_' => Ok(Self::Null),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<&str> for Error {
    fn from(src: &str) -> Error {
        Error::Other(src.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Result<Frame, Error> {
        let mut cursor = Cursor::new(data);
        Frame::parse(&mut cursor)
    }

    #[test]
    fn parse_simple_string_frame() {
        let frame = parse(b"+OK\r\n");

        assert!(matches!(frame, Ok(Frame::Simple(ref s)) if s == "OK"));
    }

    #[test]
    fn parse_simple_error_frame() {
        let frame = parse(b"-Error message\r\n");

        assert!(matches!(
            frame,
            Ok(Frame::Error(ref s)) if s == "Error message"
        ));
    }

    fn parse_integer_frame(data: &[u8], expected: i64) {
        let frame = parse(data);

        assert!(matches!(frame, Ok(Frame::Integer(i)) if i == expected));
    }

    #[test]
    fn parse_integer_frame_positive() {
        parse_integer_frame(b":1000\r\n", 1000);
    }

    #[test]
    fn parse_integer_frame_negative() {
        parse_integer_frame(b":-1000\r\n", -1000);
    }

    #[test]
    fn parse_integer_frame_positive_signed() {
        parse_integer_frame(b":+1000\r\n", 1000);
    }

    #[test]
    fn parse_bulk_string_frame_with_crlf_inside() {
        let frame = parse(b"$8\r\nfoo\r\nbar\r\n");

        assert!(matches!(
            frame,
            Ok(Frame::Bulk(ref b)) if b == &Bytes::from("foo\r\nbar")
        ));
    }

    #[test]
    fn parse_bulk_string_frame_null() {
        assert!(matches!(parse(b"$-1\r\n"), Ok(Frame::Null)));
        assert!(matches!(parse(b"*-1\r\n"), Ok(Frame::Null)));
        assert!(matches!(parse(b"_\r\n"), Ok(Frame::Null)));
    }

    #[test]
    fn parse_truncated_bulk_string_frame() {
        assert!(matches!(parse(b"$6\r\nfoo"), Err(Error::Incomplete)));
    }

    #[test]
    fn parse_array_frame_nested() {
        let frame = parse(b"*2\r\n*3\r\n:1\r\n:2\r\n:3\r\n*2\r\n+Hello\r\n-World\r\n").unwrap();

        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Array(vec![
                    Frame::Integer(1),
                    Frame::Integer(2),
                    Frame::Integer(3)
                ]),
                Frame::Array(vec![
                    Frame::Simple("Hello".to_string()),
                    Frame::Error("World".to_string())
                ]),
            ])
        );
    }

    #[test]
    fn parse_unknown_data_type() {
        assert!(matches!(parse(b"%1\r\n"), Err(Error::InvalidDataType(b'%'))));
    }

    #[test]
    fn serialize_pmessage() {
        let frame = Frame::Array(vec![
            Frame::bulk("pmessage"),
            Frame::bulk("new.*"),
            Frame::bulk("news"),
            Frame::bulk("hi"),
        ]);

        assert_eq!(
            &frame.serialize()[..],
            b"*4\r\n$8\r\npmessage\r\n$5\r\nnew.*\r\n$4\r\nnews\r\n$2\r\nhi\r\n"
        );
    }

    #[test]
    fn serialized_frame_parses_back() {
        let frame = Frame::Array(vec![
            Frame::Simple("OK".to_string()),
            Frame::Null,
            Frame::Integer(7),
            Frame::bulk(&b"\x00\x01"[..]),
        ]);

        let bytes = frame.serialize();

        assert_eq!(parse(&bytes).unwrap(), frame);
    }
}
