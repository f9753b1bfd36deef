use bytes::{Bytes, BytesMut};
use std::fmt;

use crate::codec;

/// A decoded client request: the command name followed by its arguments, each one an exact byte
/// string as it was sent on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    // Never empty.
    args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from its parts. Returns `None` when `args` is empty.
    pub fn new(args: Vec<Bytes>) -> Option<Self> {
        if args.is_empty() {
            return None;
        }
        Some(Self { args })
    }

    pub(crate) fn from_args(args: Vec<Bytes>) -> Self {
        debug_assert!(!args.is_empty());
        Self { args }
    }

    /// The command name, as sent by the client.
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    /// Case-insensitive comparison against the command name.
    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name.as_bytes())
    }

    /// All the parts, name included.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    /// Number of parts, name included.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Encodes the command the way a client sends it: an array of bulk strings.
    pub fn serialize(&self) -> Bytes {
        let mut dst = BytesMut::new();
        codec::append_array(&mut dst, self.args.len());
        for arg in &self.args {
            codec::append_bulk(&mut dst, arg);
        }
        dst.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Builds a [`Command`] from string literals. Handy for tests and clients.
impl<'a> TryFrom<&[&'a str]> for Command {
    type Error = crate::Error;

    fn try_from(parts: &[&'a str]) -> Result<Self, Self::Error> {
        let args = parts
            .iter()
            .map(|part| Bytes::copy_from_slice(part.as_bytes()))
            .collect();

        Command::new(args).ok_or_else(|| "a command needs at least a name".into())
    }
}
