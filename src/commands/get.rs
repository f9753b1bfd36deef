use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

/// Get the value of `key`. If the key does not exist the special value `nil` is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/get/>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: Bytes,
}

impl Executable for Get {
    fn exec(self, ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        let store = ctx.store.lock();

        match store.get(&self.key) {
            Some(value) => Ok(Frame::Bulk(value.clone()).into()),
            None => Ok(Frame::Null.into()),
        }
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::run;

    #[test]
    fn existing_key() {
        let ctx = Context::default();
        ctx.store.lock().set(Bytes::from("key1"), Bytes::from("1"));

        let (out, _) = run(&ctx, &["GET", "key1"]);

        assert_eq!(out, b"$1\r\n1\r\n");
    }

    #[test]
    fn missing_key() {
        let (out, _) = run(&Context::default(), &["GET", "key1"]);

        assert_eq!(out, b"$-1\r\n");
    }
}
