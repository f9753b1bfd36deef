use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

/// Set `key` to hold the string `value`. Options such as `EX` or `NX` are not supported.
///
/// Ref: <https://redis.io/docs/latest/commands/set>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
}

impl Executable for Set {
    fn exec(self, ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        ctx.store.lock().set(self.key, self.value);

        Ok(Frame::Simple("OK".to_string()).into())
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        let value = parser.next_bytes()?;

        Ok(Self { key, value })
    }
}
