use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

// https://redis.io/commands/del
#[derive(Debug, PartialEq)]
pub struct Del {
    pub keys: Vec<Bytes>,
}

impl Executable for Del {
    fn exec(self, ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        let mut store = ctx.store.lock();
        let count = self
            .keys
            .iter()
            .filter(|key| store.remove(key).is_some())
            .count();

        Ok(Frame::Integer(count as i64).into())
    }
}

impl TryFrom<&mut CommandParser> for Del {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let keys = parser.remaining_bytes()?;

        Ok(Self { keys })
    }
}
