use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

/// Posts a message to a channel. Replies with the number of deliveries.
///
/// Ref: <https://redis.io/docs/latest/commands/publish>
#[derive(Debug, PartialEq)]
pub struct Publish {
    pub channel: Bytes,
    pub message: Bytes,
}

impl Executable for Publish {
    fn exec(self, ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        let sent = ctx.pubsub.publish(&self.channel, &self.message);

        Ok(Frame::Integer(sent as i64).into())
    }
}

impl TryFrom<&mut CommandParser> for Publish {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let channel = parser.next_bytes()?;
        let message = parser.next_bytes()?;

        Ok(Self { channel, message })
    }
}
