use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::pubsub::Kind;
use crate::router::Reply;
use crate::Error;

/// Subscribes the client to the given channels. Confirmations are written to the connection by
/// the registry, one per channel.
///
/// Ref: <https://redis.io/docs/latest/commands/subscribe>
#[derive(Debug, PartialEq)]
pub struct Subscribe {
    pub channels: Vec<Bytes>,
}

/// Subscribes the client to the given patterns, matched as regular expressions against channel
/// names.
///
/// Ref: <https://redis.io/docs/latest/commands/psubscribe>
#[derive(Debug, PartialEq)]
pub struct PSubscribe {
    pub patterns: Vec<Bytes>,
}

impl Executable for Subscribe {
    fn exec(self, ctx: &Context, conn: &Connection) -> Result<Reply, Error> {
        ctx.pubsub.subscribe(conn, Kind::Channel, &self.channels);
        Ok(Reply::none())
    }
}

impl Executable for PSubscribe {
    fn exec(self, ctx: &Context, conn: &Connection) -> Result<Reply, Error> {
        ctx.pubsub.subscribe(conn, Kind::Pattern, &self.patterns);
        Ok(Reply::none())
    }
}

impl TryFrom<&mut CommandParser> for Subscribe {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let channels = parser.remaining_bytes()?;
        Ok(Self { channels })
    }
}

impl TryFrom<&mut CommandParser> for PSubscribe {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let patterns = parser.remaining_bytes()?;
        Ok(Self { patterns })
    }
}
