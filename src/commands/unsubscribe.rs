use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::pubsub::Kind;
use crate::router::Reply;
use crate::Error;

/// Unsubscribes the client from the given channels, or from all of them when none is given.
///
/// Ref: <https://redis.io/docs/latest/commands/unsubscribe>
#[derive(Debug, PartialEq)]
pub struct Unsubscribe {
    pub channels: Vec<Bytes>,
}

/// Ref: <https://redis.io/docs/latest/commands/punsubscribe>
#[derive(Debug, PartialEq)]
pub struct PUnsubscribe {
    pub patterns: Vec<Bytes>,
}

impl Executable for Unsubscribe {
    fn exec(self, ctx: &Context, conn: &Connection) -> Result<Reply, Error> {
        ctx.pubsub.unsubscribe(conn, Kind::Channel, &self.channels);
        Ok(Reply::none())
    }
}

impl Executable for PUnsubscribe {
    fn exec(self, ctx: &Context, conn: &Connection) -> Result<Reply, Error> {
        ctx.pubsub.unsubscribe(conn, Kind::Pattern, &self.patterns);
        Ok(Reply::none())
    }
}

impl TryFrom<&mut CommandParser> for Unsubscribe {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self {
            channels: parser.rest(),
        })
    }
}

impl TryFrom<&mut CommandParser> for PUnsubscribe {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self {
            patterns: parser.rest(),
        })
    }
}
