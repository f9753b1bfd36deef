use bytes::Bytes;
use std::str::FromStr;
use strum_macros::EnumString;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

/// Introspection of the pub/sub registry.
///
/// Ref: <https://redis.io/docs/latest/commands/pubsub/>
#[derive(Debug, PartialEq)]
pub enum Pubsub {
    /// Active channels, optionally filtered by a pattern.
    Channels(Option<Bytes>),
    /// Literal subscriber count of each channel.
    Numsub(Vec<Bytes>),
    /// Number of patterns with at least one subscriber.
    Numpat,
}

#[derive(Debug, EnumString)]
#[strum(ascii_case_insensitive)]
enum Subcommand {
    Channels,
    Numsub,
    Numpat,
}

impl Executable for Pubsub {
    fn exec(self, ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        let res = match self {
            Pubsub::Channels(pattern) => {
                let channels = ctx.pubsub.channels(pattern.as_deref());
                Frame::Array(channels.into_iter().map(Frame::Bulk).collect())
            }
            Pubsub::Numsub(channels) => {
                let mut frames = Vec::with_capacity(channels.len() * 2);
                for channel in channels {
                    let count = ctx.pubsub.subscriber_count(&channel);
                    frames.push(Frame::Bulk(channel));
                    frames.push(Frame::Integer(count as i64));
                }
                Frame::Array(frames)
            }
            Pubsub::Numpat => Frame::Integer(ctx.pubsub.pattern_count() as i64),
        };

        Ok(res.into())
    }
}

impl TryFrom<&mut CommandParser> for Pubsub {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let name = parser.next_string()?;
        let subcommand =
            Subcommand::from_str(&name).map_err(|_| CommandParserError::UnknownSubcommand {
                command: parser.name().to_string(),
                subcommand: name,
            })?;

        match subcommand {
            Subcommand::Channels => Ok(Pubsub::Channels(parser.maybe_next_bytes())),
            Subcommand::Numsub => Ok(Pubsub::Numsub(parser.rest())),
            Subcommand::Numpat => Ok(Pubsub::Numpat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{connection, run};
    use crate::pubsub::Kind;

    fn context() -> (Context, Connection) {
        let ctx = Context::default();
        let (conn, _rx) = connection();
        ctx.pubsub.subscribe(
            &conn,
            Kind::Channel,
            &[Bytes::from("news"), Bytes::from("sport")],
        );
        ctx.pubsub.subscribe(&conn, Kind::Pattern, &[Bytes::from("^n")]);
        (ctx, conn)
    }

    #[test]
    fn channels_with_pattern() {
        let (ctx, _conn) = context();

        let (out, _) = run(&ctx, &["PUBSUB", "CHANNELS", "^n"]);

        assert_eq!(out, b"*1\r\n$4\r\nnews\r\n");
    }

    #[test]
    fn numsub() {
        let (ctx, _conn) = context();

        let (out, _) = run(&ctx, &["pubsub", "numsub", "news", "other"]);

        assert_eq!(out, b"*4\r\n$4\r\nnews\r\n:1\r\n$5\r\nother\r\n:0\r\n");
    }

    #[test]
    fn numpat() {
        let (ctx, _conn) = context();

        let (out, _) = run(&ctx, &["PUBSUB", "NUMPAT"]);

        assert_eq!(out, b":1\r\n");
    }

    #[test]
    fn unknown_subcommand() {
        let (out, _) = run(&Context::default(), &["PUBSUB", "SHARDCHANNELS"]);

        assert_eq!(
            out,
            b"-ERR unknown subcommand 'SHARDCHANNELS' for 'pubsub'\r\n"
        );
    }
}
