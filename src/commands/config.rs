use bytes::Bytes;
use std::str::FromStr;
use strum_macros::EnumString;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

/// There is no runtime configuration to inspect. `CONFIG GET` answers every parameter with an
/// empty value, which is enough for tools like `redis-benchmark`, and `CONFIG SET` is accepted
/// and ignored.
#[derive(Debug, PartialEq)]
pub enum Config {
    Get(Bytes),
    Set(Bytes, Bytes),
}

#[derive(Debug, EnumString)]
#[strum(ascii_case_insensitive)]
enum Subcommand {
    Get,
    Set,
}

impl Executable for Config {
    fn exec(self, _ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        let res = match self {
            Config::Get(parameter) => Frame::Array(vec![Frame::Bulk(parameter), Frame::bulk("")]),
            Config::Set(_, _) => Frame::Simple("OK".to_string()),
        };

        Ok(res.into())
    }
}

impl TryFrom<&mut CommandParser> for Config {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let name = parser.next_string()?;
        let subcommand =
            Subcommand::from_str(&name).map_err(|_| CommandParserError::UnknownSubcommand {
                command: parser.name().to_string(),
                subcommand: name,
            })?;

        match subcommand {
            Subcommand::Get => Ok(Config::Get(parser.next_bytes()?)),
            Subcommand::Set => {
                let parameter = parser.next_bytes()?;
                let value = parser.next_bytes()?;
                Ok(Config::Set(parameter, value))
            }
        }
    }
}
