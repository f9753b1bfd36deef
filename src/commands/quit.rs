use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError, Context};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::router::Reply;
use crate::Error;

/// Ask the server to close the connection once the pending replies are written.
///
/// Ref: <https://redis.io/docs/latest/commands/quit>
#[derive(Debug, PartialEq)]
pub struct Quit;

impl Executable for Quit {
    fn exec(self, _ctx: &Context, _conn: &Connection) -> Result<Reply, Error> {
        Ok(Reply::from(Frame::Simple("OK".to_string())).and_close())
    }
}

impl TryFrom<&mut CommandParser> for Quit {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}
