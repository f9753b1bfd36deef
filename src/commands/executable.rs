use crate::commands::Context;
use crate::connection::Connection;
use crate::router::Reply;
use crate::Error;

pub trait Executable {
    fn exec(self, ctx: &Context, conn: &Connection) -> Result<Reply, Error>;
}
