use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::mem;
use std::str;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec;
use crate::command::Command;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::Error;

/// What the connection should do once the current batch has been flushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Continue,
    Close,
}

/// The encoded reply to one command, plus whether the connection should be closed afterwards.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Reply {
    pub bytes: Bytes,
    pub action: Action,
}

impl Reply {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            action: Action::Continue,
        }
    }

    /// A command that already wrote to its connection and has nothing to add to the batch.
    pub fn none() -> Self {
        Self::default()
    }

    /// Marks the reply as the last one: the connection is closed once it has been flushed.
    pub fn and_close(mut self) -> Self {
        self.action = Action::Close;
        self
    }
}

impl From<Frame> for Reply {
    fn from(frame: Frame) -> Self {
        Reply::new(frame.serialize())
    }
}

/// Handles one command.
///
/// Implemented for any `Fn(&Connection, &Command) -> Result<Reply, Error>`, so plain closures
/// can be registered.
pub trait Handler: Send + Sync {
    fn call(&self, conn: &Connection, cmd: &Command) -> Result<Reply, Error>;

    /// Whether the handler writes to the connection itself instead of (or on top of) returning a
    /// reply. The router flushes the replies collected so far before calling such a handler.
    fn writes_directly(&self) -> bool {
        false
    }
}

impl<F> Handler for F
where
    F: Fn(&Connection, &Command) -> Result<Reply, Error> + Send + Sync,
{
    fn call(&self, conn: &Connection, cmd: &Command) -> Result<Reply, Error> {
        self(conn, cmd)
    }
}

/// Maps command names, case-insensitively, to handlers.
#[derive(Default, Clone)]
pub struct Router {
    handlers: HashMap<String, Arc<dyn Handler>>,
    fallback: Option<Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Router {
        Router::default()
    }

    pub fn register<H>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: Handler + 'static,
    {
        self.handlers.insert(name.to_ascii_lowercase(), Arc::new(handler));
        self
    }

    /// Handler for every command that has no registered name. Without one, unknown commands get
    /// an error reply.
    pub fn fallback<H>(&mut self, handler: H) -> &mut Self
    where
        H: Handler + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    fn lookup(&self, cmd: &Command) -> Option<&Arc<dyn Handler>> {
        str::from_utf8(cmd.name())
            .ok()
            .and_then(|name| self.handlers.get(&name.to_ascii_lowercase()))
            .or(self.fallback.as_ref())
    }

    /// Runs every command of a batch, in order, and writes all their replies to `conn` as one
    /// write.
    ///
    /// A failing command gets an error reply and doesn't stop the others. A handler asking to
    /// close the connection doesn't stop them either: the whole batch runs, its replies are
    /// written, and [`Action::Close`] is returned.
    pub fn dispatch(&self, conn: &Connection, commands: Vec<Command>) -> Action {
        let mut replies = Vec::with_capacity(commands.len());
        let mut action = Action::Continue;

        for cmd in &commands {
            let Some(handler) = self.lookup(cmd) else {
                debug!("Unknown command: {}", cmd);
                let message = format!(
                    "ERR unknown command '{}'",
                    String::from_utf8_lossy(cmd.name())
                );
                replies.push(error_reply(&message));
                continue;
            };

            if handler.writes_directly() && !replies.is_empty() {
                conn.write_batch(mem::take(&mut replies));
            }

            match handler.call(conn, cmd) {
                Ok(reply) => {
                    if !reply.bytes.is_empty() {
                        replies.push(reply.bytes);
                    }
                    if reply.action == Action::Close {
                        action = Action::Close;
                    }
                }
                Err(err) => {
                    debug!("Command {} failed: {}", cmd, err);
                    replies.push(error_reply(&error_message(&err)));
                }
            }
        }

        debug!(
            "Dispatched {} commands, writing {} replies",
            commands.len(),
            replies.len()
        );

        if !conn.write_batch(replies) {
            warn!("Connection {} is gone, dropping replies", conn.id());
        }

        action
    }
}

/// Error messages start with an upper-case error code (`ERR`, `WRONGTYPE`, ...). Messages
/// without one get `ERR`. A code is at least two letters, so a sentence starting with `A` is
/// not mistaken for one.
fn error_message(err: &Error) -> String {
    let message = err.to_string();
    let code = message.split(' ').next().unwrap_or_default();

    if code.len() >= 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        message
    } else {
        format!("ERR {}", message)
    }
}

fn error_reply(message: &str) -> Bytes {
    let mut dst = BytesMut::new();
    codec::append_error(&mut dst, message);
    dst.freeze()
}
