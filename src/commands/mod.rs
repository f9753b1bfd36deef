//! Example application commands built on top of the router and the pub/sub registry.

pub mod config;
pub mod del;
pub mod echo;
pub mod executable;
pub mod get;
pub mod ping;
pub mod publish;
pub mod pubsub;
pub mod quit;
pub mod set;
pub mod subscribe;
pub mod unsubscribe;

use bytes::Bytes;
use std::marker::PhantomData;
use std::{str, vec};
use thiserror::Error as ThisError;

use crate::command::Command;
use crate::connection::Connection;
use crate::pubsub::PubSub;
use crate::router::{Handler, Reply, Router};
use crate::store::Store;
use crate::Error;

use config::Config;
use del::Del;
use echo::Echo;
use executable::Executable;
use get::Get;
use ping::Ping;
use publish::Publish;
use pubsub::Pubsub;
use quit::Quit;
use set::Set;
use subscribe::{PSubscribe, Subscribe};
use unsubscribe::{PUnsubscribe, Unsubscribe};

/// Shared state the example commands work on.
#[derive(Clone, Default)]
pub struct Context {
    pub store: Store,
    pub pubsub: PubSub,
}

impl Context {
    pub fn new(store: Store, pubsub: PubSub) -> Self {
        Self { store, pubsub }
    }
}

/// Builds a router with every example command registered.
pub fn router(ctx: Context) -> Router {
    let mut router = Router::new();
    router
        .register("config", Builtin::<Config>::new(&ctx))
        .register("del", Builtin::<Del>::new(&ctx))
        .register("echo", Builtin::<Echo>::new(&ctx))
        .register("get", Builtin::<Get>::new(&ctx))
        .register("ping", Builtin::<Ping>::new(&ctx))
        .register("publish", Builtin::<Publish>::new(&ctx))
        .register("pubsub", Builtin::<Pubsub>::new(&ctx))
        .register("quit", Builtin::<Quit>::new(&ctx))
        .register("set", Builtin::<Set>::new(&ctx))
        .register("subscribe", Builtin::<Subscribe>::new(&ctx).direct())
        .register("psubscribe", Builtin::<PSubscribe>::new(&ctx).direct())
        .register("unsubscribe", Builtin::<Unsubscribe>::new(&ctx).direct())
        .register("punsubscribe", Builtin::<PUnsubscribe>::new(&ctx).direct());
    router
}

/// Adapts a parsed, executable command type to the router's [`Handler`].
struct Builtin<T> {
    ctx: Context,
    direct: bool,
    _command: PhantomData<fn() -> T>,
}

impl<T> Builtin<T> {
    fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            direct: false,
            _command: PhantomData,
        }
    }

    /// The command writes to its connection itself.
    fn direct(mut self) -> Self {
        self.direct = true;
        self
    }
}

impl<T> Handler for Builtin<T>
where
    T: for<'a> TryFrom<&'a mut CommandParser, Error = CommandParserError> + Executable,
{
    fn call(&self, conn: &Connection, cmd: &Command) -> Result<Reply, Error> {
        let mut parser = CommandParser::new(cmd);

        let parsed =
            T::try_from(&mut parser).and_then(|parsed| parser.finish().map(|()| parsed));

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(CommandParserError::EndOfStream) => {
                return Err(CommandParserError::WrongArity {
                    command: parser.name.clone(),
                }
                .into())
            }
            Err(err) => return Err(err.into()),
        };

        parsed.exec(&self.ctx, conn)
    }

    fn writes_directly(&self) -> bool {
        self.direct
    }
}

pub struct CommandParser {
    name: String,
    parts: vec::IntoIter<Bytes>,
}

impl CommandParser {
    pub fn new(cmd: &Command) -> Self {
        let mut parts = cmd.args().to_vec().into_iter();
        let name = parts
            .next()
            .map(|name| String::from_utf8_lossy(&name).to_lowercase())
            .unwrap_or_default();

        Self { name, parts }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        self.parts.next().ok_or(CommandParserError::EndOfStream)
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let bytes = self.next_bytes()?;
        str::from_utf8(&bytes)
            .map(|s| s.to_string())
            .map_err(CommandParserError::InvalidUTF8String)
    }

    /// The next argument if there is one.
    fn maybe_next_bytes(&mut self) -> Option<Bytes> {
        self.parts.next()
    }

    /// All remaining arguments. At least one must be left.
    fn remaining_bytes(&mut self) -> Result<Vec<Bytes>, CommandParserError> {
        let rest: Vec<Bytes> = self.parts.by_ref().collect();
        if rest.is_empty() {
            return Err(CommandParserError::EndOfStream);
        }
        Ok(rest)
    }

    /// All remaining arguments, possibly none.
    fn rest(&mut self) -> Vec<Bytes> {
        self.parts.by_ref().collect()
    }

    /// Fails if arguments are left over.
    fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.parts.len() > 0 {
            return Err(CommandParserError::WrongArity {
                command: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity { command: String },
    #[error("ERR unknown subcommand '{subcommand}' for '{command}'")]
    UnknownSubcommand { command: String, subcommand: String },
    #[error("ERR invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("ERR attempting to extract a value failed due to the command being fully consumed")]
    EndOfStream,
}
