//! A RESP command server core: streaming multibulk decoding, batched replies and pub/sub fan-out.

pub mod codec;
pub mod command;
pub mod commands;
pub mod config;
pub mod connection;
pub mod frame;
pub mod pubsub;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

pub use command::Command;
pub use config::Config;
pub use connection::Connection;
pub use router::{Action, Handler, Reply, Router};
pub use server::Server;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
