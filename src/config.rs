use clap::Parser;

use crate::codec::{Limits, DEFAULT_MAX_BULK_LEN, DEFAULT_MAX_MULTIBULK_LEN};

const HOST: &str = "127.0.0.1";
const PORT: u16 = 6380;
const READ_BUFFER_SIZE: usize = 4096;

/// Server settings. Every flag can also be set through its environment variable.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "respcast", version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(long, env = "RESPCAST_HOST", default_value = HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "RESPCAST_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Largest bulk string a client may send, in bytes
    #[arg(long, env = "RESPCAST_MAX_BULK_LEN", default_value_t = DEFAULT_MAX_BULK_LEN)]
    pub max_bulk_len: usize,

    /// Largest number of arguments in a single command
    #[arg(long, env = "RESPCAST_MAX_MULTIBULK_LEN", default_value_t = DEFAULT_MAX_MULTIBULK_LEN)]
    pub max_multibulk_len: usize,

    /// Initial capacity of each connection's read buffer, in bytes
    #[arg(long, env = "RESPCAST_READ_BUFFER_SIZE", default_value_t = READ_BUFFER_SIZE)]
    pub read_buffer_size: usize,
}

impl Config {
    pub fn limits(&self) -> Limits {
        Limits {
            max_bulk_len: self.max_bulk_len,
            max_multibulk_len: self.max_multibulk_len,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: HOST.to_string(),
            port: PORT,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_multibulk_len: DEFAULT_MAX_MULTIBULK_LEN,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}
