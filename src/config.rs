use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::store::{DEFAULT_BUSY_TIMEOUT, DEFAULT_DATABASE};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7778;

/// Everything the server needs to start, passed explicitly into bootstrap, executor and the
/// accept loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub busy_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: PathBuf::from(DEFAULT_DATABASE),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Lenient port parsing: anything missing or not a valid port falls back to the default.
pub fn parse_port(port: Option<&str>) -> u16 {
    port.and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
