pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod executor;
pub mod response;
pub mod server;
pub mod store;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
