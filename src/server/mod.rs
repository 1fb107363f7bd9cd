mod server;
mod config;

pub use server::RtmpServer;
pub use config::{ServerConfig, ServerConfigBuilder};
