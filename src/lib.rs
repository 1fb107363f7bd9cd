mod utils;
mod amf;
mod protocol;
mod handshake;
mod chunk;
mod stream;
mod processing;
mod session;
mod broker;
mod server;

// Re-export commonly used types at crate root
pub use utils::*;
pub use amf::*;
pub use protocol::*;
pub use chunk::*;
pub use handshake::*;

// Server exports
pub use server::{RtmpServer, ServerConfig};

// Session/broker exports
pub use session::Session;
pub use broker::{Broker, BrokerEvent, SessionHandle, SessionId};

// Stream exports
pub use stream::*;

// Processing exports
pub use processing::*;
