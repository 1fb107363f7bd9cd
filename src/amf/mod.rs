mod amf0;
mod amf3;
mod decoder;
mod encoder;

pub use amf0::*;
pub use amf3::{Amf3Decoder, Amf3Value};
pub use decoder::*;
pub use encoder::*;
