//! JSON-line protocol: message types and framing

mod codec;
mod messages;

pub use codec::JsonLineCodec;
pub use messages::*;
