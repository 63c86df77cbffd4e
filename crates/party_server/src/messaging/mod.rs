//! Wire protocol: the JSON envelope, typed inbound intents and outbound messages.

pub mod codec;
pub mod types;

pub use codec::{decode_intent, encode_message, ProtocolError};
pub use types::*;
