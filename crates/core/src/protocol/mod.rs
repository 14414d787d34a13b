//! Wire framing

mod codec;

pub use codec::{MessageCodec, MAX_MESSAGE_SIZE};
