mod chunks;
mod decoder;

pub use chunks::Chunks;
#[cfg(test)]
pub use chunks::Error as ChunksError;
pub use decoder::{StreamDecoder, StreamMessage};
