//! Encoding helpers used when a response is turned into outgoing frames.
//!
//! - [`header`]: header names travel as ASCII bytes, header values as Latin-1 bytes
//! - [`chunk`]: body buffers are split into frames of a bounded size
//!
//! Both are pure functions over [`bytes::Bytes`]; chunking slices the input buffer instead of
//! copying it.

mod chunk;
mod error;
mod header;

pub use chunk::Chunks;
pub use chunk::DEFAULT_CHUNK_SIZE;
pub use chunk::chunk_bytes;
pub use error::EncodeError;
pub use header::decode_header_name;
pub use header::decode_header_value;
pub use header::encode_header;
pub use header::encode_header_name;
pub use header::encode_header_value;
