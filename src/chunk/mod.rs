//! Zero-copy chunk addressing

pub mod header;

pub use header::{ChunkHeader, CHUNK_HEADER_LAYOUT_VERSION};
