//! Splitting content into extents and putting it back together.
//!
//! Chunking is fixed-size: every extent is `max_chunk_size` bytes except the
//! last, which holds the remainder. Empty content produces no extents at all,
//! so an empty file has an empty recipe.

use bytes::{Bytes, BytesMut};

/// Default maximum extent size in bytes.
pub const DEFAULT_EXTENT_SIZE: usize = 4096;

/// Split `content` into ordered slices of at most `max_chunk_size` bytes.
///
/// A `max_chunk_size` of zero is treated as one byte per extent.
pub fn split(content: &[u8], max_chunk_size: usize) -> Vec<&[u8]> {
    content.chunks(max_chunk_size.max(1)).collect()
}

/// Like [`split`], but returns zero-copy views into a shared buffer.
pub fn split_bytes(content: &Bytes, max_chunk_size: usize) -> Vec<Bytes> {
    let size = max_chunk_size.max(1);
    let mut chunks = Vec::with_capacity(content.len().div_ceil(size));
    let mut offset = 0;
    while offset < content.len() {
        let end = (offset + size).min(content.len());
        chunks.push(content.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Concatenate extents in order.
pub fn reassemble<I, C>(chunks: I) -> Bytes
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut out = BytesMut::new();
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out.freeze()
}
