//! Fixed-size chunk planning shared by the producing and consuming ends of a transfer.
use crate::ContentDigest;

/// Maximum size of a single chunk; both ends of a transfer must agree on it.
pub const BLOB_CHUNK_SIZE: u64 = 6 * 1024 * 1024;

/// One chunk of a blob: its position in the chunk sequence and its byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

/// Split `size` bytes into consecutive ranges of `chunk_size` bytes; the last range holds the
/// remainder. An empty blob has no chunks.
pub fn chunk_ranges(size: u64, chunk_size: u64) -> impl Iterator<Item = ChunkRange> {
    let chunk_size = chunk_size.max(1);
    let count = (size + chunk_size - 1) / chunk_size;
    (0..count).map(move |i| {
        let offset = i * chunk_size;
        ChunkRange {
            index: i as u32,
            offset,
            len: chunk_size.min(size - offset),
        }
    })
}

/// Ordered digests of the chunks of `bs` split with `chunk_size`.
pub fn split_digests(bs: &[u8], chunk_size: u64) -> Vec<ContentDigest> {
    chunk_ranges(bs.len() as u64, chunk_size)
        .map(|r| {
            let start = r.offset as usize;
            ContentDigest::from(&bs[start..start + r.len as usize])
        })
        .collect()
}
