//! Chunk data structures and integrity verification.
//!
//! Each chunk carries:
//! - session_id: the session it belongs to
//! - index: zero-based, contiguous within the session
//! - checksum: SHA3-256 of the chunk payload
//!
//! The receiver side recomputes the checksum on receipt and echoes it in
//! the acknowledgment; any mismatch fails the owning session immediately.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use uuid::Uuid;

/// Metadata accompanying a chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Session this chunk belongs to.
    pub session_id: Uuid,
    /// Zero-based index within the session.
    pub index: u32,
    /// Total chunks the session's file is divided into.
    pub total_chunks: u32,
    /// SHA3-256 hash of the chunk payload.
    pub checksum: [u8; 32],
}

/// A complete chunk ready for delivery.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub meta: ChunkMeta,
    /// Chunk payload; a cheap slice of the session's file bytes.
    pub payload: Bytes,
}

impl Chunk {
    /// Verify that the payload matches the checksum in the metadata.
    pub fn verify(&self) -> bool {
        compute_checksum(&self.payload) == self.meta.checksum
    }
}

/// Compute the SHA3-256 checksum of a chunk payload.
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ── Chunker ──────────────────────────────────────────────────────────────────

/// Lazy, finite, non-restartable chunk sequence for one session.
///
/// Partitions the file payload into chunks of the session's fixed size;
/// the last chunk may be smaller. Indices are contiguous from zero.
/// Restarting a failed session means a new session and a new `Chunker` —
/// there is no rewind.
#[derive(Debug)]
pub struct Chunker {
    session_id: Uuid,
    payload: Bytes,
    chunk_size: usize,
    total_chunks: u32,
    next: u32,
}

impl Chunker {
    pub fn new(session_id: Uuid, payload: Bytes, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        let total_chunks = payload.len().div_ceil(chunk_size) as u32;
        Self {
            session_id,
            payload,
            chunk_size,
            total_chunks,
            next: 0,
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }
}

impl Iterator for Chunker {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.total_chunks {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let start = index as usize * self.chunk_size;
        let end = (start + self.chunk_size).min(self.payload.len());
        let payload = self.payload.slice(start..end);

        Some(Chunk {
            meta: ChunkMeta {
                session_id: self.session_id,
                index,
                total_chunks: self.total_chunks,
                checksum: compute_checksum(&payload),
            },
            payload,
        })
    }
}

// ── Acknowledgment tracking ──────────────────────────────────────────────────

/// Bit vector tracking which chunk indices have been acknowledged.
///
/// Completion requires the sequence to be contiguous and gap-free; acks may
/// arrive out of order within the in-flight window.
#[derive(Debug, Clone)]
pub struct AckBitmap {
    total_chunks: u32,
    bits: Vec<u64>,
}

impl AckBitmap {
    pub fn new(total_chunks: u32) -> Self {
        let words = (total_chunks as usize).div_ceil(64);
        Self {
            total_chunks,
            bits: vec![0u64; words],
        }
    }

    /// Mark a chunk as acknowledged.
    pub fn set(&mut self, index: u32) {
        if index < self.total_chunks {
            self.bits[(index / 64) as usize] |= 1u64 << (index % 64);
        }
    }

    /// Check if a chunk has been acknowledged.
    pub fn is_set(&self, index: u32) -> bool {
        if index >= self.total_chunks {
            return false;
        }
        (self.bits[(index / 64) as usize] >> (index % 64)) & 1 == 1
    }

    /// Count of acknowledged chunks.
    pub fn acked_count(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    /// True once every chunk index has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.acked_count() == self.total_chunks
    }

    /// Indices not yet acknowledged.
    pub fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks).filter(|i| !self.is_set(*i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        let data = b"hello world";
        let h1 = compute_checksum(data);
        let h2 = compute_checksum(data);
        assert_eq!(h1, h2);
        assert_ne!(h1, [0u8; 32]);
        assert_ne!(h1, compute_checksum(b"hello worle"));
    }

    #[test]
    fn chunker_partitions_with_short_tail() {
        let payload = Bytes::from(vec![0xABu8; 1024 * 3 + 100]);
        let chunker = Chunker::new(Uuid::new_v4(), payload, 1024);
        assert_eq!(chunker.total_chunks(), 4);

        let chunks: Vec<Chunk> = chunker.collect();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].meta.index, 0);
        assert_eq!(chunks[3].meta.index, 3);
        assert_eq!(chunks[3].payload.len(), 100);
        assert!(chunks.iter().all(|c| c.verify()));
        // Indices are contiguous and gap-free.
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.meta.index as usize, i);
            assert_eq!(c.meta.total_chunks, 4);
        }
    }

    #[test]
    fn chunker_ten_megabytes_in_one_megabyte_chunks() {
        let payload = Bytes::from(vec![7u8; 10 * 1024 * 1024]);
        let chunker = Chunker::new(Uuid::new_v4(), payload, 1024 * 1024);
        assert_eq!(chunker.total_chunks(), 10);

        let indices: Vec<u32> = chunker.map(|c| c.meta.index).collect();
        assert_eq!(indices, (0..10).collect::<Vec<u32>>());
    }

    #[test]
    fn chunker_empty_payload_yields_nothing() {
        let mut chunker = Chunker::new(Uuid::new_v4(), Bytes::new(), 1024);
        assert_eq!(chunker.total_chunks(), 0);
        assert!(chunker.next().is_none());
    }

    #[test]
    fn bitmap_tracks_acks_and_gaps() {
        let mut bm = AckBitmap::new(100);
        assert_eq!(bm.acked_count(), 0);
        assert!(!bm.is_complete());

        bm.set(0);
        bm.set(50);
        bm.set(99);
        assert_eq!(bm.acked_count(), 3);
        assert!(bm.is_set(50));
        assert!(!bm.is_set(1));
        assert_eq!(bm.missing().len(), 97);

        for i in 0..100 {
            bm.set(i);
        }
        assert!(bm.is_complete());
        assert!(bm.missing().is_empty());
    }
}
