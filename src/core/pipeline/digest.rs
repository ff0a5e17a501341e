//! Whole-file integrity digest, computed incrementally from chunk checksums.
//!
//! Both sides fold the ordered per-chunk checksums into a running SHA3-256
//! state: the sender while emitting chunks, the receiver once every index
//! has arrived. The receiver reports its digest when the transfer
//! finalizes; any divergence fails the session. Per-chunk checksums catch
//! corruption early; the aggregate digest guarantees the reassembled file
//! as a whole.

use sha3::{Digest, Sha3_256};

/// Final whole-file digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest(pub [u8; 32]);

/// Incremental digest builder over ordered chunk checksums.
#[derive(Debug, Clone)]
pub struct AggregateDigest {
    hasher: Sha3_256,
    chunks: u32,
}

impl AggregateDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
            chunks: 0,
        }
    }

    /// Fold in the checksum of the next chunk, in index order.
    pub fn absorb(&mut self, checksum: &[u8; 32]) {
        self.hasher.update(checksum);
        self.chunks += 1;
    }

    /// Number of checksums absorbed so far.
    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    /// Finish the digest. An empty sequence has a well-defined digest, so
    /// zero-byte files still verify.
    pub fn finish(self) -> FileDigest {
        FileDigest(self.hasher.finalize().into())
    }
}

impl Default for AggregateDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::chunk::compute_checksum;

    #[test]
    fn same_checksum_sequence_same_digest() {
        let checksums = [compute_checksum(b"one"), compute_checksum(b"two")];

        let mut a = AggregateDigest::new();
        let mut b = AggregateDigest::new();
        for c in &checksums {
            a.absorb(c);
            b.absorb(c);
        }
        assert_eq!(a.chunks(), 2);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn order_matters() {
        let one = compute_checksum(b"one");
        let two = compute_checksum(b"two");

        let mut forward = AggregateDigest::new();
        forward.absorb(&one);
        forward.absorb(&two);

        let mut reversed = AggregateDigest::new();
        reversed.absorb(&two);
        reversed.absorb(&one);

        assert_ne!(forward.finish(), reversed.finish());
    }

    #[test]
    fn empty_digest_is_stable() {
        assert_eq!(AggregateDigest::new().finish(), AggregateDigest::new().finish());
    }
}
