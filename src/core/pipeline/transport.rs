//! Transport seam between the chunk pipeline and the network layer.
//!
//! The core never talks to sockets. It hands chunks to a [`ChunkTransport`]
//! and consumes acknowledgments; whatever moves the bytes (WebRTC data
//! channels, websockets, a relay) lives behind this trait, out of scope.
//!
//! [`LoopbackTransport`] is the in-process implementation: it plays the
//! receiver role the way a remote endpoint would — recompute each chunk's
//! checksum, keep the per-session receive ledger, fold the aggregate
//! digest — and supports fault injection for exercising every failure
//! path without a network.

use crate::core::pipeline::chunk::{Chunk, ChunkMeta, compute_checksum};
use crate::core::pipeline::digest::{AggregateDigest, FileDigest};
use anyhow::{Result, bail};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ── Acknowledgment ───────────────────────────────────────────────────────────

/// Receiver-side acknowledgment of one delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    pub session_id: Uuid,
    pub index: u32,
    /// Checksum the receiver computed over the bytes it actually got.
    /// The pipeline compares this against the checksum it sent.
    pub checksum: [u8; 32],
}

// ── Trait ────────────────────────────────────────────────────────────────────

/// Chunk delivery contract implemented by the network layer.
pub trait ChunkTransport: Send + Sync + 'static {
    /// Deliver one chunk and wait for the receiver's acknowledgment.
    ///
    /// Errors mean the connection to the receiver is gone; the pipeline
    /// maps them to a `ConnectionLost` failure. Deadlines are enforced by
    /// the caller, not the transport.
    fn deliver(&self, chunk: Chunk) -> impl Future<Output = Result<ChunkAck>> + Send;

    /// Called once every chunk of a session has been acknowledged.
    /// Returns the receiver's whole-file aggregate digest.
    fn finalize(&self, session_id: Uuid) -> impl Future<Output = Result<FileDigest>> + Send;
}

// ── Loopback implementation ──────────────────────────────────────────────────

/// Fault injection knobs for [`LoopbackTransport`].
#[derive(Default)]
pub struct LoopbackFaults {
    /// Fail delivery of this chunk index with a transport error.
    pub fail_at: Option<u32>,
    /// Ack this chunk index with a corrupted checksum.
    pub corrupt_at: Option<u32>,
    /// Hold the ack for this chunk index longer than any sane deadline.
    pub stall_at: Option<u32>,
    /// How long a stalled ack is held.
    pub stall_for: Duration,
    /// Observation hook invoked before each chunk is acknowledged.
    pub on_chunk: Option<Arc<dyn Fn(&ChunkMeta) + Send + Sync>>,
}

#[derive(Default)]
struct ReceivedSession {
    /// Checksums by chunk index; `BTreeMap` keeps finalize in index order.
    checksums: BTreeMap<u32, [u8; 32]>,
    total_chunks: u32,
    bytes: u64,
}

/// In-process chunk transport: the receiver endpoint as a library.
///
/// Clones share the same receive ledger, so a test can keep a handle and
/// inspect what "arrived" after the pipeline finishes.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    sessions: Arc<Mutex<HashMap<Uuid, ReceivedSession>>>,
    faults: Arc<LoopbackFaults>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: LoopbackFaults) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            faults: Arc::new(faults),
        }
    }

    /// Total bytes received (and acknowledged) for a session.
    pub fn received_bytes(&self, session_id: &Uuid) -> u64 {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.bytes)
            .unwrap_or(0)
    }

    /// Number of distinct chunks received for a session.
    pub fn received_chunks(&self, session_id: &Uuid) -> u32 {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.checksums.len() as u32)
            .unwrap_or(0)
    }
}

impl ChunkTransport for LoopbackTransport {
    async fn deliver(&self, chunk: Chunk) -> Result<ChunkAck> {
        let meta = chunk.meta;

        if let Some(hook) = &self.faults.on_chunk {
            hook(&meta);
        }
        if self.faults.stall_at == Some(meta.index) {
            tokio::time::sleep(self.faults.stall_for).await;
        }
        if self.faults.fail_at == Some(meta.index) {
            bail!("delivery of chunk {} refused", meta.index);
        }

        // The receiver verifies what it actually got, never trusting the
        // sender's metadata.
        let mut checksum = compute_checksum(&chunk.payload);
        if self.faults.corrupt_at == Some(meta.index) {
            checksum[0] ^= 0xFF;
        }

        let mut sessions = self.sessions.lock();
        let recv = sessions.entry(meta.session_id).or_default();
        recv.total_chunks = meta.total_chunks;
        if recv.checksums.insert(meta.index, checksum).is_none() {
            recv.bytes += chunk.payload.len() as u64;
        }

        Ok(ChunkAck {
            session_id: meta.session_id,
            index: meta.index,
            checksum,
        })
    }

    async fn finalize(&self, session_id: Uuid) -> Result<FileDigest> {
        let sessions = self.sessions.lock();
        let Some(recv) = sessions.get(&session_id) else {
            // A zero-chunk session never delivered anything; its digest is
            // the empty sequence.
            return Ok(AggregateDigest::new().finish());
        };
        if recv.checksums.len() as u32 != recv.total_chunks {
            bail!(
                "session {} finalized with {}/{} chunks",
                session_id,
                recv.checksums.len(),
                recv.total_chunks
            );
        }
        let mut digest = AggregateDigest::new();
        for checksum in recv.checksums.values() {
            digest.absorb(checksum);
        }
        Ok(digest.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::chunk::Chunker;
    use bytes::Bytes;

    fn chunks(session_id: Uuid, len: usize, chunk_size: usize) -> Vec<Chunk> {
        Chunker::new(session_id, Bytes::from(vec![0x5Au8; len]), chunk_size).collect()
    }

    #[tokio::test]
    async fn loopback_acks_echo_receiver_checksum() {
        let transport = LoopbackTransport::new();
        let id = Uuid::new_v4();

        for chunk in chunks(id, 2500, 1000) {
            let sent = chunk.meta.checksum;
            let ack = transport.deliver(chunk).await.unwrap();
            assert_eq!(ack.checksum, sent);
            assert_eq!(ack.session_id, id);
        }
        assert_eq!(transport.received_bytes(&id), 2500);
        assert_eq!(transport.received_chunks(&id), 3);
    }

    #[tokio::test]
    async fn loopback_finalize_matches_sender_digest() {
        let transport = LoopbackTransport::new();
        let id = Uuid::new_v4();
        let mut expected = AggregateDigest::new();

        for chunk in chunks(id, 4096, 1024) {
            expected.absorb(&chunk.meta.checksum);
            transport.deliver(chunk).await.unwrap();
        }
        assert_eq!(transport.finalize(id).await.unwrap(), expected.finish());
    }

    #[tokio::test]
    async fn finalize_rejects_gaps() {
        let transport = LoopbackTransport::new();
        let id = Uuid::new_v4();
        let mut all = chunks(id, 3000, 1000);
        all.remove(1);
        for chunk in all {
            transport.deliver(chunk).await.unwrap();
        }
        assert!(transport.finalize(id).await.is_err());
    }

    #[tokio::test]
    async fn corrupt_fault_flips_acked_checksum() {
        let transport = LoopbackTransport::with_faults(LoopbackFaults {
            corrupt_at: Some(1),
            ..Default::default()
        });
        let id = Uuid::new_v4();

        for chunk in chunks(id, 3000, 1000) {
            let sent = chunk.meta.checksum;
            let index = chunk.meta.index;
            let ack = transport.deliver(chunk).await.unwrap();
            if index == 1 {
                assert_ne!(ack.checksum, sent);
            } else {
                assert_eq!(ack.checksum, sent);
            }
        }
    }

    #[tokio::test]
    async fn fail_fault_errors_delivery() {
        let transport = LoopbackTransport::with_faults(LoopbackFaults {
            fail_at: Some(0),
            ..Default::default()
        });
        let id = Uuid::new_v4();
        let chunk = chunks(id, 100, 1000).remove(0);
        assert!(transport.deliver(chunk).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_delivery_does_not_double_count_bytes() {
        let transport = LoopbackTransport::new();
        let id = Uuid::new_v4();
        let chunk = chunks(id, 100, 1000).remove(0);
        transport.deliver(chunk.clone()).await.unwrap();
        transport.deliver(chunk).await.unwrap();
        assert_eq!(transport.received_bytes(&id), 100);
    }
}
