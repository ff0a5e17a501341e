//! Per-session pipeline driver.
//!
//! Each admitted session is driven by exactly one task, the single writer
//! of that session's state and byte counter. The driver:
//! 1. Waits for the receiver's readiness confirmation (`Pending → Active`),
//!    watching presence so a receiver that disconnects first fails the
//!    session instead of blocking out the deadline.
//! 2. Streams chunks through the transport with a bounded unacknowledged
//!    window, verifying each acknowledgment's checksum.
//! 3. Terminalizes the session, records the history entry, and only then
//!    publishes the terminated event — a client reacting to the event is
//!    guaranteed to find the entry.
//!
//! Cancellation is cooperative and takes effect at chunk boundaries, never
//! mid-chunk.

use crate::core::config::CoreConfig;
use crate::core::error::FailureReason;
use crate::core::event::{CoreEvent, EventBus};
use crate::core::history::HistoryLedger;
use crate::core::pipeline::chunk::{AckBitmap, Chunker};
use crate::core::pipeline::digest::AggregateDigest;
use crate::core::pipeline::progress::ProgressGate;
use crate::core::pipeline::transport::ChunkTransport;
use crate::core::presence::PresenceRegistry;
use crate::core::session::{SessionSnapshot, TransferSession};
use crate::utils::stop::StopSignal;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Everything one session driver owns or holds a handle to.
pub(crate) struct SessionDriver<T: ChunkTransport> {
    pub session: TransferSession,
    pub payload: Bytes,
    pub cfg: CoreConfig,
    pub transport: Arc<T>,
    pub presence: Arc<PresenceRegistry>,
    pub history: Arc<HistoryLedger>,
    pub bus: EventBus,
    pub stop: StopSignal,
    pub ready: Arc<Notify>,
    pub snapshot_tx: watch::Sender<SessionSnapshot>,
}

/// Outcome of one delivery attempt, reported by its in-flight task.
enum Delivery {
    Acked { index: u32, len: u64 },
    Mismatch { index: u32 },
    TimedOut { index: u32 },
    Failed { index: u32 },
}

/// What happened while waiting for the next acknowledgment.
enum Drained {
    Progressed,
    Fatal(FailureReason),
    Stopped,
}

/// Why the chunk stream ended early.
enum StreamEnd {
    Cancelled,
    Failed(FailureReason),
}

/// How the pending phase ended.
enum Readiness {
    Confirmed,
    Fatal(FailureReason),
    Stopped,
}

impl<T: ChunkTransport> SessionDriver<T> {
    /// Drive the session to a terminal state. Returns the final snapshot.
    pub async fn run(mut self) -> SessionSnapshot {
        match self.wait_for_receiver().await {
            Readiness::Confirmed => {}
            Readiness::Stopped => {
                self.session.cancel();
                return self.finish();
            }
            Readiness::Fatal(reason) => {
                // Pending → Failed is always legal.
                let _ = self.session.fail(reason);
                return self.finish();
            }
        }

        if self.session.activate().is_err() {
            // Single-writer discipline makes this unreachable; surface it
            // loudly instead of wedging the session.
            warn!(session_id = %self.session.id, "activation raced a terminal state");
            return self.finish();
        }
        self.publish_snapshot();
        debug!(session_id = %self.session.id, "session active");

        match self.stream_chunks().await {
            Ok(()) => {}
            Err(StreamEnd::Cancelled) => {
                self.session.cancel();
            }
            Err(StreamEnd::Failed(reason)) => {
                let _ = self.session.fail(reason);
            }
        }
        self.finish()
    }

    // ── Pending phase ────────────────────────────────────────────────────

    async fn wait_for_receiver(&mut self) -> Readiness {
        // Subscribe before the liveness check so an offline transition
        // between the two cannot be missed.
        let mut events = self.bus.subscribe();
        if !self.presence.is_online(&self.session.receiver) {
            return Readiness::Fatal(FailureReason::ReceiverUnavailable);
        }

        let deadline = tokio::time::sleep(self.cfg.receiver_ack_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.ready.notified() => return Readiness::Confirmed,
                _ = self.stop.wait() => return Readiness::Stopped,
                _ = &mut deadline => return Readiness::Fatal(FailureReason::AckTimeout),
                event = events.recv() => match event {
                    Ok(CoreEvent::PresenceChanged { participant_id, online: false, .. })
                        if participant_id == self.session.receiver =>
                    {
                        return Readiness::Fatal(FailureReason::ReceiverUnavailable);
                    }
                    Ok(_) => {}
                    // Lagged behind the bus: fall back to a direct check.
                    Err(_) => {
                        if !self.presence.is_online(&self.session.receiver) {
                            return Readiness::Fatal(FailureReason::ReceiverUnavailable);
                        }
                    }
                },
            }
        }
    }

    // ── Active phase ─────────────────────────────────────────────────────

    async fn stream_chunks(&mut self) -> Result<(), StreamEnd> {
        let mut chunker = Chunker::new(
            self.session.id,
            self.payload.clone(),
            self.session.chunk_size,
        );
        let total_chunks = chunker.total_chunks();
        let mut acked = AckBitmap::new(total_chunks);
        let mut expected = AggregateDigest::new();
        let mut gate = ProgressGate::new(
            self.cfg.progress_interval,
            self.cfg.progress_delta_percent,
        );
        let mut in_flight: JoinSet<Delivery> = JoinSet::new();

        for chunk in chunker.by_ref() {
            // Chunk boundary: the only place cancellation and connection
            // loss are observed.
            if self.stop.cancelled() {
                return Err(StreamEnd::Cancelled);
            }
            if !self.presence.is_online(&self.session.sender)
                || !self.presence.is_online(&self.session.receiver)
            {
                return Err(StreamEnd::Failed(FailureReason::ConnectionLost));
            }

            while in_flight.len() >= self.cfg.chunks_in_flight {
                match self.drain_one(&mut in_flight, &mut acked, &mut gate).await {
                    Drained::Progressed => {}
                    Drained::Stopped => return Err(StreamEnd::Cancelled),
                    Drained::Fatal(reason) => return Err(StreamEnd::Failed(reason)),
                }
            }

            expected.absorb(&chunk.meta.checksum);
            let transport = Arc::clone(&self.transport);
            let deadline = self.cfg.chunk_ack_timeout;
            in_flight.spawn(async move {
                let index = chunk.meta.index;
                let len = chunk.payload.len() as u64;
                let sent = chunk.meta.checksum;
                match tokio::time::timeout(deadline, transport.deliver(chunk)).await {
                    Err(_) => Delivery::TimedOut { index },
                    Ok(Err(_)) => Delivery::Failed { index },
                    Ok(Ok(ack)) if ack.index == index && ack.checksum == sent => {
                        Delivery::Acked { index, len }
                    }
                    Ok(Ok(_)) => Delivery::Mismatch { index },
                }
            });
        }

        while !in_flight.is_empty() {
            match self.drain_one(&mut in_flight, &mut acked, &mut gate).await {
                Drained::Progressed => {}
                Drained::Stopped => return Err(StreamEnd::Cancelled),
                Drained::Fatal(reason) => return Err(StreamEnd::Failed(reason)),
            }
        }

        if !acked.is_complete() {
            // Every delivery reported success yet indices are missing: a
            // chunker bug, surfaced as an integrity failure.
            warn!(
                session_id = %self.session.id,
                missing = acked.missing().len(),
                "acknowledged sequence has gaps"
            );
            return Err(StreamEnd::Failed(FailureReason::IntegrityError));
        }

        match self.transport.finalize(self.session.id).await {
            Ok(digest) if digest == expected.finish() => {}
            Ok(_) => return Err(StreamEnd::Failed(FailureReason::IntegrityError)),
            Err(_) => return Err(StreamEnd::Failed(FailureReason::ConnectionLost)),
        }

        // Land the bar exactly on 100%, covering zero-chunk files that
        // never produced an acknowledgment.
        if gate.should_emit(self.session.bytes_transferred(), self.session.file.size) {
            self.publish_progress();
        }

        self.session
            .complete()
            .map_err(|_| StreamEnd::Failed(FailureReason::IntegrityError))?;
        Ok(())
    }

    /// Wait for one in-flight delivery to resolve and account for it.
    async fn drain_one(
        &mut self,
        in_flight: &mut JoinSet<Delivery>,
        acked: &mut AckBitmap,
        gate: &mut ProgressGate,
    ) -> Drained {
        let joined = tokio::select! {
            _ = self.stop.wait() => return Drained::Stopped,
            joined = in_flight.join_next() => joined,
        };

        match joined {
            None => Drained::Progressed,
            Some(Err(_)) => Drained::Fatal(FailureReason::ConnectionLost),
            Some(Ok(Delivery::Acked { index, len })) => {
                acked.set(index);
                self.session.record_acked_bytes(len);
                self.publish_snapshot();
                if gate.should_emit(self.session.bytes_transferred(), self.session.file.size) {
                    self.publish_progress();
                }
                Drained::Progressed
            }
            Some(Ok(Delivery::Mismatch { index })) => {
                warn!(session_id = %self.session.id, chunk = index, "chunk checksum mismatch");
                Drained::Fatal(FailureReason::IntegrityError)
            }
            Some(Ok(Delivery::TimedOut { index })) => {
                warn!(session_id = %self.session.id, chunk = index, "chunk acknowledgment deadline expired");
                Drained::Fatal(FailureReason::AckTimeout)
            }
            Some(Ok(Delivery::Failed { index })) => {
                warn!(session_id = %self.session.id, chunk = index, "chunk delivery failed");
                Drained::Fatal(FailureReason::ConnectionLost)
            }
        }
    }

    // ── Termination ──────────────────────────────────────────────────────

    /// Publish the final snapshot, record history, then emit the terminal
    /// event — strictly in that order.
    fn finish(self) -> SessionSnapshot {
        let snapshot = self.session.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());

        let entry = self.history.record(&self.session);
        self.bus.publish(CoreEvent::TransferTerminated {
            session_id: self.session.id,
            state: self.session.state(),
            failure: self.session.failure(),
        });

        info!(
            session_id = %self.session.id,
            file = %self.session.file.name,
            status = entry.status,
            bytes = self.session.bytes_transferred(),
            duration_ms = entry.duration_ms,
            "session terminated"
        );
        snapshot
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }

    fn publish_progress(&self) {
        self.bus.publish(CoreEvent::TransferProgress {
            session_id: self.session.id,
            bytes_transferred: self.session.bytes_transferred(),
            total_bytes: self.session.file.size,
            percent: self.session.percent(),
        });
    }
}
