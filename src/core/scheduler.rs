//! Session scheduler: admission control and dispatch.
//!
//! The scheduler is the sole creator of transfer sessions. It enforces the
//! per-participant concurrency cap, the receiver-online requirement, and a
//! short dedup window against UI double-submits, then hands each admitted
//! session to its own pipeline driver task. The driver owns the session;
//! the scheduler keeps only a handle (stop signal, readiness notifier,
//! snapshot watch) and releases the concurrency slots when the driver
//! reports termination.

use crate::core::config::CoreConfig;
use crate::core::error::{AdmissionError, InvalidTransition, RequestError};
use crate::core::event::EventBus;
use crate::core::history::HistoryLedger;
use crate::core::pipeline::driver::SessionDriver;
use crate::core::pipeline::transport::ChunkTransport;
use crate::core::presence::PresenceRegistry;
use crate::core::session::{FileMeta, SessionSnapshot, SessionState, TransferSession};
use crate::utils::format::short_id;
use crate::utils::stop::StopSignal;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Notify, watch};
use tracing::{debug, info};
use uuid::Uuid;

// ── Participant statistics ───────────────────────────────────────────────────

/// Cumulative per-participant transfer statistics, for the user list.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ParticipantStats {
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_cancelled: u64,
    /// Bytes acknowledged on sessions where this participant sent.
    pub bytes_sent: u64,
    /// Bytes acknowledged on sessions where this participant received.
    pub bytes_received: u64,
}

impl ParticipantStats {
    fn absorb(&mut self, snapshot: &SessionSnapshot, as_sender: bool) {
        match snapshot.state {
            SessionState::Completed => self.sessions_completed += 1,
            SessionState::Failed => self.sessions_failed += 1,
            SessionState::Cancelled => self.sessions_cancelled += 1,
            SessionState::Pending | SessionState::Active => {}
        }
        if as_sender {
            self.bytes_sent += snapshot.bytes_transferred;
        } else {
            self.bytes_received += snapshot.bytes_transferred;
        }
    }
}

// ── Handles ──────────────────────────────────────────────────────────────────

/// Scheduler-side view of a running session. The driver task owns the
/// session itself.
struct SessionHandle {
    stop: StopSignal,
    ready: Arc<Notify>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

type DedupKey = (String, String, String, u64);

#[derive(Default)]
struct Inner {
    active: HashMap<Uuid, SessionHandle>,
    /// Active session count per participant (sender and receiver both).
    slots: HashMap<String, usize>,
    /// Recently admitted submissions, for double-submit protection.
    recent: HashMap<DedupKey, Instant>,
    stats: HashMap<String, ParticipantStats>,
}

// ── Scheduler ────────────────────────────────────────────────────────────────

pub struct Scheduler<T: ChunkTransport> {
    cfg: CoreConfig,
    presence: Arc<PresenceRegistry>,
    history: Arc<HistoryLedger>,
    bus: EventBus,
    transport: Arc<T>,
    inner: Mutex<Inner>,
}

impl<T: ChunkTransport> Scheduler<T> {
    pub fn new(
        cfg: CoreConfig,
        presence: Arc<PresenceRegistry>,
        history: Arc<HistoryLedger>,
        bus: EventBus,
        transport: Arc<T>,
    ) -> Self {
        Self {
            cfg,
            presence,
            history,
            bus,
            transport,
            inner: Mutex::new(Inner::default()),
        }
    }

    // ── Admission ────────────────────────────────────────────────────────

    /// Admit a transfer and spawn its driver. Must run inside a tokio
    /// runtime.
    pub fn submit(
        self: &Arc<Self>,
        sender: &str,
        receiver: &str,
        file: FileMeta,
        payload: Bytes,
    ) -> Result<Uuid, RequestError> {
        let Some(sender_info) = self.presence.lookup(sender) else {
            return Err(RequestError::invalid("unknown sender"));
        };
        if !sender_info.online {
            return Err(RequestError::invalid("sender is not connected"));
        }
        if !sender_info.roles.can_send() {
            return Err(RequestError::invalid("sender lacks the send role"));
        }

        match self.presence.lookup(receiver) {
            Some(p) if p.online => {
                if !p.roles.can_receive() {
                    return Err(RequestError::invalid("receiver lacks the receive role"));
                }
            }
            _ => return Err(AdmissionError::ReceiverOffline(receiver.to_string()).into()),
        }

        let session = TransferSession::new(
            sender.to_string(),
            receiver.to_string(),
            file,
            self.cfg.chunk_size,
        );
        let session_id = session.id;
        let stop = StopSignal::new();
        let ready = Arc::new(Notify::new());
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        {
            let mut inner = self.inner.lock();

            let now = Instant::now();
            inner
                .recent
                .retain(|_, at| now.duration_since(*at) < self.cfg.dedup_window);
            let key: DedupKey = (
                sender.to_string(),
                receiver.to_string(),
                session.file.name.clone(),
                session.file.size,
            );
            if inner.recent.contains_key(&key) {
                return Err(AdmissionError::DuplicateTransfer.into());
            }

            for id in [sender, receiver] {
                let used = inner.slots.get(id).copied().unwrap_or(0);
                if used >= self.cfg.sessions_per_participant {
                    return Err(AdmissionError::CapacityExceeded {
                        participant: id.to_string(),
                        cap: self.cfg.sessions_per_participant,
                    }
                    .into());
                }
            }

            inner.recent.insert(key, now);
            *inner.slots.entry(sender.to_string()).or_insert(0) += 1;
            *inner.slots.entry(receiver.to_string()).or_insert(0) += 1;
            inner.active.insert(
                session_id,
                SessionHandle {
                    stop: stop.clone(),
                    ready: Arc::clone(&ready),
                    snapshot: snapshot_rx,
                },
            );
        }

        let driver = SessionDriver {
            session,
            payload,
            cfg: self.cfg.clone(),
            transport: Arc::clone(&self.transport),
            presence: Arc::clone(&self.presence),
            history: Arc::clone(&self.history),
            bus: self.bus.clone(),
            stop,
            ready,
            snapshot_tx,
        };
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let final_snapshot = driver.run().await;
            scheduler.release(&final_snapshot);
        });

        info!(
            session_id = %session_id,
            sender = %short_id(sender),
            receiver = %short_id(receiver),
            "transfer admitted"
        );
        Ok(session_id)
    }

    /// Release the slots and handle of a terminated session, and fold its
    /// outcome into the participant statistics.
    fn release(&self, snapshot: &SessionSnapshot) {
        let mut inner = self.inner.lock();
        if inner.active.remove(&snapshot.id).is_none() {
            return;
        }
        for id in [&snapshot.sender, &snapshot.receiver] {
            if let Some(used) = inner.slots.get_mut(id.as_str()) {
                *used = used.saturating_sub(1);
                if *used == 0 {
                    inner.slots.remove(id.as_str());
                }
            }
        }
        inner
            .stats
            .entry(snapshot.sender.clone())
            .or_default()
            .absorb(snapshot, true);
        inner
            .stats
            .entry(snapshot.receiver.clone())
            .or_default()
            .absorb(snapshot, false);
        debug!(session_id = %snapshot.id, "session slots released");
    }

    // ── Operations on admitted sessions ──────────────────────────────────

    /// Receiver readiness confirmation. Repeated confirmation of an active
    /// session is a no-op; confirming a terminated session is a contract
    /// violation.
    pub fn acknowledge(&self, id: &Uuid) -> Result<(), RequestError> {
        if let Some(handle) = self.inner.lock().active.get(id) {
            handle.ready.notify_one();
            return Ok(());
        }
        match self.history.terminal_state_of(id) {
            Some(state) => Err(InvalidTransition {
                from: state,
                to: SessionState::Active,
            }
            .into()),
            None => Err(RequestError::invalid("unknown session")),
        }
    }

    /// Request cooperative cancellation. Idempotent: cancelling a session
    /// that already terminated is a no-op.
    pub fn cancel(&self, id: &Uuid) -> Result<(), RequestError> {
        if let Some(handle) = self.inner.lock().active.get(id) {
            handle.stop.cancel();
            debug!(session_id = %id, "cancellation requested");
            return Ok(());
        }
        if self.history.terminal_state_of(id).is_some() {
            return Ok(());
        }
        Err(RequestError::invalid("unknown session"))
    }

    // ── Read views ───────────────────────────────────────────────────────

    /// Committed snapshots of all sessions that have not been released yet.
    pub fn active_snapshots(&self) -> Vec<SessionSnapshot> {
        self.inner
            .lock()
            .active
            .values()
            .map(|h| h.snapshot.borrow().clone())
            .collect()
    }

    /// Snapshot of one active session.
    pub fn snapshot_of(&self, id: &Uuid) -> Option<SessionSnapshot> {
        self.inner
            .lock()
            .active
            .get(id)
            .map(|h| h.snapshot.borrow().clone())
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Sessions currently counted against a participant's cap.
    pub fn load_of(&self, participant: &str) -> usize {
        self.inner.lock().slots.get(participant).copied().unwrap_or(0)
    }

    pub fn stats_of(&self, participant: &str) -> Option<ParticipantStats> {
        self.inner.lock().stats.get(participant).copied()
    }
}
