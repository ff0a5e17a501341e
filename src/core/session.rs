//! Transfer session: the unit of work moving one file from a sender to a
//! receiver.
//!
//! A session owns:
//! - The lifecycle state machine (`Pending → Active → terminal`)
//! - Byte-level progress accounting (monotonic, capped at the declared size)
//! - The failure reason, set exactly once on the `Failed` transition
//!
//! There is exactly one session per transfer request. A session is owned
//! exclusively by its pipeline driver for its active lifetime; every other
//! component reads committed [`SessionSnapshot`]s.

use crate::core::error::{FailureReason, InvalidTransition};
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// ── Session State Machine ────────────────────────────────────────────────────

/// All possible states of a transfer session.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: no transition is
/// permitted out of them, and any attempt is rejected with
/// [`InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Admitted, receiver has not yet confirmed readiness.
    Pending,
    /// Receiver confirmed; bytes are flowing.
    Active,
    /// All declared bytes acknowledged, chunk sequence gap-free.
    Completed,
    /// Terminated with an error; see the session's failure reason.
    Failed,
    /// Explicitly cancelled by either party. Non-error terminal state.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// Status label shown by the transfer-history UI badges.
    pub fn status_label(&self) -> &'static str {
        match self {
            SessionState::Pending | SessionState::Active => "pending",
            SessionState::Completed => "success",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }
}

// ── File metadata ────────────────────────────────────────────────────────────

/// Declared metadata of the file being transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// File name as shown in the transfer history.
    pub name: String,
    /// Declared total size in bytes.
    pub size: u64,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

// ── Transfer Session ─────────────────────────────────────────────────────────

/// One file-transfer attempt from a specific sender to a specific receiver.
#[derive(Debug, Clone)]
pub struct TransferSession {
    /// Unique session id, generated at admission.
    pub id: Uuid,
    /// Sending participant id.
    pub sender: String,
    /// Receiving participant id.
    pub receiver: String,
    /// Declared file metadata.
    pub file: FileMeta,
    /// Chunk size fixed for this session at admission.
    pub chunk_size: usize,
    /// Bytes acknowledged so far. Monotonically non-decreasing while
    /// active, never exceeds `file.size`.
    bytes_transferred: u64,
    state: SessionState,
    /// Failure reason, set only on the `Failed` transition.
    failure: Option<FailureReason>,
    /// Wall-clock admission time (for history display).
    created_at: SystemTime,
    /// Monotonic admission time (for duration accounting).
    started: Instant,
    /// Monotonic termination time; set exactly once.
    finished: Option<Instant>,
    /// Set exactly once, when a terminal state is reached.
    terminated_at: Option<SystemTime>,
}

impl TransferSession {
    pub fn new(sender: String, receiver: String, file: FileMeta, chunk_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            receiver,
            file,
            chunk_size,
            bytes_transferred: 0,
            state: SessionState::Pending,
            failure: None,
            created_at: SystemTime::now(),
            started: Instant::now(),
            finished: None,
            terminated_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    /// Elapsed time since admission, frozen at termination.
    pub fn duration(&self) -> std::time::Duration {
        match self.finished {
            Some(at) => at.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    // ── State transitions ────────────────────────────────────────────────

    fn guard(&self, allowed: &[SessionState], to: SessionState) -> Result<(), InvalidTransition> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    /// `Pending → Active`: receiver confirmed readiness.
    pub fn activate(&mut self) -> Result<(), InvalidTransition> {
        self.guard(&[SessionState::Pending], SessionState::Active)?;
        self.state = SessionState::Active;
        Ok(())
    }

    /// `Active → Completed`: all declared bytes acknowledged.
    pub fn complete(&mut self) -> Result<(), InvalidTransition> {
        self.guard(&[SessionState::Active], SessionState::Completed)?;
        self.state = SessionState::Completed;
        self.mark_finished();
        Ok(())
    }

    /// `Pending | Active → Failed`, recording the reason.
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), InvalidTransition> {
        self.guard(
            &[SessionState::Pending, SessionState::Active],
            SessionState::Failed,
        )?;
        self.state = SessionState::Failed;
        self.failure = Some(reason);
        self.mark_finished();
        Ok(())
    }

    /// `Pending | Active → Cancelled`.
    ///
    /// Idempotent: cancelling an already-terminal session is a no-op and
    /// returns `false` instead of an error.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Cancelled;
        self.mark_finished();
        true
    }

    fn mark_finished(&mut self) {
        self.finished = Some(Instant::now());
        self.terminated_at = Some(SystemTime::now());
    }

    // ── Progress accounting ──────────────────────────────────────────────

    /// Record `delta` newly acknowledged bytes.
    ///
    /// The counter is monotonic and capped at the declared total size; the
    /// pipeline driver is the single writer, so a cap hit indicates a
    /// chunker bug and is clamped rather than propagated.
    pub fn record_acked_bytes(&mut self, delta: u64) {
        debug_assert_eq!(self.state, SessionState::Active);
        let next = self.bytes_transferred.saturating_add(delta);
        debug_assert!(next <= self.file.size);
        self.bytes_transferred = next.min(self.file.size);
    }

    /// Progress as an integer percentage. Empty files report 100 once active.
    pub fn percent(&self) -> u8 {
        percent_of(self.bytes_transferred, self.file.size)
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// Committed, immutable view of this session for readers outside the
    /// owning driver.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            file_name: self.file.name.clone(),
            total_bytes: self.file.size,
            bytes_transferred: self.bytes_transferred,
            state: self.state,
            failure: self.failure,
            status: self.state.status_label(),
            created_at_unix: unix_secs(self.created_at),
            terminated_at_unix: self.terminated_at.map(unix_secs),
        }
    }
}

/// Integer percentage of `part` over `whole`; a zero-byte whole is 100%.
pub(crate) fn percent_of(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        100
    } else {
        ((part.saturating_mul(100)) / whole) as u8
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Serializable, committed view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub file_name: String,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub state: SessionState,
    pub failure: Option<FailureReason>,
    /// UI badge label derived from `state`.
    pub status: &'static str,
    pub created_at_unix: u64,
    pub terminated_at_unix: Option<u64>,
}
