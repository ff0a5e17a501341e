//! Coordination gateway: the boundary the presentation layer and network
//! transport talk to.
//!
//! Operations map one-to-one onto what the client UI does — pick a role
//! and connect, submit a file, confirm readiness, cancel, browse history.
//! Every input is validated here; malformed requests fail fast with
//! `InvalidRequest` and never touch session state. Connected clients get a
//! live event stream for the user list, the progress bar, and the history
//! badges.

use crate::core::config::{CoreConfig, MAX_IDENTIFIER_LEN};
use crate::core::error::RequestError;
use crate::core::event::{CoreEvent, EventBus};
use crate::core::history::{HistoryEntry, HistoryFilter, HistoryLedger};
use crate::core::pipeline::transport::ChunkTransport;
use crate::core::presence::{Participant, PresenceRegistry, RoleSet};
use crate::core::scheduler::{ParticipantStats, Scheduler};
use crate::core::session::{FileMeta, SessionSnapshot};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Live event subscription handed to each connected client.
pub type EventStream = broadcast::Receiver<CoreEvent>;

/// Service-level introspection counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthSnapshot {
    pub online_participants: usize,
    pub active_sessions: usize,
    pub history_entries: usize,
}

// ── Gateway ──────────────────────────────────────────────────────────────────

pub struct Gateway<T: ChunkTransport> {
    cfg: CoreConfig,
    bus: EventBus,
    presence: Arc<PresenceRegistry>,
    history: Arc<HistoryLedger>,
    scheduler: Arc<Scheduler<T>>,
}

impl<T: ChunkTransport> Gateway<T> {
    pub fn new(cfg: CoreConfig, transport: T) -> Self {
        let bus = EventBus::new();
        let presence = Arc::new(PresenceRegistry::new(bus.clone()));
        let history = Arc::new(HistoryLedger::new());
        let scheduler = Arc::new(Scheduler::new(
            cfg.clone(),
            Arc::clone(&presence),
            Arc::clone(&history),
            bus.clone(),
            Arc::new(transport),
        ));
        Self {
            cfg,
            bus,
            presence,
            history,
            scheduler,
        }
    }

    // ── Presence boundary ────────────────────────────────────────────────

    /// Register (or refresh) a participant, bring them online, and return
    /// their event stream. The stream is subscribed before the online
    /// transition, so clients observe their own presence event.
    pub fn connect(
        &self,
        id: &str,
        display_name: &str,
        roles: RoleSet,
    ) -> Result<EventStream, RequestError> {
        validate_identifier(id, "participant id")?;
        validate_identifier(display_name, "display name")?;

        self.presence.register(id, display_name, roles);
        let events = self.bus.subscribe();
        self.presence.set_online(id, true);
        debug!(participant = %id, "client connected");
        Ok(events)
    }

    /// Mark a participant offline. The participant stays registered so
    /// history keeps resolving their name.
    pub fn disconnect(&self, id: &str) -> Result<(), RequestError> {
        validate_identifier(id, "participant id")?;
        if self.presence.set_online(id, false) {
            Ok(())
        } else {
            Err(RequestError::invalid("unknown participant"))
        }
    }

    /// Snapshot of everyone currently online, for the user list.
    pub fn list_online(&self) -> Vec<Participant> {
        self.presence.list_online()
    }

    // ── Transfer boundary ────────────────────────────────────────────────

    /// Submit a file for transfer. Returns the admitted session id.
    pub fn submit_transfer(
        &self,
        sender: &str,
        receiver: &str,
        file_name: &str,
        declared_size: u64,
        payload: Bytes,
    ) -> Result<Uuid, RequestError> {
        validate_identifier(sender, "sender id")?;
        validate_identifier(receiver, "receiver id")?;
        validate_identifier(file_name, "file name")?;
        if sender == receiver {
            return Err(RequestError::invalid("sender and receiver must differ"));
        }
        if declared_size > self.cfg.max_file_size {
            return Err(RequestError::invalid("file exceeds the size limit"));
        }
        if payload.len() as u64 != declared_size {
            return Err(RequestError::invalid(
                "payload length does not match the declared size",
            ));
        }

        self.scheduler
            .submit(sender, receiver, FileMeta::new(file_name, declared_size), payload)
    }

    /// Receiver-side readiness confirmation for a pending session.
    pub fn acknowledge_receipt(&self, session_id: Uuid) -> Result<(), RequestError> {
        self.scheduler.acknowledge(&session_id)
    }

    /// Cancel a session. Idempotent; cancelling an already-terminal
    /// session is a no-op.
    pub fn cancel_transfer(&self, session_id: Uuid) -> Result<(), RequestError> {
        self.scheduler.cancel(&session_id)
    }

    // ── Read boundary ────────────────────────────────────────────────────

    /// Terminated sessions, most recent first.
    pub fn query_history(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.history.list(filter)
    }

    /// Committed snapshots of in-flight sessions (the UI's "pending" rows).
    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        self.scheduler.active_snapshots()
    }

    pub fn participant_stats(&self, id: &str) -> Option<ParticipantStats> {
        self.scheduler.stats_of(id)
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            online_participants: self.presence.online_count(),
            active_sessions: self.scheduler.active_count(),
            history_entries: self.history.len(),
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

fn validate_identifier(value: &str, what: &str) -> Result<(), RequestError> {
    if value.is_empty() {
        return Err(RequestError::invalid(format!("{what} must not be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(RequestError::invalid(format!("{what} is too long")));
    }
    if value.chars().any(char::is_control) {
        return Err(RequestError::invalid(format!(
            "{what} contains control characters"
        )));
    }
    Ok(())
}
