//! Transfer history ledger: append-only record of terminated sessions.
//!
//! One entry per session, recorded exactly once when the session reaches a
//! terminal state and never mutated or deleted afterwards — retention and
//! pruning are an external operational concern. Entries are sharded by
//! session id so recordings from independent sessions proceed in parallel;
//! a global sequence number gives `list` its most-recent-first order.

use crate::core::config::REGISTRY_SHARDS;
use crate::core::error::FailureReason;
use crate::core::session::{SessionState, TransferSession};
use crate::utils::format::format_size;
use parking_lot::Mutex;
use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// ── History entry ────────────────────────────────────────────────────────────

/// Immutable snapshot of a terminated session.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Global recording order; higher means more recent.
    pub seq: u64,
    pub session_id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub file_name: String,
    pub total_bytes: u64,
    /// Bytes acknowledged when the session terminated.
    pub bytes_transferred: u64,
    /// Final state; always terminal.
    pub state: SessionState,
    pub failure: Option<FailureReason>,
    /// UI badge label ("success", "failed", "cancelled").
    pub status: &'static str,
    /// Admission-to-termination duration in milliseconds.
    pub duration_ms: u64,
    pub recorded_at: u64,
}

impl HistoryEntry {
    /// Human-readable size for the transfer-history list.
    pub fn size_display(&self) -> String {
        format_size(self.total_bytes)
    }

    /// The other party from `viewer`'s perspective, as shown in the
    /// history list's counterpart column.
    pub fn counterpart(&self, viewer: &str) -> &str {
        if self.sender == viewer {
            &self.receiver
        } else {
            &self.sender
        }
    }

    pub fn involves(&self, participant: &str) -> bool {
        self.sender == participant || self.receiver == participant
    }
}

// ── Filter ───────────────────────────────────────────────────────────────────

/// Query filter for [`HistoryLedger::list`].
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only entries where this participant was sender or receiver.
    pub participant: Option<String>,
    /// Only entries with this final state.
    pub state: Option<SessionState>,
    /// At most this many entries, most recent first.
    pub limit: Option<usize>,
}

// ── Ledger ───────────────────────────────────────────────────────────────────

/// Sharded, append-only ledger of terminated sessions.
#[derive(Debug)]
pub struct HistoryLedger {
    shards: Vec<Mutex<Vec<HistoryEntry>>>,
    seq: AtomicU64,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self {
            shards: (0..REGISTRY_SHARDS).map(|_| Mutex::new(Vec::new())).collect(),
            seq: AtomicU64::new(0),
        }
    }

    fn shard(&self, id: &Uuid) -> &Mutex<Vec<HistoryEntry>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Record a terminated session. Atomic: readers observe either the
    /// ledger without the entry or with the complete entry, never a
    /// partial write.
    pub fn record(&self, session: &TransferSession) -> HistoryEntry {
        debug_assert!(session.state().is_terminal());
        let entry = HistoryEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            session_id: session.id,
            sender: session.sender.clone(),
            receiver: session.receiver.clone(),
            file_name: session.file.name.clone(),
            total_bytes: session.file.size,
            bytes_transferred: session.bytes_transferred(),
            state: session.state(),
            failure: session.failure(),
            status: session.state().status_label(),
            duration_ms: session.duration().as_millis() as u64,
            recorded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        };
        self.shard(&session.id).lock().push(entry.clone());
        entry
    }

    /// Entries matching `filter`, most recent first.
    pub fn list(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self
            .shards
            .iter()
            .flat_map(|s| {
                s.lock()
                    .iter()
                    .filter(|e| {
                        filter
                            .participant
                            .as_deref()
                            .is_none_or(|p| e.involves(p))
                            && filter.state.is_none_or(|st| e.state == st)
                    })
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        entries.sort_unstable_by(|a, b| b.seq.cmp(&a.seq));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        entries
    }

    /// The recorded terminal state of a session, if it has terminated.
    pub fn terminal_state_of(&self, id: &Uuid) -> Option<SessionState> {
        self.shard(id)
            .lock()
            .iter()
            .rev()
            .find(|e| e.session_id == *id)
            .map(|e| e.state)
    }

    /// Total number of recorded entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::FileMeta;

    fn terminated(sender: &str, receiver: &str, cancelled: bool) -> TransferSession {
        let mut s = TransferSession::new(
            sender.to_string(),
            receiver.to_string(),
            FileMeta::new("notes.txt", 2048),
            512,
        );
        if cancelled {
            s.cancel();
        } else {
            s.activate().unwrap();
            s.record_acked_bytes(2048);
            s.complete().unwrap();
        }
        s
    }

    #[test]
    fn record_then_list_most_recent_first() {
        let ledger = HistoryLedger::new();
        let first = ledger.record(&terminated("a", "b", false));
        let second = ledger.record(&terminated("a", "c", false));
        let third = ledger.record(&terminated("c", "b", true));

        let all = ledger.list(&HistoryFilter::default());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].seq, third.seq);
        assert_eq!(all[1].seq, second.seq);
        assert_eq!(all[2].seq, first.seq);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn append_only_across_recordings() {
        let ledger = HistoryLedger::new();
        let mut seen = Vec::new();
        for i in 0..20 {
            let entry = ledger.record(&terminated(&format!("s{i}"), "r", false));
            seen.push(entry.session_id);
            // Every prior entry is still present after each recording.
            let listed = ledger.list(&HistoryFilter::default());
            assert_eq!(listed.len(), seen.len());
            for id in &seen {
                assert!(listed.iter().any(|e| e.session_id == *id));
            }
        }
    }

    #[test]
    fn filters_by_participant_state_and_limit() {
        let ledger = HistoryLedger::new();
        ledger.record(&terminated("alice", "bob", false));
        ledger.record(&terminated("alice", "carol", true));
        ledger.record(&terminated("dave", "bob", false));

        let alice = ledger.list(&HistoryFilter {
            participant: Some("alice".into()),
            ..Default::default()
        });
        assert_eq!(alice.len(), 2);

        let cancelled = ledger.list(&HistoryFilter {
            state: Some(SessionState::Cancelled),
            ..Default::default()
        });
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].status, "cancelled");

        let limited = ledger.list(&HistoryFilter {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn terminal_state_lookup() {
        let ledger = HistoryLedger::new();
        let session = terminated("a", "b", false);
        let id = session.id;
        assert!(ledger.terminal_state_of(&id).is_none());

        ledger.record(&session);
        assert_eq!(ledger.terminal_state_of(&id), Some(SessionState::Completed));
    }

    #[test]
    fn entries_serialize_for_the_history_list() {
        let ledger = HistoryLedger::new();
        let entry = ledger.record(&terminated("alice", "bob", false));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["file_name"], "notes.txt");
        assert_eq!(json["status"], "success");
        assert_eq!(json["total_bytes"], 2048);
        assert_eq!(json["sender"], "alice");
    }

    #[test]
    fn entry_display_helpers() {
        let ledger = HistoryLedger::new();
        let entry = ledger.record(&terminated("alice", "bob", false));
        assert_eq!(entry.size_display(), "2.00 KB");
        assert_eq!(entry.counterpart("alice"), "bob");
        assert_eq!(entry.counterpart("bob"), "alice");
        assert!(entry.involves("alice") && entry.involves("bob"));
        assert!(!entry.involves("carol"));
    }
}
