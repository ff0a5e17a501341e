//! Error taxonomy for the coordination core.
//!
//! Three families, matching how callers must react:
//! - [`AdmissionError`]: rejected before any session exists. Fully
//!   recoverable by caller retry.
//! - [`FailureReason`]: terminates an in-flight session. Recorded in
//!   history and surfaced to both parties; never retried automatically —
//!   resubmission is a new session.
//! - [`RequestError`]/[`InvalidTransition`]: client-contract violations,
//!   surfaced immediately and never silently swallowed.
//!
//! No error here is fatal to the service: each session's failure is
//! isolated from other sessions and from the registries.

use crate::core::session::SessionState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Admission ────────────────────────────────────────────────────────────────

/// Rejection at submission time, before a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The participant already has the maximum number of active sessions.
    #[error("participant {participant} is at the concurrent session cap ({cap})")]
    CapacityExceeded { participant: String, cap: usize },

    /// The receiver is unknown or not currently online.
    #[error("receiver {0} is offline")]
    ReceiverOffline(String),

    /// An identical submission was seen within the dedup window.
    #[error("duplicate transfer submission within the dedup window")]
    DuplicateTransfer,
}

// ── In-flight failure ────────────────────────────────────────────────────────

/// Why an in-flight session reached `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FailureReason {
    /// Receiver went offline before confirming readiness, or never did.
    #[error("receiver unavailable")]
    ReceiverUnavailable,

    /// A chunk checksum or the file digest did not match.
    #[error("integrity check failed")]
    IntegrityError,

    /// An acknowledgment deadline expired.
    #[error("acknowledgment timeout")]
    AckTimeout,

    /// Either party lost its connection while the transfer was active.
    #[error("connection lost")]
    ConnectionLost,
}

// ── Contract violations ──────────────────────────────────────────────────────

/// Attempted state transition that the session state machine forbids.
///
/// Always a caller bug, not a retryable condition: terminal states are
/// absorbing and `Pending` cannot skip ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Error surface of the gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Malformed input: empty/oversized identifiers, undeclared payload
    /// length, unknown session ids. Rejected before touching any state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Submission rejected by admission control.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Operation attempted against a session in an incompatible state.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl RequestError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_render_context() {
        let err = AdmissionError::CapacityExceeded {
            participant: "alice".into(),
            cap: 4,
        };
        assert_eq!(
            err.to_string(),
            "participant alice is at the concurrent session cap (4)"
        );
        assert_eq!(
            AdmissionError::ReceiverOffline("bob".into()).to_string(),
            "receiver bob is offline"
        );
    }

    #[test]
    fn request_error_wraps_admission_transparently() {
        let err: RequestError = AdmissionError::DuplicateTransfer.into();
        assert_eq!(
            err.to_string(),
            "duplicate transfer submission within the dedup window"
        );
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = InvalidTransition {
            from: SessionState::Completed,
            to: SessionState::Active,
        };
        assert!(err.to_string().contains("Completed"));
        assert!(err.to_string().contains("Active"));
    }
}
