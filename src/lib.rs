//! dropline: coordination core for browser-driven file transfers.
//!
//! This crate is the single source of truth for everything between the
//! presentation layer (role selection, user list, progress bar, transfer
//! history) and the network transport:
//! - Participant presence (online/offline, display names, role capabilities)
//! - Transfer session lifecycle (a closed state machine per session)
//! - Chunked delivery with integrity checking and progress accounting
//! - Admission control (concurrency caps, duplicate protection)
//! - An append-only transfer history for UI display and audit
//!
//! **Architecture rule**: no transfer logic may exist outside `core`. The
//! UI layer subscribes to the gateway's event stream and dispatches the
//! gateway's operations; the transport layer implements [`ChunkTransport`]
//! and moves raw chunks. All coordination happens here.

pub mod core;
pub mod utils;

pub use crate::core::config::CoreConfig;
pub use crate::core::error::{AdmissionError, FailureReason, InvalidTransition, RequestError};
pub use crate::core::event::CoreEvent;
pub use crate::core::gateway::{EventStream, Gateway, HealthSnapshot};
pub use crate::core::history::{HistoryEntry, HistoryFilter};
pub use crate::core::pipeline::transport::{
    ChunkAck, ChunkTransport, LoopbackFaults, LoopbackTransport,
};
pub use crate::core::presence::{Participant, RoleSet};
pub use crate::core::scheduler::ParticipantStats;
pub use crate::core::session::{FileMeta, SessionSnapshot, SessionState};
