//! Centralized configuration for the coordination core.
//!
//! All tunable parameters live here so they can be reviewed and adjusted
//! in a single place. Defaults are exposed as constants; the knobs that
//! vary per deployment are collected in [`CoreConfig`].

use std::time::Duration;

// ── Transfer / Chunking ──────────────────────────────────────────────────────

/// Default chunk size in bytes (256 KB).
///
/// Sized so a typical browser-sized upload produces a progress-bar-friendly
/// number of chunks without flooding the transport with tiny frames. The
/// chunk size is fixed per session at admission time; in-flight sessions are
/// never re-chunked.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Maximum unacknowledged chunks in flight per session.
///
/// The pipeline pauses chunk emission once this many deliveries are awaiting
/// acknowledgment, which bounds receiver-side buffering regardless of the
/// transport's own flow control.
pub const DEFAULT_CHUNKS_IN_FLIGHT: usize = 16;

/// Hard deadline for a single chunk acknowledgment. Expiry fails the
/// session; it never blocks indefinitely.
pub const DEFAULT_CHUNK_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a `Pending` session waits for the receiver to confirm readiness
/// before the transfer is failed.
pub const DEFAULT_RECEIVER_ACK_TIMEOUT: Duration = Duration::from_secs(30);

// ── Admission ────────────────────────────────────────────────────────────────

/// Maximum simultaneously active sessions per participant. Counts both
/// sending and receiving sessions that have not reached a terminal state.
pub const DEFAULT_SESSIONS_PER_PARTICIPANT: usize = 4;

/// Window within which an identical (sender, receiver, file name, size)
/// submission is treated as a UI double-submit and rejected.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(10);

/// Maximum declared file size accepted at the gateway (8 GB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Maximum length of participant ids and file names accepted at the gateway.
pub const MAX_IDENTIFIER_LEN: usize = 255;

// ── Progress events ──────────────────────────────────────────────────────────

/// Minimum interval between progress events for one session. Chunk
/// acknowledgments arriving faster than this are coalesced.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Minimum percentage-point delta that forces a progress event through
/// even inside the interval gate. The 100% mark is always emitted.
pub const DEFAULT_PROGRESS_DELTA_PERCENT: u8 = 5;

// ── Event bus / registries ───────────────────────────────────────────────────

/// Capacity of the broadcast event channel handed to each connected client.
/// Slow subscribers past this depth observe a lag error, never block the core.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shard count for the presence registry and history ledger. Writes for
/// independent keys proceed in parallel; only same-shard writes serialize.
pub const REGISTRY_SHARDS: usize = 16;

// ── Runtime knobs ────────────────────────────────────────────────────────────

/// Deployment-tunable parameters for the coordination core.
///
/// `CoreConfig::default()` mirrors the constants above. Tests shrink the
/// timeouts and windows to keep runs fast.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Chunk size in bytes, fixed per session at admission.
    pub chunk_size: usize,
    /// Maximum unacknowledged chunks in flight per session.
    pub chunks_in_flight: usize,
    /// Hard deadline for each chunk acknowledgment.
    pub chunk_ack_timeout: Duration,
    /// Deadline for receiver readiness confirmation of a `Pending` session.
    pub receiver_ack_timeout: Duration,
    /// Per-participant concurrent session cap.
    pub sessions_per_participant: usize,
    /// Duplicate-submission rejection window.
    pub dedup_window: Duration,
    /// Maximum declared file size accepted at the gateway.
    pub max_file_size: u64,
    /// Minimum interval between progress events per session.
    pub progress_interval: Duration,
    /// Percentage delta that bypasses the interval gate.
    pub progress_delta_percent: u8,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunks_in_flight: DEFAULT_CHUNKS_IN_FLIGHT,
            chunk_ack_timeout: DEFAULT_CHUNK_ACK_TIMEOUT,
            receiver_ack_timeout: DEFAULT_RECEIVER_ACK_TIMEOUT,
            sessions_per_participant: DEFAULT_SESSIONS_PER_PARTICIPANT,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            progress_delta_percent: DEFAULT_PROGRESS_DELTA_PERCENT,
        }
    }
}
