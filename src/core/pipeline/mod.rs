//! Chunk pipeline: splits file payloads into bounded chunks, delivers them
//! through the transport seam, verifies integrity, and tracks byte-level
//! progress for the UI.

pub mod chunk;
pub mod digest;
pub mod driver;
pub mod progress;
pub mod transport;
