//! Driver error types.
//!
//! Errors the driver itself can raise. Store-level failures (unknown rooms,
//! duplicate membership) never reach this level: the driver converts them to
//! outbound `error` frames so the client always learns why an action failed.

use std::fmt;

/// Errors from driver event processing.
#[derive(Debug)]
pub enum DriverError {
    /// Connection not found in the registry.
    ///
    /// A frame arrived for a connection id the driver has no session for.
    /// Indicates the runtime delivered events out of order (frame after
    /// close). The connection should be dropped; other connections are
    /// unaffected.
    SessionNotFound(u64),

    /// Connection id already registered.
    ///
    /// The runtime minted a duplicate connection id. This is a logic bug -
    /// ids come from a monotonic counter and must be unique. Fatal - report
    /// as issue.
    SessionAlreadyExists(u64),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
        }
    }
}

impl std::error::Error for DriverError {}
