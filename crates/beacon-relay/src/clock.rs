//! Injectable time source for server-assigned timestamps.
//!
//! The driver stamps every relayed `message` frame with a server-side UTC
//! timestamp. Going through a trait keeps the driver deterministic in tests:
//! production uses [`SystemClock`], tests pin a fixed instant.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
