use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall clock time in unix seconds.
///
/// Token expiry is absolute, so whatever backs this must already be
/// synchronized when provisioning starts.
pub trait Clock {
    fn now(&self) -> u64;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            // a clock before the epoch is as good as unsynchronized
            .unwrap_or_default()
    }
}
