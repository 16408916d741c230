//! Time source used to age bearer tokens

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Source of the current wall-clock time
pub trait Clock: Debug + Send + Sync {
    /// Current time in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
