use chrono::{DateTime, Utc};

/// Source of "now" for claim expiry decisions.
///
/// Production code uses [`SystemClock`]; tests swap in a clock they can advance
/// so that TTL expiry does not depend on sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
