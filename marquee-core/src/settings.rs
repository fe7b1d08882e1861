use std::time::Duration;

/// Business rules the coordinators run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationSettings {
    /// How long a fresh claim holds its seats.
    pub claim_ttl: Duration,
    /// How far a checkout extension pushes a live claim past "now".
    pub checkout_extension: Duration,
    /// How long a booking attempt waits for its payment confirmation.
    pub payment_timeout: Duration,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            claim_ttl: Duration::from_secs(60),
            checkout_extension: Duration::from_secs(120),
            payment_timeout: Duration::from_secs(30),
        }
    }
}
