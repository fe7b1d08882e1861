use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Seat identifier as provisioned in the hall's seat map (e.g. `3-1-42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(pub String);

impl SeatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key of a seat reservation row, one per (show, seat).
///
/// Ids of the same show sort in the same order as their seat ids, which is
/// what makes the ledger's lock order canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    pub fn new(show_id: ShowId, seat_id: &SeatId) -> Self {
        Self(format!("SH_{}_ST_{}", show_id.0, seat_id.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A time-bounded hold placed by the claim coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Permanent allocation written by the booking coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub user_id: UserId,
    pub confirmation_id: Uuid,
    pub payment_confirmation_id: String,
    pub booked_at: DateTime<Utc>,
}

/// One ledger row. Status is never stored; see [`SeatReservation::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatReservation {
    pub id: ReservationId,
    pub show_id: ShowId,
    pub seat_id: SeatId,
    pub claim: Option<Claim>,
    pub booking: Option<BookingRecord>,
}

impl SeatReservation {
    /// The state of a row that has never been claimed.
    pub fn untouched(show_id: ShowId, seat_id: SeatId) -> Self {
        Self {
            id: ReservationId::new(show_id, &seat_id),
            show_id,
            seat_id,
            claim: None,
            booking: None,
        }
    }

    pub fn is_booked(&self) -> bool {
        self.booking.is_some()
    }

    pub fn claimed_by(&self) -> Option<UserId> {
        self.claim.as_ref().map(|c| c.user_id)
    }

    pub fn status(&self, now: DateTime<Utc>) -> SeatStatus {
        if let Some(booking) = &self.booking {
            return SeatStatus::Booked {
                user_id: booking.user_id,
                confirmation_id: booking.confirmation_id,
            };
        }
        match &self.claim {
            Some(claim) if claim.is_live(now) => SeatStatus::Claimed {
                user_id: claim.user_id,
                expires_at: claim.expires_at,
            },
            _ => SeatStatus::Available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Claimed {
        user_id: UserId,
        expires_at: DateTime<Utc>,
    },
    Booked {
        user_id: UserId,
        confirmation_id: Uuid,
    },
}
