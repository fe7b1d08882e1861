pub mod clock;
pub mod events;
pub mod payment;
pub mod repository;
pub mod reservation;
pub mod settings;
pub mod transition;

pub use clock::{Clock, SystemClock};
pub use payment::{CorrelationKey, DeliveryOutcome, PaymentConfirmation};
pub use reservation::{ReservationId, SeatId, SeatReservation, SeatStatus, ShowId, UserId};
pub use settings::ReservationSettings;

use std::fmt;
use std::time::Duration;

/// Why a claim or booking lost the race for a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    Booked,
    ClaimedByOther,
    /// Another booking attempt for the same seats and user is already waiting on payment.
    PaymentPending,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::Booked => f.write_str("booked"),
            ConflictReason::ClaimedByOther => f.write_str("claimed by other"),
            ConflictReason::PaymentPending => f.write_str("payment already pending"),
        }
    }
}

/// Why a booking (or checkout extension) was refused before touching the seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionReason {
    NotClaimed,
    NotClaimedByUser,
    PaymentMismatch,
}

impl fmt::Display for PreconditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionReason::NotClaimed => f.write_str("seats need to be claimed first"),
            PreconditionReason::NotClaimedByUser => f.write_str("not claimed by this user"),
            PreconditionReason::PaymentMismatch => {
                f.write_str("payment confirmation does not match the booking request")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Seat {seat} unavailable: {reason}")]
    ConflictError { seat: SeatId, reason: ConflictReason },
    #[error("Precondition failed: {reason}")]
    PreconditionError {
        seat: Option<SeatId>,
        reason: PreconditionReason,
    },
    #[error("Payment confirmation not received within {0:?}")]
    TimeoutError(Duration),
    #[error("Store unavailable: {0}")]
    TransientError(String),
}

impl ReservationError {
    pub fn conflict(seat: &SeatId, reason: ConflictReason) -> Self {
        ReservationError::ConflictError {
            seat: seat.clone(),
            reason,
        }
    }

    pub fn precondition(seat: Option<&SeatId>, reason: PreconditionReason) -> Self {
        ReservationError::PreconditionError {
            seat: seat.cloned(),
            reason,
        }
    }
}

impl From<repository::LedgerError> for ReservationError {
    fn from(err: repository::LedgerError) -> Self {
        ReservationError::TransientError(err.to_string())
    }
}

pub type ReservationResult<T> = Result<T, ReservationError>;
