//! Transition rules of the seat state machine.
//!
//! ```text
//!  Available ──claim──▶ Claimed{user} ──book(user)──▶ Booked{user}
//!      ▲                    │
//!      └──── ttl elapses ───┘
//! ```
//!
//! Every function here takes the rows of one locked batch and either returns the
//! full replacement batch or the first violation found in lock order. Callers
//! commit the replacement as a whole, so a single bad seat leaves every row untouched.

use chrono::{DateTime, Utc};

use crate::reservation::{BookingRecord, Claim, SeatReservation, SeatStatus, UserId};
use crate::{ConflictReason, PreconditionReason, ReservationError, ReservationResult};

fn reject_booked(rows: &[SeatReservation]) -> ReservationResult<()> {
    match rows.iter().find(|row| row.is_booked()) {
        Some(row) => Err(ReservationError::conflict(&row.seat_id, ConflictReason::Booked)),
        None => Ok(()),
    }
}

/// Available (or expired) → Claimed by `user_id` until `expires_at`.
///
/// A user re-claiming seats they already hold refreshes the expiry.
pub fn plan_claim(
    rows: &[SeatReservation],
    user_id: UserId,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ReservationResult<Vec<SeatReservation>> {
    reject_booked(rows)?;

    for row in rows {
        if let SeatStatus::Claimed { user_id: holder, .. } = row.status(now) {
            if holder != user_id {
                return Err(ReservationError::conflict(
                    &row.seat_id,
                    ConflictReason::ClaimedByOther,
                ));
            }
        }
    }

    Ok(rows
        .iter()
        .map(|row| SeatReservation {
            claim: Some(Claim {
                user_id,
                expires_at,
            }),
            ..row.clone()
        })
        .collect())
}

/// Claimed by `user_id` → Claimed by `user_id` until at least `expires_at`.
pub fn plan_extension(
    rows: &[SeatReservation],
    user_id: UserId,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ReservationResult<Vec<SeatReservation>> {
    reject_booked(rows)?;
    require_claimed_by(rows, user_id, now)?;

    Ok(rows
        .iter()
        .map(|row| {
            let current = row.claim.as_ref().map(|c| c.expires_at);
            SeatReservation {
                claim: Some(Claim {
                    user_id,
                    expires_at: current.map_or(expires_at, |c| c.max(expires_at)),
                }),
                ..row.clone()
            }
        })
        .collect())
}

/// Claimed by `booking.user_id` → Booked.
pub fn plan_booking(
    rows: &[SeatReservation],
    booking: &BookingRecord,
    now: DateTime<Utc>,
) -> ReservationResult<Vec<SeatReservation>> {
    reject_booked(rows)?;
    require_claimed_by(rows, booking.user_id, now)?;

    Ok(rows
        .iter()
        .map(|row| SeatReservation {
            booking: Some(booking.clone()),
            ..row.clone()
        })
        .collect())
}

fn require_claimed_by(
    rows: &[SeatReservation],
    user_id: UserId,
    now: DateTime<Utc>,
) -> ReservationResult<()> {
    for row in rows {
        match row.status(now) {
            SeatStatus::Claimed { user_id: holder, .. } if holder == user_id => {}
            SeatStatus::Claimed { .. } => {
                return Err(ReservationError::precondition(
                    Some(&row.seat_id),
                    PreconditionReason::NotClaimedByUser,
                ))
            }
            SeatStatus::Available | SeatStatus::Booked { .. } => {
                return Err(ReservationError::precondition(
                    Some(&row.seat_id),
                    PreconditionReason::NotClaimed,
                ))
            }
        }
    }
    Ok(())
}
