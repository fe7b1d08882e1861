use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use marquee_core::repository::{SeatLedger, ShowCatalog};
use marquee_core::{
    Clock, CorrelationKey, ReservationError, ReservationResult, SeatId, SeatReservation, ShowId,
    UserId,
};

/// A validated set of seats of one show, sorted into lock order.
///
/// Both coordinators lock through a `SeatBatch`, so two requests touching
/// overlapping seats always acquire their row locks in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatBatch {
    show_id: ShowId,
    seat_ids: Vec<SeatId>,
}

impl SeatBatch {
    pub fn new(show_id: ShowId, seat_ids: &[SeatId]) -> ReservationResult<Self> {
        if seat_ids.is_empty() {
            return Err(ReservationError::ValidationError(
                "at least one seat is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(seat_ids.len());
        for seat in seat_ids {
            if seat.as_str().trim().is_empty() {
                return Err(ReservationError::ValidationError(
                    "seat id must not be empty".to_string(),
                ));
            }
            if !seen.insert(seat) {
                return Err(ReservationError::ValidationError(format!(
                    "seat {seat} appears more than once"
                )));
            }
        }

        let mut seat_ids = seat_ids.to_vec();
        seat_ids.sort();
        Ok(Self { show_id, seat_ids })
    }

    /// Checks the show and every seat against the provisioned seat map.
    pub async fn validate(&self, catalog: &dyn ShowCatalog) -> ReservationResult<()> {
        if !catalog.show_exists(self.show_id).await? {
            return Err(ReservationError::ValidationError(format!(
                "show {} does not exist",
                self.show_id
            )));
        }

        let unknown = catalog.unknown_seats(self.show_id, &self.seat_ids).await?;
        if let Some(seat) = unknown.first() {
            return Err(ReservationError::ValidationError(format!(
                "seat {} does not exist for show {}",
                seat, self.show_id
            )));
        }
        Ok(())
    }

    pub fn show_id(&self) -> ShowId {
        self.show_id
    }

    pub fn seat_ids(&self) -> &[SeatId] {
        &self.seat_ids
    }

    pub fn len(&self) -> usize {
        self.seat_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seat_ids.is_empty()
    }

    pub fn correlation_key(&self, user_id: UserId) -> CorrelationKey {
        CorrelationKey::new(&self.seat_ids, user_id)
    }
}

/// `now + ttl`, refusing durations the calendar cannot represent.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> ReservationResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| ReservationError::ValidationError(format!("hold duration {ttl:?} is out of range")))
}

/// Locks the batch, plans the replacement rows and commits them. A rejected
/// plan rolls the whole batch back, so no row of the batch changes.
pub(crate) async fn commit_transition<T, F>(
    ledger: &dyn SeatLedger,
    clock: &dyn Clock,
    batch: &SeatBatch,
    plan: F,
) -> ReservationResult<T>
where
    F: FnOnce(&[SeatReservation], DateTime<Utc>) -> ReservationResult<(Vec<SeatReservation>, T)>
        + Send,
    T: Send,
{
    let locked = ledger.lock_batch(batch.show_id(), batch.seat_ids()).await?;
    // Status is derived against the clock read under the locks.
    let now = clock.now();

    let planned = plan(locked.rows(), now);
    match planned {
        Ok((rows, out)) => {
            locked.commit(rows).await?;
            Ok(out)
        }
        Err(e) => {
            if let Err(rollback) = locked.rollback().await {
                warn!("Rollback of show {} batch failed: {}", batch.show_id(), rollback);
            }
            Err(e)
        }
    }
}

pub(crate) fn log_rejection(op: &str, batch: &SeatBatch, user_id: UserId, err: &ReservationError) {
    let show_id = batch.show_id();
    match err {
        ReservationError::ConflictError { .. } => {
            info!("{} by user {} on show {} lost: {}", op, user_id, show_id, err)
        }
        ReservationError::PreconditionError { .. } => {
            warn!("{} by user {} on show {} refused: {}", op, user_id, show_id, err)
        }
        ReservationError::TransientError(_) => {
            error!("{} by user {} on show {} failed: {}", op, user_id, show_id, err)
        }
        ReservationError::ValidationError(_) | ReservationError::TimeoutError(_) => {
            debug!("{} by user {} on show {}: {}", op, user_id, show_id, err)
        }
    }
}
