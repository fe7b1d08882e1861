use async_trait::async_trait;

use crate::events::BookingConfirmed;
use crate::reservation::{ReservationId, SeatId, SeatReservation, ShowId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt reservation {0}: {1}")]
    Corrupt(ReservationId, String),
    #[error("Batch commit does not match locked rows: {0}")]
    BatchMismatch(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Availability cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Event publish failed: {0}")]
pub struct PublishError(pub String);

/// Durable record of reservation status per (show, seat).
///
/// Mutations only happen through a [`LedgerBatch`], which holds exclusive locks
/// on every row of the batch until it is committed or rolled back.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Opens a transaction and locks the rows for `seat_ids` in ascending seat order.
    ///
    /// Rows that were never touched are created in the available state.
    async fn lock_batch(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<Box<dyn LedgerBatch>, LedgerError>;

    /// Reads a single row without locking it.
    async fn get(
        &self,
        show_id: ShowId,
        seat_id: &SeatId,
    ) -> Result<Option<SeatReservation>, LedgerError>;

    /// Number of booked seats for the show.
    async fn count_booked(&self, show_id: ShowId) -> Result<u64, LedgerError>;
}

/// An open ledger transaction over a locked set of rows.
///
/// Dropping a batch without committing discards it.
#[async_trait]
pub trait LedgerBatch: Send {
    /// Locked rows, in lock order.
    fn rows(&self) -> &[SeatReservation];

    /// Writes `rows` (same ids, same order as [`LedgerBatch::rows`]) and commits.
    async fn commit(self: Box<Self>, rows: Vec<SeatReservation>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Read access to the show and seat maps owned by venue provisioning.
#[async_trait]
pub trait ShowCatalog: Send + Sync {
    async fn show_exists(&self, show_id: ShowId) -> Result<bool, LedgerError>;

    /// Returns the subset of `seat_ids` that are not part of the show's hall.
    async fn unknown_seats(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<Vec<SeatId>, LedgerError>;

    /// Total number of seats the show sells, `None` if the show does not exist.
    async fn seat_capacity(&self, show_id: ShowId) -> Result<Option<u64>, LedgerError>;
}

/// Outcome of subtracting booked seats from a cached counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    Applied { remaining: u64 },
    /// The counter held fewer seats than were booked; it was clamped to zero.
    Clamped { shortfall: u64 },
    /// No counter cached for the show.
    Missing,
}

/// Fast-read counter of unbooked seats per show. Advisory only.
#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    async fn remaining(&self, show_id: ShowId) -> Result<Option<u64>, CacheError>;

    async fn seed(&self, show_id: ShowId, remaining: u64) -> Result<(), CacheError>;

    /// Subtracts `seats` from the counter, never going below zero.
    async fn decrement(&self, show_id: ShowId, seats: u64) -> Result<Decrement, CacheError>;

    async fn invalidate(&self, show_id: ShowId) -> Result<(), CacheError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn booking_confirmed(&self, event: &BookingConfirmed) -> Result<(), PublishError>;
}
