//! Process-local stores for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

use marquee_core::events::BookingConfirmed;
use marquee_core::repository::{
    AvailabilityCache, CacheError, Decrement, EventPublisher, LedgerBatch, LedgerError,
    PublishError, SeatLedger, ShowCatalog,
};
use marquee_core::{Clock, ReservationId, SeatId, SeatReservation, ShowId};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type RowLocks = Arc<Mutex<HashMap<ReservationId, Arc<tokio::sync::Mutex<()>>>>>;

/// Ledger with one async lock per row.
///
/// Committed rows live in a plain map so unlocked reads see the last commit,
/// never a batch's staged writes.
#[derive(Default)]
pub struct InMemoryLedger {
    committed: Arc<Mutex<HashMap<ReservationId, SeatReservation>>>,
    row_locks: RowLocks,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail as if the connection dropped mid-transaction.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn row_lock(&self, id: &ReservationId) -> Arc<tokio::sync::Mutex<()>> {
        guard(&self.row_locks)
            .entry(id.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl SeatLedger for InMemoryLedger {
    async fn lock_batch(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<Box<dyn LedgerBatch>, LedgerError> {
        let mut keyed: Vec<(ReservationId, &SeatId)> = seat_ids
            .iter()
            .map(|seat| (ReservationId::new(show_id, seat), seat))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut guards = Vec::with_capacity(keyed.len());
        for (id, _) in &keyed {
            guards.push(self.row_lock(id).lock_owned().await);
        }

        let rows = {
            let committed = guard(&self.committed);
            keyed
                .into_iter()
                .map(|(id, seat)| {
                    committed
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| SeatReservation::untouched(show_id, seat.clone()))
                })
                .collect()
        };

        Ok(Box::new(InMemoryBatch {
            committed: Arc::clone(&self.committed),
            row_locks: Arc::clone(&self.row_locks),
            fail_commit: Arc::clone(&self.fail_next_commit),
            rows,
            guards,
        }))
    }

    async fn get(
        &self,
        show_id: ShowId,
        seat_id: &SeatId,
    ) -> Result<Option<SeatReservation>, LedgerError> {
        let id = ReservationId::new(show_id, seat_id);
        Ok(guard(&self.committed).get(&id).cloned())
    }

    async fn count_booked(&self, show_id: ShowId) -> Result<u64, LedgerError> {
        let booked = guard(&self.committed)
            .values()
            .filter(|row| row.show_id == show_id && row.is_booked())
            .count();
        Ok(booked as u64)
    }
}

struct InMemoryBatch {
    committed: Arc<Mutex<HashMap<ReservationId, SeatReservation>>>,
    row_locks: RowLocks,
    fail_commit: Arc<AtomicBool>,
    rows: Vec<SeatReservation>,
    // Released when the batch is committed, rolled back or dropped.
    guards: Vec<OwnedMutexGuard<()>>,
}

#[async_trait]
impl LedgerBatch for InMemoryBatch {
    fn rows(&self) -> &[SeatReservation] {
        &self.rows
    }

    async fn commit(self: Box<Self>, rows: Vec<SeatReservation>) -> Result<(), LedgerError> {
        let same_ids = rows.len() == self.rows.len()
            && rows.iter().zip(&self.rows).all(|(new, old)| new.id == old.id);
        if !same_ids {
            return Err(LedgerError::BatchMismatch(format!(
                "{} row(s) written for {} locked",
                rows.len(),
                self.rows.len()
            )));
        }
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("connection reset during commit".to_string()));
        }

        let mut committed = guard(&self.committed);
        for row in rows {
            committed.insert(row.id.clone(), row);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        Ok(())
    }
}

impl Drop for InMemoryBatch {
    fn drop(&mut self) {
        self.guards.clear();
        // Clones are only taken under the map lock, so a count of one means
        // no batch holds or waits on the row.
        let mut locks = guard(&self.row_locks);
        for row in &self.rows {
            if locks.get(&row.id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(&row.id);
            }
        }
    }
}

/// Seat maps keyed by show.
#[derive(Default)]
pub struct InMemoryCatalog {
    shows: Mutex<HashMap<ShowId, BTreeSet<SeatId>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_show<I, S>(self, show_id: ShowId, seats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_show(show_id, seats);
        self
    }

    pub fn add_show<I, S>(&self, show_id: ShowId, seats: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seats = seats.into_iter().map(SeatId::new).collect();
        guard(&self.shows).insert(show_id, seats);
    }
}

#[async_trait]
impl ShowCatalog for InMemoryCatalog {
    async fn show_exists(&self, show_id: ShowId) -> Result<bool, LedgerError> {
        Ok(guard(&self.shows).contains_key(&show_id))
    }

    async fn unknown_seats(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<Vec<SeatId>, LedgerError> {
        let shows = guard(&self.shows);
        let known = shows.get(&show_id);
        Ok(seat_ids
            .iter()
            .filter(|seat| !known.is_some_and(|k| k.contains(*seat)))
            .cloned()
            .collect())
    }

    async fn seat_capacity(&self, show_id: ShowId) -> Result<Option<u64>, LedgerError> {
        Ok(guard(&self.shows).get(&show_id).map(|s| s.len() as u64))
    }
}

#[derive(Default)]
pub struct InMemoryAvailabilityCache {
    counters: Mutex<HashMap<ShowId, u64>>,
    unavailable: AtomicBool,
}

impl InMemoryAvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `CacheError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityCache for InMemoryAvailabilityCache {
    async fn remaining(&self, show_id: ShowId) -> Result<Option<u64>, CacheError> {
        self.check()?;
        Ok(guard(&self.counters).get(&show_id).copied())
    }

    async fn seed(&self, show_id: ShowId, remaining: u64) -> Result<(), CacheError> {
        self.check()?;
        guard(&self.counters).insert(show_id, remaining);
        Ok(())
    }

    async fn decrement(&self, show_id: ShowId, seats: u64) -> Result<Decrement, CacheError> {
        self.check()?;
        let mut counters = guard(&self.counters);
        let Some(current) = counters.get_mut(&show_id) else {
            return Ok(Decrement::Missing);
        };
        if *current >= seats {
            *current -= seats;
            Ok(Decrement::Applied {
                remaining: *current,
            })
        } else {
            let shortfall = seats - *current;
            *current = 0;
            Ok(Decrement::Clamped { shortfall })
        }
    }

    async fn invalidate(&self, show_id: ShowId) -> Result<(), CacheError> {
        self.check()?;
        guard(&self.counters).remove(&show_id);
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<BookingConfirmed>>,
    unavailable: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<BookingConfirmed> {
        guard(&self.events).clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn booking_confirmed(&self, event: &BookingConfirmed) -> Result<(), PublishError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PublishError("broker unreachable".to_string()));
        }
        guard(&self.events).push(event.clone());
        Ok(())
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = guard(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *guard(&self.now)
    }
}
