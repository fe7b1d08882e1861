use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use marquee_core::repository::{AvailabilityCache, SeatLedger, ShowCatalog};
use marquee_core::{ReservationError, ReservationResult, ShowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    NotAvailable,
    /// Nothing cached; the caller should recount from the ledger.
    Unknown,
}

impl Availability {
    fn from_remaining(remaining: u64) -> Self {
        if remaining == 0 {
            Availability::NotAvailable
        } else {
            Availability::Available
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountSource {
    Cache,
    Ledger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilitySnapshot {
    pub show_id: ShowId,
    pub status: Availability,
    pub remaining: u64,
    pub source: CountSource,
}

/// Read side of the availability counter.
pub struct AvailabilityQuery {
    cache: Arc<dyn AvailabilityCache>,
    ledger: Arc<dyn SeatLedger>,
    catalog: Arc<dyn ShowCatalog>,
}

impl AvailabilityQuery {
    pub fn new(
        cache: Arc<dyn AvailabilityCache>,
        ledger: Arc<dyn SeatLedger>,
        catalog: Arc<dyn ShowCatalog>,
    ) -> Self {
        Self {
            cache,
            ledger,
            catalog,
        }
    }

    /// Answers from the cache alone. An unreachable cache reads as `Unknown`.
    pub async fn query(&self, show_id: ShowId) -> Availability {
        match self.cache.remaining(show_id).await {
            Ok(Some(remaining)) => Availability::from_remaining(remaining),
            Ok(None) => Availability::Unknown,
            Err(e) => {
                warn!("Availability cache read for show {} failed: {}", show_id, e);
                Availability::Unknown
            }
        }
    }

    /// Cached count when present, otherwise a ledger recount that re-seeds the cache.
    pub async fn snapshot(&self, show_id: ShowId) -> ReservationResult<AvailabilitySnapshot> {
        match self.cache.remaining(show_id).await {
            Ok(Some(remaining)) => Ok(AvailabilitySnapshot {
                show_id,
                status: Availability::from_remaining(remaining),
                remaining,
                source: CountSource::Cache,
            }),
            Ok(None) => self.recount(show_id).await,
            Err(e) => {
                warn!("Availability cache read for show {} failed: {}", show_id, e);
                self.recount(show_id).await
            }
        }
    }

    /// Counts unbooked seats straight from the ledger and re-seeds the cache.
    pub async fn recount(&self, show_id: ShowId) -> ReservationResult<AvailabilitySnapshot> {
        let capacity = self.catalog.seat_capacity(show_id).await?.ok_or_else(|| {
            ReservationError::ValidationError(format!("show {} does not exist", show_id))
        })?;
        let booked = self.ledger.count_booked(show_id).await?;
        let remaining = capacity.saturating_sub(booked);

        match self.cache.seed(show_id, remaining).await {
            Ok(()) => info!("Seeded availability of show {} with {}", show_id, remaining),
            Err(e) => error!("Failed to seed availability of show {}: {}", show_id, e),
        }

        Ok(AvailabilitySnapshot {
            show_id,
            status: Availability::from_remaining(remaining),
            remaining,
            source: CountSource::Ledger,
        })
    }
}
