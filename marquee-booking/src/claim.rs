use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use marquee_core::repository::{SeatLedger, ShowCatalog};
use marquee_core::transition::{plan_claim, plan_extension};
use marquee_core::{Clock, ReservationResult, SeatId, SeatReservation, ShowId, UserId};

use crate::batch::{commit_transition, expiry_after, log_rejection, SeatBatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub show_id: ShowId,
    pub seat_ids: Vec<SeatId>,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Moves seat batches from available to claimed, all or nothing.
pub struct ClaimCoordinator {
    ledger: Arc<dyn SeatLedger>,
    catalog: Arc<dyn ShowCatalog>,
    clock: Arc<dyn Clock>,
}

impl ClaimCoordinator {
    pub fn new(
        ledger: Arc<dyn SeatLedger>,
        catalog: Arc<dyn ShowCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            clock,
        }
    }

    /// Claims every seat in `seat_ids` for `user_id` for `ttl`.
    pub async fn claim(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        user_id: UserId,
        ttl: Duration,
    ) -> ReservationResult<ClaimReceipt> {
        let batch = SeatBatch::new(show_id, seat_ids)?;
        batch.validate(self.catalog.as_ref()).await?;

        let expires_at = self
            .transition(&batch, |rows, now| {
                let expires_at = expiry_after(now, ttl)?;
                Ok((plan_claim(rows, user_id, expires_at, now)?, expires_at))
            })
            .await
            .inspect_err(|e| log_rejection("claim", &batch, user_id, e))?;

        info!(
            "Claimed {} seat(s) of show {} for user {} until {}",
            batch.len(),
            show_id,
            user_id,
            expires_at
        );
        Ok(ClaimReceipt {
            show_id,
            seat_ids: batch.seat_ids().to_vec(),
            user_id,
            expires_at,
        })
    }

    /// Pushes the user's live claims on `seat_ids` to at least `now + extension`.
    ///
    /// Used right before checkout so the hold outlives the payment round trip.
    pub async fn extend(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        user_id: UserId,
        extension: Duration,
    ) -> ReservationResult<ClaimReceipt> {
        let batch = SeatBatch::new(show_id, seat_ids)?;
        batch.validate(self.catalog.as_ref()).await?;

        let expires_at = self
            .transition(&batch, |rows, now| {
                let target = expiry_after(now, extension)?;
                let planned = plan_extension(rows, user_id, target, now)?;
                let expires_at = planned
                    .iter()
                    .filter_map(|row| row.claim.as_ref().map(|c| c.expires_at))
                    .min()
                    .unwrap_or(target);
                Ok((planned, expires_at))
            })
            .await
            .inspect_err(|e| log_rejection("extend", &batch, user_id, e))?;

        info!(
            "Extended claim on {} seat(s) of show {} for user {} until {}",
            batch.len(),
            show_id,
            user_id,
            expires_at
        );
        Ok(ClaimReceipt {
            show_id,
            seat_ids: batch.seat_ids().to_vec(),
            user_id,
            expires_at,
        })
    }
}

impl ClaimCoordinator {
    async fn transition<T, F>(&self, batch: &SeatBatch, plan: F) -> ReservationResult<T>
    where
        F: FnOnce(&[SeatReservation], DateTime<Utc>) -> ReservationResult<(Vec<SeatReservation>, T)>
            + Send,
        T: Send,
    {
        commit_transition(self.ledger.as_ref(), self.clock.as_ref(), batch, plan).await
    }
}
