use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use marquee_core::events::BookingConfirmed;
use marquee_core::reservation::BookingRecord;
use marquee_core::repository::{AvailabilityCache, Decrement, EventPublisher, SeatLedger, ShowCatalog};
use marquee_core::transition::plan_booking;
use marquee_core::{
    Clock, ConflictReason, PreconditionReason, ReservationError, ReservationResult, SeatId, ShowId,
    UserId,
};

use crate::batch::{commit_transition, log_rejection, SeatBatch};
use crate::handshake::{HandshakeError, PaymentHandshake};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub show_id: ShowId,
    pub seat_ids: Vec<SeatId>,
    pub user_id: UserId,
    pub booking_confirmation_id: Uuid,
    pub payment_confirmation_id: String,
    pub price: i64,
    pub booked_at: DateTime<Utc>,
}

/// Turns a user's claims into bookings once their payment is confirmed.
pub struct BookingCoordinator {
    ledger: Arc<dyn SeatLedger>,
    catalog: Arc<dyn ShowCatalog>,
    cache: Arc<dyn AvailabilityCache>,
    publisher: Arc<dyn EventPublisher>,
    handshake: Arc<PaymentHandshake>,
    clock: Arc<dyn Clock>,
}

impl BookingCoordinator {
    pub fn new(
        ledger: Arc<dyn SeatLedger>,
        catalog: Arc<dyn ShowCatalog>,
        cache: Arc<dyn AvailabilityCache>,
        publisher: Arc<dyn EventPublisher>,
        handshake: Arc<PaymentHandshake>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            cache,
            publisher,
            handshake,
            clock,
        }
    }

    /// Waits for the payment confirmation of `seat_ids`, then books them for `user_id`.
    ///
    /// No ledger lock is held while waiting; rows are locked only once the
    /// confirmation is in hand.
    pub async fn book(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        user_id: UserId,
        payment_timeout: Duration,
    ) -> ReservationResult<BookingReceipt> {
        let batch = SeatBatch::new(show_id, seat_ids)?;
        batch.validate(self.catalog.as_ref()).await?;

        let key = batch.correlation_key(user_id);
        let confirmation = self
            .handshake
            .register(key.clone())
            .map_err(|e| match e {
                HandshakeError::AlreadyWaiting(_) => {
                    ReservationError::conflict(&batch.seat_ids()[0], ConflictReason::PaymentPending)
                }
                HandshakeError::Timeout(t) => ReservationError::TimeoutError(t),
            })?
            .wait(payment_timeout)
            .await
            .map_err(|_| ReservationError::TimeoutError(payment_timeout))
            .inspect_err(|e| log_rejection("book", &batch, user_id, e))?;

        if !confirmation.matches(&key) {
            let err = ReservationError::precondition(None, PreconditionReason::PaymentMismatch);
            log_rejection("book", &batch, user_id, &err);
            return Err(err);
        }

        let payment_confirmation_id = confirmation.confirmation_id.clone();
        let record = commit_transition(
            self.ledger.as_ref(),
            self.clock.as_ref(),
            &batch,
            move |rows, now| {
                let record = BookingRecord {
                    user_id,
                    confirmation_id: Uuid::new_v4(),
                    payment_confirmation_id,
                    booked_at: now,
                };
                Ok((plan_booking(rows, &record, now)?, record))
            },
        )
        .await
        .inspect_err(|e| log_rejection("book", &batch, user_id, e))?;

        info!(
            "Booked {} seat(s) of show {} for user {} (confirmation {})",
            batch.len(),
            show_id,
            user_id,
            record.confirmation_id
        );

        // The ledger is committed; nothing below may fail the booking.
        self.settle_availability(show_id, batch.len() as u64).await;

        let receipt = BookingReceipt {
            show_id,
            seat_ids: batch.seat_ids().to_vec(),
            user_id,
            booking_confirmation_id: record.confirmation_id,
            payment_confirmation_id: record.payment_confirmation_id,
            price: confirmation.price,
            booked_at: record.booked_at,
        };
        self.announce(&receipt).await;
        Ok(receipt)
    }

    async fn settle_availability(&self, show_id: ShowId, seats: u64) {
        match self.cache.decrement(show_id, seats).await {
            Ok(Decrement::Applied { remaining }) => {
                info!("Show {} availability now {}", show_id, remaining);
            }
            Ok(Decrement::Clamped { shortfall }) => {
                warn!(
                    "Show {} availability counter was short by {} seat(s); dropping it for a recount",
                    show_id, shortfall
                );
                if let Err(e) = self.cache.invalidate(show_id).await {
                    error!("Failed to drop availability counter of show {}: {}", show_id, e);
                }
            }
            Ok(Decrement::Missing) => {
                info!(
                    "Cache miss for show {}, skipping decrement (seeded on next recount)",
                    show_id
                );
            }
            Err(e) => {
                error!("Failed to decrement availability of show {}: {}", show_id, e);
            }
        }
    }

    async fn announce(&self, receipt: &BookingReceipt) {
        let event = BookingConfirmed {
            show_id: receipt.show_id,
            seat_ids: receipt.seat_ids.clone(),
            user_id: receipt.user_id,
            booking_confirmation_id: receipt.booking_confirmation_id,
            payment_confirmation_id: receipt.payment_confirmation_id.clone(),
            booked_at: receipt.booked_at,
        };
        if let Err(e) = self.publisher.booking_confirmed(&event).await {
            error!(
                "Booking {} committed but event was not published: {}",
                receipt.booking_confirmation_id, e
            );
        }
    }
}
