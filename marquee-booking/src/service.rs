use std::sync::Arc;

use marquee_core::repository::{AvailabilityCache, EventPublisher, SeatLedger, ShowCatalog};
use marquee_core::{
    Clock, CorrelationKey, DeliveryOutcome, PaymentConfirmation, ReservationResult,
    ReservationSettings, SeatId, SeatReservation, SeatStatus, ShowId, UserId,
};

use crate::availability::{Availability, AvailabilityQuery, AvailabilitySnapshot};
use crate::batch::SeatBatch;
use crate::booking::{BookingCoordinator, BookingReceipt};
use crate::claim::{ClaimCoordinator, ClaimReceipt};
use crate::handshake::PaymentHandshake;

/// Store handles shared by every coordinator. Opened once at startup.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn SeatLedger>,
    pub catalog: Arc<dyn ShowCatalog>,
    pub cache: Arc<dyn AvailabilityCache>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// The reservation protocol as seen from the service boundary.
pub struct ReservationService {
    claims: ClaimCoordinator,
    bookings: BookingCoordinator,
    availability: AvailabilityQuery,
    handshake: Arc<PaymentHandshake>,
    stores: Stores,
    clock: Arc<dyn Clock>,
    settings: ReservationSettings,
}

impl ReservationService {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, settings: ReservationSettings) -> Self {
        let handshake = Arc::new(PaymentHandshake::new());
        Self {
            claims: ClaimCoordinator::new(
                stores.ledger.clone(),
                stores.catalog.clone(),
                clock.clone(),
            ),
            bookings: BookingCoordinator::new(
                stores.ledger.clone(),
                stores.catalog.clone(),
                stores.cache.clone(),
                stores.publisher.clone(),
                handshake.clone(),
                clock.clone(),
            ),
            availability: AvailabilityQuery::new(
                stores.cache.clone(),
                stores.ledger.clone(),
                stores.catalog.clone(),
            ),
            handshake,
            stores,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    pub fn handshake(&self) -> &Arc<PaymentHandshake> {
        &self.handshake
    }

    pub async fn claim_seats(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        user_id: UserId,
    ) -> ReservationResult<ClaimReceipt> {
        self.claims
            .claim(show_id, seat_ids, user_id, self.settings.claim_ttl)
            .await
    }

    pub async fn extend_claim(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        user_id: UserId,
    ) -> ReservationResult<ClaimReceipt> {
        self.claims
            .extend(show_id, seat_ids, user_id, self.settings.checkout_extension)
            .await
    }

    pub async fn book_seats(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
        user_id: UserId,
    ) -> ReservationResult<BookingReceipt> {
        self.bookings
            .book(show_id, seat_ids, user_id, self.settings.payment_timeout)
            .await
    }

    /// Routes a confirmation to the booking waiting on its own seat set and user.
    pub fn deliver_payment_confirmation(&self, confirmation: PaymentConfirmation) -> DeliveryOutcome {
        let key = CorrelationKey::for_confirmation(&confirmation);
        self.handshake.deliver(&key, confirmation)
    }

    /// Routes a confirmation to an explicitly addressed booking attempt.
    pub fn deliver_payment_confirmation_to(
        &self,
        key: &CorrelationKey,
        confirmation: PaymentConfirmation,
    ) -> DeliveryOutcome {
        self.handshake.deliver(key, confirmation)
    }

    pub async fn query_availability(&self, show_id: ShowId) -> Availability {
        self.availability.query(show_id).await
    }

    pub async fn availability_snapshot(
        &self,
        show_id: ShowId,
    ) -> ReservationResult<AvailabilitySnapshot> {
        self.availability.snapshot(show_id).await
    }

    pub async fn recount_availability(
        &self,
        show_id: ShowId,
    ) -> ReservationResult<AvailabilitySnapshot> {
        self.availability.recount(show_id).await
    }

    pub async fn seat_status(&self, show_id: ShowId, seat_id: &SeatId) -> ReservationResult<SeatStatus> {
        let batch = SeatBatch::new(show_id, std::slice::from_ref(seat_id))?;
        batch.validate(self.stores.catalog.as_ref()).await?;

        let row = self
            .stores
            .ledger
            .get(show_id, seat_id)
            .await?
            .unwrap_or_else(|| SeatReservation::untouched(show_id, seat_id.clone()));
        Ok(row.status(self.clock.now()))
    }
}
