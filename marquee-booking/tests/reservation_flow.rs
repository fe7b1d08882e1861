use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use marquee_booking::memory::{
    InMemoryAvailabilityCache, InMemoryCatalog, InMemoryLedger, ManualClock, RecordingPublisher,
};
use marquee_booking::{Availability, BookingReceipt, CountSource, ReservationService, Stores};
use marquee_core::repository::{AvailabilityCache, SeatLedger};
use marquee_core::{
    ConflictReason, CorrelationKey, DeliveryOutcome, PaymentConfirmation, PreconditionReason,
    ReservationError, ReservationResult, ReservationSettings, SeatId, SeatStatus, ShowId, UserId,
};

const SHOW: ShowId = ShowId(1);

struct Harness {
    service: Arc<ReservationService>,
    ledger: Arc<InMemoryLedger>,
    cache: Arc<InMemoryAvailabilityCache>,
    publisher: Arc<RecordingPublisher>,
    clock: Arc<ManualClock>,
}

fn harness_with_timeout(payment_timeout: Duration) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let catalog = Arc::new(InMemoryCatalog::new().with_show(SHOW, ["A1", "A2", "A3", "A4", "B1"]));
    let cache = Arc::new(InMemoryAvailabilityCache::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 10, 19, 0, 0).unwrap(),
    ));

    let stores = Stores {
        ledger: ledger.clone(),
        catalog,
        cache: cache.clone(),
        publisher: publisher.clone(),
    };
    let settings = ReservationSettings {
        claim_ttl: Duration::from_secs(60),
        checkout_extension: Duration::from_secs(120),
        payment_timeout,
    };
    Harness {
        service: Arc::new(ReservationService::new(stores, clock.clone(), settings)),
        ledger,
        cache,
        publisher,
        clock,
    }
}

fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(5))
}

fn ids(seats: &[&str]) -> Vec<SeatId> {
    seats.iter().map(|s| SeatId::new(*s)).collect()
}

fn payment(seats: &[&str], user: i64, id: &str) -> PaymentConfirmation {
    PaymentConfirmation {
        seat_ids: ids(seats),
        user_id: UserId(user),
        price: 50,
        confirmation_id: id.to_string(),
    }
}

async fn wait_for_waiters(service: &ReservationService, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.handshake().pending() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("booking never started waiting on payment");
}

/// Starts a booking, waits until it is parked on the handshake, then delivers
/// `confirmation` to its correlation key.
async fn book_with(
    h: &Harness,
    seats: &[&str],
    user: i64,
    confirmation: PaymentConfirmation,
) -> (ReservationResult<BookingReceipt>, DeliveryOutcome) {
    let service = Arc::clone(&h.service);
    let seat_ids = ids(seats);
    let booking =
        tokio::spawn(async move { service.book_seats(SHOW, &seat_ids, UserId(user)).await });

    wait_for_waiters(&h.service, 1).await;
    let key = CorrelationKey::new(&ids(seats), UserId(user));
    let outcome = h.service.deliver_payment_confirmation_to(&key, confirmation);
    (booking.await.unwrap(), outcome)
}

async fn status(h: &Harness, seat: &str) -> SeatStatus {
    h.service.seat_status(SHOW, &SeatId::new(seat)).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_claims_have_one_winner() {
    let h = harness();

    let mut tasks = Vec::new();
    for user in 1..=8 {
        let service = Arc::clone(&h.service);
        let seats = if user % 2 == 0 { ids(&["A1", "A2"]) } else { ids(&["A3", "A2"]) };
        tasks.push(tokio::spawn(async move {
            service.claim_seats(SHOW, &seats, UserId(user)).await
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => winners.push(receipt),
            Err(ReservationError::ConflictError { reason, .. }) => {
                assert_eq!(reason, ConflictReason::ClaimedByOther)
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let winner = winners[0].user_id;
    for seat in &winners[0].seat_ids {
        assert!(matches!(
            status(&h, seat.as_str()).await,
            SeatStatus::Claimed { user_id, .. } if user_id == winner
        ));
    }
}

#[tokio::test]
async fn test_claim_books_after_payment() {
    let h = harness();
    h.service.recount_availability(SHOW).await.unwrap();

    h.service.claim_seats(SHOW, &ids(&["B1"]), UserId(3)).await.unwrap();
    let (receipt, outcome) = book_with(&h, &["B1"], 3, payment(&["B1"], 3, "conf-77")).await;
    let receipt = receipt.unwrap();

    assert_eq!(outcome, DeliveryOutcome::Accepted);
    assert_eq!(receipt.payment_confirmation_id, "conf-77");
    assert_eq!(receipt.price, 50);
    assert_eq!(
        status(&h, "B1").await,
        SeatStatus::Booked {
            user_id: UserId(3),
            confirmation_id: receipt.booking_confirmation_id,
        }
    );
    assert_eq!(h.cache.remaining(SHOW).await.unwrap(), Some(4));

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].booking_confirmation_id, receipt.booking_confirmation_id);

    // The waiter is gone; a replayed confirmation completes nothing.
    let replay = h
        .service
        .deliver_payment_confirmation(payment(&["B1"], 3, "conf-77"));
    assert_eq!(replay, DeliveryOutcome::NoWaiter);
}

#[tokio::test]
async fn test_expired_claim_is_taken_over() {
    let h = harness();

    h.service.claim_seats(SHOW, &ids(&["A1"]), UserId(1)).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(61));
    assert_eq!(status(&h, "A1").await, SeatStatus::Available);

    h.service.claim_seats(SHOW, &ids(&["A1"]), UserId(2)).await.unwrap();

    let (result, outcome) = book_with(&h, &["A1"], 1, payment(&["A1"], 1, "conf-1")).await;
    assert_eq!(outcome, DeliveryOutcome::Accepted);
    assert!(matches!(
        result,
        Err(ReservationError::PreconditionError {
            reason: PreconditionReason::NotClaimedByUser,
            ..
        })
    ));
    assert!(matches!(
        status(&h, "A1").await,
        SeatStatus::Claimed { user_id: UserId(2), .. }
    ));
}

#[tokio::test]
async fn test_booking_with_one_unclaimed_seat_changes_nothing() {
    let h = harness();
    h.service.claim_seats(SHOW, &ids(&["A2"]), UserId(2)).await.unwrap();

    let (result, _) = book_with(&h, &["A2", "A3"], 2, payment(&["A2", "A3"], 2, "conf-2")).await;
    assert!(matches!(
        result,
        Err(ReservationError::PreconditionError {
            reason: PreconditionReason::NotClaimed,
            ..
        })
    ));

    assert!(matches!(status(&h, "A2").await, SeatStatus::Claimed { .. }));
    assert_eq!(status(&h, "A3").await, SeatStatus::Available);
    assert_eq!(h.ledger.count_booked(SHOW).await.unwrap(), 0);
    assert!(h.publisher.events().is_empty());
}

#[tokio::test]
async fn test_claim_touching_booked_seat_leaves_batch_untouched() {
    let h = harness();
    h.service.claim_seats(SHOW, &ids(&["A1"]), UserId(1)).await.unwrap();
    book_with(&h, &["A1"], 1, payment(&["A1"], 1, "conf-1"))
        .await
        .0
        .unwrap();

    let err = h
        .service
        .claim_seats(SHOW, &ids(&["A2", "A1"]), UserId(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::ConflictError { ref seat, reason: ConflictReason::Booked } if seat.as_str() == "A1"
    ));
    assert_eq!(status(&h, "A2").await, SeatStatus::Available);
}

#[tokio::test]
async fn test_mismatched_payment_fails_the_waiting_booking() {
    let h = harness();
    h.service
        .claim_seats(SHOW, &ids(&["A1", "A2"]), UserId(7))
        .await
        .unwrap();

    let (result, outcome) = book_with(&h, &["A1", "A2"], 7, payment(&["A1"], 7, "conf-9")).await;
    assert_eq!(outcome, DeliveryOutcome::RejectedMismatch);
    assert!(matches!(
        result,
        Err(ReservationError::PreconditionError {
            reason: PreconditionReason::PaymentMismatch,
            ..
        })
    ));
    assert!(matches!(status(&h, "A1").await, SeatStatus::Claimed { .. }));
    assert!(matches!(status(&h, "A2").await, SeatStatus::Claimed { .. }));
}

#[tokio::test]
async fn test_payment_timeout_leaves_claims_in_place() {
    let h = harness_with_timeout(Duration::from_millis(50));
    h.service.claim_seats(SHOW, &ids(&["A4"]), UserId(4)).await.unwrap();

    let err = h
        .service
        .book_seats(SHOW, &ids(&["A4"]), UserId(4))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::TimeoutError(_)));
    assert_eq!(h.service.handshake().pending(), 0);
    assert!(matches!(status(&h, "A4").await, SeatStatus::Claimed { .. }));

    let late = h
        .service
        .deliver_payment_confirmation(payment(&["A4"], 4, "late"));
    assert_eq!(late, DeliveryOutcome::NoWaiter);
}

#[tokio::test]
async fn test_second_booking_attempt_while_waiting_is_refused() {
    let h = harness();
    h.service.claim_seats(SHOW, &ids(&["B1"]), UserId(3)).await.unwrap();

    let service = Arc::clone(&h.service);
    let first = tokio::spawn(async move { service.book_seats(SHOW, &ids(&["B1"]), UserId(3)).await });
    wait_for_waiters(&h.service, 1).await;

    let err = h
        .service
        .book_seats(SHOW, &ids(&["B1"]), UserId(3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::ConflictError {
            reason: ConflictReason::PaymentPending,
            ..
        }
    ));

    let outcome = h
        .service
        .deliver_payment_confirmation(payment(&["B1"], 3, "conf-3"));
    assert_eq!(outcome, DeliveryOutcome::Accepted);
    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_cache_outage_does_not_fail_booking() {
    let h = harness();
    h.service.claim_seats(SHOW, &ids(&["A1"]), UserId(1)).await.unwrap();

    h.cache.set_unavailable(true);
    let (result, _) = book_with(&h, &["A1"], 1, payment(&["A1"], 1, "conf-1")).await;
    assert!(result.is_ok());
    assert_eq!(h.service.query_availability(SHOW).await, Availability::Unknown);

    h.cache.set_unavailable(false);
    let snapshot = h.service.availability_snapshot(SHOW).await.unwrap();
    assert_eq!(snapshot.remaining, 4);
    assert_eq!(snapshot.source, CountSource::Ledger);
    assert_eq!(h.service.query_availability(SHOW).await, Availability::Available);
}

#[tokio::test]
async fn test_failed_commit_rolls_back_booking() {
    let h = harness();
    h.service.recount_availability(SHOW).await.unwrap();
    h.service.claim_seats(SHOW, &ids(&["A3"]), UserId(5)).await.unwrap();

    h.ledger.fail_next_commit();
    let (result, _) = book_with(&h, &["A3"], 5, payment(&["A3"], 5, "conf-5")).await;
    assert!(matches!(result, Err(ReservationError::TransientError(_))));

    assert!(matches!(status(&h, "A3").await, SeatStatus::Claimed { .. }));
    assert_eq!(h.cache.remaining(SHOW).await.unwrap(), Some(5));
    assert!(h.publisher.events().is_empty());
}

#[tokio::test]
async fn test_short_counter_is_clamped_then_recounted() {
    let h = harness();
    h.cache.seed(SHOW, 1).await.unwrap();
    h.service
        .claim_seats(SHOW, &ids(&["A1", "A2"]), UserId(1))
        .await
        .unwrap();

    let (result, _) = book_with(&h, &["A1", "A2"], 1, payment(&["A1", "A2"], 1, "conf-1")).await;
    assert!(result.is_ok());

    // The counter never goes negative; it is dropped and rebuilt from the ledger.
    assert_eq!(h.service.query_availability(SHOW).await, Availability::Unknown);
    let snapshot = h.service.availability_snapshot(SHOW).await.unwrap();
    assert_eq!(snapshot.remaining, 3);
    assert_eq!(h.cache.remaining(SHOW).await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_sold_out_show_reports_not_available() {
    let h = harness();
    let all = ["A1", "A2", "A3", "A4", "B1"];
    h.service.recount_availability(SHOW).await.unwrap();
    h.service.claim_seats(SHOW, &ids(&all), UserId(1)).await.unwrap();

    let (result, _) = book_with(&h, &all, 1, payment(&all, 1, "conf-all")).await;
    assert!(result.is_ok());
    assert_eq!(h.service.query_availability(SHOW).await, Availability::NotAvailable);
}

#[tokio::test]
async fn test_extend_claim_before_checkout() {
    let h = harness();
    let claimed = h.service.claim_seats(SHOW, &ids(&["A1"]), UserId(1)).await.unwrap();

    h.clock.advance(chrono::Duration::seconds(30));
    let extended = h.service.extend_claim(SHOW, &ids(&["A1"]), UserId(1)).await.unwrap();
    assert_eq!(
        extended.expires_at - claimed.expires_at,
        chrono::Duration::seconds(90)
    );

    let err = h
        .service
        .extend_claim(SHOW, &ids(&["A1"]), UserId(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReservationError::PreconditionError {
            reason: PreconditionReason::NotClaimedByUser,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unknown_show_and_seat_are_rejected() {
    let h = harness();

    let err = h
        .service
        .claim_seats(ShowId(99), &ids(&["A1"]), UserId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::ValidationError(_)));

    let err = h
        .service
        .claim_seats(SHOW, &ids(&["A1", "Z9"]), UserId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::ValidationError(_)));
    assert_eq!(status(&h, "A1").await, SeatStatus::Available);

    assert!(h.service.seat_status(SHOW, &SeatId::new("Z9")).await.is_err());
}

#[tokio::test]
async fn test_claim_lost_to_expiry_cannot_be_booked() {
    let h = harness();

    h.service
        .claim_seats(SHOW, &ids(&["A1", "A2"]), UserId(7))
        .await
        .unwrap();

    let err = h
        .service
        .claim_seats(SHOW, &ids(&["A1"]), UserId(9))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Seat A1 unavailable: claimed by other");

    h.clock.advance(chrono::Duration::seconds(60));
    h.service.claim_seats(SHOW, &ids(&["A1"]), UserId(9)).await.unwrap();

    let (result, _) = book_with(&h, &["A1", "A2"], 7, payment(&["A1", "A2"], 7, "conf-7")).await;
    assert!(matches!(
        result,
        Err(ReservationError::PreconditionError { ref seat, .. }) if seat.as_ref().map(SeatId::as_str) == Some("A1")
    ));

    // The rejected booking left A2 exactly as user 7's claim wrote it.
    let a2 = h.ledger.get(SHOW, &SeatId::new("A2")).await.unwrap().unwrap();
    let claim = a2.claim.unwrap();
    assert_eq!(claim.user_id, UserId(7));
    assert_eq!(claim.expires_at, Utc.with_ymd_and_hms(2026, 1, 10, 19, 1, 0).unwrap());
    assert!(a2.booking.is_none());
    assert_eq!(status(&h, "A2").await, SeatStatus::Available);
}
