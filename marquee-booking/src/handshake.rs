use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use marquee_core::{CorrelationKey, DeliveryOutcome, PaymentConfirmation};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("A booking attempt is already waiting on payment for {0}")]
    AlreadyWaiting(CorrelationKey),
    #[error("No payment confirmation within {0:?}")]
    Timeout(Duration),
}

struct Waiter {
    ticket: u64,
    slot: oneshot::Sender<PaymentConfirmation>,
}

/// Process-wide registry pairing booking attempts with payment confirmations.
///
/// Each correlation key has at most one waiter. A confirmation is handed over
/// through a one-shot slot and the entry is retired in the same step, so a
/// confirmation completes at most one booking.
#[derive(Default)]
pub struct PaymentHandshake {
    waiters: Mutex<HashMap<CorrelationKey, Waiter>>,
    tickets: AtomicU64,
}

impl PaymentHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<CorrelationKey, Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the single waiter for `key`.
    pub fn register(
        self: &Arc<Self>,
        key: CorrelationKey,
    ) -> Result<PendingConfirmation, HandshakeError> {
        let (tx, rx) = oneshot::channel();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);

        let mut waiters = self.waiters();
        if let Some(existing) = waiters.get(&key) {
            if !existing.slot.is_closed() {
                return Err(HandshakeError::AlreadyWaiting(key));
            }
        }
        waiters.insert(key.clone(), Waiter { ticket, slot: tx });
        drop(waiters);

        debug!("Waiting for payment confirmation {}", key);
        Ok(PendingConfirmation {
            registry: Arc::clone(self),
            key,
            ticket,
            slot: rx,
        })
    }

    /// Registers for `key` and suspends until a confirmation arrives or `timeout` elapses.
    pub async fn await_confirmation(
        self: &Arc<Self>,
        key: CorrelationKey,
        timeout: Duration,
    ) -> Result<PaymentConfirmation, HandshakeError> {
        self.register(key)?.wait(timeout).await
    }

    /// Hands `confirmation` to the waiter registered under `key`.
    ///
    /// A payload that names other seats or another user is still handed over,
    /// so the waiting booking fails right away instead of timing out, and is
    /// reported as rejected.
    pub fn deliver(&self, key: &CorrelationKey, confirmation: PaymentConfirmation) -> DeliveryOutcome {
        // The hand-off happens under the registry lock so a waiter timing out
        // retires either before the lookup or after the send.
        let mut waiters = self.waiters();
        let Some(waiter) = waiters.remove(key) else {
            debug!("No booking waiting on payment {}", key);
            return DeliveryOutcome::NoWaiter;
        };

        let outcome = if confirmation.matches(key) {
            DeliveryOutcome::Accepted
        } else {
            warn!(
                "Payment confirmation {} does not match waiter {}",
                confirmation.confirmation_id, key
            );
            DeliveryOutcome::RejectedMismatch
        };

        let delivered = waiter.slot.send(confirmation).is_ok();
        drop(waiters);

        if delivered {
            info!("Payment confirmation handed to booking {}", key);
            outcome
        } else {
            // The booking was dropped before the hand-off.
            DeliveryOutcome::NoWaiter
        }
    }

    pub fn pending(&self) -> usize {
        self.waiters().len()
    }

    fn retire(&self, key: &CorrelationKey, ticket: u64) {
        let mut waiters = self.waiters();
        if waiters.get(key).is_some_and(|w| w.ticket == ticket) {
            waiters.remove(key);
        }
    }
}

/// A registered waiter. Dropping it retires the registration.
pub struct PendingConfirmation {
    registry: Arc<PaymentHandshake>,
    key: CorrelationKey,
    ticket: u64,
    slot: oneshot::Receiver<PaymentConfirmation>,
}

impl PendingConfirmation {
    pub async fn wait(mut self, timeout: Duration) -> Result<PaymentConfirmation, HandshakeError> {
        match tokio::time::timeout(timeout, &mut self.slot).await {
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(_)) => Err(HandshakeError::Timeout(timeout)),
            Err(_) => {
                // Once retired no delivery can reach this slot; pick up one that
                // landed just before.
                self.registry.retire(&self.key, self.ticket);
                self.slot
                    .try_recv()
                    .map_err(|_| HandshakeError::Timeout(timeout))
            }
        }
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        self.registry.retire(&self.key, self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::{SeatId, UserId};

    fn key(seats: &[&str], user: i64) -> CorrelationKey {
        let seats: Vec<SeatId> = seats.iter().map(|s| SeatId::new(*s)).collect();
        CorrelationKey::new(&seats, UserId(user))
    }

    fn confirmation(seats: &[&str], user: i64, id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            seat_ids: seats.iter().map(|s| SeatId::new(*s)).collect(),
            user_id: UserId(user),
            price: 50,
            confirmation_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_delivery_reaches_waiter_once() {
        let handshake = Arc::new(PaymentHandshake::new());
        let pending = handshake.register(key(&["B1"], 3)).unwrap();

        let first = handshake.deliver(&key(&["B1"], 3), confirmation(&["B1"], 3, "c-1"));
        let second = handshake.deliver(&key(&["B1"], 3), confirmation(&["B1"], 3, "c-2"));
        assert_eq!(first, DeliveryOutcome::Accepted);
        assert_eq!(second, DeliveryOutcome::NoWaiter);

        let received = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.confirmation_id, "c-1");
        assert_eq!(handshake.pending(), 0);
    }

    #[tokio::test]
    async fn test_second_waiter_for_same_key_is_refused() {
        let handshake = Arc::new(PaymentHandshake::new());
        let _pending = handshake.register(key(&["A1", "A2"], 7)).unwrap();

        let err = handshake.register(key(&["A2", "A1"], 7)).err().unwrap();
        assert!(matches!(err, HandshakeError::AlreadyWaiting(_)));

        // Another user on the same seats is a different key.
        assert!(handshake.register(key(&["A1", "A2"], 9)).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_retires_registration() {
        let handshake = Arc::new(PaymentHandshake::new());

        let err = handshake
            .await_confirmation(key(&["A1"], 7), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::Timeout(Duration::from_millis(20)));
        assert_eq!(handshake.pending(), 0);

        let late = handshake.deliver(&key(&["A1"], 7), confirmation(&["A1"], 7, "late"));
        assert_eq!(late, DeliveryOutcome::NoWaiter);
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_rejected_but_wakes_waiter() {
        let handshake = Arc::new(PaymentHandshake::new());
        let pending = handshake.register(key(&["A1", "A2"], 7)).unwrap();

        let outcome = handshake.deliver(&key(&["A1", "A2"], 7), confirmation(&["A1"], 7, "c-9"));
        assert_eq!(outcome, DeliveryOutcome::RejectedMismatch);

        let received = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert!(!received.matches(&key(&["A1", "A2"], 7)));
    }

    #[tokio::test]
    async fn test_dropped_waiter_frees_key() {
        let handshake = Arc::new(PaymentHandshake::new());
        let pending = handshake.register(key(&["A1"], 7)).unwrap();
        drop(pending);

        assert_eq!(handshake.pending(), 0);
        assert!(handshake.register(key(&["A1"], 7)).is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_complete_one_waiter() {
        let handshake = Arc::new(PaymentHandshake::new());
        let pending = handshake.register(key(&["C1"], 5)).unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let handshake = Arc::clone(&handshake);
            tasks.push(tokio::spawn(async move {
                handshake.deliver(&key(&["C1"], 5), confirmation(&["C1"], 5, &format!("c-{i}")))
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() == DeliveryOutcome::Accepted {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert!(pending.wait(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_delivery_racing_timeout_is_never_lost() {
        for _ in 0..200 {
            let handshake = Arc::new(PaymentHandshake::new());
            let pending = handshake.register(key(&["D1"], 2)).unwrap();

            let deliverer = {
                let handshake = Arc::clone(&handshake);
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    handshake.deliver(&key(&["D1"], 2), confirmation(&["D1"], 2, "c-race"))
                })
            };
            let waited = pending.wait(Duration::from_micros(1)).await;
            let outcome = deliverer.await.unwrap();

            // Accepted exactly when the waiter received the payload.
            assert_eq!(outcome == DeliveryOutcome::Accepted, waited.is_ok());
            assert_eq!(handshake.pending(), 0);
        }
    }
}
