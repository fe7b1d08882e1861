use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use marquee_core::{DeliveryOutcome, ReservationError, ReservationResult};

/// Counters behind `GET /metrics`. Owns its registry so tests can build as many as they like.
pub struct ReservationMetrics {
    registry: Registry,
    requests: IntCounterVec,
    deliveries: IntCounterVec,
    pending_payments: IntGauge,
}

impl ReservationMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "marquee_reservation_requests_total",
                "Reservation operations by outcome",
            ),
            &["operation", "outcome"],
        )?;
        let deliveries = IntCounterVec::new(
            Opts::new(
                "marquee_payment_deliveries_total",
                "Payment confirmations handed to the handshake, by outcome",
            ),
            &["source", "outcome"],
        )?;
        let pending_payments = IntGauge::new(
            "marquee_pending_payments",
            "Booking attempts currently waiting on a payment confirmation",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(pending_payments.clone()))?;

        Ok(Self {
            registry,
            requests,
            deliveries,
            pending_payments,
        })
    }

    pub fn observe<T>(&self, operation: &str, result: &ReservationResult<T>) {
        self.requests
            .with_label_values(&[operation, outcome_label(result)])
            .inc();
    }

    pub fn observe_delivery(&self, source: &str, outcome: DeliveryOutcome) {
        let outcome = match outcome {
            DeliveryOutcome::Accepted => "accepted",
            DeliveryOutcome::RejectedMismatch => "rejected_mismatch",
            DeliveryOutcome::NoWaiter => "no_waiter",
        };
        self.deliveries.with_label_values(&[source, outcome]).inc();
    }

    pub fn set_pending_payments(&self, pending: usize) {
        self.pending_payments.set(pending as i64);
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn outcome_label<T>(result: &ReservationResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ReservationError::ValidationError(_)) => "validation",
        Err(ReservationError::ConflictError { .. }) => "conflict",
        Err(ReservationError::PreconditionError { .. }) => "precondition",
        Err(ReservationError::TimeoutError(_)) => "timeout",
        Err(ReservationError::TransientError(_)) => "transient",
    }
}
