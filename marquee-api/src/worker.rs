use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use marquee_booking::ReservationService;
use marquee_core::{CorrelationKey, PaymentConfirmation};

use crate::metrics::ReservationMetrics;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message has no payload")]
    EmptyPayload,
    #[error("invalid payment confirmation: {0}")]
    Payload(#[from] serde_json::Error),
}

pub struct PaymentWorkerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
}

/// Consumes payment confirmations and hands each one to the waiting booking.
///
/// Runs until `shutdown` flips to `true`.
pub async fn start_payment_worker(
    config: PaymentWorkerConfig,
    reservations: Arc<ReservationService>,
    metrics: Arc<ReservationMetrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "latest")
        .create()?;

    consumer.subscribe(&[config.topic.as_str()])?;
    info!("Payment worker started, listening on {}", config.topic);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Payment worker shutting down");
                    return Ok(());
                }
            }
            received = consumer.recv() => match received {
                Err(e) => error!("Kafka error: {}", e),
                Ok(m) => match decode_message(m.key(), m.payload()) {
                    Ok((key, confirmation)) => {
                        let confirmation_id = confirmation.confirmation_id.clone();
                        let outcome = match key {
                            Some(key) => reservations.deliver_payment_confirmation_to(&key, confirmation),
                            None => reservations.deliver_payment_confirmation(confirmation),
                        };
                        debug!("Payment confirmation {} delivered: {:?}", confirmation_id, outcome);
                        metrics.observe_delivery("kafka", outcome);
                    }
                    Err(e) => warn!(
                        "Dropping message at {}/{} offset {}: {}",
                        m.topic(),
                        m.partition(),
                        m.offset(),
                        e
                    ),
                },
            },
        }
    }
}

/// Splits a broker message into its optional explicit correlation key and the payload.
///
/// An unreadable key falls back to the key derived from the payload.
pub fn decode_message(
    key: Option<&[u8]>,
    payload: Option<&[u8]>,
) -> Result<(Option<CorrelationKey>, PaymentConfirmation), DecodeError> {
    let payload = payload.ok_or(DecodeError::EmptyPayload)?;
    let confirmation: PaymentConfirmation = serde_json::from_slice(payload)?;

    let key = key.and_then(|raw| {
        let parsed = std::str::from_utf8(raw).ok().and_then(CorrelationKey::parse);
        if parsed.is_none() {
            warn!(
                "Unreadable correlation key on confirmation {}, deriving from payload",
                confirmation.confirmation_id
            );
        }
        parsed
    });
    Ok((key, confirmation))
}
