use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use marquee_core::events::BookingConfirmed;
use marquee_core::repository::{EventPublisher, PublishError};

use crate::error::StoreError;

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    bookings_topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, bookings_topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            bookings_topic: bookings_topic.to_string(),
        })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    async fn publish_booking(&self, event: &BookingConfirmed) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        // Keyed by show so a show's bookings stay ordered on one partition.
        let key = event.show_id.to_string();
        self.publish(&self.bookings_topic, &key, &payload).await?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn booking_confirmed(&self, event: &BookingConfirmed) -> Result<(), PublishError> {
        Ok(self.publish_booking(event).await?)
    }
}
