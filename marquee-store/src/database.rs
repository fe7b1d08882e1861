use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::ReservationRules;
use crate::error::StoreError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays the `business_rules` table on top of the configured rules.
    pub async fn fetch_reservation_rules(
        &self,
        defaults: ReservationRules,
    ) -> Result<ReservationRules, sqlx::Error> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        Ok(apply_rules(defaults, rows))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// Rule values are stored as {"value": <number>}.
fn apply_rules(mut rules: ReservationRules, rows: Vec<(String, Value)>) -> ReservationRules {
    for (key, value) in rows {
        let Some(seconds) = value.get("value").and_then(Value::as_u64) else {
            warn!("Ignoring business rule {} with value {}", key, value);
            continue;
        };
        match key.as_str() {
            "claim_ttl_seconds" => rules.claim_ttl_seconds = seconds,
            "checkout_extension_seconds" => rules.checkout_extension_seconds = seconds,
            "payment_timeout_seconds" => rules.payment_timeout_seconds = seconds,
            _ => {}
        }
    }
    rules
}
