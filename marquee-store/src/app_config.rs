use serde::Deserialize;
use std::env;
use std::time::Duration;

use marquee_core::ReservationSettings;

use crate::error::StoreError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub reservation: ReservationRules,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ReservationRules {
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl_seconds: u64,
    #[serde(default = "default_checkout_extension")]
    pub checkout_extension_seconds: u64,
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_seconds: u64,
}

fn default_claim_ttl() -> u64 { 60 }
fn default_checkout_extension() -> u64 { 120 }
fn default_payment_timeout() -> u64 { 30 }

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            claim_ttl_seconds: default_claim_ttl(),
            checkout_extension_seconds: default_checkout_extension(),
            payment_timeout_seconds: default_payment_timeout(),
        }
    }
}

impl From<&ReservationRules> for ReservationSettings {
    fn from(rules: &ReservationRules) -> Self {
        ReservationSettings {
            claim_ttl: Duration::from_secs(rules.claim_ttl_seconds),
            checkout_extension: Duration::from_secs(rules.checkout_extension_seconds),
            payment_timeout: Duration::from_secs(rules.payment_timeout_seconds),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub payment_confirmations_topic: String,
    pub bookings_topic: String,
}

impl Config {
    pub fn load() -> Result<Self, StoreError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment and local overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `MARQUEE__RESERVATION__CLAIM_TTL_SECONDS=120`
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn reservation_settings(&self) -> ReservationSettings {
        ReservationSettings::from(&self.reservation)
    }
}
