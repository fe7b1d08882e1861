pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod error;
pub mod events;
pub mod ledger_repo;
pub mod redis_repo;

pub use app_config::Config;
pub use catalog_repo::PgShowCatalog;
pub use database::DbClient;
pub use error::StoreError;
pub use events::EventProducer;
pub use ledger_repo::PgSeatLedger;
pub use redis_repo::RedisClient;
