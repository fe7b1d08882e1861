use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

use marquee_core::repository::{AvailabilityCache, CacheError, Decrement};
use marquee_core::ShowId;

use crate::error::StoreError;

// Returns nil on a missing counter so a miss is never seeded with a negative
// value; the next recount seeds it from the ledger. Otherwise returns
// {remaining, shortfall}, clamping at zero.
const DECREMENT_SCRIPT: &str = r#"
    local current = redis.call("GET", KEYS[1])
    if not current then
        return nil
    end
    current = tonumber(current)
    local seats = tonumber(ARGV[1])
    if current >= seats then
        return {redis.call("DECRBY", KEYS[1], seats), 0}
    end
    redis.call("SET", KEYS[1], 0)
    return {0, seats - current}
"#;

fn availability_key(show_id: ShowId) -> String {
    format!("show:{}:availability", show_id)
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn get_show_availability(&self, show_id: ShowId) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection().await?;
        let remaining: Option<u64> = conn.get(availability_key(show_id)).await?;
        Ok(remaining)
    }

    pub async fn set_show_availability(&self, show_id: ShowId, remaining: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(availability_key(show_id), remaining).await?;
        info!("Show {} availability set to {}", show_id, remaining);
        Ok(())
    }

    pub async fn decr_show_availability(&self, show_id: ShowId, seats: u64) -> Result<Decrement, StoreError> {
        let mut conn = self.connection().await?;
        let result: Option<(u64, u64)> = redis::Script::new(DECREMENT_SCRIPT)
            .key(availability_key(show_id))
            .arg(seats)
            .invoke_async(&mut conn)
            .await?;

        Ok(match result {
            None => Decrement::Missing,
            Some((_, shortfall)) if shortfall > 0 => Decrement::Clamped { shortfall },
            Some((remaining, _)) => Decrement::Applied { remaining },
        })
    }

    pub async fn delete_show_availability(&self, show_id: ShowId) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(availability_key(show_id)).await?;
        debug!("Show {} availability counter dropped", show_id);
        Ok(())
    }
}

#[async_trait]
impl AvailabilityCache for RedisClient {
    async fn remaining(&self, show_id: ShowId) -> Result<Option<u64>, CacheError> {
        Ok(self.get_show_availability(show_id).await?)
    }

    async fn seed(&self, show_id: ShowId, remaining: u64) -> Result<(), CacheError> {
        Ok(self.set_show_availability(show_id, remaining).await?)
    }

    async fn decrement(&self, show_id: ShowId, seats: u64) -> Result<Decrement, CacheError> {
        Ok(self.decr_show_availability(show_id, seats).await?)
    }

    async fn invalidate(&self, show_id: ShowId) -> Result<(), CacheError> {
        Ok(self.delete_show_availability(show_id).await?)
    }
}
