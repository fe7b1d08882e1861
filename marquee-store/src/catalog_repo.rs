use async_trait::async_trait;
use sqlx::PgPool;

use marquee_core::repository::{LedgerError, ShowCatalog};
use marquee_core::{SeatId, ShowId};

use crate::error::StoreError;

/// Reads the venue tables (`shows`, `seats`). Provisioning writes them; this side never does.
#[derive(Clone)]
pub struct PgShowCatalog {
    pool: PgPool,
}

impl PgShowCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, show_id: ShowId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shows WHERE id = $1)")
            .bind(show_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn missing_seats(&self, show_id: ShowId, seat_ids: &[SeatId]) -> Result<Vec<SeatId>, StoreError> {
        let requested: Vec<&str> = seat_ids.iter().map(SeatId::as_str).collect();
        let missing: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.seat_id
            FROM UNNEST($2::text[]) AS r(seat_id)
            WHERE NOT EXISTS (
                SELECT 1
                FROM shows sh
                JOIN seats st ON st.hall_id = sh.hall_id
                WHERE sh.id = $1 AND st.seat_id = r.seat_id
            )
            "#,
        )
        .bind(show_id.0)
        .bind(&requested)
        .fetch_all(&self.pool)
        .await?;
        Ok(missing.into_iter().map(SeatId::new).collect())
    }

    async fn capacity(&self, show_id: ShowId) -> Result<Option<u64>, StoreError> {
        let capacity: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT COUNT(st.seat_id)
            FROM shows sh
            LEFT JOIN seats st ON st.hall_id = sh.hall_id
            WHERE sh.id = $1
            GROUP BY sh.id
            "#,
        )
        .bind(show_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(capacity.map(|c| c.max(0) as u64))
    }
}

#[async_trait]
impl ShowCatalog for PgShowCatalog {
    async fn show_exists(&self, show_id: ShowId) -> Result<bool, LedgerError> {
        Ok(self.exists(show_id).await?)
    }

    async fn unknown_seats(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<Vec<SeatId>, LedgerError> {
        Ok(self.missing_seats(show_id, seat_ids).await?)
    }

    async fn seat_capacity(&self, show_id: ShowId) -> Result<Option<u64>, LedgerError> {
        Ok(self.capacity(show_id).await?)
    }
}
