use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use marquee_core::reservation::{BookingRecord, Claim};
use marquee_core::repository::{LedgerBatch, LedgerError, SeatLedger};
use marquee_core::{ReservationId, SeatId, SeatReservation, ShowId, UserId};

use crate::error::StoreError;

const RESERVATION_COLUMNS: &str = "id, show_id, seat_id, claimed_by, claim_expires_at, \
     booked_by, booking_confirmation_id, payment_confirmation_id, booked_at";

/// Postgres-backed seat ledger. One row per (show, seat) in `seat_reservations`.
#[derive(Clone)]
pub struct PgSeatLedger {
    pool: PgPool,
}

impl PgSeatLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn open_batch(&self, show_id: ShowId, seat_ids: &[SeatId]) -> Result<PgBatch, StoreError> {
        let mut keyed: Vec<(ReservationId, &SeatId)> = seat_ids
            .iter()
            .map(|seat| (ReservationId::new(show_id, seat), seat))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let ids: Vec<String> = keyed.iter().map(|(id, _)| id.as_str().to_string()).collect();
        let seats: Vec<String> = keyed.iter().map(|(_, seat)| seat.as_str().to_string()).collect();

        let mut tx = self.pool.begin().await?;

        // Rows are created lazily, in lock order, the first time a seat is touched.
        sqlx::query(
            r#"
            INSERT INTO seat_reservations (id, show_id, seat_id)
            SELECT t.id, $1, t.seat_id
            FROM UNNEST($2::text[], $3::text[]) AS t(id, seat_id)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(show_id.0)
        .bind(&ids)
        .bind(&seats)
        .execute(&mut *tx)
        .await?;

        let locked: Vec<ReservationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM seat_reservations
            WHERE id = ANY($1)
            ORDER BY id COLLATE "C"
            FOR UPDATE
            "#
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        if locked.len() != ids.len() {
            return Err(LedgerError::BatchMismatch(format!(
                "locked {} of {} row(s) for show {}",
                locked.len(),
                ids.len(),
                show_id
            ))
            .into());
        }

        let rows = locked
            .into_iter()
            .map(SeatReservation::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Locked {} reservation row(s) of show {}", rows.len(), show_id);
        Ok(PgBatch { tx, rows })
    }

    async fn fetch(&self, show_id: ShowId, seat_id: &SeatId) -> Result<Option<SeatReservation>, StoreError> {
        let id = ReservationId::new(show_id, seat_id);
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM seat_reservations WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SeatReservation::try_from).transpose()?)
    }

    async fn booked(&self, show_id: ShowId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seat_reservations WHERE show_id = $1 AND booked_by IS NOT NULL",
        )
        .bind(show_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl SeatLedger for PgSeatLedger {
    async fn lock_batch(
        &self,
        show_id: ShowId,
        seat_ids: &[SeatId],
    ) -> Result<Box<dyn LedgerBatch>, LedgerError> {
        let batch = self.open_batch(show_id, seat_ids).await?;
        Ok(Box::new(batch))
    }

    async fn get(
        &self,
        show_id: ShowId,
        seat_id: &SeatId,
    ) -> Result<Option<SeatReservation>, LedgerError> {
        Ok(self.fetch(show_id, seat_id).await?)
    }

    async fn count_booked(&self, show_id: ShowId) -> Result<u64, LedgerError> {
        Ok(self.booked(show_id).await?)
    }
}

/// An open transaction holding `FOR UPDATE` locks on its rows.
pub struct PgBatch {
    tx: Transaction<'static, Postgres>,
    rows: Vec<SeatReservation>,
}

impl PgBatch {
    async fn write(mut self, rows: Vec<SeatReservation>) -> Result<(), StoreError> {
        let same_ids = rows.len() == self.rows.len()
            && rows.iter().zip(&self.rows).all(|(new, old)| new.id == old.id);
        if !same_ids {
            return Err(LedgerError::BatchMismatch(format!(
                "{} row(s) written for {} locked",
                rows.len(),
                self.rows.len()
            ))
            .into());
        }

        for row in &rows {
            let claim = row.claim.as_ref();
            let booking = row.booking.as_ref();
            sqlx::query(
                r#"
                UPDATE seat_reservations
                SET claimed_by = $2,
                    claim_expires_at = $3,
                    booked_by = $4,
                    booking_confirmation_id = $5,
                    payment_confirmation_id = $6,
                    booked_at = $7,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(row.id.as_str())
            .bind(claim.map(|c| c.user_id.0))
            .bind(claim.map(|c| c.expires_at))
            .bind(booking.map(|b| b.user_id.0))
            .bind(booking.map(|b| b.confirmation_id))
            .bind(booking.map(|b| b.payment_confirmation_id.as_str()))
            .bind(booking.map(|b| b.booked_at))
            .execute(&mut *self.tx)
            .await?;
        }

        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerBatch for PgBatch {
    fn rows(&self) -> &[SeatReservation] {
        &self.rows
    }

    async fn commit(self: Box<Self>, rows: Vec<SeatReservation>) -> Result<(), LedgerError> {
        Ok((*self).write(rows).await?)
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        let batch = *self;
        batch.tx.rollback().await.map_err(StoreError::from)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: String,
    show_id: i64,
    seat_id: String,
    claimed_by: Option<i64>,
    claim_expires_at: Option<DateTime<Utc>>,
    booked_by: Option<i64>,
    booking_confirmation_id: Option<Uuid>,
    payment_confirmation_id: Option<String>,
    booked_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRow> for SeatReservation {
    type Error = LedgerError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let show_id = ShowId(row.show_id);
        let seat_id = SeatId::new(row.seat_id);
        let id = ReservationId::new(show_id, &seat_id);
        if id.as_str() != row.id {
            return Err(LedgerError::Corrupt(
                id,
                format!("stored under foreign id {}", row.id),
            ));
        }

        let claim = match (row.claimed_by, row.claim_expires_at) {
            (Some(user), Some(expires_at)) => Some(Claim {
                user_id: UserId(user),
                expires_at,
            }),
            (None, None) => None,
            _ => return Err(LedgerError::Corrupt(id, "half-written claim".to_string())),
        };

        let booking = match (
            row.booked_by,
            row.booking_confirmation_id,
            row.payment_confirmation_id,
            row.booked_at,
        ) {
            (Some(user), Some(confirmation_id), Some(payment_confirmation_id), Some(booked_at)) => {
                Some(BookingRecord {
                    user_id: UserId(user),
                    confirmation_id,
                    payment_confirmation_id,
                    booked_at,
                })
            }
            (None, None, None, None) => None,
            _ => return Err(LedgerError::Corrupt(id, "half-written booking".to_string())),
        };

        Ok(SeatReservation {
            id,
            show_id,
            seat_id,
            claim,
            booking,
        })
    }
}
