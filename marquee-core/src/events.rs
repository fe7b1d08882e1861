use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reservation::{SeatId, ShowId, UserId};

pub const BOOKING_CONFIRMED: &str = "booking.confirmed";

/// Published after a booking batch committed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmed {
    pub show_id: ShowId,
    pub seat_ids: Vec<SeatId>,
    pub user_id: UserId,
    pub booking_confirmation_id: Uuid,
    pub payment_confirmation_id: String,
    pub booked_at: DateTime<Utc>,
}
