use axum::{
    extract::{Json, Path, State},
    routing::post,
    Router,
};

use marquee_booking::BookingReceipt;
use marquee_core::ShowId;

use crate::claims::SeatsRequest;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/shows/{show_id}/bookings", post(book_seats))
}

/// Holds the request open until the payment confirmation for these seats
/// arrives or the payment timeout elapses.
async fn book_seats(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<SeatsRequest>,
) -> Result<Json<BookingReceipt>, AppError> {
    let result = state
        .reservations
        .book_seats(ShowId(show_id), &req.seat_ids, req.user_id)
        .await;
    state.metrics.observe("book", &result);
    Ok(Json(result?))
}
