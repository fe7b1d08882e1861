use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;

use marquee_booking::{Availability, AvailabilitySnapshot};
use marquee_core::{SeatId, SeatStatus, ShowId};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub show_id: ShowId,
    pub status: Availability,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows/{show_id}/availability", get(query_availability))
        .route("/v1/shows/{show_id}/availability/count", get(availability_count))
        .route("/v1/shows/{show_id}/availability/recount", post(recount_availability))
        .route("/v1/shows/{show_id}/seats/{seat_id}", get(seat_status))
}

/// Cache-only answer; `UNKNOWN` tells the caller to ask for a count.
async fn query_availability(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Json<AvailabilityResponse> {
    let show_id = ShowId(show_id);
    let status = state.reservations.query_availability(show_id).await;
    Json(AvailabilityResponse { show_id, status })
}

async fn availability_count(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<AvailabilitySnapshot>, AppError> {
    let result = state.reservations.availability_snapshot(ShowId(show_id)).await;
    state.metrics.observe("availability", &result);
    Ok(Json(result?))
}

async fn recount_availability(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<AvailabilitySnapshot>, AppError> {
    let result = state.reservations.recount_availability(ShowId(show_id)).await;
    state.metrics.observe("recount", &result);
    Ok(Json(result?))
}

async fn seat_status(
    State(state): State<AppState>,
    Path((show_id, seat_id)): Path<(i64, String)>,
) -> Result<Json<SeatStatus>, AppError> {
    let status = state
        .reservations
        .seat_status(ShowId(show_id), &SeatId::new(seat_id))
        .await?;
    Ok(Json(status))
}
