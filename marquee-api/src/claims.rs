use axum::{
    extract::{Json, Path, State},
    routing::post,
    Router,
};
use serde::Deserialize;

use marquee_booking::ClaimReceipt;
use marquee_core::{SeatId, ShowId, UserId};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SeatsRequest {
    pub seat_ids: Vec<SeatId>,
    pub user_id: UserId,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows/{show_id}/claims", post(claim_seats))
        .route("/v1/shows/{show_id}/claims/extend", post(extend_claim))
}

async fn claim_seats(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<SeatsRequest>,
) -> Result<Json<ClaimReceipt>, AppError> {
    let result = state
        .reservations
        .claim_seats(ShowId(show_id), &req.seat_ids, req.user_id)
        .await;
    state.metrics.observe("claim", &result);
    Ok(Json(result?))
}

/// Called right before checkout; pushes the user's claims out by the checkout extension.
async fn extend_claim(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(req): Json<SeatsRequest>,
) -> Result<Json<ClaimReceipt>, AppError> {
    let result = state
        .reservations
        .extend_claim(ShowId(show_id), &req.seat_ids, req.user_id)
        .await;
    state.metrics.observe("extend", &result);
    Ok(Json(result?))
}
