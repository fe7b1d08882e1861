use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use marquee_core::{CorrelationKey, DeliveryOutcome, PaymentConfirmation};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    /// Explicit `"<user>:<seat>,<seat>"` key. Derived from the payload when absent.
    #[serde(default)]
    pub correlation_key: Option<String>,
    #[serde(flatten)]
    pub confirmation: PaymentConfirmation,
}

#[derive(Debug, Serialize)]
pub struct DeliverResponse {
    pub outcome: DeliveryOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/confirmations", post(deliver_confirmation))
}

async fn deliver_confirmation(
    State(state): State<AppState>,
    Json(req): Json<DeliverRequest>,
) -> Result<Json<DeliverResponse>, AppError> {
    let confirmation_id = req.confirmation.confirmation_id.clone();
    let outcome = match req.correlation_key.as_deref() {
        Some(raw) => {
            let key = CorrelationKey::parse(raw).ok_or_else(|| {
                AppError::ValidationError(format!("malformed correlation key {raw:?}"))
            })?;
            state
                .reservations
                .deliver_payment_confirmation_to(&key, req.confirmation)
        }
        None => state.reservations.deliver_payment_confirmation(req.confirmation),
    };

    info!("Payment confirmation {} delivered: {:?}", confirmation_id, outcome);
    state.metrics.observe_delivery("http", outcome);
    Ok(Json(DeliverResponse { outcome }))
}
