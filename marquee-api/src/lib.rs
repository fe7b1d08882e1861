use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod availability;
pub mod bookings;
pub mod claims;
pub mod error;
pub mod metrics;
pub mod payments;
pub mod state;
pub mod worker;

pub use metrics::ReservationMetrics;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::USER_AGENT]);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .merge(claims::routes())
        .merge(bookings::routes())
        .merge(payments::routes())
        .merge(availability::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .set_pending_payments(state.reservations.handshake().pending());
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
