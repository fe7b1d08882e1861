use std::sync::Arc;

use marquee_booking::ReservationService;

use crate::metrics::ReservationMetrics;

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationService>,
    pub metrics: Arc<ReservationMetrics>,
}

impl AppState {
    pub fn new(reservations: Arc<ReservationService>, metrics: Arc<ReservationMetrics>) -> Self {
        Self {
            reservations,
            metrics,
        }
    }
}
