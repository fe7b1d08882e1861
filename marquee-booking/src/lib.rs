pub mod availability;
pub mod batch;
pub mod booking;
pub mod claim;
pub mod handshake;
pub mod memory;
pub mod service;

pub use availability::{Availability, AvailabilityQuery, AvailabilitySnapshot, CountSource};
pub use batch::SeatBatch;
pub use booking::{BookingCoordinator, BookingReceipt};
pub use claim::{ClaimCoordinator, ClaimReceipt};
pub use handshake::{HandshakeError, PaymentHandshake, PendingConfirmation};
pub use service::{ReservationService, Stores};
