//! Public-facing entry points: the booking write path and the status read path.

pub mod booking;
pub mod status;

pub use booking::{BookingGateway, BookingReceipt, BookingRequest};
pub use status::{PublicStatusGateway, StatusQuery, StatusView};
