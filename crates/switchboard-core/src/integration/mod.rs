//! Integration layer - contracts with the outside world.
//!
//! - Outbound request and platform response model
//! - The delivery collaborator and result observation

pub mod delivery;
pub mod outbound;

pub use delivery::{
    BoxedDelivery, BoxedObserver, Delivery, DeliveryFn, DeliveryReport, LoggingObserver,
    ResultObserver, delivery_fn,
};
pub use outbound::{ApiResponse, OutboundRequest};
