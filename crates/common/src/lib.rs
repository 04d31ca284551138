//! Shared types used across the choreography engine.
//!
//! Identifier newtypes keep the different UUID-based ids from being mixed
//! up at compile time; `Money` keeps amounts in integer cents.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CustomerId, EventId, NotificationId, OrderId, PaymentId};
