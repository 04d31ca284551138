//! Domain entities for the choreography engine.
//!
//! Order, Payment and Notification are created once and move monotonically
//! through their state machines until a terminal state; no entity is ever
//! deleted. All mutation goes through explicit transition methods that
//! validate legality, and every persisted row carries a version for
//! optimistic-concurrency updates.

pub mod error;
pub mod memory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod repository;

pub use error::DomainError;
pub use memory::{InMemoryNotificationRepository, InMemoryOrderRepository, InMemoryPaymentRepository};
pub use notification::{Notification, NotificationStatus, NotificationType};
pub use order::{CustomerContact, Order, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use repository::{NotificationRepository, OrderRepository, PaymentRepository};

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
