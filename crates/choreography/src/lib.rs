//! The choreography services: the order lifecycle manager, the payment
//! orchestrator, the notification dispatcher and the retry scheduler, plus
//! the bounded worker pool and the external-capability seams (payment
//! gateway, notification channels) they call through.
//!
//! Each service owns its entity rows and talks to the others only via the
//! event bus. The retry scheduler operates out-of-band on persisted state.

pub mod channels;
pub mod dispatcher;
pub mod gateway;
pub mod order_manager;
pub mod payment;
pub mod scheduler;
pub mod worker;

pub use channels::{ChannelError, InMemoryChannel, NotificationChannel};
pub use dispatcher::NotificationDispatcher;
pub use gateway::{GatewayError, GatewayResponse, InMemoryPaymentGateway, PaymentGateway};
pub use order_manager::{NewOrder, NewOrderItem, OrderLifecycleManager};
pub use payment::{PaymentOrchestrator, RetryPolicy};
pub use scheduler::RetryScheduler;
pub use worker::WorkerPool;
