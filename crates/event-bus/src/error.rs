//! Bus error types.

use thiserror::Error;

/// Errors that can occur in the bus client.
#[derive(Debug, Error)]
pub enum BusError {
    /// Envelope could not be serialized to its wire form.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A message could not be handed to the transport.
    #[error("Publish failed on topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// A subscription could not be registered.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}
