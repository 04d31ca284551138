//! Payment gateway capability.

use async_trait::async_trait;
use common::Money;
use domain::PaymentMethod;
use thiserror::Error;

/// A failed gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered and declined the charge.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The gateway could not be reached or answered garbage.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// A successful gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// Gateway-assigned transaction id, e.g. `TXN-AB12CD34`.
    pub transaction_id: String,
    /// Raw response text kept on the payment row for support lookups.
    pub raw: String,
}

/// The external charge capability the payment orchestrator calls through.
///
/// Calls are bounded by the orchestrator's attempt timeout; an elapsed
/// timeout counts as a failed attempt and frees the worker slot.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, amount: Money, method: PaymentMethod)
        -> Result<GatewayResponse, GatewayError>;
}

/// Scripted in-memory gateway for tests and local runs.
///
/// Succeeds by default; [`fail_next`] queues a number of declines, after
/// which it succeeds again. Every call is recorded.
///
/// [`fail_next`]: InMemoryPaymentGateway::fail_next
#[derive(Debug, Default)]
pub struct InMemoryPaymentGateway {
    state: tokio::sync::Mutex<GatewayState>,
}

#[derive(Debug, Default)]
struct GatewayState {
    failures_remaining: u32,
    charges: Vec<(Money, PaymentMethod)>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next `count` charges to be declined.
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.failures_remaining = count;
    }

    /// Number of charge calls made so far.
    pub async fn charge_count(&self) -> usize {
        self.state.lock().await.charges.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut state = self.state.lock().await;
        state.charges.push((amount, method));
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(GatewayError::Declined("insufficient funds".to_string()));
        }
        let transaction_id = format!(
            "TXN-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
        );
        Ok(GatewayResponse {
            raw: format!("approved {transaction_id} for {amount}"),
            transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.fail_next(1).await;

        let declined = gateway
            .charge(Money::from_cents(1000), PaymentMethod::CreditCard)
            .await;
        assert!(matches!(declined, Err(GatewayError::Declined(_))));

        let approved = gateway
            .charge(Money::from_cents(1000), PaymentMethod::CreditCard)
            .await
            .unwrap();
        assert!(approved.transaction_id.starts_with("TXN-"));
        assert_eq!(gateway.charge_count().await, 2);
    }
}
