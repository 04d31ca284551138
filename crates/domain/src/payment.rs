//! Payment entity, retry bookkeeping and status state machine.

use chrono::{DateTime, Duration, Utc};
use common::{CustomerId, Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment.
///
/// Transitions:
/// ```text
/// Pending ──► Processing ──┬──► Completed ──► Refunded
///    │            ▲        └──► Failed ──► (retry, while attempts remain)
///    │            └────────────────┘
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Returns true if an attempt may start from this status.
    pub fn can_begin_attempt(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Refunded | PaymentStatus::Cancelled
        )
    }

    /// Returns the status name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
    CashOnDelivery,
    DigitalWallet,
}

/// A payment row. Owned by the Payment Orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub payment_number: String,
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<String>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Set only when entering Failed with retries remaining.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped by the repository on update.
    pub version: u64,
}

impl Payment {
    /// Creates a new payment in `Pending` with a generated payment number.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        order_number: impl Into<String>,
        customer_id: CustomerId,
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
        customer_phone: impl Into<String>,
        amount: Money,
        method: PaymentMethod,
        max_retries: u32,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            payment_number: generate_payment_number(),
            order_id,
            order_number: order_number.into(),
            customer_id,
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_phone: customer_phone.into(),
            amount,
            method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            gateway_response: None,
            failure_reason: None,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 0,
        }
    }

    /// Returns true if a retry is still permitted: the payment is Failed
    /// and attempts remain. Once `retry_count == max_retries` this is false
    /// permanently.
    pub fn can_retry(&self) -> bool {
        self.status == PaymentStatus::Failed && self.retry_count < self.max_retries
    }

    /// Starts an attempt: Pending/Failed -> Processing.
    pub fn begin_attempt(&mut self) -> Result<(), DomainError> {
        if !self.status.can_begin_attempt() {
            return Err(DomainError::invalid_transition(
                "Payment",
                self.status,
                PaymentStatus::Processing,
            ));
        }
        self.status = PaymentStatus::Processing;
        self.next_retry_at = None;
        Ok(())
    }

    /// Starts a retry attempt: requires [`can_retry`], increments
    /// `retry_count` and moves to Processing.
    ///
    /// [`can_retry`]: Payment::can_retry
    pub fn begin_retry(&mut self) -> Result<(), DomainError> {
        if !self.can_retry() {
            return Err(DomainError::Validation(format!(
                "payment {} is not retryable (status {}, attempt {}/{})",
                self.payment_number, self.status, self.retry_count, self.max_retries
            )));
        }
        self.retry_count += 1;
        self.begin_attempt()
    }

    /// Completes the attempt: Processing -> Completed.
    pub fn complete(&mut self, transaction_id: impl Into<String>) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Processing {
            return Err(DomainError::invalid_transition(
                "Payment",
                self.status,
                PaymentStatus::Completed,
            ));
        }
        self.status = PaymentStatus::Completed;
        self.transaction_id = Some(transaction_id.into());
        self.completed_at = Some(Utc::now());
        self.failure_reason = None;
        self.next_retry_at = None;
        Ok(())
    }

    /// Fails the attempt: Processing -> Failed. Schedules the next retry
    /// window only while attempts remain; an exhausted payment stays Failed
    /// with no `next_retry_at` and requires external intervention.
    pub fn fail(&mut self, reason: impl Into<String>, backoff: Duration) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Processing {
            return Err(DomainError::invalid_transition(
                "Payment",
                self.status,
                PaymentStatus::Failed,
            ));
        }
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.next_retry_at = if self.retry_count < self.max_retries {
            Some(Utc::now() + backoff)
        } else {
            None
        };
        Ok(())
    }

    /// Returns true if this payment is due for a retry sweep at `now`.
    pub fn retry_due(&self, now: DateTime<Utc>) -> bool {
        self.can_retry() && self.next_retry_at.is_some_and(|at| at <= now)
    }
}

/// Generates a unique payment number, e.g. `PAY-1700000000000-AB12CD34`.
pub fn generate_payment_number() -> String {
    format!(
        "PAY-{}-{}",
        Utc::now().timestamp_millis(),
        &uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payment() -> Payment {
        Payment::new(
            OrderId::new(),
            "ORD-1",
            CustomerId::new(),
            "Jane Doe",
            "jane@example.com",
            "+1-555-0100",
            Money::from_cents(2500),
            PaymentMethod::default(),
            3,
        )
    }

    #[test]
    fn new_payment_is_pending_with_zero_retries() {
        let payment = sample_payment();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.retry_count, 0);
        assert_eq!(payment.method, PaymentMethod::CreditCard);
        assert!(payment.payment_number.starts_with("PAY-"));
    }

    #[test]
    fn attempt_completes_with_transaction_id() {
        let mut payment = sample_payment();
        payment.begin_attempt().unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);

        payment.complete("TXN-123").unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.transaction_id.as_deref(), Some("TXN-123"));
        assert!(payment.completed_at.is_some());
    }

    #[test]
    fn failure_schedules_retry_window_while_attempts_remain() {
        let mut payment = sample_payment();
        payment.begin_attempt().unwrap();
        payment.fail("gateway declined", Duration::minutes(5)).unwrap();

        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("gateway declined"));
        let next = payment.next_retry_at.expect("retry window expected");
        let delta = next - Utc::now();
        assert!(delta > Duration::minutes(4) && delta <= Duration::minutes(5));
    }

    #[test]
    fn exhausted_failure_has_no_retry_window() {
        let mut payment = sample_payment();
        payment.retry_count = payment.max_retries;
        payment.status = PaymentStatus::Processing;
        payment.fail("declined again", Duration::minutes(5)).unwrap();

        assert!(payment.next_retry_at.is_none());
        assert!(!payment.can_retry());
    }

    #[test]
    fn retry_count_never_exceeds_max_retries() {
        let mut payment = sample_payment();
        payment.begin_attempt().unwrap();
        payment.fail("declined", Duration::minutes(5)).unwrap();

        while payment.can_retry() {
            payment.begin_retry().unwrap();
            payment.fail("declined", Duration::minutes(5)).unwrap();
        }

        assert_eq!(payment.retry_count, payment.max_retries);
        assert!(!payment.can_retry());
        assert!(payment.begin_retry().is_err());
        assert!(payment.next_retry_at.is_none());
    }

    #[test]
    fn completed_payment_rejects_new_attempts() {
        let mut payment = sample_payment();
        payment.begin_attempt().unwrap();
        payment.complete("TXN-1").unwrap();

        let err = payment.begin_attempt().unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn retry_due_respects_window() {
        let mut payment = sample_payment();
        payment.begin_attempt().unwrap();
        payment.fail("declined", Duration::minutes(5)).unwrap();

        assert!(!payment.retry_due(Utc::now()));
        assert!(payment.retry_due(Utc::now() + Duration::minutes(6)));
    }

    #[test]
    fn pending_payment_is_not_retry_eligible() {
        let payment = sample_payment();
        assert!(!payment.can_retry());
    }
}
