//! Payment orchestrator.
//!
//! Consumes `ORDER_CREATED`, owns payment rows, and drives each payment
//! through attempt/retry against the gateway. Attempt outcomes are recorded
//! on the row and announced only via `PAYMENT_COMPLETED` / `PAYMENT_FAILED`
//! events; a declined charge is a successful handler run, not a redelivery.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::PaymentId;
use domain::{DomainError, Payment, PaymentMethod, PaymentRepository};
use event_bus::{
    BusMessage, Envelope, EventBus, EventHandler, EventPayload, EventType, HandlerError,
    PaymentPayload, ProcessedEvents, Topic,
};

use crate::gateway::PaymentGateway;
use crate::worker::WorkerPool;

/// Service name stamped on published envelopes.
const SOURCE: &str = "payment-service";

/// Retry and timeout policy for payment attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts allowed after the first failure.
    pub max_retries: u32,
    /// Delay before a failed payment becomes eligible for the retry sweep.
    pub backoff: chrono::Duration,
    /// Upper bound on one gateway call; elapsed means the attempt failed.
    pub attempt_timeout: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: chrono::Duration::minutes(5),
            attempt_timeout: std::time::Duration::from_secs(10),
        }
    }
}

/// Owns the payment rows and the payment topics.
pub struct PaymentOrchestrator {
    repo: Arc<dyn PaymentRepository>,
    bus: Arc<dyn EventBus>,
    gateway: Arc<dyn PaymentGateway>,
    workers: WorkerPool,
    processed: ProcessedEvents,
    policy: RetryPolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        repo: Arc<dyn PaymentRepository>,
        bus: Arc<dyn EventBus>,
        gateway: Arc<dyn PaymentGateway>,
        workers: WorkerPool,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repo,
            bus,
            gateway,
            workers,
            processed: ProcessedEvents::new(),
            policy,
        }
    }

    /// Topics this orchestrator consumes.
    pub fn topics() -> Vec<Topic> {
        vec![Topic::OrderCreated]
    }

    pub async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        self.repo.find_by_id(id).await
    }

    /// Re-drives a failed payment. Only legal while `can_retry()` holds;
    /// the retry counts against `max_retries`.
    #[tracing::instrument(skip(self), fields(payment_id = %id))]
    pub async fn retry_payment(&self, id: PaymentId) -> Result<Payment, DomainError> {
        let mut payment = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Payment", id))?;
        payment.begin_retry()?;
        let payment = self.repo.update(payment).await?;

        tracing::info!(
            payment_number = %payment.payment_number,
            attempt = payment.retry_count,
            max_retries = payment.max_retries,
            "retrying payment"
        );
        metrics::counter!("payment_retries_total").increment(1);
        self.publish_event(EventType::PaymentProcessing, &payment).await;
        self.execute_attempt(payment).await
    }

    /// First attempt for a fresh payment: Pending -> Processing, then the
    /// gateway call.
    async fn attempt(&self, mut payment: Payment) -> Result<Payment, DomainError> {
        payment.begin_attempt()?;
        let payment = self.repo.update(payment).await?;
        self.publish_event(EventType::PaymentProcessing, &payment).await;
        self.execute_attempt(payment).await
    }

    /// Runs the gateway call for a payment already persisted as Processing
    /// and records the outcome. Declines, timeouts and pool saturation all
    /// land in `Failed`; only storage errors propagate.
    async fn execute_attempt(&self, mut payment: Payment) -> Result<Payment, DomainError> {
        let _slot = match self.workers.try_acquire() {
            Ok(slot) => slot,
            Err(saturated) => {
                tracing::warn!(payment_number = %payment.payment_number, %saturated, "payment attempt rejected");
                return self.record_failure(payment, saturated.to_string()).await;
            }
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.policy.attempt_timeout,
            self.gateway.charge(payment.amount, payment.method),
        )
        .await;
        metrics::histogram!("payment_gateway_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(response)) => {
                payment.complete(response.transaction_id)?;
                payment.gateway_response = Some(response.raw);
                let payment = self.repo.update(payment).await?;

                tracing::info!(
                    payment_number = %payment.payment_number,
                    transaction_id = ?payment.transaction_id,
                    "payment completed"
                );
                metrics::counter!("payments_completed_total").increment(1);
                self.publish_event(EventType::PaymentCompleted, &payment).await;
                Ok(payment)
            }
            Ok(Err(error)) => self.record_failure(payment, error.to_string()).await,
            Err(_) => {
                let reason = format!(
                    "gateway call exceeded {}ms",
                    self.policy.attempt_timeout.as_millis()
                );
                self.record_failure(payment, reason).await
            }
        }
    }

    async fn record_failure(
        &self,
        mut payment: Payment,
        reason: String,
    ) -> Result<Payment, DomainError> {
        payment.fail(reason, self.policy.backoff)?;
        let payment = self.repo.update(payment).await?;

        tracing::warn!(
            payment_number = %payment.payment_number,
            reason = payment.failure_reason.as_deref().unwrap_or_default(),
            attempt = payment.retry_count,
            next_retry_at = ?payment.next_retry_at,
            "payment attempt failed"
        );
        metrics::counter!("payments_failed_total").increment(1);
        self.publish_event(EventType::PaymentFailed, &payment).await;
        Ok(payment)
    }

    async fn publish_event(&self, event_type: EventType, payment: &Payment) {
        let envelope = Envelope::new(event_type, SOURCE, payment_payload(payment));
        if let Err(error) = self
            .bus
            .publish(envelope.topic(), &payment.order_number, &envelope)
            .await
        {
            tracing::error!(
                payment_number = %payment.payment_number,
                event_type = %event_type,
                %error,
                "failed to publish payment event"
            );
            metrics::counter!("payment_event_publish_failures_total").increment(1);
        }
    }
}

/// Builds the wire payload for a payment event.
pub fn payment_payload(payment: &Payment) -> EventPayload {
    EventPayload::Payment(PaymentPayload {
        payment_id: payment.id,
        payment_number: payment.payment_number.clone(),
        order_id: payment.order_id,
        order_number: payment.order_number.clone(),
        customer_id: payment.customer_id,
        customer_name: payment.customer_name.clone(),
        customer_email: payment.customer_email.clone(),
        customer_phone: payment.customer_phone.clone(),
        amount: payment.amount,
        status: payment.status.to_string(),
        transaction_id: payment.transaction_id.clone(),
        failure_reason: payment.failure_reason.clone(),
    })
}

fn classify(error: DomainError) -> HandlerError {
    match error {
        DomainError::Validation(_) | DomainError::InvalidTransition { .. } => {
            HandlerError::DeadLetter(error.to_string())
        }
        other => HandlerError::Retry(other.to_string()),
    }
}

#[async_trait]
impl EventHandler for PaymentOrchestrator {
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError> {
        let envelope = message
            .envelope()
            .map_err(|e| HandlerError::DeadLetter(format!("malformed order event: {e}")))?;
        // The id is marked processed only once the work completes, so a
        // Retry verdict leaves the redelivery effective.
        if self.processed.contains(envelope.event_id).await {
            return Ok(());
        }

        let EventPayload::Order(order) = &envelope.payload else {
            return Err(HandlerError::DeadLetter(format!(
                "unexpected payload domain on {}",
                message.topic
            )));
        };
        if envelope.event_type != EventType::OrderCreated {
            self.processed.mark_processed(envelope.event_id).await;
            return Ok(());
        }

        // At most one payment per order: a redelivered or replayed
        // ORDER_CREATED for a known order is a no-op.
        if self
            .repo
            .find_by_order_id(order.order_id)
            .await
            .map_err(classify)?
            .is_some()
        {
            tracing::debug!(order_number = %order.order_number, "payment already exists");
            self.processed.mark_processed(envelope.event_id).await;
            return Ok(());
        }

        let payment = Payment::new(
            order.order_id,
            order.order_number.clone(),
            order.customer_id,
            order.customer_name.clone(),
            order.customer_email.clone(),
            order.customer_phone.clone(),
            order.total_amount,
            PaymentMethod::default(),
            self.policy.max_retries,
        );
        let payment = self.repo.insert(payment).await.map_err(classify)?;

        tracing::info!(
            payment_number = %payment.payment_number,
            order_number = %payment.order_number,
            amount = %payment.amount,
            "payment initiated"
        );
        metrics::counter!("payments_initiated_total").increment(1);
        self.publish_event(EventType::PaymentInitiated, &payment).await;

        self.attempt(payment).await.map_err(classify)?;
        self.processed.mark_processed(envelope.event_id).await;
        Ok(())
    }
}
