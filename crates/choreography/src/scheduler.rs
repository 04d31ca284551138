//! Retry scheduler.
//!
//! Runs on a fixed interval, independent of the event stream: sweeps the
//! stores for failed payments whose retry window has opened and failed
//! notifications with attempts remaining, and re-drives each through its
//! owning service. Candidates are processed independently with bounded
//! concurrency; one failure never aborts the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{
    NotificationRepository, NotificationStatus, PaymentRepository, PaymentStatus,
};
use futures_util::StreamExt;

use crate::dispatcher::NotificationDispatcher;
use crate::payment::PaymentOrchestrator;

/// Candidates re-driven concurrently per sweep.
const SWEEP_CONCURRENCY: usize = 4;

pub struct RetryScheduler {
    payments: Arc<PaymentOrchestrator>,
    dispatcher: Arc<NotificationDispatcher>,
    payment_repo: Arc<dyn PaymentRepository>,
    notification_repo: Arc<dyn NotificationRepository>,
}

impl RetryScheduler {
    pub fn new(
        payments: Arc<PaymentOrchestrator>,
        dispatcher: Arc<NotificationDispatcher>,
        payment_repo: Arc<dyn PaymentRepository>,
        notification_repo: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            payments,
            dispatcher,
            payment_repo,
            notification_repo,
        }
    }

    /// One sweep over both stores as of `now`. Returns how many candidates
    /// were picked up.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> usize {
        let due_payments = match self.payment_repo.find_retryable(now).await {
            Ok(payments) => payments,
            Err(error) => {
                tracing::error!(%error, "could not query retryable payments");
                Vec::new()
            }
        };
        let due_notifications = match self.notification_repo.find_retryable().await {
            Ok(notifications) => notifications,
            Err(error) => {
                tracing::error!(%error, "could not query retryable notifications");
                Vec::new()
            }
        };
        let picked_up = due_payments.len() + due_notifications.len();
        if picked_up == 0 {
            return 0;
        }
        tracing::info!(
            payments = due_payments.len(),
            notifications = due_notifications.len(),
            "retry sweep starting"
        );

        futures_util::stream::iter(due_payments)
            .for_each_concurrent(SWEEP_CONCURRENCY, |payment| async move {
                if let Err(error) = self.payments.retry_payment(payment.id).await {
                    // The row may have been claimed by a racing consumer
                    // between the query and the retry; skip it.
                    tracing::warn!(
                        payment_number = %payment.payment_number,
                        %error,
                        "payment retry skipped"
                    );
                }
            })
            .await;

        futures_util::stream::iter(due_notifications)
            .for_each_concurrent(SWEEP_CONCURRENCY, |notification| async move {
                if let Err(error) = self.dispatcher.retry_notification(notification.id).await {
                    tracing::warn!(
                        notification_id = %notification.id,
                        %error,
                        "notification retry skipped"
                    );
                }
            })
            .await;

        metrics::counter!("retry_sweeps_total").increment(1);
        picked_up
    }

    /// Logs aggregate per-status counts. Read-only; runs on a coarser
    /// cadence than the sweep.
    pub async fn statistics(&self) {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
        ] {
            if let Ok(count) = self.payment_repo.count_by_status(status).await {
                metrics::gauge!("payments_by_status", "status" => status.as_str()).set(count as f64);
                tracing::info!(status = %status, count, "payment statistics");
            }
        }
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
        ] {
            if let Ok(count) = self.notification_repo.count_by_status(status).await {
                metrics::gauge!("notifications_by_status", "status" => status.as_str())
                    .set(count as f64);
                tracing::info!(status = %status, count, "notification statistics");
            }
        }
    }

    /// Production loop: sweeps every `interval`, reporting statistics every
    /// tenth sweep.
    pub async fn run(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut sweeps: u64 = 0;
        loop {
            ticker.tick().await;
            self.run_once(Utc::now()).await;
            sweeps += 1;
            if sweeps % 10 == 0 {
                self.statistics().await;
            }
        }
    }
}
