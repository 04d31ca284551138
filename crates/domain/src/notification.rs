//! Notification entity and delivery state machine.

use chrono::{DateTime, Utc};
use common::NotificationId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Email,
    Sms,
    Push,
}

impl NotificationType {
    /// Returns the channel name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "EMAIL",
            NotificationType::Sms => "SMS",
            NotificationType::Push => "PUSH",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a notification.
///
/// Transitions:
/// ```text
/// Pending ──► Sending ──┬──► Sent
///               ▲       └──► Failed ──► Retry ──► Sending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sending,
    Sent,
    Failed,
    Retry,
}

impl NotificationStatus {
    /// Returns true if a send may start from this status.
    pub fn can_begin_sending(&self) -> bool {
        matches!(self, NotificationStatus::Pending | NotificationStatus::Retry)
    }

    /// Returns the status name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sending => "SENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
            NotificationStatus::Retry => "RETRY",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification row. Owned by the Notification Dispatcher; the Retry
/// Scheduler re-drives Failed rows through the dispatcher's retry entry
/// point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub notification_type: NotificationType,
    pub recipient: String,
    pub subject: Option<String>,
    pub message: String,
    pub status: NotificationStatus,
    /// What kind of entity this notification is about ("ORDER", "PAYMENT", "DELIVERY").
    pub related_entity_type: String,
    /// The business identifier of that entity (order/payment/delivery number).
    pub related_entity_id: String,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped by the repository on update.
    pub version: u64,
}

impl Notification {
    /// Creates a new notification in `Pending`.
    pub fn new(
        notification_type: NotificationType,
        recipient: impl Into<String>,
        subject: Option<String>,
        message: impl Into<String>,
        related_entity_type: impl Into<String>,
        related_entity_id: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            notification_type,
            recipient: recipient.into(),
            subject,
            message: message.into(),
            status: NotificationStatus::Pending,
            related_entity_type: related_entity_type.into(),
            related_entity_id: related_entity_id.into(),
            error_message: None,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            sent_at: None,
            version: 0,
        }
    }

    /// Returns true if a retry is still permitted.
    pub fn can_retry(&self) -> bool {
        self.status == NotificationStatus::Failed && self.retry_count < self.max_retries
    }

    /// Starts a send: Pending/Retry -> Sending.
    pub fn begin_sending(&mut self) -> Result<(), DomainError> {
        if !self.status.can_begin_sending() {
            return Err(DomainError::invalid_transition(
                "Notification",
                self.status,
                NotificationStatus::Sending,
            ));
        }
        self.status = NotificationStatus::Sending;
        Ok(())
    }

    /// Marks the send successful: Sending -> Sent, stamping `sent_at`.
    pub fn mark_sent(&mut self) -> Result<(), DomainError> {
        if self.status != NotificationStatus::Sending {
            return Err(DomainError::invalid_transition(
                "Notification",
                self.status,
                NotificationStatus::Sent,
            ));
        }
        self.status = NotificationStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.error_message = None;
        Ok(())
    }

    /// Marks the send failed: Sending -> Failed, recording the error. The
    /// retry count is left alone for the scheduler to drive.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        if self.status != NotificationStatus::Sending {
            return Err(DomainError::invalid_transition(
                "Notification",
                self.status,
                NotificationStatus::Failed,
            ));
        }
        self.status = NotificationStatus::Failed;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Claims the row for a retry: requires [`can_retry`], increments
    /// `retry_count` and moves to Retry.
    ///
    /// [`can_retry`]: Notification::can_retry
    pub fn begin_retry(&mut self) -> Result<(), DomainError> {
        if !self.can_retry() {
            return Err(DomainError::Validation(format!(
                "notification {} is not retryable (status {}, attempt {}/{})",
                self.id, self.status, self.retry_count, self.max_retries
            )));
        }
        self.retry_count += 1;
        self.status = NotificationStatus::Retry;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notification() -> Notification {
        Notification::new(
            NotificationType::Email,
            "jane@example.com",
            Some("Order Confirmation - ORD-1".to_string()),
            "Thank you for your order!",
            "ORDER",
            "ORD-1",
            3,
        )
    }

    #[test]
    fn new_notification_is_pending() {
        let n = sample_notification();
        assert_eq!(n.status, NotificationStatus::Pending);
        assert_eq!(n.retry_count, 0);
        assert!(n.sent_at.is_none());
    }

    #[test]
    fn successful_send_stamps_sent_at() {
        let mut n = sample_notification();
        n.begin_sending().unwrap();
        n.mark_sent().unwrap();
        assert_eq!(n.status, NotificationStatus::Sent);
        assert!(n.sent_at.is_some());
    }

    #[test]
    fn failed_send_records_error_and_keeps_retry_count() {
        let mut n = sample_notification();
        n.begin_sending().unwrap();
        n.mark_failed("smtp timeout").unwrap();
        assert_eq!(n.status, NotificationStatus::Failed);
        assert_eq!(n.error_message.as_deref(), Some("smtp timeout"));
        assert_eq!(n.retry_count, 0);
        assert!(n.can_retry());
    }

    #[test]
    fn retry_cycle_increments_count() {
        let mut n = sample_notification();
        n.begin_sending().unwrap();
        n.mark_failed("smtp timeout").unwrap();

        n.begin_retry().unwrap();
        assert_eq!(n.status, NotificationStatus::Retry);
        assert_eq!(n.retry_count, 1);

        n.begin_sending().unwrap();
        n.mark_sent().unwrap();
        assert_eq!(n.status, NotificationStatus::Sent);
    }

    #[test]
    fn exhausted_notification_cannot_retry() {
        let mut n = sample_notification();
        n.begin_sending().unwrap();
        n.mark_failed("bounce").unwrap();
        while n.can_retry() {
            n.begin_retry().unwrap();
            n.begin_sending().unwrap();
            n.mark_failed("bounce").unwrap();
        }
        assert_eq!(n.retry_count, n.max_retries);
        assert!(n.begin_retry().is_err());
    }

    #[test]
    fn sent_notification_rejects_resend() {
        let mut n = sample_notification();
        n.begin_sending().unwrap();
        n.mark_sent().unwrap();
        assert!(n.begin_sending().is_err());
    }
}
