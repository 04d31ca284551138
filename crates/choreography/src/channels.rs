//! Notification channel capability.

use async_trait::async_trait;
use domain::NotificationType;
use thiserror::Error;

/// A failed channel send.
#[derive(Debug, Error)]
#[error("{channel} send failed: {reason}")]
pub struct ChannelError {
    pub channel: NotificationType,
    pub reason: String,
}

/// One delivery channel (email, SMS, push). The dispatcher holds one
/// implementation per [`NotificationType`] and treats each send as an
/// independent unit of work.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The channel this implementation delivers on.
    fn channel_type(&self) -> NotificationType;

    /// Delivers one message. Bounded by the dispatcher's send timeout.
    async fn send(
        &self,
        recipient: &str,
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), ChannelError>;
}

/// A delivered message, as recorded by [`InMemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub recipient: String,
    pub subject: Option<String>,
    pub message: String,
}

/// Recording in-memory channel for tests and local runs.
///
/// Succeeds by default; [`fail_next`] queues failures.
///
/// [`fail_next`]: InMemoryChannel::fail_next
#[derive(Debug)]
pub struct InMemoryChannel {
    channel: NotificationType,
    state: tokio::sync::Mutex<ChannelState>,
}

#[derive(Debug, Default)]
struct ChannelState {
    failures_remaining: u32,
    sent: Vec<RecordedSend>,
}

impl InMemoryChannel {
    pub fn new(channel: NotificationType) -> Self {
        Self {
            channel,
            state: tokio::sync::Mutex::new(ChannelState::default()),
        }
    }

    /// Queues the next `count` sends to fail.
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.failures_remaining = count;
    }

    /// Messages delivered so far.
    pub async fn sent(&self) -> Vec<RecordedSend> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }
}

#[async_trait]
impl NotificationChannel for InMemoryChannel {
    fn channel_type(&self) -> NotificationType {
        self.channel
    }

    async fn send(
        &self,
        recipient: &str,
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ChannelError {
                channel: self.channel,
                reason: "provider rejected the message".to_string(),
            });
        }
        state.sent.push(RecordedSend {
            recipient: recipient.to_string(),
            subject: subject.map(str::to_string),
            message: message.to_string(),
        });
        Ok(())
    }
}
