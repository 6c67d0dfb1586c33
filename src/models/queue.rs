//! Queue and message models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Retention applied when a message is sent without an explicit time-to-live.
pub const DEFAULT_MESSAGE_TTL_DAYS: i64 = 7;

/// Largest message body the queue service accepts, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Largest batch `get_messages` / `peek_messages` may return.
pub const MAX_MESSAGES_PER_CALL: u32 = 32;

/// How long a sent message is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageTtl {
    /// Service default retention.
    #[default]
    Default,
    /// Never expires.
    Infinite,
    /// Expires after the given duration.
    Finite(Duration),
}

impl MessageTtl {
    pub fn from_infinite(infinite: bool) -> Self {
        if infinite {
            MessageTtl::Infinite
        } else {
            MessageTtl::Default
        }
    }

    /// Effective lifetime, `None` meaning the message never expires.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            MessageTtl::Default => Some(Duration::days(DEFAULT_MESSAGE_TTL_DAYS)),
            MessageTtl::Infinite => None,
            MessageTtl::Finite(d) => Some(*d),
        }
    }
}

/// Queue metadata kept by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueModel {
    pub name: String,
    pub created_on: DateTime<Utc>,
}

impl QueueModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_on: Utc::now(),
        }
    }
}

/// Returned when a message is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
    /// Needed to delete or update this message before it is received.
    pub pop_receipt: String,
    pub inserted_on: DateTime<Utc>,
    /// `None` when the message never expires.
    pub expires_on: Option<DateTime<Utc>>,
    pub time_next_visible: DateTime<Utc>,
}

/// Returned when a message's body or visibility is updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReceipt {
    pub pop_receipt: String,
    pub time_next_visible: DateTime<Utc>,
}

/// A received message. The pop receipt is valid until the message is
/// received again or updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub pop_receipt: String,
    pub message_text: String,
    pub inserted_on: DateTime<Utc>,
    pub expires_on: Option<DateTime<Utc>>,
    pub time_next_visible: DateTime<Utc>,
    pub dequeue_count: u32,
}

/// A message observed without changing its visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeekedMessage {
    pub message_id: String,
    pub message_text: String,
    pub inserted_on: DateTime<Utc>,
    pub expires_on: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_from_flag() {
        assert_eq!(MessageTtl::from_infinite(true), MessageTtl::Infinite);
        assert_eq!(MessageTtl::from_infinite(false), MessageTtl::Default);
    }

    #[test]
    fn test_ttl_duration() {
        assert_eq!(MessageTtl::Infinite.duration(), None);
        assert_eq!(MessageTtl::Default.duration(), Some(Duration::days(7)));
        assert_eq!(
            MessageTtl::Finite(Duration::seconds(5)).duration(),
            Some(Duration::seconds(5))
        );
    }
}
