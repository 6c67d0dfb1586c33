//! Queue store: queues and their messages.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{
    MessageTtl, PeekedMessage, QueueMessage, QueueModel, SendReceipt, UpdateReceipt,
    MAX_MESSAGES_PER_CALL, MAX_MESSAGE_SIZE,
};

const MAX_LIST_RESULTS: u32 = 5000;

/// Trait for queue storage operations.
#[async_trait]
pub trait QueueStore: Send + Sync {
    // Queue operations
    async fn create_queue(&self, name: &str) -> StorageResult<QueueModel>;
    async fn delete_queue(&self, name: &str) -> StorageResult<()>;
    async fn queue_exists(&self, name: &str) -> bool;
    async fn list_queues(
        &self,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_results: Option<u32>,
    ) -> StorageResult<(Vec<QueueModel>, Option<String>)>;

    // Message operations
    async fn put_message(
        &self,
        queue: &str,
        body: &str,
        visibility_timeout: Duration,
        ttl: MessageTtl,
    ) -> StorageResult<SendReceipt>;
    async fn get_messages(
        &self,
        queue: &str,
        max_messages: u32,
        visibility_timeout: Duration,
    ) -> StorageResult<Vec<QueueMessage>>;
    async fn peek_messages(&self, queue: &str, max_messages: u32)
        -> StorageResult<Vec<PeekedMessage>>;
    async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> StorageResult<()>;
    async fn update_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
        body: Option<&str>,
        visibility_timeout: Duration,
    ) -> StorageResult<UpdateReceipt>;
    async fn clear_messages(&self, queue: &str) -> StorageResult<()>;
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    inserted_on: DateTime<Utc>,
    expires_on: Option<DateTime<Utc>>,
    time_next_visible: DateTime<Utc>,
    pop_receipt: String,
    dequeue_count: u32,
}

impl StoredMessage {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.map(|at| at <= now).unwrap_or(false)
    }

    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.time_next_visible <= now
    }

    fn peeked(&self) -> PeekedMessage {
        PeekedMessage {
            message_id: self.id.clone(),
            message_text: self.body.clone(),
            inserted_on: self.inserted_on,
            expires_on: self.expires_on,
            dequeue_count: self.dequeue_count,
        }
    }
}

struct QueueSlot {
    model: QueueModel,
    messages: Mutex<VecDeque<StoredMessage>>,
}

impl QueueSlot {
    /// Locks the message list with expired messages already purged.
    fn live_messages(
        &self,
        now: DateTime<Utc>,
    ) -> parking_lot::MutexGuard<'_, VecDeque<StoredMessage>> {
        let mut messages = self.messages.lock();
        messages.retain(|m| !m.is_expired(now));
        messages
    }
}

/// In-memory implementation of the queue store.
pub struct MemoryQueueStore {
    queues: DashMap<Arc<str>, Arc<QueueSlot>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    fn slot(&self, queue: &str) -> StorageResult<Arc<QueueSlot>> {
        self.queues
            .get(queue)
            .map(|slot| slot.value().clone())
            .ok_or_else(|| StorageError::new(ErrorCode::QueueNotFound))
    }

    fn new_pop_receipt() -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn check_max_messages(max_messages: u32) -> StorageResult<()> {
        if max_messages == 0 || max_messages > MAX_MESSAGES_PER_CALL {
            return Err(StorageError::with_message(
                ErrorCode::OutOfRangeInput,
                format!(
                    "The number of messages must be between 1 and {}.",
                    MAX_MESSAGES_PER_CALL
                ),
            ));
        }
        Ok(())
    }

    fn check_visibility(visibility_timeout: Duration, min: Duration) -> StorageResult<()> {
        if visibility_timeout < min || visibility_timeout > Duration::days(7) {
            return Err(StorageError::with_message(
                ErrorCode::OutOfRangeInput,
                "The visibility timeout is out of range.",
            ));
        }
        Ok(())
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn create_queue(&self, name: &str) -> StorageResult<QueueModel> {
        match self.queues.entry(Arc::from(name)) {
            Entry::Occupied(_) => Err(StorageError::new(ErrorCode::QueueAlreadyExists)),
            Entry::Vacant(vacant) => {
                let model = QueueModel::new(name);
                vacant.insert(Arc::new(QueueSlot {
                    model: model.clone(),
                    messages: Mutex::new(VecDeque::new()),
                }));
                debug!(queue = name, "created queue");
                Ok(model)
            }
        }
    }

    async fn delete_queue(&self, name: &str) -> StorageResult<()> {
        self.queues
            .remove(name)
            .map(|_| debug!(queue = name, "deleted queue"))
            .ok_or_else(|| StorageError::new(ErrorCode::QueueNotFound))
    }

    async fn queue_exists(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    async fn list_queues(
        &self,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_results: Option<u32>,
    ) -> StorageResult<(Vec<QueueModel>, Option<String>)> {
        let max_results = max_results.unwrap_or(MAX_LIST_RESULTS);
        if max_results == 0 || max_results > MAX_LIST_RESULTS {
            return Err(StorageError::new(ErrorCode::OutOfRangeInput));
        }
        let max_results = max_results as usize;

        let mut queues: Vec<QueueModel> = self
            .queues
            .iter()
            .filter(|entry| prefix.map(|p| entry.key().starts_with(p)).unwrap_or(true))
            .filter(|entry| marker.map(|m| entry.key().as_ref() > m).unwrap_or(true))
            .map(|entry| entry.value().model.clone())
            .collect();
        queues.sort_by(|a, b| a.name.cmp(&b.name));

        let next_marker = if queues.len() > max_results {
            queues.truncate(max_results);
            queues.last().map(|q| q.name.clone())
        } else {
            None
        };

        Ok((queues, next_marker))
    }

    async fn put_message(
        &self,
        queue: &str,
        body: &str,
        visibility_timeout: Duration,
        ttl: MessageTtl,
    ) -> StorageResult<SendReceipt> {
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(StorageError::new(ErrorCode::MessageTooLarge));
        }
        let lifetime = ttl.duration();
        if let Some(lifetime) = lifetime {
            if lifetime < Duration::seconds(1) {
                return Err(StorageError::with_message(
                    ErrorCode::OutOfRangeInput,
                    "The message time-to-live must be at least one second.",
                ));
            }
        }
        Self::check_visibility(visibility_timeout, Duration::zero())?;
        if lifetime.map(|l| visibility_timeout >= l).unwrap_or(false) {
            return Err(StorageError::with_message(
                ErrorCode::OutOfRangeInput,
                "The visibility timeout must be shorter than the message time-to-live.",
            ));
        }

        let slot = self.slot(queue)?;
        let now = Utc::now();
        let expires_on = lifetime
            .map(|l| {
                now.checked_add_signed(l).ok_or_else(|| {
                    StorageError::with_message(
                        ErrorCode::OutOfRangeInput,
                        "The message time-to-live is too large.",
                    )
                })
            })
            .transpose()?;
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            inserted_on: now,
            expires_on,
            time_next_visible: now + visibility_timeout,
            pop_receipt: Self::new_pop_receipt(),
            dequeue_count: 0,
        };
        let receipt = SendReceipt {
            message_id: message.id.clone(),
            pop_receipt: message.pop_receipt.clone(),
            inserted_on: message.inserted_on,
            expires_on: message.expires_on,
            time_next_visible: message.time_next_visible,
        };

        slot.live_messages(now).push_back(message);
        debug!(queue, message_id = %receipt.message_id, "enqueued message");
        Ok(receipt)
    }

    async fn get_messages(
        &self,
        queue: &str,
        max_messages: u32,
        visibility_timeout: Duration,
    ) -> StorageResult<Vec<QueueMessage>> {
        Self::check_max_messages(max_messages)?;
        Self::check_visibility(visibility_timeout, Duration::seconds(1))?;

        let slot = self.slot(queue)?;
        let now = Utc::now();
        let mut messages = slot.live_messages(now);

        let received: Vec<QueueMessage> = messages
            .iter_mut()
            .filter(|m| m.is_visible(now))
            .take(max_messages as usize)
            .map(|m| {
                m.pop_receipt = Self::new_pop_receipt();
                m.time_next_visible = now + visibility_timeout;
                m.dequeue_count += 1;
                QueueMessage {
                    message_id: m.id.clone(),
                    pop_receipt: m.pop_receipt.clone(),
                    message_text: m.body.clone(),
                    inserted_on: m.inserted_on,
                    expires_on: m.expires_on,
                    time_next_visible: m.time_next_visible,
                    dequeue_count: m.dequeue_count,
                }
            })
            .collect();

        debug!(queue, count = received.len(), "received messages");
        Ok(received)
    }

    async fn peek_messages(
        &self,
        queue: &str,
        max_messages: u32,
    ) -> StorageResult<Vec<PeekedMessage>> {
        Self::check_max_messages(max_messages)?;

        let slot = self.slot(queue)?;
        let now = Utc::now();
        let messages = slot.live_messages(now);
        Ok(messages
            .iter()
            .filter(|m| m.is_visible(now))
            .take(max_messages as usize)
            .map(StoredMessage::peeked)
            .collect())
    }

    async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> StorageResult<()> {
        let slot = self.slot(queue)?;
        let mut messages = slot.live_messages(Utc::now());

        let index = messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| StorageError::new(ErrorCode::MessageNotFound))?;
        if messages[index].pop_receipt != pop_receipt {
            return Err(StorageError::new(ErrorCode::PopReceiptMismatch));
        }
        messages.remove(index);
        debug!(queue, message_id, "deleted message");
        Ok(())
    }

    async fn update_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
        body: Option<&str>,
        visibility_timeout: Duration,
    ) -> StorageResult<UpdateReceipt> {
        if body.map(|b| b.len() > MAX_MESSAGE_SIZE).unwrap_or(false) {
            return Err(StorageError::new(ErrorCode::MessageTooLarge));
        }
        Self::check_visibility(visibility_timeout, Duration::zero())?;

        let slot = self.slot(queue)?;
        let now = Utc::now();
        let mut messages = slot.live_messages(now);

        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StorageError::new(ErrorCode::MessageNotFound))?;
        if message.pop_receipt != pop_receipt {
            return Err(StorageError::new(ErrorCode::PopReceiptMismatch));
        }
        if let Some(body) = body {
            message.body = body.to_string();
        }
        message.pop_receipt = Self::new_pop_receipt();
        message.time_next_visible = now + visibility_timeout;

        Ok(UpdateReceipt {
            pop_receipt: message.pop_receipt.clone(),
            time_next_visible: message.time_next_visible,
        })
    }

    async fn clear_messages(&self, queue: &str) -> StorageResult<()> {
        let slot = self.slot(queue)?;
        slot.messages.lock().clear();
        Ok(())
    }
}
