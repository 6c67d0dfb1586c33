//! Queue client and queue handles.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::validate_queue_name;
use crate::account::StorageAccount;
use crate::config::{ClientOptions, Settings};
use crate::error::{Error, ErrorCode, Result};
use crate::models::{MessageTtl, PeekedMessage, QueueMessage, SendReceipt, UpdateReceipt};
use crate::storage::{MemoryQueueStore, QueueStore};

/// Entry point for queue operations against one storage account.
#[derive(Clone)]
pub struct QueueClient {
    account: StorageAccount,
    store: Arc<dyn QueueStore>,
    options: ClientOptions,
}

impl std::fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueClient")
            .field("account", &self.account)
            .field("options", &self.options)
            .finish()
    }
}

impl QueueClient {
    pub fn new(account: StorageAccount, store: Arc<dyn QueueStore>) -> Self {
        Self {
            account,
            store,
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(
        account: StorageAccount,
        store: Arc<dyn QueueStore>,
        options: ClientOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            account,
            store,
            options,
        })
    }

    /// A client backed by a fresh in-process store.
    pub fn in_memory(account: StorageAccount) -> Self {
        Self::new(account, Arc::new(MemoryQueueStore::new()))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::in_memory(settings.account()?))
    }

    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        Ok(Self::in_memory(StorageAccount::parse(connection_string)?))
    }

    pub fn account(&self) -> &StorageAccount {
        &self.account
    }

    /// A handle to a queue without contacting the store.
    pub fn queue(&self, name: &str) -> Result<QueueHandle> {
        validate_queue_name(name)?;
        Ok(self.handle(name))
    }

    /// Creates the queue unless it already exists and returns a handle to it.
    pub async fn create_queue(&self, name: &str) -> Result<QueueHandle> {
        let queue = self.queue(name)?;
        queue.create_if_not_exists().await?;
        Ok(queue)
    }

    /// Deletes a queue. Returns `false` when there was nothing to delete.
    pub async fn delete_queue(&self, name: &str) -> Result<bool> {
        self.queue(name)?.delete().await
    }

    pub async fn list_queues(&self, prefix: Option<&str>) -> Result<Vec<QueueHandle>> {
        let mut handles = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let (queues, next_marker) = self
                .store
                .list_queues(prefix, marker.as_deref(), Some(self.options.max_page_size))
                .await?;
            handles.extend(queues.into_iter().map(|q| self.handle(&q.name)));
            match next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(handles)
    }

    fn handle(&self, name: &str) -> QueueHandle {
        QueueHandle {
            name: name.to_string(),
            url: self.account.queue_url(name),
            store: self.store.clone(),
            options: self.options.clone(),
        }
    }
}

/// A named queue. Cheap to clone; all clones address the same queue.
#[derive(Clone)]
pub struct QueueHandle {
    name: String,
    url: Url,
    store: Arc<dyn QueueStore>,
    options: ClientOptions,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .finish()
    }
}

impl QueueHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn exists(&self) -> bool {
        self.store.queue_exists(&self.name).await
    }

    /// Returns `true` if the queue was created by this call.
    pub async fn create_if_not_exists(&self) -> Result<bool> {
        match self.store.create_queue(&self.name).await {
            Ok(_) => {
                info!(queue = %self.name, "created queue");
                Ok(true)
            }
            Err(e) if e.code == ErrorCode::QueueAlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the queue and its messages. An absent queue is not an error.
    pub async fn delete(&self) -> Result<bool> {
        match self.store.delete_queue(&self.name).await {
            Ok(()) => {
                info!(queue = %self.name, "deleted queue");
                Ok(true)
            }
            Err(e) if e.code == ErrorCode::QueueNotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Sends a message that never expires when `infinite_ttl` is set, and
    /// otherwise lives for the service default of seven days.
    ///
    /// The queue is created first if it does not exist.
    pub async fn send_message(&self, body: &str, infinite_ttl: bool) -> Result<SendReceipt> {
        self.send_message_with_ttl(body, MessageTtl::from_infinite(infinite_ttl))
            .await
    }

    pub async fn send_message_with_ttl(&self, body: &str, ttl: MessageTtl) -> Result<SendReceipt> {
        self.create_if_not_exists().await?;
        let receipt = self
            .store
            .put_message(&self.name, body, Duration::zero(), ttl)
            .await?;
        debug!(
            queue = %self.name,
            message_id = %receipt.message_id,
            ?ttl,
            "sent message"
        );
        Ok(receipt)
    }

    /// Receives up to `max_count` visible messages and hides them for the
    /// configured visibility timeout.
    pub async fn receive_messages(&self, max_count: u32) -> Result<Vec<QueueMessage>> {
        self.receive_messages_with_timeout(max_count, self.options.visibility_timeout)
            .await
    }

    pub async fn receive_messages_with_timeout(
        &self,
        max_count: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        Ok(self
            .store
            .get_messages(&self.name, max_count, visibility_timeout)
            .await?)
    }

    /// Reads up to `max_count` visible messages without hiding them.
    pub async fn peek_messages(&self, max_count: u32) -> Result<Vec<PeekedMessage>> {
        Ok(self.store.peek_messages(&self.name, max_count).await?)
    }

    /// Deletes a message using the pop receipt from its latest receive or update.
    pub async fn delete_message(&self, message_id: &str, pop_receipt: &str) -> Result<()> {
        check_receipt(message_id, pop_receipt)?;
        self.store
            .delete_message(&self.name, message_id, pop_receipt)
            .await?;
        debug!(queue = %self.name, message_id, "deleted message");
        Ok(())
    }

    /// Replaces a message body and makes it visible again after `visibility_timeout`.
    pub async fn update_message(
        &self,
        message_id: &str,
        pop_receipt: &str,
        body: &str,
        visibility_timeout: Duration,
    ) -> Result<UpdateReceipt> {
        check_receipt(message_id, pop_receipt)?;
        Ok(self
            .store
            .update_message(
                &self.name,
                message_id,
                pop_receipt,
                Some(body),
                visibility_timeout,
            )
            .await?)
    }

    pub async fn clear_messages(&self) -> Result<()> {
        self.store.clear_messages(&self.name).await?;
        info!(queue = %self.name, "cleared messages");
        Ok(())
    }
}

fn check_receipt(message_id: &str, pop_receipt: &str) -> Result<()> {
    if message_id.is_empty() {
        return Err(Error::argument("message id must not be empty"));
    }
    if pop_receipt.is_empty() {
        return Err(Error::argument("pop receipt must not be empty"));
    }
    Ok(())
}
