//! Table client and table handles.

use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::{validate_key, validate_table_name};
use crate::account::StorageAccount;
use crate::config::{ClientOptions, Settings};
use crate::error::{Error, ErrorCode, Result, StorageError};
use crate::models::{
    from_record, to_record, BatchResult, ContinuationToken, EntityRecord, TableEntity,
    UpsertMode, MAX_BATCH_SIZE,
};
use crate::storage::{MemoryTableStore, TableStore};

/// Entry point for table operations against one storage account.
#[derive(Clone)]
pub struct TableClient {
    account: StorageAccount,
    store: Arc<dyn TableStore>,
    options: ClientOptions,
}

impl std::fmt::Debug for TableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableClient")
            .field("account", &self.account)
            .field("options", &self.options)
            .finish()
    }
}

impl TableClient {
    pub fn new(account: StorageAccount, store: Arc<dyn TableStore>) -> Self {
        Self {
            account,
            store,
            options: ClientOptions::default(),
        }
    }

    /// Creates a client with custom options, rejecting values the store would refuse.
    pub fn with_options(
        account: StorageAccount,
        store: Arc<dyn TableStore>,
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
        Self::new(account, Arc::new(MemoryTableStore::new()))
    }

    /// Parses the settings' connection string and opens an in-process store.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::in_memory(settings.account()?))
    }

    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        Ok(Self::in_memory(StorageAccount::parse(connection_string)?))
    }

    pub fn account(&self) -> &StorageAccount {
        &self.account
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// A handle to a table without contacting the store.
    pub fn table(&self, name: &str) -> Result<TableHandle> {
        validate_table_name(name)?;
        Ok(self.handle(name))
    }

    /// Creates the table unless it already exists and returns a handle to it.
    pub async fn create_table_if_absent(&self, name: &str) -> Result<TableHandle> {
        let table = self.table(name)?;
        table.create_if_not_exists().await?;
        Ok(table)
    }

    /// Deletes a table. Returns `false` when there was nothing to delete.
    pub async fn delete_table(&self, name: &str) -> Result<bool> {
        self.table(name)?.delete().await
    }

    /// Lists all tables, optionally restricted to names starting with `prefix`.
    pub async fn list_tables(&self, prefix: Option<&str>) -> Result<Vec<TableHandle>> {
        let mut handles = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let (tables, next_marker) = self
                .store
                .list_tables(prefix, marker.as_deref(), Some(self.options.max_page_size))
                .await?;
            handles.extend(tables.into_iter().map(|t| self.handle(&t.name)));
            match next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        debug!(count = handles.len(), ?prefix, "listed tables");
        Ok(handles)
    }

    fn handle(&self, name: &str) -> TableHandle {
        TableHandle {
            name: name.to_string(),
            url: self.account.table_url(name),
            store: self.store.clone(),
            options: self.options.clone(),
        }
    }
}

/// A named table. Cheap to clone; all clones address the same table.
#[derive(Clone)]
pub struct TableHandle {
    name: String,
    url: Url,
    store: Arc<dyn TableStore>,
    options: ClientOptions,
}

impl std::fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandle")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .finish()
    }
}

impl TableHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn exists(&self) -> bool {
        self.store.table_exists(&self.name).await
    }

    /// Returns `true` if the table was created by this call.
    pub async fn create_if_not_exists(&self) -> Result<bool> {
        match self.store.create_table(&self.name).await {
            Ok(_) => {
                info!(table = %self.name, "created table");
                Ok(true)
            }
            Err(e) if e.code == ErrorCode::TableAlreadyExists => {
                debug!(table = %self.name, "table already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the table. An absent table is not an error.
    pub async fn delete(&self) -> Result<bool> {
        match self.store.delete_table(&self.name).await {
            Ok(()) => {
                info!(table = %self.name, "deleted table");
                Ok(true)
            }
            Err(e) if e.code == ErrorCode::TableNotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Inserts a new entity. An entity already stored under the same keys is a
    /// store error (`EntityAlreadyExists`).
    pub async fn insert_entity<E: TableEntity>(&self, entity: &E) -> Result<E> {
        let record = encode(entity)?;
        let stored = self.store.insert_entity(&self.name, record).await?;
        debug!(
            table = %self.name,
            partition_key = %stored.partition_key,
            row_key = %stored.row_key,
            "inserted entity"
        );
        decode(stored)
    }

    /// Inserts the entity, or merges its fields into the stored one.
    pub async fn upsert_entity<E: TableEntity>(&self, entity: &E) -> Result<E> {
        self.write_entity(entity, UpsertMode::Merge).await
    }

    /// Inserts the entity, or replaces the stored one entirely.
    pub async fn replace_entity<E: TableEntity>(&self, entity: &E) -> Result<E> {
        self.write_entity(entity, UpsertMode::Replace).await
    }

    /// Point lookup. A missing entity is `Ok(None)`.
    pub async fn get_entity<E: TableEntity>(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<E>> {
        validate_key("partition key", partition_key)?;
        validate_key("row key", row_key)?;

        match self
            .store
            .get_entity(&self.name, partition_key, row_key)
            .await
        {
            Ok(record) => decode(record).map(Some),
            Err(e) if e.code == ErrorCode::EntityNotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the entity if its ETag still matches the stored one.
    ///
    /// The entity must carry an ETag; set it to `*` to delete unconditionally.
    pub async fn delete_entity<E: TableEntity>(&self, entity: &E) -> Result<()> {
        validate_key("partition key", entity.partition_key())?;
        validate_key("row key", entity.row_key())?;
        let etag = entity.etag().ok_or_else(|| {
            Error::argument("delete requires an ETag, which may be the '*' wildcard")
        })?;

        self.store
            .delete_entity(&self.name, entity.partition_key(), entity.row_key(), etag)
            .await?;
        debug!(
            table = %self.name,
            partition_key = entity.partition_key(),
            row_key = entity.row_key(),
            "deleted entity"
        );
        Ok(())
    }

    /// Inserts all entities in one all-or-nothing transaction.
    ///
    /// Every entity must share one partition key and the batch may hold at most
    /// 100 entities.
    pub async fn batch_insert<E: TableEntity>(&self, entities: &[E]) -> Result<BatchResult<E>> {
        let first = entities
            .first()
            .ok_or_else(|| Error::argument("batch must contain at least one entity"))?;
        if entities.len() > MAX_BATCH_SIZE {
            return Err(Error::argument(format!(
                "batch holds {} entities, the limit is {}",
                entities.len(),
                MAX_BATCH_SIZE
            )));
        }

        let partition_key = first.partition_key().to_string();
        let mut records = Vec::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            if entity.partition_key() != partition_key {
                return Err(Error::argument(format!(
                    "entity {} has partition key '{}', batch partition is '{}'",
                    index,
                    entity.partition_key(),
                    partition_key
                )));
            }
            records.push(encode(entity)?);
        }

        let stored = self
            .store
            .insert_batch(&self.name, &partition_key, records)
            .await?;
        let entities = stored
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<E>>>()?;

        info!(
            table = %self.name,
            partition_key = %partition_key,
            count = entities.len(),
            "inserted batch"
        );
        Ok(BatchResult {
            partition_key,
            entities,
        })
    }

    /// Returns every entity in the partition, following continuation tokens.
    pub async fn scan_partition<E: TableEntity>(&self, partition_key: &str) -> Result<Vec<E>> {
        validate_key("partition key", partition_key)?;
        self.partition_pages(partition_key).try_concat().await
    }

    /// Streams the partition one store page at a time.
    pub fn partition_pages<'a, E>(
        &'a self,
        partition_key: &'a str,
    ) -> impl Stream<Item = Result<Vec<E>>> + 'a
    where
        E: TableEntity + 'a,
    {
        stream::try_unfold(PageState::Start, move |state| async move {
            let token = match state {
                PageState::Start => None,
                PageState::Next(token) => Some(token),
                PageState::Done => return Ok(None),
            };
            self.fetch_page::<E>(partition_key, token.as_ref())
                .await
                .map(|(entities, next)| {
                    Some((entities, next.map_or(PageState::Done, PageState::Next)))
                })
        })
    }

    async fn fetch_page<E: TableEntity>(
        &self,
        partition_key: &str,
        token: Option<&ContinuationToken>,
    ) -> Result<(Vec<E>, Option<ContinuationToken>)> {
        let page = self
            .store
            .query_partition(
                &self.name,
                partition_key,
                token,
                self.options.max_page_size,
            )
            .await?;
        debug!(
            table = %self.name,
            partition_key,
            count = page.entities.len(),
            more = page.continuation.is_some(),
            "fetched partition page"
        );
        let entities = page
            .entities
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<E>>>()?;
        Ok((entities, page.continuation))
    }

    async fn write_entity<E: TableEntity>(&self, entity: &E, mode: UpsertMode) -> Result<E> {
        let record = encode(entity)?;
        let stored = self.store.upsert_entity(&self.name, record, mode).await?;
        debug!(
            table = %self.name,
            partition_key = %stored.partition_key,
            row_key = %stored.row_key,
            ?mode,
            "wrote entity"
        );
        decode(stored)
    }
}

enum PageState {
    Start,
    Next(ContinuationToken),
    Done,
}

fn encode<E: TableEntity>(entity: &E) -> Result<EntityRecord> {
    validate_key("partition key", entity.partition_key())?;
    validate_key("row key", entity.row_key())?;
    to_record(entity).map_err(|e| Error::argument(format!("entity cannot be stored: {}", e)))
}

/// A stored record that does not fit `E` is reported as a store error.
fn decode<E: TableEntity>(record: EntityRecord) -> Result<E> {
    from_record(record).map_err(|e| {
        Error::from(StorageError::with_message(
            ErrorCode::InvalidInput,
            format!(
                "stored entity does not match {}: {}",
                std::any::type_name::<E>(),
                e
            ),
        ))
    })
}
