//! Table store: tables and their entities.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{
    ContinuationToken, EntityPage, EntityRecord, TableModel, UpsertMode, MAX_BATCH_SIZE,
    MAX_ENTITY_PROPERTIES,
};

/// Largest page a partition query or table listing may request.
const MAX_RESULTS: u32 = 1000;

/// Trait for table storage operations.
#[async_trait]
pub trait TableStore: Send + Sync {
    // Table operations
    async fn create_table(&self, name: &str) -> StorageResult<TableModel>;
    async fn delete_table(&self, name: &str) -> StorageResult<()>;
    async fn table_exists(&self, name: &str) -> bool;
    async fn list_tables(
        &self,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_results: Option<u32>,
    ) -> StorageResult<(Vec<TableModel>, Option<String>)>;

    // Entity operations
    async fn insert_entity(&self, table: &str, entity: EntityRecord)
        -> StorageResult<EntityRecord>;
    async fn upsert_entity(
        &self,
        table: &str,
        entity: EntityRecord,
        mode: UpsertMode,
    ) -> StorageResult<EntityRecord>;
    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<EntityRecord>;
    /// Deletes an entity whose ETag matches `if_match`, or any entity when it is `*`.
    async fn delete_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        if_match: &str,
    ) -> StorageResult<()>;

    // Batch and query operations
    async fn insert_batch(
        &self,
        table: &str,
        partition_key: &str,
        entities: Vec<EntityRecord>,
    ) -> StorageResult<Vec<EntityRecord>>;
    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
        continuation: Option<&ContinuationToken>,
        max_results: u32,
    ) -> StorageResult<EntityPage>;
}

/// Entities of one table ordered by (partition key, row key).
type EntityMap = BTreeMap<(String, String), EntityRecord>;

struct TableSlot {
    model: TableModel,
    entities: RwLock<EntityMap>,
}

/// In-memory implementation of the table store.
pub struct MemoryTableStore {
    /// Tables indexed by lowercased name.
    tables: DashMap<Arc<str>, Arc<TableSlot>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Table names are case-insensitive.
    #[inline]
    fn table_key(name: &str) -> Arc<str> {
        Arc::from(name.to_ascii_lowercase())
    }

    fn slot(&self, table: &str) -> StorageResult<Arc<TableSlot>> {
        self.tables
            .get(&Self::table_key(table))
            .map(|slot| slot.value().clone())
            .ok_or_else(|| StorageError::new(ErrorCode::TableNotFound))
    }

    fn new_etag() -> String {
        format!("W/\"0x{}\"", Uuid::new_v4().simple())
    }

    fn check_properties(entity: &EntityRecord) -> StorageResult<()> {
        if entity.properties.len() > MAX_ENTITY_PROPERTIES {
            return Err(StorageError::new(ErrorCode::TooManyProperties));
        }
        if let Some(name) = entity.properties.keys().find(|name| !is_valid_property_name(name)) {
            return Err(StorageError::with_message(
                ErrorCode::PropertyNameInvalid,
                format!("The property name '{}' is invalid.", name),
            ));
        }
        Ok(())
    }

    /// Stamps a record with a fresh ETag and timestamp.
    fn stamp(mut entity: EntityRecord) -> EntityRecord {
        entity.etag = Some(Self::new_etag());
        entity.timestamp = Some(Utc::now());
        entity
    }
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Property names follow C# identifier rules and may not reuse system names.
fn is_valid_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_');
    starts_ok
        && name.len() <= 255
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(name, "PartitionKey" | "RowKey" | "Timestamp" | "ETag")
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn create_table(&self, name: &str) -> StorageResult<TableModel> {
        match self.tables.entry(Self::table_key(name)) {
            Entry::Occupied(_) => Err(StorageError::new(ErrorCode::TableAlreadyExists)),
            Entry::Vacant(vacant) => {
                let model = TableModel::new(name);
                vacant.insert(Arc::new(TableSlot {
                    model: model.clone(),
                    entities: RwLock::new(BTreeMap::new()),
                }));
                debug!(table = name, "created table");
                Ok(model)
            }
        }
    }

    async fn delete_table(&self, name: &str) -> StorageResult<()> {
        self.tables
            .remove(&Self::table_key(name))
            .map(|_| debug!(table = name, "deleted table"))
            .ok_or_else(|| StorageError::new(ErrorCode::TableNotFound))
    }

    async fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&Self::table_key(name))
    }

    async fn list_tables(
        &self,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_results: Option<u32>,
    ) -> StorageResult<(Vec<TableModel>, Option<String>)> {
        let max_results = max_results.unwrap_or(MAX_RESULTS);
        if max_results == 0 || max_results > MAX_RESULTS {
            return Err(StorageError::new(ErrorCode::OutOfRangeInput));
        }
        let max_results = max_results as usize;

        let mut tables: Vec<TableModel> = self
            .tables
            .iter()
            .filter_map(|entry| {
                let model = &entry.value().model;
                if let Some(p) = prefix {
                    if !model.name.starts_with(p) {
                        return None;
                    }
                }
                if let Some(m) = marker {
                    if model.name.as_str() <= m {
                        return None;
                    }
                }
                Some(model.clone())
            })
            .collect();

        tables.sort_by(|a, b| a.name.cmp(&b.name));

        let next_marker = if tables.len() > max_results {
            tables.truncate(max_results);
            tables.last().map(|t| t.name.clone())
        } else {
            None
        };

        Ok((tables, next_marker))
    }

    async fn insert_entity(
        &self,
        table: &str,
        entity: EntityRecord,
    ) -> StorageResult<EntityRecord> {
        Self::check_properties(&entity)?;
        let slot = self.slot(table)?;
        let mut entities = slot.entities.write();

        let key = entity.key();
        if entities.contains_key(&key) {
            return Err(StorageError::new(ErrorCode::EntityAlreadyExists));
        }
        let stored = Self::stamp(entity);
        entities.insert(key, stored.clone());
        Ok(stored)
    }

    async fn upsert_entity(
        &self,
        table: &str,
        entity: EntityRecord,
        mode: UpsertMode,
    ) -> StorageResult<EntityRecord> {
        Self::check_properties(&entity)?;
        let slot = self.slot(table)?;
        let mut entities = slot.entities.write();

        let key = entity.key();
        let merged = match (mode, entities.get(&key)) {
            (UpsertMode::Merge, Some(existing)) => {
                let mut properties = existing.properties.clone();
                properties.extend(entity.properties);
                let merged = EntityRecord {
                    properties,
                    ..entity
                };
                Self::check_properties(&merged)?;
                merged
            }
            _ => entity,
        };

        let stored = Self::stamp(merged);
        entities.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<EntityRecord> {
        let slot = self.slot(table)?;
        let entities = slot.entities.read();
        entities
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::new(ErrorCode::EntityNotFound))
    }

    async fn delete_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        if_match: &str,
    ) -> StorageResult<()> {
        let slot = self.slot(table)?;
        let mut entities = slot.entities.write();

        let key = (partition_key.to_string(), row_key.to_string());
        let existing = entities
            .get(&key)
            .ok_or_else(|| StorageError::new(ErrorCode::EntityNotFound))?;
        if if_match != "*" && existing.etag.as_deref() != Some(if_match) {
            return Err(StorageError::new(ErrorCode::UpdateConditionNotSatisfied));
        }
        entities.remove(&key);
        Ok(())
    }

    async fn insert_batch(
        &self,
        table: &str,
        partition_key: &str,
        entities: Vec<EntityRecord>,
    ) -> StorageResult<Vec<EntityRecord>> {
        if entities.is_empty() || entities.len() > MAX_BATCH_SIZE {
            return Err(StorageError::with_message(
                ErrorCode::InvalidInput,
                format!(
                    "A batch must contain between 1 and {} operations.",
                    MAX_BATCH_SIZE
                ),
            ));
        }

        let mut row_keys = HashSet::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            if entity.partition_key != partition_key {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidInput,
                    format!(
                        "{}:All entities in a batch must have the same partition key.",
                        index
                    ),
                ));
            }
            if !row_keys.insert(entity.row_key.as_str()) {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidDuplicateRow,
                    format!("{}:{}", index, ErrorCode::InvalidDuplicateRow.default_message()),
                ));
            }
            Self::check_properties(entity).map_err(|e| {
                StorageError::with_message(e.code, format!("{}:{}", index, e.message))
            })?;
        }

        let slot = self.slot(table)?;
        let mut stored_entities = slot.entities.write();

        // Nothing is written unless every insert can succeed.
        if let Some(index) = entities
            .iter()
            .position(|entity| stored_entities.contains_key(&entity.key()))
        {
            return Err(StorageError::with_message(
                ErrorCode::EntityAlreadyExists,
                format!("{}:{}", index, ErrorCode::EntityAlreadyExists.default_message()),
            ));
        }

        let inserted: Vec<EntityRecord> = entities.into_iter().map(Self::stamp).collect();
        for entity in &inserted {
            stored_entities.insert(entity.key(), entity.clone());
        }
        debug!(
            table,
            partition_key,
            count = inserted.len(),
            "committed batch"
        );
        Ok(inserted)
    }

    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
        continuation: Option<&ContinuationToken>,
        max_results: u32,
    ) -> StorageResult<EntityPage> {
        if max_results == 0 || max_results > MAX_RESULTS {
            return Err(StorageError::new(ErrorCode::OutOfRangeInput));
        }
        let start_row = match continuation {
            Some(token) if token.next_partition_key != partition_key => {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidInput,
                    "The continuation token does not belong to this partition.",
                ));
            }
            Some(token) => token.next_row_key.clone(),
            None => String::new(),
        };

        let slot = self.slot(table)?;
        let entities = slot.entities.read();

        let start = (partition_key.to_string(), start_row);
        let mut page: Vec<EntityRecord> = entities
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(|((pk, _), _)| pk == partition_key)
            .take(max_results as usize + 1)
            .map(|(_, entity)| entity.clone())
            .collect();

        let continuation = if page.len() > max_results as usize {
            page.pop().map(|next| ContinuationToken {
                next_partition_key: next.partition_key,
                next_row_key: next.row_key,
            })
        } else {
            None
        };

        Ok(EntityPage {
            entities: page,
            continuation,
        })
    }
}
