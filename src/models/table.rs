//! Table and stored-entity models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved property names carried by every entity.
pub const PARTITION_KEY: &str = "PartitionKey";
pub const ROW_KEY: &str = "RowKey";
pub const TIMESTAMP: &str = "Timestamp";

/// Maximum number of custom properties on one entity.
pub const MAX_ENTITY_PROPERTIES: usize = 252;

/// Maximum number of entities in one batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Table metadata kept by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableModel {
    /// Table name as it was created. Lookups ignore case.
    pub name: String,
    pub created_on: DateTime<Utc>,
}

impl TableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_on: Utc::now(),
        }
    }
}

/// An entity as the store sees it: keys, system fields and a property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub partition_key: String,
    pub row_key: String,
    /// Change-tracking token, assigned by the store on every write.
    pub etag: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub properties: Map<String, Value>,
}

impl EntityRecord {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            etag: None,
            timestamp: None,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Composite key used to order entities within a table.
    pub fn key(&self) -> (String, String) {
        (self.partition_key.clone(), self.row_key.clone())
    }
}

/// How an upsert treats properties already stored under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertMode {
    /// Supplied properties overwrite, others are kept.
    #[default]
    Merge,
    /// The stored entity is replaced wholesale.
    Replace,
}

/// Position to resume a partition query from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

/// One page of a partition query.
#[derive(Debug, Clone, Default)]
pub struct EntityPage {
    pub entities: Vec<EntityRecord>,
    pub continuation: Option<ContinuationToken>,
}

/// Outcome of a committed batch insert.
#[derive(Debug, Clone)]
pub struct BatchResult<E> {
    pub partition_key: String,
    /// Inserted entities, in submission order, with their assigned ETags.
    pub entities: Vec<E>,
}

impl<E> BatchResult<E> {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
