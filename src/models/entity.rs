//! Typed entities and their conversion to store records.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::table::{EntityRecord, PARTITION_KEY, ROW_KEY, TIMESTAMP};

/// Anything that can be stored in a table.
///
/// Implementors serialize to a JSON object whose `PartitionKey` and `RowKey`
/// members hold the composite key; every other non-null member becomes an
/// entity property. The ETag and timestamp are assigned by the store and are
/// expected to be skipped by serde.
pub trait TableEntity: Serialize + DeserializeOwned + Send + Sync {
    fn partition_key(&self) -> &str;
    fn row_key(&self) -> &str;
    fn etag(&self) -> Option<&str>;
    fn set_etag(&mut self, etag: Option<String>);

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_timestamp(&mut self, _timestamp: Option<DateTime<Utc>>) {}
}

/// Converts an entity into the record handed to a store.
///
/// Null members are dropped, so an unset optional field never overwrites a
/// stored value under merge semantics.
pub fn to_record<E: TableEntity>(entity: &E) -> Result<EntityRecord, serde_json::Error> {
    let mut properties = match serde_json::to_value(entity)? {
        Value::Object(map) => map,
        other => {
            return Err(serde_json::Error::custom(format!(
                "entity must serialize to an object, got {}",
                other
            )))
        }
    };
    properties.remove(PARTITION_KEY);
    properties.remove(ROW_KEY);
    properties.remove(TIMESTAMP);
    properties.retain(|_, v| !v.is_null());

    Ok(EntityRecord {
        partition_key: entity.partition_key().to_string(),
        row_key: entity.row_key().to_string(),
        etag: entity.etag().map(str::to_string),
        timestamp: entity.timestamp(),
        properties,
    })
}

/// Rebuilds a typed entity from a stored record.
pub fn from_record<E: TableEntity>(record: EntityRecord) -> Result<E, serde_json::Error> {
    let EntityRecord {
        partition_key,
        row_key,
        etag,
        timestamp,
        mut properties,
    } = record;
    properties.insert(PARTITION_KEY.to_string(), Value::String(partition_key));
    properties.insert(ROW_KEY.to_string(), Value::String(row_key));

    let mut entity: E = serde_json::from_value(Value::Object(properties))?;
    entity.set_etag(etag);
    entity.set_timestamp(timestamp);
    Ok(entity)
}

/// A worker record keyed by `(PartitionKey, RowKey)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerModel {
    pub partition_key: String,
    pub row_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip)]
    pub etag: Option<String>,
    #[serde(skip)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WorkerModel {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Self::default()
        }
    }

    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = Some(worker_name.into());
        self
    }

    pub fn with_job_number(mut self, job_number: impl Into<String>) -> Self {
        self.job_number = Some(job_number.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

impl TableEntity for WorkerModel {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.timestamp = timestamp;
    }
}

/// A schemaless entity: keys plus an arbitrary property bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicEntity {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
    #[serde(skip)]
    pub etag: Option<String>,
    #[serde(skip)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DynamicEntity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

impl TableEntity for DynamicEntity {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.timestamp = timestamp;
    }
}
