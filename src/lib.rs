//! storage-facade: typed Azure Table and Queue Storage clients.
//!
//! The clients validate caller input and hand every operation to a
//! [`TableStore`] or [`QueueStore`]. An in-process implementation of both
//! ships with the crate.
//!
//! # Example
//!
//! ```no_run
//! use storage_facade::{Settings, TableClient, WorkerModel};
//!
//! #[tokio::main]
//! async fn main() -> storage_facade::Result<()> {
//!     let settings = Settings::load("Settings.json")?;
//!     let client = TableClient::from_settings(&settings)?;
//!     let table = client.create_table_if_absent("WorkerTable").await?;
//!     table
//!         .upsert_entity(&WorkerModel::new("Harp", "abc123").with_department("外交部"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;

// Re-exports for convenience
pub use account::StorageAccount;
pub use client::{QueueClient, QueueHandle, TableClient, TableHandle};
pub use config::{Args, ClientOptions, Config, Settings, DEFAULT_SETTINGS_FILE};
pub use error::{Error, ErrorCode, Result, StorageError, StorageResult};
pub use models::{
    BatchResult, DynamicEntity, MessageTtl, QueueMessage, SendReceipt, TableEntity, WorkerModel,
};
pub use storage::{MemoryQueueStore, MemoryTableStore, QueueStore, TableStore};
