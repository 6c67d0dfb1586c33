//! Common test utilities.

#![allow(dead_code)]

use std::sync::Arc;

use storage_facade::{
    ClientOptions, MemoryQueueStore, MemoryTableStore, QueueClient, StorageAccount, TableClient,
    TableHandle, WorkerModel,
};

/// Table client over a fresh in-process store.
pub fn table_client() -> TableClient {
    TableClient::in_memory(StorageAccount::development())
}

/// Table client whose partition scans return at most `page_size` entities per page.
pub fn paged_table_client(page_size: u32) -> TableClient {
    TableClient::with_options(
        StorageAccount::development(),
        Arc::new(MemoryTableStore::new()),
        ClientOptions::default().with_max_page_size(page_size),
    )
    .unwrap()
}

/// Queue client over a fresh in-process store.
pub fn queue_client() -> QueueClient {
    QueueClient::in_memory(StorageAccount::development())
}

/// Queue client that hides received messages for `seconds`.
pub fn queue_client_with_visibility(seconds: i64) -> QueueClient {
    QueueClient::with_options(
        StorageAccount::development(),
        Arc::new(MemoryQueueStore::new()),
        ClientOptions::default().with_visibility_timeout(chrono::Duration::seconds(seconds)),
    )
    .unwrap()
}

/// Creates a table on a fresh client.
pub async fn fresh_table(name: &str) -> TableHandle {
    table_client().create_table_if_absent(name).await.unwrap()
}

pub fn worker(partition_key: &str, row_key: &str) -> WorkerModel {
    WorkerModel::new(partition_key, row_key)
        .with_worker_name(format!("worker {}", row_key))
        .with_job_number(row_key.to_string())
        .with_department("外交部")
}
