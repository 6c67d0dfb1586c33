//! Table client tests.

mod common;

use std::collections::BTreeSet;

use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use common::{fresh_table, paged_table_client, table_client, worker};
use storage_facade::{DynamicEntity, Error, ErrorCode, TableEntity, WorkerModel};

#[tokio::test]
async fn test_upsert_then_get() {
    let table = fresh_table("Workers").await;

    let written = table.upsert_entity(&worker("Harp", "abc123")).await.unwrap();
    assert!(written.etag.is_some());
    assert!(written.timestamp.is_some());

    let fetched: WorkerModel = table.get_entity("Harp", "abc123").await.unwrap().unwrap();
    assert_eq!(fetched.worker_name.as_deref(), Some("worker abc123"));
    assert_eq!(fetched.job_number.as_deref(), Some("abc123"));
    assert_eq!(fetched.department.as_deref(), Some("外交部"));
    assert_eq!(fetched.etag, written.etag);
}

#[tokio::test]
async fn test_merge_keeps_omitted_fields() {
    let table = fresh_table("Workers").await;

    table
        .upsert_entity(
            &WorkerModel::new("Harp", "abc123")
                .with_worker_name("Walter")
                .with_job_number("0001")
                .with_department("外交部"),
        )
        .await
        .unwrap();
    table
        .upsert_entity(&WorkerModel::new("Harp", "abc123").with_department("策划部"))
        .await
        .unwrap();

    let fetched: WorkerModel = table.get_entity("Harp", "abc123").await.unwrap().unwrap();
    assert_eq!(fetched.department.as_deref(), Some("策划部"));
    assert_eq!(fetched.worker_name.as_deref(), Some("Walter"));
    assert_eq!(fetched.job_number.as_deref(), Some("0001"));

    table.delete_entity(&fetched).await.unwrap();
    let gone: Option<WorkerModel> = table.get_entity("Harp", "abc123").await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_replace_drops_omitted_fields() {
    let table = fresh_table("Workers").await;
    table.upsert_entity(&worker("Harp", "r1")).await.unwrap();

    let replaced = table
        .replace_entity(&WorkerModel::new("Harp", "r1").with_department("策划部"))
        .await
        .unwrap();
    assert_eq!(replaced.worker_name, None);

    let fetched: WorkerModel = table.get_entity("Harp", "r1").await.unwrap().unwrap();
    assert_eq!(fetched.worker_name, None);
    assert_eq!(fetched.job_number, None);
    assert_eq!(fetched.department.as_deref(), Some("策划部"));
}

#[tokio::test]
async fn test_insert_entity_rejects_existing_keys() {
    let table = fresh_table("Workers").await;

    let inserted = table.insert_entity(&worker("Harp", "abc123")).await.unwrap();
    assert!(inserted.etag.is_some());

    let err = table
        .insert_entity(&WorkerModel::new("Harp", "abc123").with_department("策划部"))
        .await
        .unwrap_err();
    assert_eq!(err.store_code(), Some(ErrorCode::EntityAlreadyExists));

    let fetched: WorkerModel = table.get_entity("Harp", "abc123").await.unwrap().unwrap();
    assert_eq!(fetched.department.as_deref(), Some("外交部"));
}

#[tokio::test]
async fn test_stored_entity_of_wrong_shape_is_store_error() {
    let table = fresh_table("Workers").await;
    table
        .upsert_entity(&DynamicEntity::new("Harp", "abc123").with_property("WorkerName", 42))
        .await
        .unwrap();

    let err = table
        .get_entity::<WorkerModel>("Harp", "abc123")
        .await
        .unwrap_err();
    assert_eq!(err.store_code(), Some(ErrorCode::InvalidInput));
    assert!(!matches!(err, Error::Argument(_)));
}

#[tokio::test]
async fn test_get_missing_entity_is_none() {
    let table = fresh_table("Workers").await;
    let missing: Option<WorkerModel> = table.get_entity("Nobody", "none").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_delete_with_stale_etag_fails() {
    let table = fresh_table("Workers").await;
    let first = table.upsert_entity(&worker("Harp", "r1")).await.unwrap();
    table
        .upsert_entity(&WorkerModel::new("Harp", "r1").with_job_number("0002"))
        .await
        .unwrap();

    let err = table.delete_entity(&first).await.unwrap_err();
    assert_eq!(err.store_code(), Some(ErrorCode::UpdateConditionNotSatisfied));

    let still_there: Option<WorkerModel> = table.get_entity("Harp", "r1").await.unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn test_delete_requires_etag() {
    let table = fresh_table("Workers").await;
    table.upsert_entity(&worker("Harp", "r1")).await.unwrap();

    let mut unsaved = WorkerModel::new("Harp", "r1");
    let err = table.delete_entity(&unsaved).await.unwrap_err();
    assert!(matches!(err, Error::Argument(_)));

    unsaved.set_etag(Some("*".to_string()));
    table.delete_entity(&unsaved).await.unwrap();
    let gone: Option<WorkerModel> = table.get_entity("Harp", "r1").await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_delete_missing_entity_is_store_error() {
    let table = fresh_table("Workers").await;
    let mut ghost = WorkerModel::new("Harp", "ghost");
    ghost.set_etag(Some("*".to_string()));
    let err = table.delete_entity(&ghost).await.unwrap_err();
    assert_eq!(err.store_code(), Some(ErrorCode::EntityNotFound));
}

#[tokio::test]
async fn test_create_table_is_idempotent() {
    let client = table_client();
    let first = client.create_table_if_absent("Workers").await.unwrap();
    first.upsert_entity(&worker("Harp", "r1")).await.unwrap();

    let second = client.create_table_if_absent("Workers").await.unwrap();
    assert_eq!(first.url(), second.url());
    let fetched: Option<WorkerModel> = second.get_entity("Harp", "r1").await.unwrap();
    assert!(fetched.is_some());
}

#[tokio::test]
async fn test_delete_table_is_idempotent() {
    let client = table_client();
    let table = client.create_table_if_absent("Transient").await.unwrap();
    assert!(table.delete().await.unwrap());
    assert!(!table.delete().await.unwrap());
    assert!(!client.delete_table("NeverCreated").await.unwrap());
    assert!(!table.exists().await);
}

#[tokio::test]
async fn test_scan_partition_across_pages() {
    let mut rng = rand::thread_rng();

    for page_size in [1, 3, 7, 1000] {
        let table = paged_table_client(page_size)
            .create_table_if_absent("Scan")
            .await
            .unwrap();

        let mut expected = BTreeSet::new();
        let mut rows: Vec<WorkerModel> = Vec::new();
        for _ in 0..rng.gen_range(10..40) {
            let row_key = format!("{:06}", rng.gen_range(0..1_000_000));
            if expected.insert(row_key.clone()) {
                rows.push(worker("Target", &row_key));
            }
        }
        for i in 0..15 {
            rows.push(worker("Before", &i.to_string()));
            rows.push(worker("Tarset", &i.to_string()));
            rows.push(worker("Targett", &i.to_string()));
        }
        rows.shuffle(&mut rng);
        for row in &rows {
            table.upsert_entity(row).await.unwrap();
        }

        let scanned: Vec<WorkerModel> = table.scan_partition("Target").await.unwrap();
        let scanned_keys: BTreeSet<String> = scanned.iter().map(|w| w.row_key.clone()).collect();
        assert_eq!(scanned.len(), expected.len(), "page size {}", page_size);
        assert_eq!(scanned_keys, expected, "page size {}", page_size);
        assert!(scanned.iter().all(|w| w.partition_key == "Target"));
    }
}

#[tokio::test]
async fn test_scan_empty_partition() {
    let table = fresh_table("Scan").await;
    let scanned: Vec<WorkerModel> = table.scan_partition("Nobody").await.unwrap();
    assert!(scanned.is_empty());
}

#[tokio::test]
async fn test_partition_pages_stream() {
    let table = paged_table_client(4)
        .create_table_if_absent("Pages")
        .await
        .unwrap();
    for i in 0..10 {
        table.upsert_entity(&worker("P", &format!("{:02}", i))).await.unwrap();
    }

    let pages: Vec<Vec<WorkerModel>> = table
        .partition_pages::<WorkerModel>("P")
        .map(|page| page.unwrap())
        .collect()
        .await;
    let sizes: Vec<usize> = pages.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(pages[2][1].row_key, "09");
}

#[tokio::test]
async fn test_batch_insert() {
    let table = fresh_table("Batch").await;
    let workers: Vec<WorkerModel> = (0..5).map(|i| worker("Team", &i.to_string())).collect();

    let result = table.batch_insert(&workers).await.unwrap();
    assert_eq!(result.partition_key, "Team");
    assert_eq!(result.len(), 5);
    assert!(result.entities.iter().all(|w| w.etag.is_some()));

    let scanned: Vec<WorkerModel> = table.scan_partition("Team").await.unwrap();
    assert_eq!(scanned.len(), 5);
}

#[tokio::test]
async fn test_batch_rejects_mixed_partitions() {
    let table = fresh_table("Batch").await;
    let workers = vec![worker("A", "1"), worker("B", "2")];
    let err = table.batch_insert(&workers).await.unwrap_err();
    assert!(matches!(err, Error::Argument(_)));

    let scanned: Vec<WorkerModel> = table.scan_partition("A").await.unwrap();
    assert!(scanned.is_empty());
}

#[tokio::test]
async fn test_batch_size_limits() {
    let table = fresh_table("Batch").await;
    let empty: Vec<WorkerModel> = Vec::new();
    assert!(matches!(
        table.batch_insert(&empty).await.unwrap_err(),
        Error::Argument(_)
    ));

    let too_many: Vec<WorkerModel> = (0..101).map(|i| worker("Team", &i.to_string())).collect();
    assert!(matches!(
        table.batch_insert(&too_many).await.unwrap_err(),
        Error::Argument(_)
    ));
}

#[tokio::test]
async fn test_failed_batch_leaves_table_unchanged() {
    let table = fresh_table("Batch").await;
    table.upsert_entity(&worker("Team", "2")).await.unwrap();

    let workers: Vec<WorkerModel> = (0..4).map(|i| worker("Team", &i.to_string())).collect();
    let err = table.batch_insert(&workers).await.unwrap_err();
    assert_eq!(err.store_code(), Some(ErrorCode::EntityAlreadyExists));
    assert!(err.to_string().starts_with("2:"));

    let scanned: Vec<WorkerModel> = table.scan_partition("Team").await.unwrap();
    assert_eq!(scanned.len(), 1);
}

#[tokio::test]
async fn test_list_tables_with_prefix() {
    let client = paged_table_client(2);
    for name in ["Workers", "WorkLog", "Payroll", "Workshops", "Audit"] {
        client.create_table_if_absent(name).await.unwrap();
    }

    let all = client.list_tables(None).await.unwrap();
    assert_eq!(all.len(), 5);

    let names: Vec<String> = client
        .list_tables(Some("Work"))
        .await
        .unwrap()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names, vec!["WorkLog", "Workers", "Workshops"]);
}

#[tokio::test]
async fn test_dynamic_entities() {
    let table = fresh_table("Dynamic").await;
    let entity = DynamicEntity::new("Harp", "abc123")
        .with_property("Department", "外交部")
        .with_property("Level", 3)
        .with_property("Active", true);
    table.upsert_entity(&entity).await.unwrap();

    let as_worker: WorkerModel = table.get_entity("Harp", "abc123").await.unwrap().unwrap();
    assert_eq!(as_worker.department.as_deref(), Some("外交部"));

    let as_dynamic: DynamicEntity = table.get_entity("Harp", "abc123").await.unwrap().unwrap();
    assert_eq!(as_dynamic.get("Level"), Some(&Value::from(3)));
    assert_eq!(as_dynamic.get("Active"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_invalid_keys_rejected_before_store() {
    let table = table_client().table("NotCreated").unwrap();
    for (pk, rk) in [("", "r"), ("p", ""), ("a/b", "r"), ("p", "what?")] {
        let err = table.upsert_entity(&WorkerModel::new(pk, rk)).await.unwrap_err();
        assert!(matches!(err, Error::Argument(_)), "{:?}/{:?}", pk, rk);
    }
}

#[tokio::test]
async fn test_concurrent_upserts() {
    let table = fresh_table("Concurrent").await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let table = table.clone();
        tasks.push(tokio::spawn(async move {
            table
                .upsert_entity(&worker("Shared", &format!("{:02}", i)))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let scanned: Vec<WorkerModel> = table.scan_partition("Shared").await.unwrap();
    assert_eq!(scanned.len(), 16);
}
