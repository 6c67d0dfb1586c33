//! Settings file and client construction tests.

use std::fs;

use storage_facade::{Args, Config, Error, QueueClient, Settings, TableClient, WorkerModel};
use tempfile::TempDir;

fn write_settings(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Settings.json");
    fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_clients_from_settings_file() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, r#"{"StorageConnectionString": "UseDevelopmentStorage=true"}"#);

    let settings = Settings::load(&path).unwrap();
    let tables = TableClient::from_settings(&settings).unwrap();
    assert!(tables.account().is_development());

    let table = tables.create_table_if_absent("WorkerTable").await.unwrap();
    table
        .upsert_entity(&WorkerModel::new("Harp", "abc123").with_department("外交部"))
        .await
        .unwrap();

    let queues = QueueClient::from_settings(&settings).unwrap();
    let queue = queues.create_queue("queues68f86").await.unwrap();
    assert_eq!(
        queue.url().as_str(),
        "http://127.0.0.1:10001/devstoreaccount1/queues68f86"
    );
}

#[test]
fn test_missing_settings_file() {
    let dir = TempDir::new().unwrap();
    let err = Settings::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn test_settings_file_not_json() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, "StorageConnectionString=UseDevelopmentStorage=true");
    let err = Settings::load(&path).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_malformed_connection_string() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(
        &dir,
        r#"{"StorageConnectionString": "AccountName=demoacct;AccountKey=***"}"#,
    );
    let settings = Settings::load(&path).unwrap();

    let err = TableClient::from_settings(&settings).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("AccountName and AccountKey"));
    assert!(QueueClient::from_settings(&settings).is_err());
}

#[test]
fn test_real_account_connection_string() {
    let conn = format!(
        "DefaultEndpointsProtocol=https;AccountName=demoacct;AccountKey={}",
        storage_facade::config::DEFAULT_ACCOUNT_KEY
    );
    let client = TableClient::from_connection_string(&conn).unwrap();
    assert!(!client.account().is_development());
    assert_eq!(
        client.table("Workers").unwrap().url().as_str(),
        "https://demoacct.table.core.windows.net/Workers"
    );
}

#[test]
fn test_config_reads_named_settings_file() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, r#"{"StorageConnectionString": "UseDevelopmentStorage=true"}"#);

    let config = Config::from(Args {
        settings: path,
        ..Args::default()
    });
    let settings = config.load_settings().unwrap();
    assert_eq!(settings.storage_connection_string, "UseDevelopmentStorage=true");
}

#[test]
fn test_client_debug_hides_account_key() {
    let key = storage_facade::config::DEFAULT_ACCOUNT_KEY;
    let conn = format!("AccountName=demoacct;AccountKey={}", key);

    let tables = format!("{:?}", TableClient::from_connection_string(&conn).unwrap());
    assert!(tables.contains("demoacct"));
    assert!(!tables.contains(key));

    let queues = format!("{:?}", QueueClient::from_connection_string(&conn).unwrap());
    assert!(queues.contains("demoacct"));
    assert!(!queues.contains(key));
}
