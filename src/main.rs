//! storage-demo: walks through table and queue operations.

use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use tracing_subscriber::FmtSubscriber;

use storage_facade::{
    Args, Config, MemoryQueueStore, MemoryTableStore, QueueClient, TableClient, WorkerModel,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command-line arguments
    let config = Config::from(Args::parse());

    // Set up logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let settings = config.load_settings()?;
    let account = settings.account()?;

    let tables = TableClient::with_options(
        account.clone(),
        Arc::new(MemoryTableStore::new()),
        config.options.clone(),
    )?;
    let queues = QueueClient::with_options(
        account,
        Arc::new(MemoryQueueStore::new()),
        config.options.clone(),
    )?;

    println!("Account: {}", tables.account().name());

    run_tables(&tables, &config).await?;
    run_queues(&queues, &config).await?;

    println!("\nDone.");
    Ok(())
}

async fn run_tables(
    client: &TableClient,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("\nCreating table {}...", config.table_name);
    let table = client.create_table_if_absent(&config.table_name).await?;
    println!("Table URL: {}", table.url());

    let worker = WorkerModel::new("Harp", "abc123")
        .with_worker_name("Walter Harp")
        .with_job_number("0001")
        .with_department("外交部");
    let inserted = table.upsert_entity(&worker).await?;
    println!(
        "Inserted {} / {} in {}",
        inserted.partition_key,
        inserted.row_key,
        inserted.department.as_deref().unwrap_or("-")
    );

    let update = WorkerModel::new("Harp", "abc123").with_department("策划部");
    table.upsert_entity(&update).await?;

    let fetched = table
        .get_entity::<WorkerModel>("Harp", "abc123")
        .await?
        .ok_or("entity vanished after upsert")?;
    println!(
        "Retrieved {} ({}) in {}",
        fetched.worker_name.as_deref().unwrap_or("-"),
        fetched.job_number.as_deref().unwrap_or("-"),
        fetched.department.as_deref().unwrap_or("-")
    );

    let team: Vec<WorkerModel> = (2..=4)
        .map(|i| {
            WorkerModel::new("Harp", format!("abc12{}", i))
                .with_worker_name(format!("Worker {}", i))
                .with_department("策划部")
        })
        .collect();
    let batch = table.batch_insert(&team).await?;
    println!("Batch inserted {} workers", batch.len());

    let partition: Vec<WorkerModel> = table.scan_partition("Harp").await?;
    println!("Partition Harp holds {} workers", partition.len());

    table.delete_entity(&fetched).await?;
    let gone = table.get_entity::<WorkerModel>("Harp", "abc123").await?;
    println!("After delete: {}", if gone.is_none() { "not found" } else { "still present" });

    table.delete().await?;
    println!("Deleted table {}", table.name());
    Ok(())
}

async fn run_queues(
    client: &QueueClient,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("\nCreating queue {}...", config.queue_name);
    let queue = client.create_queue(&config.queue_name).await?;

    let outgoing = [
        ("First message", true),
        ("Second message", true),
        ("Third message", false),
    ];
    for (body, infinite) in outgoing {
        let receipt = queue.send_message(body, infinite).await?;
        match receipt.expires_on {
            Some(at) => println!("Sent '{}' (expires {})", body, at),
            None => println!("Sent '{}' (never expires)", body),
        }
    }

    let messages = queue.receive_messages(10).await?;
    println!("\nPress Enter to process and delete {} messages...", messages.len());
    pause(config)?;

    for message in &messages {
        println!("Message: {}", message.message_text);
        queue
            .delete_message(&message.message_id, &message.pop_receipt)
            .await?;
    }

    println!("\nPress Enter to delete the queue...");
    pause(config)?;
    queue.delete().await?;
    println!("Deleted queue {}", queue.name());
    Ok(())
}

fn pause(config: &Config) -> std::io::Result<()> {
    if config.pause {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
    }
    Ok(())
}
