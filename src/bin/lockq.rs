//! lockq CLI: run the broker or inspect its queue.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use lockq::config::Config;
use lockq::config::secrets::ExposeSecret;
use lockq::db::Db;
use lockq::engine::{QueueEngine, RetentionSweeper};
use lockq::model::{Status, WorkId, WorkItem};
use lockq::storage::{MemoryStore, WorkItemStore};
use lockq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "lockq", about = "FIFO arbitration broker for a shared actuator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP broker and retention sweeper
    Serve {
        /// Listen address (overrides BIND_ADDR / PORT)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show the queue as one requester sees it
    Status {
        /// Requester ID
        requester: String,
    },
    /// List work items
    List {
        /// Filter by status (pending, processing, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a work item
    Show {
        /// Work item ID
        id: String,
    },
    /// Resolve a work item by hand
    Complete {
        /// Work item ID
        id: String,
        /// Record a failure instead of a success
        #[arg(long)]
        failed: bool,
        /// Failure reason
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove resolved items older than the retention window
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { bind } => cmd_serve(config, bind).await,
        command => {
            let engine = connect(&config).await?;
            match command {
                Command::Status { requester } => cmd_status(&engine, &requester).await,
                Command::List { status } => cmd_list(&engine, status).await,
                Command::Show { id } => cmd_show(&engine, &id).await,
                Command::Complete { id, failed, reason } => {
                    cmd_complete(&engine, &id, !failed, reason).await
                }
                Command::Sweep => {
                    let removed = engine.retention_sweep().await?;
                    println!("Removed {removed} resolved work items");
                    Ok(())
                }
                Command::Serve { .. } => Ok(()),
            }
        }
    }
}

/// Engine over Postgres, for the inspection commands.
async fn connect(config: &Config) -> anyhow::Result<QueueEngine> {
    let db = Db::connect(config.require_database_url()?.expose_secret()).await?;
    db.migrate().await?;
    Ok(QueueEngine::new(Arc::new(db), config.engine.clone())?)
}

async fn cmd_serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "lockq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let store: Arc<dyn WorkItemStore> = match config.database_url {
        Some(ref url) => {
            let db = Db::connect(url.expose_secret()).await?;
            db.migrate().await?;
            db.health_check().await?;
            Arc::new(db)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let engine = Arc::new(QueueEngine::new(store, config.engine.clone())?);

    let sweeper = RetentionSweeper::new(Arc::clone(&engine), config.sweep_interval);
    let sweep_task = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.run().await })
    };

    let bind_addr = bind.unwrap_or(config.bind_addr);
    let served = lockq::http::run_http(engine, &bind_addr).await;

    sweeper.shutdown();
    sweep_task.await?;
    served?;
    Ok(())
}

async fn cmd_status(engine: &QueueEngine, requester: &str) -> anyhow::Result<()> {
    let status = engine.query_status(requester).await?;
    println!("Processing:  {}", status.is_processing);
    if let Some(ref current) = status.current_requester_id {
        println!("Current:     {current}");
    }
    println!("Queue:       {}", status.queue_length);
    println!("Position:    {}", status.your_position);
    Ok(())
}

async fn cmd_list(engine: &QueueEngine, status: Option<String>) -> anyhow::Result<()> {
    let statuses = match status {
        Some(s) => vec![s.parse::<Status>()?],
        None => Status::ALL.to_vec(),
    };

    let items = engine.list(&statuses).await?;
    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<6}  {:<10}  {:<20}  SUBMITTED",
        "ID", "ACTION", "STATUS", "REQUESTER"
    );
    for item in &items {
        println!(
            "{:<36}  {:<6}  {:<10}  {:<20}  {}",
            item.id.to_string(),
            item.action,
            item.status,
            item.requester_id,
            item.submitted_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_show(engine: &QueueEngine, id: &str) -> anyhow::Result<()> {
    let id: WorkId = id.parse()?;
    print_item(&engine.get(id).await?);
    Ok(())
}

async fn cmd_complete(
    engine: &QueueEngine,
    id: &str,
    success: bool,
    reason: Option<String>,
) -> anyhow::Result<()> {
    let id: WorkId = id.parse()?;
    let item = engine.complete(id, success, reason).await?;
    print_item(&item);
    Ok(())
}

fn print_item(item: &WorkItem) {
    println!("ID:          {}", item.id);
    println!("Action:      {}", item.action);
    println!("Requester:   {}", item.requester_id);
    println!("Status:      {}", item.status);
    println!("Submitted:   {}", item.submitted_at.to_rfc3339());
    if let Some(at) = item.processing_started_at {
        println!("Claimed:     {}", at.to_rfc3339());
    }
    if let Some(at) = item.completed_at {
        println!("Resolved:    {}", at.to_rfc3339());
    }
    if let Some(ref reason) = item.failure_reason {
        println!("Reason:      {reason}");
    }
}
