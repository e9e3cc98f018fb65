//! bootstrap-runner CLI: scheduler daemon plus operator commands.

use anyhow::Context as _;
use bootstrap_runner::config::secrets::ExposeSecret;
use bootstrap_runner::config::{Config, Settings, log_level_from_env};
use bootstrap_runner::db::{Db, MemoryRepository, Repository};
use bootstrap_runner::engine::{
    ArtifactCollector, BuildInvoker, CycleReport, ItemReport, Pipeline, Scheduler,
    SchedulerConfig,
};
use bootstrap_runner::model::{Outcome, Status, WorkId, WorkItem};
use bootstrap_runner::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "bootstrap-runner",
    version,
    about = "Drive pending work items through the bootstrap pipeline"
)]
struct Cli {
    /// Defaults to `serve`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the recurring scheduler until SIGINT/SIGTERM
    Serve,
    /// Health check plus a single scan cycle, then exit
    Once,
    /// Push one in-memory work item through the full pipeline
    Synthetic {
        /// Display name of the synthetic item
        #[arg(long, default_value = "FitTrack")]
        name: String,
        /// Artifact name to match when nothing matches the item's slug
        #[arg(long)]
        fallback_name: Option<String>,
    },
    /// Apply database migrations
    Migrate,
    /// Work item operations
    Items {
        #[command(subcommand)]
        action: ItemAction,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Create a pending work item
    Submit {
        /// Display name the slug is derived from
        display_name: String,
    },
    /// List work items
    List {
        /// Filter by status (pending, in_progress, completed, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a work item and its processing results
    Show {
        /// Work item ID (full UUID)
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => cmd_serve().await,
        Command::Once => cmd_once().await,
        Command::Synthetic {
            name,
            fallback_name,
        } => cmd_synthetic(name, fallback_name).await,
        Command::Migrate => {
            let (_guard, db) = connect().await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Items { action } => {
            let (_guard, db) = connect().await?;
            match action {
                ItemAction::Submit { display_name } => cmd_items_submit(&db, display_name).await,
                ItemAction::List { status, limit } => cmd_items_list(&db, status, limit).await,
                ItemAction::Show { id } => cmd_items_show(&db, id).await,
            }
        }
    }
}

/// Load env config, start telemetry, and open the database.
///
/// A database that cannot be reached here is fatal.
async fn connect() -> anyhow::Result<(TelemetryGuard, Db)> {
    let config = Config::from_env()?;
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "bootstrap-runner".to_string(),
        default_filter: config.log_level.clone(),
    })?;
    let db = Db::connect(config.database_url.expose_secret())
        .await
        .context("cannot connect to database")?;
    Ok((guard, db))
}

fn scheduler_for<R: Repository>(repo: Arc<R>, settings: &Settings) -> anyhow::Result<Scheduler<R>> {
    let pipeline = Pipeline::from_settings(repo, settings)?;
    Ok(Scheduler::new(pipeline, SchedulerConfig::from_settings(settings)))
}

async fn cmd_serve() -> anyhow::Result<()> {
    let (_guard, db) = connect().await?;
    let settings = Settings::from_env()?;
    let scheduler = scheduler_for(Arc::new(db), &settings)?;

    // start() runs the first cycle inline; keep listening for signals meanwhile.
    let mut starter = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let interrupted = tokio::select! {
        joined = &mut starter => {
            joined?.context("repository health check failed")?;
            false
        }
        () = &mut signal => true,
    };
    if !interrupted {
        signal.await;
    }

    scheduler.stop().await;
    if interrupted {
        starter.await??;
    }
    info!("shutdown complete");
    Ok(())
}

async fn cmd_once() -> anyhow::Result<()> {
    let (_guard, db) = connect().await?;
    let settings = Settings::from_env()?;
    let scheduler = scheduler_for(Arc::new(db), &settings)?;

    let report = scheduler
        .run_once()
        .await
        .context("single scan cycle failed")?;
    print_cycle(&report);
    Ok(())
}

async fn cmd_synthetic(name: String, fallback_name: Option<String>) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: std::env::var("OTEL_ENDPOINT").ok(),
        service_name: "bootstrap-runner".to_string(),
        default_filter: log_level_from_env(),
    })?;
    let settings = Settings::from_env()?;

    let repo = Arc::new(MemoryRepository::new());
    let item = repo.insert(name);
    info!(id = %item.id, slug = %item.slug(), "synthetic work item created");

    let mut collector = ArtifactCollector::from_settings(&settings.artifacts);
    if let Some(fallback) = fallback_name {
        collector = collector.with_fallback_name(fallback);
    }
    let invoker = BuildInvoker::from_settings(&settings.build)?;
    let pipeline = Pipeline::new(repo, invoker, collector);

    match pipeline.process(item).await {
        ItemReport::Finished { result, .. } => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.outcome == Outcome::Error {
                anyhow::bail!("synthetic run failed");
            }
            Ok(())
        }
        ItemReport::Skipped { reason, .. } => anyhow::bail!("synthetic item not processed: {reason}"),
    }
}

async fn cmd_items_submit(db: &Db, display_name: String) -> anyhow::Result<()> {
    let item = db.submit_item(&display_name).await?;
    println!("Created: {} (slug: {}, status: {})", item.id, item.slug(), item.status);
    Ok(())
}

async fn cmd_items_list(db: &Db, status: Option<String>, limit: i64) -> anyhow::Result<()> {
    let status_filter: Option<Status> = match status {
        Some(s) => Some(s.parse().map_err(|_| anyhow::anyhow!("invalid status: {s}"))?),
        None => None,
    };

    let items = db.list_items(status_filter, limit).await?;
    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<11}  {:<30}  CREATED",
        "ID", "SLUG", "STATUS", "NAME"
    );
    println!("{}", "-".repeat(120));
    for item in &items {
        print_item_row(item);
    }
    println!("\n{} item(s)", items.len());
    Ok(())
}

fn print_item_row(item: &WorkItem) {
    let name: String = item.display_name.chars().take(30).collect();
    println!(
        "{:<36}  {:<20}  {:<11}  {:<30}  {}",
        item.id,
        item.slug(),
        item.status,
        name,
        item.created_at.format("%Y-%m-%d %H:%M")
    );
}

async fn cmd_items_show(db: &Db, id: String) -> anyhow::Result<()> {
    let uuid = uuid::Uuid::parse_str(&id).with_context(|| format!("invalid work item id: {id}"))?;
    let id = WorkId(uuid);
    let item = db.get_item(id).await?;

    println!("ID:       {}", item.id);
    println!("Name:     {}", item.display_name);
    println!("Slug:     {}", item.slug());
    println!("Status:   {}", item.status);
    println!("Created:  {}", item.created_at);
    println!("Updated:  {}", item.updated_at);

    for result in db.results_for(id).await? {
        println!("---");
        println!("Outcome:  {}", result.outcome);
        println!("At:       {}", result.timestamp);
        println!("Duration: {}ms", result.duration_ms);
        if let Some(path) = &result.summary_path {
            println!("Summary:  {}", path.display());
        }
        if let Some(path) = &result.output_path {
            println!("Results:  {}", path.display());
        }
        if let Some(err) = &result.error_message {
            println!("Error:    {err}");
        }
    }
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    println!(
        "Discovered {}: {} completed, {} failed, {} skipped",
        report.discovered, report.completed, report.failed, report.skipped
    );
    for item in &report.items {
        let outcome = item.outcome().map(|o| o.as_str()).unwrap_or("skipped");
        println!("  {}  {outcome}", item.id());
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, stopping scheduler"),
        () = terminate => info!("received SIGTERM, stopping scheduler"),
    }
}
