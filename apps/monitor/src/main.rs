use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

use uptime_monitor::{
    Config, HistoryRecord, HistoryStore, HttpProbe, LibsqlHistoryStore, MonitorError,
    MonitoringScheduler, Probe, pool::open_pool,
};

#[derive(Debug, Parser)]
#[command(version, about = "Periodic HTTP uptime monitor")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/uptime-monitor/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the history database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Override the log file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe every endpoint each interval until interrupted (default)
    Run,
    /// Run a single cycle, then show the latest history
    Once {
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Probe URLs once without recording the results
    Probe {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Timeout in seconds
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
    /// Show the most recent history records
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_ref())?;
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }
    if let Some(log_file) = cli.log_file {
        config.logging.file = Some(log_file);
    }

    let _log_guard = logger::init_with_file(config.logging.file.as_deref());
    debug!("{}", config);

    let outcome = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Once { limit } => once(&config, limit).await,
        Command::Probe { urls, timeout } => probe(urls, Duration::from_secs(timeout)).await,
        Command::History { limit, json } => history(&config, limit, json).await,
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

async fn open_store(config: &Config) -> Result<Arc<LibsqlHistoryStore>> {
    let pool = open_pool(&config.storage.database_path).await?;
    Ok(Arc::new(LibsqlHistoryStore::new_from_pool(pool)))
}

fn build_scheduler(
    config: &Config,
    store: Arc<LibsqlHistoryStore>,
) -> Result<MonitoringScheduler, MonitorError> {
    let probe = Arc::new(HttpProbe::new()?);
    Ok(MonitoringScheduler::new(config.monitor.clone(), probe, store)?)
}

async fn run(config: &Config) -> Result<()> {
    config.validate()?;
    let store = open_store(config).await?;
    let scheduler = build_scheduler(config, store)?;

    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Monitor stopped by user (Ctrl+C)");
            shutdown.cancel();
        }
    });

    scheduler.run().await?;
    Ok(())
}

async fn once(config: &Config, limit: usize) -> Result<()> {
    config.validate()?;
    let store = open_store(config).await?;
    let scheduler = build_scheduler(config, store.clone())?;

    let report = scheduler.run_once().await?;
    println!(
        "Checked {} endpoints, {} status change(s). Latest records:",
        report.results.len(),
        report.transitions.len()
    );
    print_records(&store.recent(limit).await?, false)
}

async fn probe(urls: Vec<String>, timeout: Duration) -> Result<()> {
    let probe = HttpProbe::new().context("failed to build HTTP client")?;

    for url in urls {
        let result = probe.check(&url, timeout).await;
        let code = result.status_code().map_or("None".to_string(), |code| code.to_string());
        let latency = result
            .response_time_ms()
            .map_or("N/A".to_string(), |ms| format!("{ms:.1}ms"));

        println!("[{}] {}", result.status().as_str().to_uppercase(), result.endpoint());
        println!("  Status code: {code}");
        println!("  Response time: {latency}");
        println!("  Checked at: {}", result.checked_at().to_rfc3339());
        println!();
    }

    Ok(())
}

async fn history(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    print_records(&store.recent(limit).await?, json)
}

fn print_records(records: &[HistoryRecord], json: bool) -> Result<()> {
    if records.is_empty() && !json {
        println!("No history recorded yet");
    }

    for record in records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{record}");
        }
    }

    Ok(())
}
