use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::Parser;
use divvy_loader::{
    config::{LoaderConfig, DEFAULT_INDEX},
    inputs, pipeline,
    sink::{BulkConfig, BulkProcessor, ElasticClient, FailFast, FailurePolicy, LogAndContinue},
};
use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Load Divvy station and trip CSVs into an Elasticsearch index"
)]
struct Args {
    /// Delete the index and exit.
    #[arg(long)]
    delete: bool,

    #[arg(long, env = "ELASTIC_ENDPOINT", default_value = "http://localhost:9200")]
    endpoint: String,

    #[arg(long, env = "ELASTIC_USERNAME", default_value = "")]
    username: String,

    #[arg(long, env = "ELASTIC_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[arg(long, default_value = DEFAULT_INDEX)]
    index: String,

    /// Defaults to $HOME/data/divvy.
    #[arg(long, env = "DIVVY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value = "mapping.json")]
    mapping: PathBuf,

    /// IANA zone the CSV wall-clock times are in.
    #[arg(long, default_value = "America/Chicago")]
    timezone: Tz,

    #[arg(long, default_value_t = 4)]
    workers: usize,

    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    #[arg(long, default_value_t = 30)]
    flush_interval_secs: u64,

    #[arg(long, default_value_t = 8)]
    queue_capacity: usize,

    /// Log rejected documents instead of aborting the run.
    #[arg(long)]
    continue_on_bulk_failure: bool,
}

impl Args {
    fn loader_config(&self) -> Result<LoaderConfig> {
        let data_dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => inputs::default_data_dir().context("HOME is not set; pass --data-dir")?,
        };
        Ok(LoaderConfig::new(data_dir)
            .with_timezone(self.timezone)
            .with_bulk(BulkConfig {
                workers: self.workers,
                batch_size: self.batch_size,
                flush_interval: Duration::from_secs(self.flush_interval_secs),
                queue_capacity: self.queue_capacity,
            }))
    }

    fn policy(&self) -> Arc<dyn FailurePolicy> {
        if self.continue_on_bulk_failure {
            Arc::new(LogAndContinue)
        } else {
            Arc::new(FailFast)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,divvy_loader=debug"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let start = Instant::now();

    // ─── 2) connect ──────────────────────────────────────────────────
    let client = ElasticClient::new(
        &args.endpoint,
        args.index.clone(),
        Some(args.username.clone()),
        Some(args.password.clone()),
    )?;
    info!(endpoint = %client.endpoint(), index = client.index(), "startup");

    if args.delete {
        client.delete_index().await?;
        warn!(index = client.index(), "Index deleted");
        return Ok(());
    }

    // ─── 3) index + sink ─────────────────────────────────────────────
    let config = args.loader_config()?;
    client
        .ensure_index(&args.mapping)
        .await
        .with_context(|| format!("preparing index {}", client.index()))?;

    let sink = BulkProcessor::new(Arc::new(client), args.policy(), config.bulk.clone());

    // ─── 4) ingest ───────────────────────────────────────────────────
    let stats = pipeline::run(&config, sink).await?;
    info!(
        stations = stats.stations,
        trips = stats.trips.enriched,
        skipped = stats.trips.skipped,
        committed = stats.sink.committed,
        rejected = stats.sink.rejected,
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
