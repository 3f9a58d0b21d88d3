//! CLI entry point for the heating station incident statistics job.
//!
//! `rank-stations` is the scheduled batch job: it rebuilds a year of station
//! status history from the backup bucket (or a local mirror of it) and writes
//! the ranked per-station incident statistics. `fetch-day` loads a single
//! day's bundles for diagnostics.

use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use heating_incidents::analyzers::analyzer::rank_stations;
use heating_incidents::bundles::fetch_day;
use heating_incidents::config::{
    DEFAULT_ARCHIVE_KEY, DEFAULT_CITY, DEFAULT_FETCH_WORKERS, DEFAULT_MAX_MISSING_DAYS, JobConfig,
};
use heating_incidents::output::{CsvSink, DEFAULT_STATS_KEY, FanOut, S3JsonSink};
use heating_incidents::store::{ArchiveStore, BundleStore, LocalStore, S3Store};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "heating_incidents")]
#[command(about = "Ranks district heating stations by incident time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Backup location: `s3://<bucket>` or a local directory with the same layout
    #[arg(long, env = "HISTORY_SOURCE")]
    source: String,

    /// Number of concurrent bundle downloads per day
    #[arg(short, long, env = "FETCH_WORKERS", default_value_t = DEFAULT_FETCH_WORKERS)]
    workers: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild one year of history and write ranked station statistics
    RankStations {
        #[command(flatten)]
        source: SourceArgs,

        /// Consecutive days without bundles before the backward walk stops
        #[arg(long, env = "MAX_MISSING_DAYS", default_value_t = DEFAULT_MAX_MISSING_DAYS)]
        max_missing_days: u32,

        /// First day covered by daily bundles; older history comes from the archive export
        #[arg(long, env = "BOUNDARY_DATE", default_value = "2025-11-03")]
        boundary_date: NaiveDate,

        /// Key of the archive export at the root of the source
        #[arg(long, env = "ARCHIVE_KEY", default_value = DEFAULT_ARCHIVE_KEY)]
        archive_key: String,

        #[arg(long, env = "CITY", default_value = DEFAULT_CITY)]
        city: String,

        /// CSV file to write the ranked statistics to
        #[arg(short, long)]
        output: Option<String>,

        /// Optional: S3 bucket to upload the ranked statistics JSON to
        #[arg(long, env = "STATS_BUCKET")]
        s3_output: Option<String>,

        /// Key of the uploaded statistics document
        #[arg(long, default_value = DEFAULT_STATS_KEY)]
        s3_key: String,
    },
    /// Load one day's bundles and print a status summary
    FetchDay {
        #[command(flatten)]
        source: SourceArgs,

        /// Day to load (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::RankStations {
            source,
            max_missing_days,
            boundary_date,
            archive_key,
            city,
            output,
            s3_output,
            s3_key,
        } => {
            let config = JobConfig {
                city,
                max_missing_days,
                boundary_date,
                archive_key,
                fetch_workers: source.workers,
            };

            let mut sink = FanOut::new();
            if let Some(path) = output {
                sink.push(Box::new(CsvSink::create(&path)?));
            }
            if let Some(bucket) = s3_output {
                let aws = aws_config::load_from_env().await;
                let s3 = S3JsonSink::new(aws_sdk_s3::Client::new(&aws), bucket, &config.city)
                    .with_key(s3_key);
                sink.push(Box::new(s3));
            }
            if sink.is_empty() {
                bail!("no output configured, pass --output and/or --s3-output");
            }

            let (bundles, archive) = open_source(&source.source).await;
            let summary = rank_stations(bundles, archive.as_ref(), &mut sink, &config, Utc::now()).await?;

            info!(
                events = summary.events,
                stations = summary.stations,
                coverage = ?summary.coverage,
                "Rank stations finished"
            );
        }
        Commands::FetchDay { source, date } => {
            let (bundles, _) = open_source(&source.source).await;
            let events = fetch_day(bundles, date, source.workers).await?;

            let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
            for event in &events {
                *by_status.entry(event.status.as_str()).or_default() += 1;
            }
            let stations: HashSet<i64> = events.iter().map(|e| e.station_id).collect();

            for (status, count) in &by_status {
                info!(status, count, "Status count");
            }
            info!(
                date = %date,
                events = events.len(),
                stations = stations.len(),
                "Day summary"
            );
        }
    }

    Ok(())
}

/// Colored stderr output plus a JSON rolling log file.
fn init_logging() -> Result<WorkerGuard> {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/heating_incidents.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("heating_incidents.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

/// Opens bundle and archive storage from an `s3://bucket` URL or a local path.
async fn open_source(source: &str) -> (Arc<dyn BundleStore>, Arc<dyn ArchiveStore>) {
    if let Some(bucket) = source.strip_prefix("s3://") {
        let bucket = bucket.trim_end_matches('/');
        info!(bucket, "Reading history from S3");
        let store = Arc::new(S3Store::from_env(bucket).await);
        let bundles: Arc<dyn BundleStore> = store.clone();
        let archive: Arc<dyn ArchiveStore> = store;
        (bundles, archive)
    } else {
        info!(root = source, "Reading history from local directory");
        let store = Arc::new(LocalStore::new(source));
        let bundles: Arc<dyn BundleStore> = store.clone();
        let archive: Arc<dyn ArchiveStore> = store;
        (bundles, archive)
    }
}
