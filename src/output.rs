//! Destinations for ranked station statistics.
//!
//! Rows arrive one at a time in rank order through [`StatsSink::write`];
//! [`StatsSink::finish`] flushes whatever a sink buffered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{HistoryError, Result};
use crate::model::StationAggregate;

pub const DEFAULT_STATS_KEY: &str = "stats/stations.json";

#[async_trait]
pub trait StatsSink: Send {
    async fn write(&mut self, row: &StationAggregate) -> Result<()>;

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects rows in memory.
#[async_trait]
impl StatsSink for Vec<StationAggregate> {
    async fn write(&mut self, row: &StationAggregate) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

/// Forwards every row to each inner sink in turn.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn StatsSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn StatsSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl StatsSink for FanOut {
    async fn write(&mut self, row: &StationAggregate) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write(row).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.finish().await?;
        }
        Ok(())
    }
}

/// Writes rows to a CSV file with a header line.
///
/// Rows go to a `<name>.partial` sibling that replaces the target only on
/// [`StatsSink::finish`]. A sink dropped without finishing removes the partial
/// file and leaves any previous output in place.
pub struct CsvSink {
    path: PathBuf,
    partial: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
    committed: bool,
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| HistoryError::sink(format!("creating {}", dir.display()), e))?;
        }
        let partial = partial_path(&path);
        let file = File::create(&partial)
            .map_err(|e| HistoryError::sink(format!("creating {}", partial.display()), e))?;
        let writer = WriterBuilder::new().has_headers(true).from_writer(file);
        debug!(path = %path.display(), partial = %partial.display(), "CSV sink opened");

        Ok(Self {
            path,
            partial,
            writer,
            rows: 0,
            committed: false,
        })
    }
}

#[async_trait]
impl StatsSink for CsvSink {
    async fn write(&mut self, row: &StationAggregate) -> Result<()> {
        self.writer
            .serialize(row)
            .map_err(|e| HistoryError::sink(format!("writing row to {}", self.partial.display()), e))?;
        self.rows += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.committed {
            return Ok(());
        }
        self.writer
            .flush()
            .map_err(|e| HistoryError::sink(format!("flushing {}", self.partial.display()), e))?;
        std::fs::rename(&self.partial, &self.path).map_err(|e| {
            HistoryError::sink(
                format!("moving {} to {}", self.partial.display(), self.path.display()),
                e,
            )
        })?;
        self.committed = true;
        info!(path = %self.path.display(), rows = self.rows, "Station statistics written to CSV");
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if !self.committed && std::fs::remove_file(&self.partial).is_ok() {
            debug!(partial = %self.partial.display(), "Discarded unfinished CSV output");
        }
    }
}

/// Ranked statistics document served to the frontend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationsIndex<'a> {
    pub generated_at: DateTime<Utc>,
    pub city: &'a str,
    pub stations: &'a [StationAggregate],
}

/// Serializes a value to JSON and uploads it to an S3 bucket with `application/json` content type.
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
) -> Result<()> {
    let body = serde_json::to_vec(value)
        .map_err(|e| HistoryError::sink(format!("serializing {key}"), e))?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body.into())
        .content_type("application/json")
        .send()
        .await
        .map_err(|e| HistoryError::sink(format!("uploading s3://{bucket}/{key}"), e))?;

    Ok(())
}

/// Buffers rows and uploads them as one [`StationsIndex`] JSON document on finish.
pub struct S3JsonSink {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    city: String,
    rows: Vec<StationAggregate>,
}

impl S3JsonSink {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: DEFAULT_STATS_KEY.to_string(),
            city: city.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

#[async_trait]
impl StatsSink for S3JsonSink {
    async fn write(&mut self, row: &StationAggregate) -> Result<()> {
        self.rows.push(row.clone());
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let index = StationsIndex {
            generated_at: Utc::now(),
            city: &self.city,
            stations: &self.rows,
        };
        write_json_to_s3(&self.client, &self.bucket, &self.key, &index).await?;
        info!(bucket = %self.bucket, key = %self.key, rows = self.rows.len(), "Station statistics uploaded");
        Ok(())
    }
}
