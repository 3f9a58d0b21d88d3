//! Tunables and deployment constants for one statistics run.

use chrono::NaiveDate;

/// First day covered by the daily stream bundles. Everything older lives in
/// the one-off archive export.
pub const BUNDLE_RETENTION_START: (i32, u32, u32) = (2025, 11, 3);

pub const DEFAULT_ARCHIVE_KEY: &str = "dynamodb_backup.csv.gz";
pub const DEFAULT_CITY: &str = "Bucharest";
pub const DEFAULT_MAX_MISSING_DAYS: u32 = 3;
pub const DEFAULT_FETCH_WORKERS: usize = 8;
/// Upper bound on the per-day worker pool.
pub const MAX_FETCH_WORKERS: usize = 256;

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub city: String,
    /// Consecutive days without a bundle after which the backward walk stops.
    pub max_missing_days: u32,
    /// Day at which daily bundles begin. Stopping here triggers the archive fallback.
    pub boundary_date: NaiveDate,
    pub archive_key: String,
    /// Worker pool size for fetching one day's bundles. Clamped to
    /// `1..=MAX_FETCH_WORKERS`.
    pub fetch_workers: usize,
}

impl JobConfig {
    pub fn workers(&self) -> usize {
        self.fetch_workers.clamp(1, MAX_FETCH_WORKERS)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        let (y, m, d) = BUNDLE_RETENTION_START;
        Self {
            city: DEFAULT_CITY.to_string(),
            max_missing_days: DEFAULT_MAX_MISSING_DAYS,
            boundary_date: NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default(),
            archive_key: DEFAULT_ARCHIVE_KEY.to_string(),
            fetch_workers: DEFAULT_FETCH_WORKERS,
        }
    }
}
