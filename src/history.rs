//! Backward reconstruction of one year of station status history.
//!
//! Walks day by day from "now" towards the cutoff, loading each day's
//! bundles. Up to `max_missing_days` consecutive empty days are tolerated;
//! the walk stops once that many have been seen in a row. Stopping right
//! after the first day of bundle retention is expected, and the remainder is
//! loaded from the archive export. Stopping anywhere else is a gap we cannot
//! reconstruct yet.

use chrono::{DateTime, Months, NaiveDate, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bundles::fetch_day;
use crate::config::JobConfig;
use crate::error::{HistoryError, Result};
use crate::model::StatusEvent;
use crate::parser::parse_archive;
use crate::store::{ArchiveStore, BundleStore};

/// Returns the instant one calendar year before `now`.
pub fn one_year_before(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(12))
        .unwrap_or(now - TimeDelta::days(365))
}

/// Keeps only events observed strictly after `cutoff` (unix seconds).
pub fn filter_after_cutoff(mut events: Vec<StatusEvent>, cutoff: i64) -> Vec<StatusEvent> {
    events.retain(|e| e.fetch_time > cutoff);
    events
}

/// Where the reconstructed history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Daily bundles reached the cutoff on their own.
    Bundles,
    /// Daily bundles ended at the retention boundary and the archive filled the rest.
    BundlesAndArchive,
}

/// Unordered events covering `(cutoff, now]`.
#[derive(Debug)]
pub struct Reconstruction {
    pub events: Vec<StatusEvent>,
    pub coverage: Coverage,
    pub days_with_data: usize,
    pub last_day_with_data: Option<NaiveDate>,
}

/// Mutable state of one backward walk.
struct ReconstructionRun {
    cursor: DateTime<Utc>,
    cutoff: DateTime<Utc>,
    missing_days: u32,
    last_day_with_data: Option<NaiveDate>,
    days_with_data: usize,
    events: Vec<StatusEvent>,
}

impl ReconstructionRun {
    fn new(now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Self {
        Self {
            cursor: now,
            cutoff,
            missing_days: 0,
            last_day_with_data: None,
            days_with_data: 0,
            events: Vec::new(),
        }
    }

    fn reached_cutoff(&self) -> bool {
        self.cursor <= self.cutoff
    }

    fn record_day(&mut self, day: NaiveDate, events: Vec<StatusEvent>) {
        self.missing_days = 0;
        self.last_day_with_data = Some(day);
        self.days_with_data += 1;
        self.events.extend(events);
    }

    fn record_missing(&mut self, day: NaiveDate) {
        warn!(date = %day, "Day backup not found");
        self.missing_days += 1;
    }

    fn step_back(&mut self) {
        self.cursor -= TimeDelta::days(1);
    }
}

/// Assembles the status history between `cutoff` and `now` from daily
/// bundles, falling back to the archive export for the period before bundles
/// were retained.
///
/// # Errors
///
/// Storage and decode failures abort immediately.
/// [`HistoryError::UnrecoverableGap`] when the walk stops before the cutoff
/// and the last day with data is not `config.boundary_date`.
#[tracing::instrument(skip_all, fields(now = %now, cutoff = %cutoff))]
pub async fn reconstruct<B, A>(
    bundles: Arc<B>,
    archive: &A,
    config: &JobConfig,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<Reconstruction>
where
    B: BundleStore + ?Sized + 'static,
    A: ArchiveStore + ?Sized,
{
    let mut run = ReconstructionRun::new(now, cutoff);

    while !run.reached_cutoff() {
        let day = run.cursor.date_naive();

        if run.missing_days >= config.max_missing_days {
            error!(
                dataset_size = run.events.len(),
                max_days_without_data = config.max_missing_days,
                date = %day,
                "Reached maximum number of days without data, stopping the walk"
            );
            break;
        }

        match fetch_day(bundles.clone(), day, config.workers()).await {
            Ok(events) => run.record_day(day, events),
            Err(e) if e.is_not_found() => run.record_missing(day),
            Err(e) => return Err(e),
        }

        run.step_back();
    }

    let coverage = if run.reached_cutoff() {
        Coverage::Bundles
    } else if run.last_day_with_data == Some(config.boundary_date) {
        info!(
            boundary = %config.boundary_date,
            key = %config.archive_key,
            "Daily bundles end at retention start, loading archive export"
        );
        let bytes = archive.fetch_full_export(&config.archive_key).await?;
        let archived = parse_archive(&bytes, cutoff.timestamp())?;
        info!(events = archived.len(), "Archive export loaded");
        run.events.extend(archived);
        Coverage::BundlesAndArchive
    } else {
        error!(
            last_day_before_gap = ?run.last_day_with_data,
            "Gap in daily bundles is larger than tolerated"
        );
        return Err(HistoryError::UnrecoverableGap {
            last_day_with_data: run.last_day_with_data,
        });
    };

    info!(
        events = run.events.len(),
        days_with_data = run.days_with_data,
        ?coverage,
        "History reconstructed"
    );

    Ok(Reconstruction {
        events: run.events,
        coverage,
        days_with_data: run.days_with_data,
        last_day_with_data: run.last_day_with_data,
    })
}
