use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::analyzers::aggregate::compute_incident_statistics;
use crate::config::JobConfig;
use crate::error::Result;
use crate::history::{Coverage, filter_after_cutoff, one_year_before, reconstruct};
use crate::output::StatsSink;
use crate::store::{ArchiveStore, BundleStore};

/// Outcome of one statistics run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub events: usize,
    pub stations: usize,
    pub coverage: Coverage,
}

/// Rebuilds the last year of station history, recomputes incident
/// statistics from scratch and hands the ranked rows to `sink` in rank order.
///
/// Nothing is written unless the whole history was reconstructed.
#[tracing::instrument(skip_all, fields(city = %config.city, now = %now))]
pub async fn rank_stations<B, A, S>(
    bundles: Arc<B>,
    archive: &A,
    sink: &mut S,
    config: &JobConfig,
    now: DateTime<Utc>,
) -> Result<RunSummary>
where
    B: BundleStore + ?Sized + 'static,
    A: ArchiveStore + ?Sized,
    S: StatsSink + ?Sized,
{
    let cutoff = one_year_before(now);
    info!(cutoff = %cutoff, "Starting rank stations processing");

    let history = reconstruct(bundles, archive, config, now, cutoff).await?;
    let events = filter_after_cutoff(history.events, cutoff.timestamp());
    let event_count = events.len();

    let rows = compute_incident_statistics(events, &config.city, now.timestamp());

    for row in &rows {
        sink.write(row).await?;
    }
    sink.finish().await?;

    let summary = RunSummary {
        events: event_count,
        stations: rows.len(),
        coverage: history.coverage,
    };
    info!(
        events = summary.events,
        stations = summary.stations,
        coverage = ?summary.coverage,
        "Station incident statistics written"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use crate::model::StationAggregate;
    use crate::store::LocalStore;
    use chrono::{NaiveDate, TimeZone};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn write_bundle(root: &std::path::Path, day: NaiveDate, records: &[(i64, &str, i64)]) {
        let dir = root.join(day.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let json: Vec<_> = records
            .iter()
            .map(|(id, status, ts)| {
                serde_json::json!({
                    "timestamp": ts,
                    "item": { "GeoId": id, "Name": format!("PT {id}"), "Status": status, "Timestamp": ts }
                })
            })
            .collect();
        std::fs::write(
            dir.join("batch.json.gz"),
            gzip(serde_json::to_string(&json).unwrap().as_bytes()),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_gap_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let today = now.date_naive();
        write_bundle(dir.path(), today, &[(1, "working", now.timestamp() - 60)]);
        let store = Arc::new(LocalStore::new(dir.path()));
        let mut sink: Vec<StationAggregate> = Vec::new();

        let err = rank_stations(store.clone(), store.as_ref(), &mut sink, &JobConfig::default(), now)
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::UnrecoverableGap { .. }));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_rows_reach_sink_in_rank_order() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 11, 4, 12, 0, 0).unwrap();
        let t = now.timestamp();

        write_bundle(
            dir.path(),
            boundary,
            &[(1, "working", t - 90_000), (2, "working", t - 90_000), (2, "broken", t - 88_000)],
        );
        write_bundle(
            dir.path(),
            now.date_naive(),
            &[(1, "broken", t - 7_200), (1, "working", t - 3_600), (2, "working", t - 3_600)],
        );
        std::fs::write(
            dir.path().join("dynamodb_backup.csv.gz"),
            gzip(b"GeoId,Name,Latitude,Longitude,Status,IncidentText,IncidentType,Timestamp,EstimatedFixDate\n"),
        )
        .unwrap();

        let store = Arc::new(LocalStore::new(dir.path()));
        let mut sink: Vec<StationAggregate> = Vec::new();

        let summary = rank_stations(store.clone(), store.as_ref(), &mut sink, &JobConfig::default(), now)
            .await
            .unwrap();

        assert_eq!(summary.coverage, Coverage::BundlesAndArchive);
        assert_eq!(summary.events, 6);
        assert_eq!(summary.stations, 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].station_id, 2);
        assert_eq!(sink[0].rank, 1);
        assert_eq!(sink[1].station_id, 1);
        assert_eq!(sink[1].rank, 2);
    }
}
