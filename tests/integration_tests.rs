use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use heating_incidents::HistoryError;
use heating_incidents::analyzers::analyzer::rank_stations;
use heating_incidents::config::JobConfig;
use heating_incidents::history::Coverage;
use heating_incidents::model::StationAggregate;
use heating_incidents::output::CsvSink;
use heating_incidents::store::LocalStore;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const ARCHIVE_HEADER: &str =
    "GeoId,Name,Latitude,Longitude,Status,IncidentText,IncidentType,Timestamp,EstimatedFixDate";

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
}

/// Writes one gzip JSON bundle in the stream backup format.
fn write_bundle(root: &Path, day: NaiveDate, name: &str, records: &[(i64, &str, &str, i64)]) {
    let dir = root.join(day.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&dir).unwrap();
    let json: Vec<_> = records
        .iter()
        .map(|(id, station_name, status, ts)| {
            serde_json::json!({
                "timestamp": *ts as f64,
                "item": {
                    "GeoId": id,
                    "Name": station_name,
                    "Status": status,
                    "IncidentText": if *status == "working" { "" } else { "Avarie" },
                    "IncidentType": "ACC",
                    "EstimatedFixDate": 0,
                    "Latitude": 44.43,
                    "Longitude": 26.10,
                    "Timestamp": ts
                }
            })
        })
        .collect();
    std::fs::write(
        dir.join(name),
        gzip(serde_json::to_string(&json).unwrap().as_bytes()),
    )
    .unwrap();
}

fn write_archive(root: &Path, rows: &[(i64, &str, &str, i64)]) {
    let mut csv = format!("{ARCHIVE_HEADER}\n");
    for (id, name, status, ts) in rows {
        csv.push_str(&format!("{id},{name},44.40,26.05,{status},,,{ts},0\n"));
    }
    std::fs::write(root.join("dynamodb_backup.csv.gz"), gzip(csv.as_bytes())).unwrap();
}

#[tokio::test]
async fn test_history_spanning_bundles_and_archive() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let now = at(date(2025, 11, 6), 12);
    let boundary = date(2025, 11, 3);

    // Station 7 broke before bundles existed and recovered on the boundary day.
    write_archive(
        root,
        &[
            (7, "PT Titan", "working", at(date(2025, 10, 1), 8).timestamp()),
            (7, "PT Titan", "broken", at(date(2025, 11, 1), 8).timestamp()),
            // older than one year: dropped
            (9, "PT Vechi", "broken", at(date(2024, 1, 1), 8).timestamp()),
        ],
    );
    write_bundle(
        root,
        boundary,
        "batch_20251103_080000.json.gz",
        &[
            (7, "PT Titan", "working", at(boundary, 8).timestamp()),
            (8, "PT Crangasi", "working", at(boundary, 8).timestamp()),
        ],
    );
    write_bundle(
        root,
        date(2025, 11, 5),
        "batch_20251105_090000.json.gz",
        &[(8, "PT Crangasi", "issue", at(date(2025, 11, 5), 9).timestamp())],
    );
    write_bundle(
        root,
        date(2025, 11, 5),
        "batch_20251105_100000.json.gz",
        &[(8, "PT Crangasi", "working", at(date(2025, 11, 5), 10).timestamp())],
    );
    std::fs::write(root.join("2025-11-05").join("README.txt"), b"ignored").unwrap();
    write_bundle(
        root,
        date(2025, 11, 6),
        "batch_20251106_110000.json.gz",
        &[(8, "PT Crangasi Nou", "broken", at(date(2025, 11, 6), 11).timestamp())],
    );

    let store = Arc::new(LocalStore::new(root).with_page_size(1));
    let config = JobConfig {
        fetch_workers: 3,
        ..Default::default()
    };
    let mut rows: Vec<StationAggregate> = Vec::new();

    let summary = rank_stations(store.clone(), store.as_ref(), &mut rows, &config, now)
        .await
        .unwrap();

    assert_eq!(summary.coverage, Coverage::BundlesAndArchive);
    assert_eq!(summary.stations, 2);
    assert_eq!(summary.events, 7);
    assert_eq!(rows.len(), 2);

    // Station 7: one 48h incident over a 33 day range.
    // Station 8: 1h + 1h (still broken at "now") over a 76h range.
    let station7 = rows.iter().find(|r| r.station_id == 7).unwrap();
    let station8 = rows.iter().find(|r| r.station_id == 8).unwrap();

    assert!((station7.max_incident_hours - 48.0).abs() < 1e-9);
    assert!((station7.avg_incident_hours - 48.0).abs() < 1e-9);
    assert!((station8.avg_incident_hours - 1.0).abs() < 1e-9);
    assert!((station8.max_incident_hours - 1.0).abs() < 1e-9);
    assert_eq!(station8.last_name, "PT Crangasi Nou");

    let month_hours = 24.0 * 30.4375;
    let expected7 = 48.0 / ((33.0 * 24.0) / month_hours);
    let expected8 = 2.0 / (76.0 / month_hours);
    assert!((station7.avg_monthly_incident_hours - expected7).abs() < 1e-6);
    assert!((station8.avg_monthly_incident_hours - expected8).abs() < 1e-6);

    assert_eq!(rows[0].station_id, 7);
    assert_eq!(rows[0].rank, 1);
    assert_eq!(rows[1].rank, 2);
}

#[tokio::test]
async fn test_gap_in_bundles_aborts_without_archive() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let now = at(date(2026, 2, 20), 12);

    write_bundle(root, date(2026, 2, 20), "a.json.gz", &[(1, "PT", "working", now.timestamp())]);
    write_bundle(root, date(2026, 2, 16), "a.json.gz", &[(1, "PT", "broken", now.timestamp() - 400_000)]);
    // A broken archive proves the fallback never runs.
    std::fs::write(root.join("dynamodb_backup.csv.gz"), b"not gzip").unwrap();

    let store = Arc::new(LocalStore::new(root));
    let out = dir.path().join("stats.csv");
    let previous = "city,rank\nBucharest,1\n";
    std::fs::write(&out, previous).unwrap();
    let mut sink = CsvSink::create(&out).unwrap();

    let err = rank_stations(store.clone(), store.as_ref(), &mut sink, &JobConfig::default(), now)
        .await
        .unwrap_err();
    drop(sink);

    match err {
        HistoryError::UnrecoverableGap { last_day_with_data } => {
            assert_eq!(last_day_with_data, Some(date(2026, 2, 20)))
        }
        other => panic!("unexpected error: {other}"),
    }
    // the last good table survives a failed run
    assert_eq!(std::fs::read_to_string(&out).unwrap(), previous);
    assert!(!dir.path().join("stats.csv.partial").exists());
}

#[tokio::test]
async fn test_corrupt_bundle_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let now = at(date(2025, 11, 4), 12);

    write_bundle(root, date(2025, 11, 4), "good.json.gz", &[(1, "PT", "working", now.timestamp())]);
    std::fs::create_dir_all(root.join("2025-11-03")).unwrap();
    std::fs::write(root.join("2025-11-03").join("bad.json.gz"), b"{}").unwrap();
    write_archive(root, &[]);

    let store = Arc::new(LocalStore::new(root));
    let mut rows: Vec<StationAggregate> = Vec::new();

    let err = rank_stations(store.clone(), store.as_ref(), &mut rows, &JobConfig::default(), now)
        .await
        .unwrap_err();

    assert!(matches!(err, HistoryError::Decode { .. }));
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_csv_output_is_ranked() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let now = at(date(2025, 11, 4), 23);
    let t = |hour| at(date(2025, 11, 4), hour).timestamp();

    write_bundle(
        root,
        date(2025, 11, 4),
        "a.json.gz",
        &[
            (1, "PT Unu", "working", t(0)),
            (2, "PT Doi", "working", t(0)),
            (1, "PT Unu", "broken", t(1)),
            (2, "PT Doi", "broken", t(1)),
            (1, "PT Unu", "working", t(2)),
            (2, "PT Doi", "working", t(5)),
            (1, "PT Unu", "working", t(10)),
            (2, "PT Doi", "working", t(10)),
        ],
    );
    write_bundle(root, date(2025, 11, 3), "a.json.gz", &[]);
    write_archive(root, &[]);

    let store = Arc::new(LocalStore::new(root));
    let out = dir.path().join("out").join("stats.csv");
    let mut sink = CsvSink::create(&out).unwrap();

    rank_stations(store.clone(), store.as_ref(), &mut sink, &JobConfig::default(), now)
        .await
        .unwrap();

    let content = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("Bucharest,1,2,PT Doi"));
    assert!(lines[2].starts_with("Bucharest,2,1,PT Unu"));
}
