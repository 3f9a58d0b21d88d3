//! Decoders for daily stream bundles and the bulk archive export.

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use crate::error::{HistoryError, Result};
use crate::model::StatusEvent;

/// Suffix of every object the stream backup writes into a day folder.
pub const BUNDLE_EXTENSION: &str = ".json.gz";

pub fn is_bundle_key(key: &str) -> bool {
    key.ends_with(BUNDLE_EXTENSION)
}

/// One stream record as written by the backup. Only the station status item
/// matters; the stream change timestamp is ignored in favour of the item's
/// own observation time.
#[derive(Debug, Deserialize)]
struct BundleRecord {
    item: BundleItem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BundleItem {
    incident_text: String,
    status: String,
    incident_type: String,
    geo_id: i64,
    estimated_fix_date: i64,
    latitude: f64,
    longitude: f64,
    timestamp: i64,
    name: String,
}

impl From<BundleItem> for StatusEvent {
    fn from(item: BundleItem) -> Self {
        StatusEvent {
            station_id: item.geo_id,
            name: item.name,
            status: item.status,
            incident_type: item.incident_type,
            incident_text: item.incident_text,
            estimated_fix_date: fix_date(item.estimated_fix_date),
            latitude: item.latitude,
            longitude: item.longitude,
            fetch_time: item.timestamp,
        }
    }
}

fn fix_date(ts: i64) -> Option<i64> {
    (ts != 0).then_some(ts)
}

fn gunzip(context: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| HistoryError::decode(context, format!("gzip: {e}")))?;
    Ok(out)
}

/// Decodes one gzip-compressed JSON array of stream records.
///
/// # Errors
///
/// Returns [`HistoryError::Decode`] naming `key` if the stream is not gzip or
/// the payload is not a JSON array of records.
pub fn parse_bundle(key: &str, bytes: &[u8]) -> Result<Vec<StatusEvent>> {
    let json = gunzip(key, bytes)?;
    let records: Vec<BundleRecord> =
        serde_json::from_slice(&json).map_err(|e| HistoryError::decode(key, format!("json: {e}")))?;

    Ok(records.into_iter().map(|r| r.item.into()).collect())
}

/// Column positions in the archive export, resolved from its header row.
struct ArchiveColumns {
    geo_id: usize,
    name: usize,
    latitude: usize,
    longitude: usize,
    status: usize,
    incident_text: usize,
    incident_type: usize,
    timestamp: usize,
    estimated_fix_date: usize,
}

impl ArchiveColumns {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let index: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim(), i))
            .collect();

        let column = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| HistoryError::decode("archive export header", format!("missing column {name}")))
        };

        Ok(Self {
            geo_id: column("GeoId")?,
            name: column("Name")?,
            latitude: column("Latitude")?,
            longitude: column("Longitude")?,
            status: column("Status")?,
            incident_text: column("IncidentText")?,
            incident_type: column("IncidentType")?,
            timestamp: column("Timestamp")?,
            estimated_fix_date: column("EstimatedFixDate")?,
        })
    }
}

fn field<'r>(row: &'r csv::StringRecord, idx: usize, line: u64, column: &str) -> Result<&'r str> {
    row.get(idx).ok_or_else(|| {
        HistoryError::decode(
            format!("archive export line {line}"),
            format!("missing value for {column}"),
        )
    })
}

fn numeric<T>(row: &csv::StringRecord, idx: usize, line: u64, column: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = field(row, idx, line, column)?;
    raw.trim().parse::<T>().map_err(|e| {
        HistoryError::decode(
            format!("archive export line {line}"),
            format!("failed to parse {column} '{raw}': {e}"),
        )
    })
}

/// Decodes the gzip-compressed CSV archive export, keeping only rows observed
/// strictly after `cutoff` (unix seconds).
///
/// An export with a header and no rows, or an entirely empty export, yields
/// no events. An empty `EstimatedFixDate` cell means no fix date; any other
/// unparseable numeric cell fails the whole load.
pub fn parse_archive(bytes: &[u8], cutoff: i64) -> Result<Vec<StatusEvent>> {
    let raw = gunzip("archive export", bytes)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(raw.as_slice());

    let header = rdr
        .headers()
        .map_err(|e| HistoryError::decode("archive export header", e))?
        .clone();
    if header.is_empty() {
        return Ok(Vec::new());
    }
    let cols = ArchiveColumns::from_header(&header)?;

    let mut events = Vec::new();
    for result in rdr.records() {
        let row = result.map_err(|e| HistoryError::decode("archive export", e))?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        let fetch_time: i64 = numeric(&row, cols.timestamp, line, "Timestamp")?;
        let station_id: i64 = numeric(&row, cols.geo_id, line, "GeoId")?;
        let latitude: f64 = numeric(&row, cols.latitude, line, "Latitude")?;
        let longitude: f64 = numeric(&row, cols.longitude, line, "Longitude")?;
        let estimated_fix_date = if field(&row, cols.estimated_fix_date, line, "EstimatedFixDate")?
            .trim()
            .is_empty()
        {
            None
        } else {
            fix_date(numeric(&row, cols.estimated_fix_date, line, "EstimatedFixDate")?)
        };

        if fetch_time <= cutoff {
            continue;
        }

        events.push(StatusEvent {
            station_id,
            name: field(&row, cols.name, line, "Name")?.to_string(),
            status: field(&row, cols.status, line, "Status")?.to_string(),
            incident_type: field(&row, cols.incident_type, line, "IncidentType")?.to_string(),
            incident_text: field(&row, cols.incident_text, line, "IncidentText")?.to_string(),
            estimated_fix_date,
            latitude,
            longitude,
            fetch_time,
        });
    }

    Ok(events)
}
