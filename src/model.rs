//! Data types shared by the reconstruction and statistics pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};

/// The single status value meaning a station is healthy. Anything else is
/// treated as an ongoing incident.
pub const WORKING: &str = "working";

/// One observation of one heating station at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub station_id: i64,
    pub name: String,
    pub status: String,
    pub incident_type: String,
    pub incident_text: String,
    /// Unix seconds, `None` when no fix date was announced.
    pub estimated_fix_date: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds at which the observation was taken.
    pub fetch_time: i64,
}

impl StatusEvent {
    pub fn is_working(&self) -> bool {
        self.status == WORKING
    }
}

/// Translates the colour category published on the status map into the
/// status vocabulary stored with each event.
pub fn status_from_category(category: &str) -> Result<&'static str> {
    match category {
        "verde" => Ok(WORKING),
        "galben" => Ok("issue"),
        "rosu" => Ok("broken"),
        other => Err(HistoryError::UnknownCategory(other.to_string())),
    }
}

/// One ranked row of per-station incident statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationAggregate {
    pub city: String,
    pub rank: usize,
    #[serde(rename = "geoId")]
    pub station_id: i64,
    pub last_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "avgMonthlyIncidentTimeHours")]
    pub avg_monthly_incident_hours: f64,
    #[serde(rename = "avgIncidentTimeHours")]
    pub avg_incident_hours: f64,
    #[serde(rename = "maxIncidentTimeHours")]
    pub max_incident_hours: f64,
}
