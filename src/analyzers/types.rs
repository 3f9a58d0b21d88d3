//! Data types used by the incident statistics pipeline.

use crate::model::StatusEvent;

/// Per-station incident tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncidentState {
    #[default]
    Clear,
    /// Not working since the given unix second.
    InIncident { since: i64 },
}

/// Everything accumulated about one station while scanning the sorted events.
#[derive(Debug, Clone, PartialEq)]
pub struct StationIncidents {
    pub station_id: i64,
    /// Name from the latest event seen for the station.
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub durations_hours: Vec<f64>,
    pub(crate) state: IncidentState,
}

impl StationIncidents {
    pub(crate) fn new(first: &StatusEvent) -> Self {
        Self {
            station_id: first.station_id,
            name: first.name.clone(),
            latitude: first.latitude,
            longitude: first.longitude,
            first_seen: first.fetch_time,
            last_seen: first.fetch_time,
            durations_hours: Vec::new(),
            state: IncidentState::Clear,
        }
    }

    pub fn state(&self) -> IncidentState {
        self.state
    }
}
