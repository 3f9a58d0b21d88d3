//! Turns a time-ordered event stream into per-station incident durations.

use std::collections::HashMap;

use crate::analyzers::types::{IncidentState, StationIncidents};
use crate::model::StatusEvent;

const SECONDS_PER_HOUR: f64 = 3600.0;

fn hours_between(start: i64, end: i64) -> f64 {
    (end - start) as f64 / SECONDS_PER_HOUR
}

impl StationIncidents {
    /// Applies one event to the station: refreshes name and observed range,
    /// then advances the incident state machine, recording the duration of an
    /// incident closed by this event.
    pub(crate) fn observe(&mut self, event: &StatusEvent) {
        if event.name != self.name {
            self.name.clone_from(&event.name);
        }
        self.first_seen = self.first_seen.min(event.fetch_time);
        self.last_seen = self.last_seen.max(event.fetch_time);

        match (self.state, event.is_working()) {
            (IncidentState::Clear, false) => {
                self.state = IncidentState::InIncident {
                    since: event.fetch_time,
                };
            }
            (IncidentState::InIncident { since }, true) => {
                self.state = IncidentState::Clear;
                self.durations_hours.push(hours_between(since, event.fetch_time));
            }
            _ => {}
        }
    }

    /// Closes an incident still open at the end of the scan against `now`,
    /// which also becomes the end of the observed range.
    pub(crate) fn close_open_incident(&mut self, now: i64) {
        if let IncidentState::InIncident { since } = self.state {
            self.state = IncidentState::Clear;
            self.last_seen = now;
            self.durations_hours.push(hours_between(since, now));
        }
    }
}

/// Scans `events`, which must be sorted ascending by `fetch_time`, and returns
/// one accumulator per distinct station in first-seen order.
///
/// Incidents still open when the stream ends are closed against `now`
/// (unix seconds), so a station broken right now always contributes an
/// ongoing-duration sample.
pub fn extract_incidents(events: &[StatusEvent], now: i64) -> Vec<StationIncidents> {
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(1024);
    let mut stations: Vec<StationIncidents> = Vec::with_capacity(1024);

    for event in events {
        let slot = *index.entry(event.station_id).or_insert_with(|| {
            stations.push(StationIncidents::new(event));
            stations.len() - 1
        });
        stations[slot].observe(event);
    }

    for station in &mut stations {
        station.close_open_incident(now);
    }

    stations
}
