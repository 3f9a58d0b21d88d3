use crate::analyzers::incidents::extract_incidents;
use crate::analyzers::types::StationIncidents;
use crate::analyzers::utility::{max, mean, ratio};
use crate::model::{StationAggregate, StatusEvent};

const AVG_DAYS_PER_MONTH: f64 = 30.4375;
const HOURS_PER_DAY: f64 = 24.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Reduces one station's incident durations into an unranked [`StationAggregate`].
///
/// The monthly average spreads the total incident time over the station's
/// observed range expressed in average-length months. Stations without any
/// incident, or observed at a single instant, report zeros rather than NaN.
pub fn aggregate_station(city: &str, station: &StationIncidents) -> StationAggregate {
    let range_hours = (station.last_seen - station.first_seen) as f64 / SECONDS_PER_HOUR;
    let range_months = range_hours / (HOURS_PER_DAY * AVG_DAYS_PER_MONTH);
    let total_hours: f64 = station.durations_hours.iter().sum();

    StationAggregate {
        city: city.to_string(),
        rank: 0,
        station_id: station.station_id,
        last_name: station.name.clone(),
        latitude: station.latitude,
        longitude: station.longitude,
        avg_monthly_incident_hours: ratio(total_hours, range_months),
        avg_incident_hours: mean(&station.durations_hours),
        max_incident_hours: max(&station.durations_hours),
    }
}

/// Orders rows worst first by average monthly incident time and assigns
/// ranks `1..=N`.
pub fn assign_ranks(rows: &mut [StationAggregate]) {
    rows.sort_by(|a, b| b.avg_monthly_incident_hours.total_cmp(&a.avg_monthly_incident_hours));
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }
}

/// Sorts the dataset by observation time, extracts incidents per station and
/// returns the ranked per-station statistics.
pub fn compute_incident_statistics(
    mut events: Vec<StatusEvent>,
    city: &str,
    now: i64,
) -> Vec<StationAggregate> {
    events.sort_unstable_by_key(|e| e.fetch_time);

    let mut rows: Vec<StationAggregate> = extract_incidents(&events, now)
        .iter()
        .map(|station| aggregate_station(city, station))
        .collect();

    assign_ranks(&mut rows);
    rows
}
