//! Field-level comparison between the stored status and a fresh observation.
//!
//! Temperature and wind values are compared by their 2-decimal string form,
//! not numerically: two readings that format identically are treated as
//! unchanged even when the underlying doubles differ. Pressure and humidity
//! are compared as integers.

use chrono::DateTime;

use crate::model::{LocationStatus, ObservationRecord};

/// Ordered change tags produced by one reconcile, e.g. `["Temp+", "Humidity-"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(Vec<String>);

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    fn push(&mut self, tag: String) {
        self.0.push(tag);
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub changes: ChangeSet,
    pub status: LocationStatus,
}

/// Format a reading the way it is stored in status.
pub fn format_reading(value: f64) -> String {
    format!("{value:.2}")
}

/// Render an observation epoch as the status refresh time.
pub fn format_refresh_time(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %z UTC").to_string())
        .unwrap_or_default()
}

/// Compare `previous` with `observation`, returning the change tags and the
/// status that should replace `previous`.
pub fn compute_delta(previous: &LocationStatus, observation: &ObservationRecord) -> Delta {
    let mut changes = ChangeSet::default();

    let temp = format_reading(observation.temperature);
    if let Some(tag) = string_change("Temp", &previous.temp, &temp) {
        changes.push(tag);
    }

    if let Some(tag) = int_change("Pressure", previous.pressure, observation.pressure) {
        changes.push(tag);
    }

    if let Some(tag) = int_change("Humidity", previous.humidity, observation.humidity) {
        changes.push(tag);
    }

    let wind_speed = format_reading(observation.wind_speed);
    if let Some(tag) = string_change("WindSpeed", &previous.wind_speed, &wind_speed) {
        changes.push(tag);
    }

    // A missing gust stays empty rather than becoming "0.00".
    let wind_gust = observation.wind_gust.map(format_reading).unwrap_or_default();
    if let Some(tag) = string_change("WindGust", &previous.wind_gust, &wind_gust) {
        changes.push(tag);
    }

    let status = LocationStatus {
        refresh_time: format_refresh_time(observation.observed_at),
        country_code: observation.country_code.clone(),
        location_name: observation.location_name.clone(),
        temp,
        pressure: observation.pressure,
        humidity: observation.humidity,
        wind_speed,
        wind_gust,
    };

    Delta { changes, status }
}

fn string_change(field: &str, previous: &str, current: &str) -> Option<String> {
    if previous == current {
        return None;
    }

    let direction = match (previous.parse::<f64>(), current.parse::<f64>()) {
        (Ok(old), Ok(new)) if new > old => "+",
        (Ok(old), Ok(new)) if new < old => "-",
        _ => "",
    };

    Some(format!("{field}{direction}"))
}

fn int_change(field: &str, previous: i64, current: i64) -> Option<String> {
    match current.cmp(&previous) {
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(format!("{field}+")),
        std::cmp::Ordering::Less => Some(format!("{field}-")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> ObservationRecord {
        ObservationRecord {
            temperature: 10.0,
            pressure: 1016,
            humidity: 60,
            wind_speed: 5.0,
            wind_gust: Some(9.0),
            country_code: "US".into(),
            location_name: "Minneapolis".into(),
            observed_at: 1_666_000_000,
        }
    }

    fn settled() -> LocationStatus {
        compute_delta(&LocationStatus::default(), &observation()).status
    }

    #[test]
    fn temperature_increase_is_tagged_plus() {
        let prev = settled();
        let obs = ObservationRecord { temperature: 12.0, ..observation() };

        let delta = compute_delta(&prev, &obs);
        assert_eq!(delta.changes.tags(), ["Temp+"]);
        assert_eq!(delta.status.temp, "12.00");
    }

    #[test]
    fn temperature_decrease_is_tagged_minus() {
        let prev = settled();
        let obs = ObservationRecord { temperature: 8.0, ..observation() };

        assert_eq!(compute_delta(&prev, &obs).changes.tags(), ["Temp-"]);
    }

    #[test]
    fn first_reading_has_no_direction_for_string_fields() {
        let prev = LocationStatus { temp: String::new(), ..settled() };
        let obs = ObservationRecord { temperature: 5.0, ..observation() };

        assert_eq!(compute_delta(&prev, &obs).changes.tags(), ["Temp"]);
    }

    #[test]
    fn first_ever_reconcile_tags_every_field_in_order() {
        let delta = compute_delta(&LocationStatus::default(), &observation());
        assert_eq!(
            delta.changes.tags(),
            ["Temp", "Pressure+", "Humidity+", "WindSpeed", "WindGust"]
        );
    }

    #[test]
    fn unchanged_observation_yields_empty_changeset() {
        let prev = settled();
        let delta = compute_delta(&prev, &observation());

        assert!(delta.changes.is_empty());
        assert_eq!(delta.status, prev);
    }

    #[test]
    fn values_equal_after_formatting_are_unchanged() {
        let prev = settled();
        let obs = ObservationRecord { temperature: 10.001, ..observation() };

        assert!(compute_delta(&prev, &obs).changes.is_empty());
    }

    #[test]
    fn integer_fields_compare_numerically() {
        let prev = settled();
        let obs = ObservationRecord { pressure: 1010, humidity: 75, ..observation() };

        assert_eq!(compute_delta(&prev, &obs).changes.tags(), ["Pressure-", "Humidity+"]);
    }

    #[test]
    fn missing_gust_writes_empty_string() {
        let obs = ObservationRecord { wind_gust: None, ..observation() };
        let delta = compute_delta(&LocationStatus::default(), &obs);

        assert_eq!(delta.status.wind_gust, "");
        assert!(!delta.changes.tags().contains(&"WindGust".to_string()));
    }

    #[test]
    fn zero_gust_is_distinct_from_missing() {
        let obs = ObservationRecord { wind_gust: Some(0.0), ..observation() };
        let delta = compute_delta(&LocationStatus::default(), &obs);

        assert_eq!(delta.status.wind_gust, "0.00");
        assert!(delta.changes.tags().contains(&"WindGust".to_string()));
    }

    #[test]
    fn gust_disappearing_is_an_undirected_change() {
        let prev = settled();
        let obs = ObservationRecord { wind_gust: None, ..observation() };

        assert_eq!(compute_delta(&prev, &obs).changes.tags(), ["WindGust"]);
    }

    #[test]
    fn identity_fields_never_enter_the_changeset() {
        let prev = settled();
        let obs = ObservationRecord {
            country_code: "CA".into(),
            location_name: "Winnipeg".into(),
            observed_at: 1_666_000_600,
            ..observation()
        };

        let delta = compute_delta(&prev, &obs);
        assert!(delta.changes.is_empty());
        assert_eq!(delta.status.country_code, "CA");
        assert_eq!(delta.status.location_name, "Winnipeg");
        assert_ne!(delta.status.refresh_time, prev.refresh_time);
    }

    #[test]
    fn formatted_readings_are_idempotent() {
        for value in [0.0, -0.004, 1.005, 12.345, -40.0, 99.999, 1234.5678] {
            let stored = format_reading(value);
            let reparsed: f64 = stored.parse().unwrap();
            assert_eq!(format_reading(reparsed), stored, "value {value}");
        }
    }

    #[test]
    fn refresh_time_is_rendered_in_utc() {
        assert_eq!(format_refresh_time(0), "1970-01-01 00:00:00 +0000 UTC");
    }

    #[test]
    fn changeset_display_joins_tags() {
        let delta = compute_delta(
            &settled(),
            &ObservationRecord { temperature: 11.0, humidity: 50, ..observation() },
        );
        assert_eq!(delta.changes.to_string(), "[Temp+, Humidity-]");
    }
}
