use tracing::warn;

use crate::{
    delta::ChangeSet,
    model::ObjectKey,
    store::{Event, EventRecorder, EventType},
};

pub const UPDATED_REASON: &str = "Updated";

/// Message attached to the `Updated` event.
pub fn change_message(changes: &ChangeSet) -> String {
    format!("Weather changed. {changes}")
}

/// Emit one `Updated` event listing every change tag. Does nothing for an
/// empty change set. Returns whether an event was recorded.
///
/// Only call this after the status write succeeded.
pub async fn notify_changes(
    recorder: &dyn EventRecorder,
    key: &ObjectKey,
    changes: &ChangeSet,
) -> bool {
    if changes.is_empty() {
        return false;
    }

    let event = Event::new(key.clone(), EventType::Normal, UPDATED_REASON, change_message(changes));
    match recorder.record(event).await {
        Ok(()) => true,
        Err(err) => {
            warn!(resource = %key, error = %err, "failed to record change event");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        delta::compute_delta,
        model::{LocationStatus, ObservationRecord},
        store::MemoryStore,
    };

    fn changes() -> ChangeSet {
        let prev = LocationStatus {
            temp: "10.00".into(),
            pressure: 1000,
            humidity: 50,
            wind_speed: "3.00".into(),
            wind_gust: String::new(),
            ..LocationStatus::default()
        };
        let obs = ObservationRecord {
            temperature: 12.0,
            pressure: 1000,
            humidity: 45,
            wind_speed: 3.0,
            wind_gust: None,
            country_code: "US".into(),
            location_name: "Somewhere".into(),
            observed_at: 0,
        };
        compute_delta(&prev, &obs).changes
    }

    #[test]
    fn message_lists_tags() {
        assert_eq!(change_message(&changes()), "Weather changed. [Temp+, Humidity-]");
    }

    #[tokio::test]
    async fn emits_exactly_one_event() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "home");

        assert!(notify_changes(&store, &key, &changes()).await);

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Normal);
        assert_eq!(events[0].reason, "Updated");
        assert_eq!(events[0].regarding, key);
    }

    #[tokio::test]
    async fn empty_changeset_is_silent() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "home");

        assert!(!notify_changes(&store, &key, &ChangeSet::default()).await);
        assert!(store.events().is_empty());
    }
}
