use tracing::debug;

use crate::{
    error::{ReconcileError, StoreError},
    model::{Location, LocationStatus},
    store::LocationStore,
};

/// Persist `status` as a status-only update guarded by the location's
/// resource version.
///
/// On success `location` carries the new status and version. On failure it
/// is left exactly as it was.
pub async fn write_status(
    store: &dyn LocationStore,
    location: &mut Location,
    status: LocationStatus,
) -> Result<(), ReconcileError> {
    let key = location.key();

    match store.update_status(&key, location.metadata.resource_version, &status).await {
        Ok(version) => {
            debug!(resource = %key, version, "status persisted");
            location.status = status;
            location.metadata.resource_version = version;
            Ok(())
        }
        Err(err @ StoreError::Conflict { .. }) => Err(ReconcileError::Conflict(err)),
        Err(err) => Err(ReconcileError::Persistence(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{ObjectKey, ObjectMeta},
        store::MemoryStore,
    };

    fn seeded() -> (MemoryStore, Location) {
        let store = MemoryStore::new();
        let loc = Location {
            metadata: ObjectMeta {
                namespace: "default".into(),
                name: "home".into(),
                resource_version: 1,
            },
            ..Location::default()
        };
        store.insert_location(loc.clone());
        (store, loc)
    }

    fn status() -> LocationStatus {
        LocationStatus { temp: "42.00".into(), ..LocationStatus::default() }
    }

    #[tokio::test]
    async fn success_updates_in_memory_copy() {
        let (store, mut loc) = seeded();

        write_status(&store, &mut loc, status()).await.unwrap();

        assert_eq!(loc.status.temp, "42.00");
        assert_eq!(loc.metadata.resource_version, 2);
    }

    #[tokio::test]
    async fn conflict_is_classified_and_leaves_status_alone() {
        let (store, mut loc) = seeded();
        store.bump_version(&ObjectKey::new("default", "home"));

        let err = write_status(&store, &mut loc, status()).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Conflict(_)));
        assert_eq!(loc.status, LocationStatus::default());
        assert_eq!(loc.metadata.resource_version, 1);
    }

    #[tokio::test]
    async fn store_outage_is_a_persistence_error() {
        let (store, mut loc) = seeded();
        store.fail_next_status_update(StoreError::Unavailable("etcd down".into()));

        let err = write_status(&store, &mut loc, status()).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Persistence(StoreError::Unavailable(_))));
        assert_eq!(loc.status, LocationStatus::default());
    }

    #[tokio::test]
    async fn vanished_resource_is_a_persistence_error() {
        let (store, mut loc) = seeded();
        store.remove_location(&loc.key());

        let err = write_status(&store, &mut loc, status()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Persistence(StoreError::NotFound { .. })));
    }
}
