use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use super::{Event, EventRecorder, LocationStore, SecretData, SecretStore};
use crate::{
    error::StoreError,
    model::{Location, LocationStatus, ObjectKey},
};

#[derive(Debug, Default)]
struct Inner {
    locations: BTreeMap<ObjectKey, Location>,
    secrets: BTreeMap<ObjectKey, SecretData>,
    events: Vec<Event>,
    get_failure: Option<StoreError>,
    secret_failure: Option<StoreError>,
    status_failure: Option<StoreError>,
}

/// Process-local store with resource-version checks, backing the manifest
/// store and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Insert or replace a location. A zero resource version is bumped to 1.
    pub fn insert_location(&self, mut location: Location) {
        if location.metadata.resource_version == 0 {
            location.metadata.resource_version = 1;
        }
        if let Ok(mut inner) = self.lock() {
            inner.locations.insert(location.key(), location);
        }
    }

    pub fn remove_location(&self, key: &ObjectKey) -> Option<Location> {
        self.lock().ok()?.locations.remove(key)
    }

    pub fn insert_secret<I, K, V>(&self, key: ObjectKey, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if let Ok(mut inner) = self.lock() {
            inner.secrets.insert(key, data);
        }
    }

    pub fn secrets(&self) -> BTreeMap<ObjectKey, SecretData> {
        self.lock().map(|inner| inner.secrets.clone()).unwrap_or_default()
    }

    /// Snapshot of a stored location.
    pub fn location(&self, key: &ObjectKey) -> Option<Location> {
        self.lock().ok()?.locations.get(key).cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().map(|inner| inner.events.clone()).unwrap_or_default()
    }

    /// Make the next `get` call fail with `err`.
    pub fn fail_next_get(&self, err: StoreError) {
        if let Ok(mut inner) = self.lock() {
            inner.get_failure = Some(err);
        }
    }

    /// Make the next `get_secret` call fail with `err`.
    pub fn fail_next_get_secret(&self, err: StoreError) {
        if let Ok(mut inner) = self.lock() {
            inner.secret_failure = Some(err);
        }
    }

    /// Make the next `update_status` call fail with `err`.
    pub fn fail_next_status_update(&self, err: StoreError) {
        if let Ok(mut inner) = self.lock() {
            inner.status_failure = Some(err);
        }
    }

    /// Simulate another writer touching the location.
    pub fn bump_version(&self, key: &ObjectKey) {
        if let Ok(mut inner) = self.lock() {
            if let Some(loc) = inner.locations.get_mut(key) {
                loc.metadata.resource_version += 1;
            }
        }
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Location, StoreError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.get_failure.take() {
            return Err(err);
        }
        inner
            .locations
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { kind: "location", key: key.clone() })
    }

    async fn list(&self) -> Result<Vec<Location>, StoreError> {
        Ok(self.lock()?.locations.values().cloned().collect())
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        status: &LocationStatus,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;

        if let Some(err) = inner.status_failure.take() {
            return Err(err);
        }

        let loc = inner
            .locations
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound { kind: "location", key: key.clone() })?;

        if loc.metadata.resource_version != resource_version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: resource_version,
                actual: loc.metadata.resource_version,
            });
        }

        loc.status = status.clone();
        loc.metadata.resource_version += 1;
        Ok(loc.metadata.resource_version)
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get_secret(&self, key: &ObjectKey) -> Result<SecretData, StoreError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.secret_failure.take() {
            return Err(err);
        }
        inner
            .secrets
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { kind: "secret", key: key.clone() })
    }
}

#[async_trait]
impl EventRecorder for MemoryStore {
    async fn record(&self, event: Event) -> Result<(), StoreError> {
        self.lock()?.events.push(event);
        Ok(())
    }
}
