//! Local store backed by a single TOML manifest file.
//!
//! ```toml
//! [[locations]]
//! metadata = { namespace = "default", name = "home" }
//! spec = { lat = "44.98", lon = "-93.27", secretRef = { name = "owm", key = "token" }, refreshPeriod = "10m" }
//!
//! [[secrets]]
//! namespace = "default"
//! name = "owm"
//! data = { token = "..." }
//! ```
//!
//! Status writes are flushed back to the same file through a sibling
//! `<file>.tmp` that is renamed over the original.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;
use tracing::info;

use super::{Event, EventRecorder, LocationStore, MemoryStore, SecretData, SecretStore};
use crate::{
    error::StoreError,
    model::{Location, LocationStatus, ObjectKey},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    secrets: Vec<SecretEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretEntry {
    namespace: String,
    name: String,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    memory: MemoryStore,
    write_lock: Mutex<()>,
}

impl ManifestStore {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        let manifest: Manifest = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        let memory = MemoryStore::new();
        for location in manifest.locations {
            memory.insert_location(location);
        }
        for secret in manifest.secrets {
            memory.insert_secret(ObjectKey::new(secret.namespace, secret.name), secret.data);
        }

        Ok(Self { path, memory, write_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self, locations: Vec<Location>) -> Manifest {
        let secrets = self
            .memory
            .secrets()
            .into_iter()
            .map(|(key, data)| SecretEntry {
                namespace: key.namespace,
                name: key.name,
                data: data
                    .into_iter()
                    .map(|(k, v)| (k, String::from_utf8_lossy(&v).into_owned()))
                    .collect(),
            })
            .collect();

        Manifest { locations, secrets }
    }

    async fn flush(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let toml = toml::to_string_pretty(manifest)
            .map_err(|e| StoreError::Unavailable(format!("failed to serialize manifest: {e}")))?;

        let tmp = self.tmp_path();
        if let Err(e) = tokio::fs::write(&tmp, toml).await {
            return Err(StoreError::Unavailable(format!(
                "failed to write {}: {e}",
                tmp.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Unavailable(format!(
                "failed to replace {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl LocationStore for ManifestStore {
    async fn get(&self, key: &ObjectKey) -> Result<Location, StoreError> {
        self.memory.get(key).await
    }

    async fn list(&self) -> Result<Vec<Location>, StoreError> {
        self.memory.list().await
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        status: &LocationStatus,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let current = self.memory.get(key).await?;
        if current.metadata.resource_version != resource_version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: resource_version,
                actual: current.metadata.resource_version,
            });
        }

        let mut locations = self.memory.list().await?;
        for loc in locations.iter_mut().filter(|loc| &loc.key() == key) {
            loc.status = status.clone();
            loc.metadata.resource_version += 1;
        }

        // Disk first, so a failed write leaves the in-memory copy untouched.
        self.flush(&self.snapshot(locations)).await?;
        self.memory.update_status(key, resource_version, status).await
    }
}

#[async_trait]
impl SecretStore for ManifestStore {
    async fn get_secret(&self, key: &ObjectKey) -> Result<SecretData, StoreError> {
        self.memory.get_secret(key).await
    }
}

#[async_trait]
impl EventRecorder for ManifestStore {
    async fn record(&self, event: Event) -> Result<(), StoreError> {
        info!(
            resource = %event.regarding,
            event_type = %event.event_type,
            reason = %event.reason,
            "{}",
            event.message
        );
        self.memory.record(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[locations]]
metadata = { namespace = "default", name = "home" }
spec = { lat = "44.98", lon = "-93.27", secretRef = { name = "owm", key = "token" }, refreshPeriod = "10m" }

[[secrets]]
namespace = "default"
name = "owm"
data = { token = "abc123" }
"#;

    #[tokio::test]
    async fn loads_locations_and_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let store = ManifestStore::load(&path).await.unwrap();
        let key = ObjectKey::new("default", "home");

        let loc = store.get(&key).await.unwrap();
        assert_eq!(loc.spec.refresh_period.as_deref(), Some("10m"));
        assert_eq!(loc.metadata.resource_version, 1);

        let secret = store.get_secret(&ObjectKey::new("default", "owm")).await.unwrap();
        assert_eq!(secret.get("token").map(Vec::as_slice), Some(&b"abc123"[..]));
    }

    #[tokio::test]
    async fn status_updates_are_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let store = ManifestStore::load(&path).await.unwrap();
        let key = ObjectKey::new("default", "home");
        let status = LocationStatus { temp: "51.30".into(), ..LocationStatus::default() };
        store.update_status(&key, 1, &status).await.unwrap();

        let reloaded = ManifestStore::load(&path).await.unwrap();
        let loc = reloaded.get(&key).await.unwrap();
        assert_eq!(loc.status.temp, "51.30");
        assert_eq!(loc.metadata.resource_version, 2);
        assert!(reloaded.get_secret(&ObjectKey::new("default", "owm")).await.is_ok());
        assert!(!dir.path().join("locations.toml.tmp").exists());
    }

    #[tokio::test]
    async fn failed_flush_keeps_manifest_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.toml");
        std::fs::write(&path, MANIFEST).unwrap();
        // A directory in the way makes the temp file unwritable.
        std::fs::create_dir(dir.path().join("locations.toml.tmp")).unwrap();

        let store = ManifestStore::load(&path).await.unwrap();
        let key = ObjectKey::new("default", "home");
        let status = LocationStatus { temp: "51.30".into(), ..LocationStatus::default() };

        let err = store.update_status(&key, 1, &status).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MANIFEST);

        let loc = store.get(&key).await.unwrap();
        assert_eq!(loc.status, LocationStatus::default());
        assert_eq!(loc.metadata.resource_version, 1);
    }

    #[tokio::test]
    async fn stale_write_is_rejected_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let store = ManifestStore::load(&path).await.unwrap();
        let key = ObjectKey::new("default", "home");

        let err = store.update_status(&key, 7, &LocationStatus::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 7, actual: 1, .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MANIFEST);
    }
}
