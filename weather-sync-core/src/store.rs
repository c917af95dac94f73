//! Seams to the external state store, secret store and event sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt::Debug};

use crate::{
    error::StoreError,
    model::{Location, LocationStatus, ObjectKey},
};

pub mod manifest;
pub mod memory;

pub use manifest::ManifestStore;
pub use memory::MemoryStore;

/// Secret payload: attribute name to raw bytes.
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[async_trait]
pub trait LocationStore: Send + Sync + Debug {
    async fn get(&self, key: &ObjectKey) -> Result<Location, StoreError>;

    async fn list(&self) -> Result<Vec<Location>, StoreError>;

    /// Replace only the status of the location, provided `resource_version`
    /// still matches. Returns the new resource version.
    async fn update_status(
        &self,
        key: &ObjectKey,
        resource_version: u64,
        status: &LocationStatus,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SecretStore: Send + Sync + Debug {
    async fn get_secret(&self, key: &ObjectKey) -> Result<SecretData, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-visible event attached to a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub regarding: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        regarding: ObjectKey,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            regarding,
            event_type,
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait EventRecorder: Send + Sync + Debug {
    async fn record(&self, event: Event) -> Result<(), StoreError>;
}
