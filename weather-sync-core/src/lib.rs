//! Core library for `weather-sync`.
//!
//! This crate defines:
//! - The `Location` resource model and its observed status
//! - The OpenWeatherMap client and response parser
//! - Change detection between stored status and fresh observations
//! - The reconcile pass that ties them together, behind store/event traits
//!
//! It is used by `weather-sync-cli`, but the reconciler can be driven by any
//! controller runtime that implements the store traits.

pub mod backoff;
pub mod config;
pub mod delta;
pub mod duration;
pub mod error;
pub mod model;
pub mod notify;
pub mod provider;
pub mod reconcile;
pub mod status;
pub mod store;

pub use backoff::Backoff;
pub use config::{Config, ReconcilerSettings};
pub use delta::{ChangeSet, Delta, compute_delta};
pub use error::{ParseError, ProviderError, ReconcileError, RetryPolicy, StoreError};
pub use model::{Location, LocationSpec, LocationStatus, ObjectKey, ObservationRecord, SecretRef};
pub use provider::{UnitSystem, WeatherProvider, openweather::OpenWeatherClient};
pub use reconcile::{Action, Reconciler};
pub use store::{
    Event, EventRecorder, EventType, LocationStore, ManifestStore, MemoryStore, SecretStore,
};
