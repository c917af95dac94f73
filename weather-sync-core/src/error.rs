//! Error taxonomy for a single reconcile.

use thiserror::Error;

use crate::{duration::DurationError, model::ObjectKey};

/// Failure talking to the weather provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// DNS, connect, timeout or body-read failure.
    #[error("weather provider request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The provider answered with something other than HTTP 200.
    #[error("weather provider returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
}

/// The provider body could not be decoded into an observation.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("weather response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// A required field is missing or has an incompatible type.
    #[error("weather response field '{field}' is missing or malformed")]
    Malformed { field: String },
}

/// Failure reported by the external state store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    /// The supplied resource version is stale.
    #[error("conflict writing '{key}': expected version {expected}, found {actual}")]
    Conflict { key: ObjectKey, expected: u64, actual: u64 },

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Everything that can end a reconcile early.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("secret '{key}' not found")]
    SecretMissing { key: ObjectKey },

    #[error("secret '{key}' does not have a '{field}' attribute")]
    SecretKeyMissing { key: ObjectKey, field: String },

    #[error("secret '{key}' attribute '{field}' is empty or not valid UTF-8")]
    SecretInvalid { key: ObjectKey, field: String },

    #[error("failed to read secret '{key}': {source}")]
    SecretUnavailable {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("status update conflict: {0}")]
    Conflict(#[source] StoreError),

    #[error("status update failed: {0}")]
    Persistence(#[source] StoreError),

    /// Loading the resource failed for a reason other than not-found.
    #[error("failed to load location: {0}")]
    Store(#[source] StoreError),

    #[error("invalid refreshPeriod '{value}': {source}")]
    InvalidRefreshPeriod {
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("reconcile cancelled")]
    Cancelled,
}

/// How soon a failed reconcile should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The failure came from a stale read; retry right away.
    Immediate,
    /// Retry after the runtime's backoff delay.
    Backoff,
}

impl ReconcileError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ReconcileError::Conflict(_) => RetryPolicy::Immediate,
            _ => RetryPolicy::Backoff,
        }
    }

    /// Event reason recorded against the resource, or `None` when the
    /// failure is not user-visible.
    pub fn event_reason(&self) -> Option<&'static str> {
        match self {
            ReconcileError::SecretMissing { .. }
            | ReconcileError::SecretKeyMissing { .. }
            | ReconcileError::SecretInvalid { .. }
            | ReconcileError::SecretUnavailable { .. } => Some("Secret"),
            ReconcileError::Provider(_) | ReconcileError::Parse(_) => Some("WeatherAPI"),
            ReconcileError::Conflict(_) | ReconcileError::Persistence(_) => Some("StatusUpdate"),
            ReconcileError::InvalidRefreshPeriod { .. } => Some("RefreshPeriod"),
            ReconcileError::Store(_) => Some("Load"),
            ReconcileError::Cancelled => None,
        }
    }

    /// Pipeline stage that failed, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::Store(_) => "load",
            ReconcileError::InvalidRefreshPeriod { .. } => "schedule",
            ReconcileError::SecretMissing { .. }
            | ReconcileError::SecretKeyMissing { .. }
            | ReconcileError::SecretInvalid { .. }
            | ReconcileError::SecretUnavailable { .. } => "secret",
            ReconcileError::Provider(_) => "fetch",
            ReconcileError::Parse(_) => "parse",
            ReconcileError::Conflict(_) | ReconcileError::Persistence(_) => "persist",
            ReconcileError::Cancelled => "cancelled",
        }
    }
}
