//! The reconcile pass: load → secret → fetch → parse → delta → persist →
//! notify → schedule.

use std::{future::Future, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    config::ReconcilerSettings,
    delta::compute_delta,
    duration::{DurationError, parse_duration},
    error::{ReconcileError, StoreError},
    model::{Location, LocationSpec, ObjectKey},
    notify::notify_changes,
    provider::{WeatherProvider, WeatherQuery, openweather::parse_observation},
    status::write_status,
    store::{Event, EventRecorder, EventType, LocationStore, SecretStore},
};

/// What the runtime should do after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    pub fn requeue(after: Duration) -> Self {
        Self { requeue_after: Some(after) }
    }

    /// Do not reschedule; wait for the resource to change.
    pub fn await_change() -> Self {
        Self { requeue_after: None }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    settings: ReconcilerSettings,
    provider: Arc<dyn WeatherProvider>,
    locations: Arc<dyn LocationStore>,
    secrets: Arc<dyn SecretStore>,
    events: Arc<dyn EventRecorder>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcilerSettings,
        provider: Arc<dyn WeatherProvider>,
        locations: Arc<dyn LocationStore>,
        secrets: Arc<dyn SecretStore>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self { settings, provider, locations, secrets, events }
    }

    /// Build a reconciler whose locations, secrets and events all live in `store`.
    pub fn with_store<S>(
        settings: ReconcilerSettings,
        provider: Arc<dyn WeatherProvider>,
        store: Arc<S>,
    ) -> Self
    where
        S: LocationStore + SecretStore + EventRecorder + 'static,
    {
        Self::new(settings, provider, store.clone(), store.clone(), store)
    }

    /// Run one reconcile for `key`.
    ///
    /// A missing location is not an error: it returns [`Action::await_change`].
    /// Every other failure is logged and, unless the pass was cancelled,
    /// recorded as a `Warning` event on the location before being returned.
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        let span = info_span!("reconcile", resource = %key);

        async move {
            info!("reconciling location");
            match self.run(key, cancel).await {
                Ok(action) => Ok(action),
                Err(err) => Err(self.fail(key, err).await),
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        let mut location = match cancellable(cancel, self.locations.get(key)).await? {
            Ok(location) => location,
            Err(StoreError::NotFound { .. }) => {
                info!("location not found, probably deleted");
                return Ok(Action::await_change());
            }
            Err(err) => return Err(ReconcileError::Store(err)),
        };
        info!(lat = %location.spec.lat, lon = %location.spec.lon, "loaded location");

        // Checked before any network call so a bad period cannot spin the API.
        let next_run = self.refresh_period(&location.spec)?;

        let token = self.resolve_token(&location, cancel).await?;

        let query = WeatherQuery {
            lat: &location.spec.lat,
            lon: &location.spec.lon,
            units: self.settings.units,
            token: &token,
        };
        let body = cancellable(cancel, self.provider.fetch_current(&query)).await??;

        let observation = parse_observation(&body)?;
        info!(
            location = %observation.location_name,
            country = %observation.country_code,
            "got weather response"
        );

        let delta = compute_delta(&location.status, &observation);
        cancellable(cancel, write_status(self.locations.as_ref(), &mut location, delta.status))
            .await??;

        notify_changes(self.events.as_ref(), key, &delta.changes).await;

        info!(
            current_temp = %location.status.temp,
            changes = %delta.changes,
            next_run = ?next_run,
            "reconcile finished"
        );
        Ok(Action::requeue(next_run))
    }

    /// Requeue delay declared by the location, or the configured default.
    pub fn refresh_period(&self, spec: &LocationSpec) -> Result<Duration, ReconcileError> {
        let raw = spec.refresh_period.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Ok(self.settings.default_refresh_period);
        }

        let invalid = |source: DurationError| ReconcileError::InvalidRefreshPeriod {
            value: raw.to_string(),
            source,
        };
        match parse_duration(raw) {
            Ok(period) if period.is_zero() => Err(invalid(DurationError::Zero)),
            Ok(period) => Ok(period),
            Err(source) => Err(invalid(source)),
        }
    }

    async fn resolve_token(
        &self,
        location: &Location,
        cancel: &CancellationToken,
    ) -> Result<String, ReconcileError> {
        let secret_ref = &location.spec.secret_ref;
        let key = ObjectKey::new(location.metadata.namespace.clone(), secret_ref.name.clone());
        let field = if secret_ref.key.is_empty() {
            self.settings.default_secret_key.clone()
        } else {
            secret_ref.key.clone()
        };

        let fetched = cancellable(cancel, self.secrets.get_secret(&key)).await?;
        let data = match fetched {
            Ok(data) => data,
            Err(StoreError::NotFound { .. }) => return Err(ReconcileError::SecretMissing { key }),
            Err(source) => return Err(ReconcileError::SecretUnavailable { key, source }),
        };

        let Some(bytes) = data.get(&field) else {
            return Err(ReconcileError::SecretKeyMissing { key, field });
        };

        match std::str::from_utf8(bytes).map(str::trim) {
            Ok(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(ReconcileError::SecretInvalid { key, field }),
        }
    }

    async fn fail(&self, key: &ObjectKey, err: ReconcileError) -> ReconcileError {
        let Some(reason) = err.event_reason() else {
            warn!(stage = err.stage(), "reconcile aborted: {err}");
            return err;
        };

        error!(stage = err.stage(), error = %err, "reconcile failed");

        let event = Event::new(key.clone(), EventType::Warning, reason, err.to_string());
        if let Err(record_err) = self.events.record(event).await {
            warn!(error = %record_err, "failed to record failure event");
        }

        err
    }
}

/// Race `fut` against cancellation of the reconcile.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ReconcileError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        out = fut => Ok(out),
    }
}
