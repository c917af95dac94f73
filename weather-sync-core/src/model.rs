use serde::{Deserialize, Serialize};

/// `(namespace, name)` identity of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = anyhow::Error;

    /// Accepts `namespace/name`, or a bare `name` in the `default` namespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            None if !s.is_empty() => Ok(Self::new("default", s)),
            _ => Err(anyhow::anyhow!("Invalid object key '{s}'. Expected <namespace>/<name>.")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,

    /// Optimistic-concurrency token; bumped by the store on every write.
    #[serde(default, rename = "resourceVersion")]
    pub resource_version: u64,
}

/// Reference to the secret holding the provider API token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(default)]
    pub key: String,
}

/// Desired state of a [`Location`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub lat: String,
    pub lon: String,
    #[serde(rename = "secretRef")]
    pub secret_ref: SecretRef,
    /// Duration string such as `5m` or `1h30m`. Empty means the default period.
    #[serde(default, rename = "refreshPeriod", skip_serializing_if = "Option::is_none")]
    pub refresh_period: Option<String>,
}

/// Observed state of a [`Location`], as last written by a reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationStatus {
    pub refresh_time: String,
    pub country_code: String,
    pub location_name: String,
    pub temp: String,
    pub pressure: i64,
    pub humidity: i64,
    pub wind_speed: String,
    pub wind_gust: String,
}

/// A location whose weather is kept in sync with the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub metadata: ObjectMeta,
    pub spec: LocationSpec,
    #[serde(default)]
    pub status: LocationStatus,
}

impl Location {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }
}

/// One parsed provider observation. Lives for a single reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub temperature: f64,
    pub pressure: i64,
    pub humidity: i64,
    pub wind_speed: f64,
    /// `None` when the provider omitted `wind.gust`; distinct from a reported `0.0`.
    pub wind_gust: Option<f64>,
    pub country_code: String,
    pub location_name: String,
    /// Observation time, unix seconds.
    pub observed_at: i64,
}
