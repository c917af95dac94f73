use crate::error::ProviderError;
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};

pub mod openweather;

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitSystem {
    Standard,
    Metric,
    #[default]
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Standard => "standard",
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub const fn all() -> &'static [UnitSystem] {
        &[UnitSystem::Standard, UnitSystem::Metric, UnitSystem::Imperial]
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for UnitSystem {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "standard" => Ok(UnitSystem::Standard),
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: standard, metric, imperial."
            )),
        }
    }
}

/// Parameters for one "current weather" lookup.
#[derive(Clone)]
pub struct WeatherQuery<'a> {
    pub lat: &'a str,
    pub lon: &'a str,
    pub units: UnitSystem,
    pub token: &'a str,
}

impl Debug for WeatherQuery<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherQuery")
            .field("lat", &self.lat)
            .field("lon", &self.lon)
            .field("units", &self.units)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Source of raw observation payloads.
///
/// One call per reconcile, no retries: the caller owns retry policy.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Returns the raw body of a successful (HTTP 200) response.
    async fn fetch_current(&self, query: &WeatherQuery<'_>) -> Result<Vec<u8>, ProviderError>;
}
