use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

use crate::{
    config::ReconcilerSettings,
    error::{ParseError, ProviderError},
    model::ObservationRecord,
};

use super::{WeatherProvider, WeatherQuery};

const USER_AGENT: &str = concat!("weather-sync/", env!("CARGO_PKG_VERSION"));

/// Client for the OpenWeatherMap "current weather" endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    endpoint: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::Transport)?;

        Ok(Self { endpoint: endpoint.into(), http })
    }

    pub fn from_settings(settings: &ReconcilerSettings) -> Result<Self, ProviderError> {
        Self::new(settings.endpoint.clone(), settings.timeout)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch_current(&self, query: &WeatherQuery<'_>) -> Result<Vec<u8>, ProviderError> {
        debug!(lat = query.lat, lon = query.lon, units = %query.units, "requesting current weather");

        let res = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("lat", query.lat),
                ("lon", query.lon),
                ("units", query.units.as_str()),
                ("appid", query.token),
            ])
            .send()
            .await
            // The request URL carries the token.
            .map_err(|e| ProviderError::Transport(e.without_url()))?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                code: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = res
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url()))?;

        Ok(body.to_vec())
    }
}

/// Decode a "current weather" body into an [`ObservationRecord`].
pub fn parse_observation(body: &[u8]) -> Result<ObservationRecord, ParseError> {
    let parsed: OwCurrentResponse = serde_json::from_slice(body).map_err(ParseError::InvalidJson)?;

    let main = parsed.main.unwrap_or_default();
    let wind = parsed.wind.unwrap_or_default();
    let sys = parsed.sys.unwrap_or_default();

    let observed_at = require(parsed.dt, "dt")?;
    if DateTime::from_timestamp(observed_at, 0).is_none() {
        return Err(malformed("dt"));
    }

    Ok(ObservationRecord {
        observed_at,
        location_name: require(parsed.name, "name")?,
        temperature: require(main.temp, "main.temp")?,
        pressure: require(main.pressure, "main.pressure")?,
        humidity: require(main.humidity, "main.humidity")?,
        wind_speed: require(wind.speed, "wind.speed")?,
        wind_gust: wind.gust,
        country_code: require(sys.country, "sys.country")?,
    })
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, ParseError> {
    value.ok_or_else(|| malformed(field))
}

fn malformed(field: &str) -> ParseError {
    ParseError::Malformed { field: field.to_string() }
}

/// Treat a present-but-mistyped value like a missing one so that the
/// caller can report the offending field by name.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(de)?;
    Ok(T::deserialize(value).ok())
}

#[derive(Debug, Default, Deserialize)]
struct OwMain {
    #[serde(default, deserialize_with = "lenient")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pressure: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    humidity: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwWind {
    #[serde(default, deserialize_with = "lenient")]
    speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    gust: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    #[serde(default, deserialize_with = "lenient")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default, deserialize_with = "lenient")]
    main: Option<OwMain>,
    #[serde(default, deserialize_with = "lenient")]
    wind: Option<OwWind>,
    #[serde(default, deserialize_with = "lenient")]
    sys: Option<OwSys>,
    #[serde(default, deserialize_with = "lenient")]
    dt: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "coord": { "lon": -93.27, "lat": 44.98 },
            "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
            "main": { "temp": 51.3, "feels_like": 49.0, "pressure": 1016, "humidity": 62 },
            "wind": { "speed": 8.05, "deg": 200, "gust": 14.97 },
            "dt": 1_666_000_000,
            "sys": { "country": "US" },
            "name": "Minneapolis",
            "cod": 200
        })
    }

    fn parse(value: &serde_json::Value) -> Result<ObservationRecord, ParseError> {
        parse_observation(value.to_string().as_bytes())
    }

    #[test]
    fn parses_full_response() {
        let obs = parse(&sample()).unwrap();

        assert_eq!(obs.location_name, "Minneapolis");
        assert_eq!(obs.country_code, "US");
        assert_eq!(obs.temperature, 51.3);
        assert_eq!(obs.pressure, 1016);
        assert_eq!(obs.humidity, 62);
        assert_eq!(obs.wind_speed, 8.05);
        assert_eq!(obs.wind_gust, Some(14.97));
        assert_eq!(obs.observed_at, 1_666_000_000);
    }

    #[test]
    fn missing_gust_is_absent_not_zero() {
        let mut body = sample();
        body["wind"].as_object_mut().unwrap().remove("gust");
        assert_eq!(parse(&body).unwrap().wind_gust, None);

        body["wind"]["gust"] = json!(0.0);
        assert_eq!(parse(&body).unwrap().wind_gust, Some(0.0));
    }

    #[test]
    fn missing_coord_does_not_fail() {
        let mut body = sample();
        body.as_object_mut().unwrap().remove("coord");
        assert_eq!(parse(&body).unwrap().location_name, "Minneapolis");
    }

    #[test]
    fn reports_missing_required_field() {
        let mut body = sample();
        body["main"].as_object_mut().unwrap().remove("humidity");

        match parse(&body) {
            Err(ParseError::Malformed { field }) => assert_eq!(field, "main.humidity"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn reports_missing_substructure() {
        let mut body = sample();
        body.as_object_mut().unwrap().remove("sys");

        match parse(&body) {
            Err(ParseError::Malformed { field }) => assert_eq!(field, "sys.country"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn reports_mistyped_field() {
        let mut body = sample();
        body["main"]["temp"] = json!("warm");

        match parse(&body) {
            Err(ParseError::Malformed { field }) => assert_eq!(field, "main.temp"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(parse_observation(b"<html>"), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
