//! Current-weather lookup (Open-Meteo, no API key) and the sampler's cache.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::WeatherError;
use crate::types::{round1, WeatherFields};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Upper bound for one lookup, so an outage cannot stall sampling.
pub const WEATHER_TIMEOUT: Duration = Duration::from_secs(4);

/// A successful reading. At least one of `temp` / `code` is known.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub temp: Option<f64>,
    pub code: Option<i64>,
    pub desc: String,
}

impl WeatherReading {
    pub fn new(temp: Option<f64>, code: Option<i64>) -> Self {
        let desc = code.map(describe).unwrap_or_default().to_string();
        Self { temp, code, desc }
    }

    /// Wire sub-record; absent parts are left out individually.
    pub fn fields(&self) -> WeatherFields {
        WeatherFields {
            temp: self.temp.map(round1),
            desc: (!self.desc.is_empty()).then(|| self.desc.clone()),
            wcode: self.code,
        }
    }
}

pub trait WeatherSource {
    fn current(&mut self, lat: f64, lon: f64) -> Result<WeatherReading, WeatherError>;
}

/// WMO weather code → label shown on the display. Unknown codes map to "".
pub fn describe(code: i64) -> &'static str {
    match code {
        0 => "Clair",
        1 => "Plutôt clair",
        2 => "Partiellement nuageux",
        3 => "Couvert",
        45 => "Brouillard",
        48 => "Brouillard givrant",
        51 => "Bruine légère",
        53 => "Bruine",
        55 => "Bruine forte",
        61 => "Pluie faible",
        63 => "Pluie",
        65 => "Pluie forte",
        71 => "Neige faible",
        73 => "Neige",
        75 => "Neige forte",
        95 => "Orage",
        _ => "",
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    weather_code: Option<i64>,
}

/// Parses an Open-Meteo `/v1/forecast` body with `current=temperature_2m,weather_code`.
pub fn parse_forecast(body: &str) -> Result<WeatherReading, WeatherError> {
    let resp: ForecastResponse =
        serde_json::from_str(body).map_err(|e| WeatherError::Malformed(e.to_string()))?;
    let current = resp
        .current
        .ok_or_else(|| WeatherError::Malformed("missing `current` block".into()))?;
    if current.temperature_2m.is_none() && current.weather_code.is_none() {
        return Err(WeatherError::Malformed(
            "neither temperature nor weather code present".into(),
        ));
    }
    Ok(WeatherReading::new(
        current.temperature_2m,
        current.weather_code,
    ))
}

pub struct OpenMeteo {
    client: reqwest::blocking::Client,
    url: String,
}

impl OpenMeteo {
    pub fn new() -> Result<Self, WeatherError> {
        Self::with_url(OPEN_METEO_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, WeatherError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(WEATHER_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl WeatherSource for OpenMeteo {
    fn current(&mut self, lat: f64, lon: f64) -> Result<WeatherReading, WeatherError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current", "temperature_2m,weather_code".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }
        parse_forecast(&resp.text()?)
    }
}

/// Weather source used when no coordinates are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWeather;

impl WeatherSource for NoWeather {
    fn current(&mut self, _lat: f64, _lon: f64) -> Result<WeatherReading, WeatherError> {
        Err(WeatherError::Malformed("weather lookups disabled".into()))
    }
}

impl<W: WeatherSource + ?Sized> WeatherSource for Box<W> {
    fn current(&mut self, lat: f64, lon: f64) -> Result<WeatherReading, WeatherError> {
        (**self).current(lat, lon)
    }
}

/// Last good reading and when it was fetched, plus the last attempt of any
/// outcome. Never degrades to empty.
#[derive(Debug, Default, Clone)]
pub struct WeatherCache {
    entry: Option<(WeatherReading, Instant)>,
    attempted_at: Option<Instant>,
}

impl WeatherCache {
    /// Never attempted, or the last attempt is older than `window`. A failed
    /// attempt waits out the window like a successful one.
    pub fn is_due(&self, now: Instant, window: Duration) -> bool {
        match self.attempted_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) > window,
        }
    }

    pub fn mark_attempt(&mut self, at: Instant) {
        self.attempted_at = Some(at);
    }

    pub fn store(&mut self, reading: WeatherReading, at: Instant) {
        self.entry = Some((reading, at));
        self.attempted_at = Some(at);
    }

    pub fn reading(&self) -> Option<&WeatherReading> {
        self.entry.as_ref().map(|(r, _)| r)
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|(_, at)| *at)
    }

    pub fn attempted_at(&self) -> Option<Instant> {
        self.attempted_at
    }
}
