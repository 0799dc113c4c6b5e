//! Data types sent to the display over the serial link.
//! Keep this module minimal and stable; it defines the wire format.

use serde::Serialize;

/// Receive/transmit throughput in KB/s.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct NetRates {
    pub rx: f64,
    pub tx: f64,
}

/// Weather sub-record; each field is omitted on its own when unknown.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct WeatherFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wcode: Option<i64>,
}

impl WeatherFields {
    pub fn is_empty(&self) -> bool {
        self.temp.is_none() && self.desc.is_none() && self.wcode.is_none()
    }
}

/// One sample. Field order matches what the firmware expects to see first.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    pub cpu: f64,
    pub ram: u64,
    pub ram_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_free: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net: Option<NetRates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherFields>,
}

impl TelemetryRecord {
    /// Compact JSON terminated by a single newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Rounds to one decimal place, the precision the display renders.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
