//! Read-side mirror of the line the bridge transmits. Every optional key may be
//! missing, so everything past the three required fields is `Option`.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Rates {
    pub rx: f64,
    pub tx: f64,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Weather {
    pub temp: Option<f64>,
    pub desc: Option<String>,
    pub wcode: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Payload {
    pub cpu: f64,
    /// KB
    pub ram: u64,
    /// KB
    pub ram_used: u64,
    pub host: Option<String>,
    pub time: Option<i64>,
    /// seconds
    pub uptime: Option<u64>,
    /// KB
    pub disk_free: Option<u64>,
    pub net: Option<Rates>,
    pub app: Option<String>,
    pub weather: Option<Weather>,
}

impl Payload {
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}
