//! The sampling loop: assemble a record, send it, sleep, repeat.
//!
//! Fast fields are sampled every tick; weather is refreshed on its own slow
//! cadence and merged from the cache. Each metric query is independent, so a
//! failing one only removes its own field from the record.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, PortBackend};
use crate::metrics::{MetricSource, NetCounters};
use crate::state::{LinkState, StatusBoard, StopSignal};
use crate::types::{round1, NetRates, TelemetryRecord};
use crate::weather::{WeatherCache, WeatherSource};

/// Floor for the pause between iterations.
pub const MIN_TICK: Duration = Duration::from_millis(100);
/// Weather older than this is refreshed.
pub const WEATHER_FRESHNESS: Duration = Duration::from_secs(300);
/// Line length the display firmware buffers before discarding.
pub const RECEIVER_LINE_LIMIT: usize = 1024;

/// Smallest divisor for rate computation.
const MIN_RATE_WINDOW: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub interval: Duration,
    /// `(latitude, longitude)`; weather is disabled when absent.
    pub coordinates: Option<(f64, f64)>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            coordinates: None,
        }
    }
}

impl SamplerConfig {
    pub fn tick(&self) -> Duration {
        self.interval.max(MIN_TICK)
    }
}

/// Previous byte counters, for turning totals into KB/s.
#[derive(Debug, Default, Clone)]
pub struct NetCounterBaseline {
    last: Option<(NetCounters, Instant)>,
}

impl NetCounterBaseline {
    /// Rates since the previous call, or `None` on the first one. The baseline
    /// always moves to `current`.
    pub fn advance(&mut self, current: NetCounters, at: Instant) -> Option<NetRates> {
        let rates = self.last.map(|(prev, prev_at)| {
            let dt = at
                .saturating_duration_since(prev_at)
                .as_secs_f64()
                .max(MIN_RATE_WINDOW);
            let rx = current.rx_bytes.saturating_sub(prev.rx_bytes) as f64 / 1024.0 / dt;
            let tx = current.tx_bytes.saturating_sub(prev.tx_bytes) as f64 / 1024.0 / dt;
            NetRates {
                rx: round1(rx),
                tx: round1(tx),
            }
        });
        self.last = Some((current, at));
        rates
    }
}

pub struct Sampler<M, W, B: PortBackend> {
    config: SamplerConfig,
    metrics: M,
    weather: W,
    link: ConnectionManager<B>,
    status: StatusBoard,
    net_baseline: NetCounterBaseline,
    weather_cache: WeatherCache,
}

impl<M, W, B> Sampler<M, W, B>
where
    M: MetricSource,
    W: WeatherSource,
    B: PortBackend,
{
    pub fn new(config: SamplerConfig, metrics: M, weather: W, link: ConnectionManager<B>) -> Self {
        Self {
            config,
            metrics,
            weather,
            link,
            status: StatusBoard::new(),
            net_baseline: NetCounterBaseline::default(),
            weather_cache: WeatherCache::default(),
        }
    }

    /// Publish status into an existing board (shared with a front end).
    pub fn with_status(mut self, status: StatusBoard) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn link(&self) -> &ConnectionManager<B> {
        &self.link
    }

    pub fn weather_cache(&self) -> &WeatherCache {
        &self.weather_cache
    }

    /// Runs until `stop` is set, then closes the connection.
    pub fn run(&mut self, stop: &StopSignal) {
        let tick = self.config.tick();
        info!(
            "sampling every {:.1}s{}",
            tick.as_secs_f64(),
            if self.config.coordinates.is_some() {
                " with weather"
            } else {
                ""
            }
        );

        while !stop.is_set() {
            if self.link.state() != LinkState::Connected {
                // ensure_connected may block for a long time; show it.
                self.status.update(|s| {
                    s.link = LinkState::Connecting;
                    s.device = None;
                });
            }
            if !self.link.ensure_connected(stop) {
                break;
            }
            self.publish_link();

            self.step(Instant::now(), Utc::now());

            stop.sleep(tick);
        }

        self.link.close();
        self.publish_link();
        info!("sampling stopped");
    }

    /// One iteration after the link is up: assemble, serialize, send.
    pub fn step(&mut self, at: Instant, wall: DateTime<Utc>) {
        let record = self.build_record(at, wall);
        let line = match record.to_line() {
            Ok(l) => l,
            Err(e) => {
                warn!("failed to encode record: {e}");
                return;
            }
        };
        if line.len() > RECEIVER_LINE_LIMIT {
            warn!(
                "record is {} bytes, display buffers only {RECEIVER_LINE_LIMIT}",
                line.len()
            );
        }

        info!("TX: {}", line.trim_end());
        match self.link.send(line.as_bytes()) {
            Ok(()) => self.status.update(|s| {
                s.samples_sent += 1;
                s.last_line = Some(line.trim_end().to_string());
                s.last_sent_at = Some(wall);
            }),
            Err(e) => {
                // Sample is dropped; the next iteration reconnects.
                warn!("{e}");
                self.status.update(|s| s.send_failures += 1);
            }
        }
        self.publish_link();
    }

    /// Assembles one record from the sources plus the weather cache.
    pub fn build_record(&mut self, at: Instant, wall: DateTime<Utc>) -> TelemetryRecord {
        let cpu = self.metrics.cpu_percent();
        let mem = self.metrics.memory();
        let now_secs = wall.timestamp();

        let mut record = TelemetryRecord {
            cpu: round1(f64::from(sane_percent(cpu))),
            ram: mem.total_kb,
            ram_used: mem.used_kb,
            time: Some(now_secs),
            ..Default::default()
        };

        record.host = ok_or_log("host", self.metrics.host_name());
        record.uptime = ok_or_log("uptime", self.metrics.boot_time())
            .map(|boot| u64::try_from(now_secs).unwrap_or(0).saturating_sub(boot));
        record.disk_free = ok_or_log("disk_free", self.metrics.disk_free_kb());
        record.net = ok_or_log("net", self.metrics.net_counters())
            .and_then(|counters| self.net_baseline.advance(counters, at));
        record.app = ok_or_log("app", self.metrics.foreground_app()).filter(|a| !a.is_empty());

        self.refresh_weather(at);
        record.weather = self
            .weather_cache
            .reading()
            .map(|r| r.fields())
            .filter(|w| !w.is_empty());

        record
    }

    /// Fetches weather when coordinates are set and the last attempt is older
    /// than the freshness window. A failed fetch keeps the cached reading and
    /// is not retried before the window passes again.
    fn refresh_weather(&mut self, at: Instant) {
        let Some((lat, lon)) = self.config.coordinates else {
            return;
        };
        if !self.weather_cache.is_due(at, WEATHER_FRESHNESS) {
            return;
        }
        self.weather_cache.mark_attempt(at);
        match self.weather.current(lat, lon) {
            Ok(reading) => {
                debug!("weather refreshed: {reading:?}");
                self.weather_cache.store(reading, at);
            }
            Err(e) => debug!("weather refresh failed, keeping cache: {e}"),
        }
    }

    fn publish_link(&self) {
        let state = self.link.state();
        let device = self.link.device().map(str::to_string);
        self.status.update(|s| {
            s.link = state;
            s.device = if state == LinkState::Connected {
                device
            } else {
                None
            };
        });
    }
}

/// NaN or infinite readings would serialize as `null`.
fn sane_percent(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn ok_or_log<T, E: std::fmt::Display>(field: &str, res: Result<T, E>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("{field} omitted: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::{instant, FakeBackend};
    use crate::connection::ConnectTimings;
    use crate::error::{SourceError, WeatherError};
    use crate::metrics::MemoryTotals;
    use crate::weather::WeatherReading;
    use chrono::TimeZone;
    use std::collections::VecDeque;

    const ALL_OPTIONAL: [&str; 5] = ["disk", "net", "host", "boot", "app"];

    #[derive(Default)]
    struct FakeMetrics {
        /// Optional queries that fail, by name.
        failing: Vec<&'static str>,
        cpu: Option<f32>,
        net: VecDeque<NetCounters>,
    }

    impl FakeMetrics {
        fn query(&self, name: &str) -> Result<(), SourceError> {
            if self.failing.contains(&name) {
                return Err(SourceError::NotAvailable(name.to_string()));
            }
            Ok(())
        }
    }

    impl MetricSource for FakeMetrics {
        fn cpu_percent(&mut self) -> f32 {
            self.cpu.unwrap_or(37.26)
        }
        fn memory(&mut self) -> MemoryTotals {
            MemoryTotals {
                total_kb: 16_000_000,
                used_kb: 9_500_000,
            }
        }
        fn disk_free_kb(&mut self) -> Result<u64, SourceError> {
            self.query("disk")?;
            Ok(120_000_000)
        }
        fn net_counters(&mut self) -> Result<NetCounters, SourceError> {
            self.query("net")?;
            self.net
                .pop_front()
                .ok_or_else(|| SourceError::NotAvailable("net".into()))
        }
        fn host_name(&mut self) -> Result<String, SourceError> {
            self.query("host")?;
            Ok("studio".into())
        }
        fn boot_time(&mut self) -> Result<u64, SourceError> {
            self.query("boot")?;
            Ok(1_700_000_000)
        }
        fn foreground_app(&mut self) -> Result<String, SourceError> {
            self.query("app")?;
            Ok("Xcode".into())
        }
    }

    /// Pops scripted results; counts calls.
    #[derive(Default)]
    struct ScriptedWeather {
        results: VecDeque<Result<WeatherReading, WeatherError>>,
        calls: usize,
    }

    impl WeatherSource for ScriptedWeather {
        fn current(&mut self, _lat: f64, _lon: f64) -> Result<WeatherReading, WeatherError> {
            self.calls += 1;
            self.results
                .pop_front()
                .unwrap_or_else(|| Err(WeatherError::Malformed("offline".into())))
        }
    }

    fn wall() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_100, 0).unwrap()
    }

    fn sampler(
        metrics: FakeMetrics,
        weather: ScriptedWeather,
        coordinates: Option<(f64, f64)>,
    ) -> Sampler<FakeMetrics, ScriptedWeather, FakeBackend> {
        let link = ConnectionManager::new(FakeBackend::with_devices(&["/dev/ttyACM0"]), 115_200)
            .with_timings(instant());
        Sampler::new(
            SamplerConfig {
                interval: Duration::ZERO,
                coordinates,
            },
            metrics,
            weather,
            link,
        )
    }

    #[test]
    fn net_rate_from_baseline() {
        let t0 = Instant::now();
        let mut base = NetCounterBaseline::default();
        assert_eq!(
            base.advance(
                NetCounters {
                    rx_bytes: 1000,
                    tx_bytes: 500
                },
                t0
            ),
            None
        );
        let rates = base
            .advance(
                NetCounters {
                    rx_bytes: 2024,
                    tx_bytes: 500,
                },
                t0 + Duration::from_secs(1),
            )
            .unwrap();
        assert!((rates.rx - 1.0).abs() < 1e-9);
        assert_eq!(rates.tx, 0.0);
    }

    #[test]
    fn net_rate_floors_tiny_windows_and_resets() {
        let t0 = Instant::now();
        let mut base = NetCounterBaseline::default();
        base.advance(
            NetCounters {
                rx_bytes: 0,
                tx_bytes: 10_000,
            },
            t0,
        );
        // Same instant: divisor floors to 0.1s instead of blowing up.
        let r = base
            .advance(
                NetCounters {
                    rx_bytes: 1024,
                    tx_bytes: 0,
                },
                t0,
            )
            .unwrap();
        assert_eq!(r.rx, 10.0);
        // Counter went backwards (interface reset): zero, not negative.
        assert_eq!(r.tx, 0.0);
    }

    #[test]
    fn full_record_when_everything_answers() {
        let metrics = FakeMetrics {
            net: VecDeque::from(vec![
                NetCounters {
                    rx_bytes: 0,
                    tx_bytes: 0,
                },
                NetCounters {
                    rx_bytes: 2048,
                    tx_bytes: 1024,
                },
            ]),
            ..Default::default()
        };
        let weather = ScriptedWeather {
            results: VecDeque::from(vec![Ok(WeatherReading::new(Some(18.44), Some(61)))]),
            ..Default::default()
        };
        let mut s = sampler(metrics, weather, Some((48.85, 2.35)));
        let t0 = Instant::now();

        let first = s.build_record(t0, wall());
        assert_eq!(first.net, None, "no baseline yet");
        assert_eq!(first.cpu, 37.3);
        assert_eq!(first.ram, 16_000_000);
        assert_eq!(first.ram_used, 9_500_000);
        assert_eq!(first.host.as_deref(), Some("studio"));
        assert_eq!(first.time, Some(1_700_000_100));
        assert_eq!(first.uptime, Some(100));
        assert_eq!(first.disk_free, Some(120_000_000));
        assert_eq!(first.app.as_deref(), Some("Xcode"));
        let w = first.weather.unwrap();
        assert_eq!(w.temp, Some(18.4));
        assert_eq!(w.desc.as_deref(), Some("Pluie faible"));
        assert_eq!(w.wcode, Some(61));

        let second = s.build_record(t0 + Duration::from_secs(2), wall());
        assert_eq!(second.net, Some(NetRates { rx: 1.0, tx: 0.5 }));
    }

    #[test]
    fn failing_sources_only_drop_their_fields() {
        let metrics = FakeMetrics {
            failing: ALL_OPTIONAL.to_vec(),
            ..Default::default()
        };
        let mut s = sampler(metrics, ScriptedWeather::default(), Some((1.0, 2.0)));
        let t0 = Instant::now();
        s.build_record(t0, wall());
        let r = s.build_record(t0 + Duration::from_secs(2), wall());

        assert_eq!(r.cpu, 37.3);
        assert_eq!(r.ram, 16_000_000);
        assert_eq!(r.ram_used, 9_500_000);
        assert_eq!(r.host, None);
        assert_eq!(r.uptime, None);
        assert_eq!(r.disk_free, None);
        assert_eq!(r.net, None);
        assert_eq!(r.app, None);
        assert_eq!(r.weather, None);

        let line = r.to_line().unwrap();
        assert_eq!(
            line,
            "{\"cpu\":37.3,\"ram\":16000000,\"ram_used\":9500000,\"time\":1700000100}\n"
        );
    }

    #[test]
    fn weather_survives_failed_refreshes() {
        let weather = ScriptedWeather {
            results: VecDeque::from(vec![Ok(WeatherReading::new(Some(12.0), Some(3)))]),
            ..Default::default()
        };
        let mut s = sampler(FakeMetrics::default(), weather, Some((1.0, 2.0)));
        let t_minus_290 = Instant::now();
        let t0 = t_minus_290 + Duration::from_secs(290);

        s.build_record(t_minus_290, wall());
        assert_eq!(s.weather.calls, 1);

        // Within the window: no fetch.
        let r = s.build_record(t0, wall());
        assert_eq!(s.weather.calls, 1);
        assert_eq!(r.weather.unwrap().wcode, Some(3));

        // Stale: one attempt, which fails; the old reading stays.
        let t_retry = t0 + Duration::from_secs(11);
        let r = s.build_record(t_retry, wall());
        assert_eq!(s.weather.calls, 2);
        let w = r.weather.unwrap();
        assert_eq!(w.temp, Some(12.0));
        assert_eq!(w.desc.as_deref(), Some("Couvert"));

        // Outage continues: no further request until the window passes again.
        for i in 1..=10 {
            let r = s.build_record(t_retry + Duration::from_secs(2 * i), wall());
            assert_eq!(r.weather.unwrap().wcode, Some(3));
        }
        assert_eq!(s.weather.calls, 2);

        s.build_record(t_retry + Duration::from_secs(301), wall());
        assert_eq!(s.weather.calls, 3);
        assert_eq!(s.weather_cache().fetched_at(), Some(t_minus_290));
    }

    #[test]
    fn weather_cache_stays_empty_until_first_success() {
        let weather = ScriptedWeather {
            results: VecDeque::from(vec![
                Err(WeatherError::Status(500)),
                Ok(WeatherReading::new(None, Some(0))),
            ]),
            ..Default::default()
        };
        let mut s = sampler(FakeMetrics::default(), weather, Some((1.0, 2.0)));
        let t0 = Instant::now();

        assert_eq!(s.build_record(t0, wall()).weather, None);
        assert_eq!(s.build_record(t0 + Duration::from_secs(2), wall()).weather, None);
        assert_eq!(s.weather.calls, 1);

        let w = s
            .build_record(t0 + Duration::from_secs(301), wall())
            .weather
            .unwrap();
        assert_eq!(s.weather.calls, 2);
        assert_eq!(w.temp, None);
        assert_eq!(w.desc.as_deref(), Some("Clair"));
    }

    #[test]
    fn no_coordinates_no_weather_calls() {
        let mut s = sampler(FakeMetrics::default(), ScriptedWeather::default(), None);
        let r = s.build_record(Instant::now(), wall());
        assert_eq!(r.weather, None);
        assert_eq!(s.weather.calls, 0);
    }

    #[test]
    fn step_sends_line_and_updates_status() {
        let mut s = sampler(FakeMetrics::default(), ScriptedWeather::default(), None);
        let port = s.link.backend().port.clone();
        assert!(s.link.ensure_connected(&StopSignal::new()));

        s.step(Instant::now(), wall());

        let written = String::from_utf8(port.written.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("{\"cpu\":37.3,"));
        assert!(written.ends_with("}\n"));
        let status = s.status().snapshot();
        assert_eq!(status.samples_sent, 1);
        assert_eq!(status.link, LinkState::Connected);
        assert_eq!(status.device.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(status.last_sent_at, Some(wall()));
    }

    #[test]
    fn failed_send_drops_sample_and_disconnects() {
        let mut s = sampler(FakeMetrics::default(), ScriptedWeather::default(), None);
        let port = s.link.backend().port.clone();
        assert!(s.link.ensure_connected(&StopSignal::new()));
        *port.fail_writes.lock().unwrap() = true;

        s.step(Instant::now(), wall());

        let status = s.status().snapshot();
        assert_eq!(status.samples_sent, 0);
        assert_eq!(status.send_failures, 1);
        assert_eq!(status.link, LinkState::Disconnected);
        assert_eq!(s.link().state(), LinkState::Disconnected);
        assert!(port.written.lock().unwrap().is_empty());
    }

    #[test]
    fn run_stops_and_closes() {
        let mut s = sampler(FakeMetrics::default(), ScriptedWeather::default(), None);
        let port = s.link.backend().port.clone();
        let status = s.status();
        let stop = StopSignal::new();
        let remote = stop.clone();
        let watcher = std::thread::spawn(move || {
            // Wait until a few lines went out, then ask the loop to stop.
            while status.snapshot().samples_sent < 3 {
                std::thread::sleep(Duration::from_millis(5));
            }
            remote.request();
        });

        s.run(&stop);
        watcher.join().unwrap();

        assert_eq!(s.link().state(), LinkState::Disconnected);
        assert_eq!(s.status().snapshot().link, LinkState::Disconnected);
        let written = String::from_utf8(port.written.lock().unwrap().clone()).unwrap();
        assert!(written.lines().count() >= 3);
        assert!(written.lines().all(|l| l.starts_with("{\"cpu\":")));
    }

    #[test]
    fn tick_has_a_floor() {
        let cfg = SamplerConfig {
            interval: Duration::from_millis(5),
            coordinates: None,
        };
        assert_eq!(cfg.tick(), MIN_TICK);
        let cfg = SamplerConfig {
            interval: Duration::from_secs(3),
            coordinates: None,
        };
        assert_eq!(cfg.tick(), Duration::from_secs(3));
    }

    fn keys(record: &TelemetryRecord) -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(&record.to_line().unwrap()).unwrap();
        value.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn each_failing_source_drops_only_its_own_key() {
        let all = [
            "app",
            "cpu",
            "disk_free",
            "host",
            "net",
            "ram",
            "ram_used",
            "time",
            "uptime",
            "weather",
        ];
        let cases = [
            ("disk", "disk_free"),
            ("net", "net"),
            ("app", "app"),
            ("host", "host"),
            ("boot", "uptime"),
            ("weather", "weather"),
        ];

        for (source, key) in cases {
            let metrics = FakeMetrics {
                failing: vec![source],
                net: VecDeque::from(vec![
                    NetCounters {
                        rx_bytes: 0,
                        tx_bytes: 0,
                    },
                    NetCounters {
                        rx_bytes: 1024,
                        tx_bytes: 1024,
                    },
                ]),
                ..Default::default()
            };
            let mut weather = ScriptedWeather::default();
            if source != "weather" {
                weather
                    .results
                    .push_back(Ok(WeatherReading::new(Some(9.0), Some(1))));
            }
            let mut s = sampler(metrics, weather, Some((1.0, 2.0)));
            let t0 = Instant::now();
            s.build_record(t0, wall());
            let r = s.build_record(t0 + Duration::from_secs(2), wall());

            let mut expected: Vec<String> = all
                .iter()
                .filter(|k| **k != key)
                .map(|k| k.to_string())
                .collect();
            expected.sort();
            let mut got = keys(&r);
            got.sort();
            assert_eq!(got, expected, "failing {source}");
        }
    }

    #[test]
    fn non_finite_cpu_is_reported_as_zero() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let metrics = FakeMetrics {
                cpu: Some(bad),
                ..Default::default()
            };
            let mut s = sampler(metrics, ScriptedWeather::default(), None);
            let r = s.build_record(Instant::now(), wall());
            assert_eq!(r.cpu, 0.0);
            let line = r.to_line().unwrap();
            assert!(line.starts_with("{\"cpu\":0.0,"), "{line}");
            assert!(!line.contains("null"));
        }

        let metrics = FakeMetrics {
            cpu: Some(140.0),
            ..Default::default()
        };
        let mut s = sampler(metrics, ScriptedWeather::default(), None);
        assert_eq!(s.build_record(Instant::now(), wall()).cpu, 100.0);
    }

    #[test]
    fn status_shows_connecting_while_no_device_is_attached() {
        let link = ConnectionManager::new(FakeBackend::with_devices(&[]), 115_200).with_timings(
            ConnectTimings {
                poll_retry: Duration::from_millis(5),
                ..instant()
            },
        );
        let mut s = Sampler::new(
            SamplerConfig::default(),
            FakeMetrics::default(),
            ScriptedWeather::default(),
            link,
        );
        let status = s.status();
        let stop = StopSignal::new();
        let remote = stop.clone();
        let watcher = std::thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut seen = status.snapshot().link;
            while seen != LinkState::Connecting && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
                seen = status.snapshot().link;
            }
            remote.request();
            seen
        });

        s.run(&stop);
        let seen = watcher.join().unwrap();

        assert_eq!(seen, LinkState::Connecting);
        assert_eq!(s.status().snapshot().link, LinkState::Disconnected);
        assert_eq!(s.status().snapshot().samples_sent, 0);
    }
}
