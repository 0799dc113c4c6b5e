//! Host metric queries. Each optional query returns its own `Result` so the
//! sampler can omit exactly the field that failed.

use std::path::Path;
use std::time::Instant;

use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTotals {
    pub total_kb: u64,
    pub used_kb: u64,
}

/// Cumulative byte counters summed over all interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

pub trait MetricSource {
    /// Global CPU load, 0..=100.
    fn cpu_percent(&mut self) -> f32;
    fn memory(&mut self) -> MemoryTotals;
    fn disk_free_kb(&mut self) -> Result<u64, SourceError>;
    fn net_counters(&mut self) -> Result<NetCounters, SourceError>;
    fn host_name(&mut self) -> Result<String, SourceError>;
    /// Boot time as Unix seconds.
    fn boot_time(&mut self) -> Result<u64, SourceError>;
    fn foreground_app(&mut self) -> Result<String, SourceError>;
}

/// `sysinfo`-backed source. Handles persist across samples so CPU usage is a
/// delta between consecutive calls.
pub struct SysinfoSource {
    sys: System,
    disks: Disks,
    networks: Networks,
    last_cpu_refresh: Instant,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let sys = System::new_with_specifics(refresh_kind);
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_cpu_refresh: Instant::now(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn cpu_percent(&mut self) -> f32 {
        // sysinfo needs a minimum gap between two refreshes for a usable delta
        let since = self.last_cpu_refresh.elapsed();
        if since < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        self.sys.refresh_cpu_usage();
        self.last_cpu_refresh = Instant::now();
        let usage = self.sys.global_cpu_usage();
        if usage.is_finite() {
            usage.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    fn memory(&mut self) -> MemoryTotals {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let used = total.saturating_sub(self.sys.available_memory());
        MemoryTotals {
            total_kb: total / 1024,
            used_kb: used / 1024,
        }
    }

    fn disk_free_kb(&mut self) -> Result<u64, SourceError> {
        self.disks.refresh(true);
        let root = Path::new(root_mount());
        self.disks
            .list()
            .iter()
            .find(|d| d.mount_point() == root)
            .or_else(|| self.disks.list().first())
            .map(|d| d.available_space() / 1024)
            .ok_or_else(|| SourceError::NotAvailable("no disks listed".into()))
    }

    fn net_counters(&mut self) -> Result<NetCounters, SourceError> {
        self.networks.refresh(true);
        if self.networks.list().is_empty() {
            return Err(SourceError::NotAvailable("no network interfaces".into()));
        }
        let (rx_bytes, tx_bytes) =
            self.networks
                .list()
                .iter()
                .fold((0u64, 0u64), |acc, (_, d)| {
                    (
                        acc.0.saturating_add(d.total_received()),
                        acc.1.saturating_add(d.total_transmitted()),
                    )
                });
        Ok(NetCounters { rx_bytes, tx_bytes })
    }

    fn host_name(&mut self) -> Result<String, SourceError> {
        let name = hostname::get()?;
        name.into_string()
            .map_err(|_| SourceError::NotAvailable("host name is not valid UTF-8".into()))
    }

    fn boot_time(&mut self) -> Result<u64, SourceError> {
        match System::boot_time() {
            0 => Err(SourceError::NotAvailable("boot time unknown".into())),
            t => Ok(t),
        }
    }

    fn foreground_app(&mut self) -> Result<String, SourceError> {
        frontmost_app()
    }
}

#[cfg(windows)]
fn root_mount() -> &'static str {
    "C:\\"
}

#[cfg(not(windows))]
fn root_mount() -> &'static str {
    "/"
}

#[cfg(target_os = "macos")]
fn frontmost_app() -> Result<String, SourceError> {
    use std::process::{Command, Stdio};
    use std::time::Duration;

    const SCRIPT: &str = "tell application \"System Events\" to get name of application processes whose frontmost is true";
    const TIMEOUT: Duration = Duration::from_millis(1500);

    let mut child = Command::new("osascript")
        .args(["-e", SCRIPT])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + TIMEOUT;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::NotAvailable("osascript timed out".into()));
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    if !status.success() {
        return Err(SourceError::NotAvailable(format!("osascript exited with {status}")));
    }

    let mut out = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        use std::io::Read;
        stdout.read_to_string(&mut out)?;
    }
    first_app_name(&out).ok_or_else(|| SourceError::NotAvailable("no frontmost app".into()))
}

#[cfg(not(target_os = "macos"))]
fn frontmost_app() -> Result<String, SourceError> {
    Err(SourceError::NotAvailable(
        "foreground app lookup is only supported on macOS".into(),
    ))
}

/// System Events may answer with a ", "-separated list; the first non-empty name wins.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn first_app_name(out: &str) -> Option<String> {
    out.trim()
        .split(", ")
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
