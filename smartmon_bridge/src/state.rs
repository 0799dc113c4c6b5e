//! Cross-thread state: the cooperative stop flag and read-only status snapshots
//! for front ends. The serial handle itself never leaves the sampling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Granularity of interruptible sleeps.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Shared stop flag, checked at iteration boundaries and during waits.
#[derive(Clone, Default, Debug)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleeps for `dur` unless stop is requested first. Returns `false` when woken by stop.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        loop {
            if self.is_set() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn label(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        }
    }
}

/// Immutable snapshot of what the bridge is doing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStatus {
    pub link: LinkState,
    pub device: Option<String>,
    pub samples_sent: u64,
    pub send_failures: u64,
    pub last_line: Option<String>,
    pub last_sent_at: Option<DateTime<Utc>>,
}

/// Cheap clonable handle; writers are the sampler only.
#[derive(Clone, Default)]
pub struct StatusBoard(Arc<RwLock<BridgeStatus>>);

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BridgeStatus {
        match self.0.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut BridgeStatus)) {
        let mut guard = match self.0.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_runs_to_completion_without_stop() {
        let stop = StopSignal::new();
        let t = Instant::now();
        assert!(stop.sleep(Duration::from_millis(20)));
        assert!(t.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn sleep_returns_early_when_stopped() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.request();
        });
        let t = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(10)));
        assert!(t.elapsed() < Duration::from_secs(5));
        h.join().unwrap();
    }

    #[test]
    fn snapshots_are_detached() {
        let board = StatusBoard::new();
        board.update(|s| {
            s.link = LinkState::Connected;
            s.device = Some("/dev/ttyACM0".into());
        });
        let snap = board.snapshot();
        board.update(|s| s.link = LinkState::Disconnected);
        assert_eq!(snap.link, LinkState::Connected);
        assert_eq!(board.snapshot().link, LinkState::Disconnected);
    }
}
