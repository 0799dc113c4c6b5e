//! Serial connection lifecycle: Disconnected → Connecting → Connected → Disconnected.
//!
//! The manager is the only owner of the live port. A failed write drops the
//! handle immediately; the caller gets the error and the next
//! `ensure_connected` goes back to enumeration instead of reusing anything.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::ports::{self, SerialCandidate};
use crate::state::{LinkState, StopSignal};

/// Where candidates come from and how a device is opened.
pub trait PortBackend {
    type Port: Write;

    fn enumerate(&mut self) -> Vec<SerialCandidate>;
    fn open(&mut self, device: &str, baud: u32) -> Result<Self::Port, LinkError>;
}

/// The real thing, backed by `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortBackend for SystemPorts {
    type Port = Box<dyn serialport::SerialPort>;

    fn enumerate(&mut self) -> Vec<SerialCandidate> {
        ports::list_candidates()
    }

    fn open(&mut self, device: &str, baud: u32) -> Result<Self::Port, LinkError> {
        serialport::new(device, baud)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|source| LinkError::Open {
                device: device.to_string(),
                source,
            })
    }
}

/// Delays used by the reconnect cycle.
#[derive(Debug, Clone, Copy)]
pub struct ConnectTimings {
    /// Pause after a successful open so the board can finish its reset.
    pub settle: Duration,
    /// Backoff after a failed open.
    pub open_retry: Duration,
    /// Backoff while no device is attached.
    pub poll_retry: Duration,
}

impl Default for ConnectTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            open_retry: Duration::from_secs(1),
            poll_retry: Duration::from_millis(500),
        }
    }
}

/// The live serial channel.
pub struct ConnectionHandle<P> {
    pub device: String,
    pub baud: u32,
    port: P,
}

pub struct ConnectionManager<B: PortBackend> {
    backend: B,
    baud: u32,
    fixed: Option<String>,
    preferred: Option<String>,
    timings: ConnectTimings,
    state: LinkState,
    handle: Option<ConnectionHandle<B::Port>>,
}

impl<B: PortBackend> ConnectionManager<B> {
    pub fn new(backend: B, baud: u32) -> Self {
        Self {
            backend,
            baud,
            fixed: None,
            preferred: None,
            timings: ConnectTimings::default(),
            state: LinkState::Disconnected,
            handle: None,
        }
    }

    /// Always open this device instead of autodetecting.
    pub fn with_fixed_device(mut self, device: Option<String>) -> Self {
        self.fixed = device;
        self
    }

    pub fn with_timings(mut self, timings: ConnectTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Device of the live connection.
    pub fn device(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.device.as_str())
    }

    /// Last device that opened successfully; used for sticky selection.
    pub fn preferred(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Blocks until connected (`true`) or stop is requested (`false`).
    pub fn ensure_connected(&mut self, stop: &StopSignal) -> bool {
        if self.handle.is_some() {
            return true;
        }
        self.state = LinkState::Connecting;

        while !stop.is_set() {
            let target = match &self.fixed {
                Some(dev) => Some(dev.clone()),
                None => {
                    let candidates = self.backend.enumerate();
                    ports::select(&candidates, self.preferred.as_deref())
                }
            };

            let Some(device) = target else {
                debug!("waiting for device…");
                stop.sleep(self.timings.poll_retry);
                continue;
            };

            match self.backend.open(&device, self.baud) {
                Ok(port) => {
                    if !stop.sleep(self.timings.settle) {
                        // Stopped mid-settle: drop the fresh port without ever using it.
                        break;
                    }
                    info!("connected {device} @{}", self.baud);
                    self.preferred = Some(device.clone());
                    self.handle = Some(ConnectionHandle {
                        device,
                        baud: self.baud,
                        port,
                    });
                    self.state = LinkState::Connected;
                    return true;
                }
                Err(e) => {
                    warn!("{e}");
                    stop.sleep(self.timings.open_retry);
                }
            }
        }

        self.state = LinkState::Disconnected;
        false
    }

    /// Writes and flushes. Any failure closes the handle; the caller reconnects.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        let res = handle
            .port
            .write_all(bytes)
            .and_then(|_| handle.port.flush());
        if let Err(e) = res {
            warn!("write to {} failed, dropping connection: {e}", handle.device);
            self.close();
            return Err(LinkError::Write(e));
        }
        Ok(())
    }

    /// Closes the handle if present. Idempotent.
    pub fn close(&mut self) {
        if let Some(h) = self.handle.take() {
            debug!("closing {}", h.device);
        }
        self.state = LinkState::Disconnected;
    }
}

impl<B: PortBackend> Drop for ConnectionManager<B> {
    fn drop(&mut self) {
        self.close();
    }
}
