//! Serial device enumeration and the autodetect heuristic.
//!
//! Candidates are re-enumerated on every selection attempt. Scoring favours
//! USB modem/serial style device names and known microcontroller bridge
//! chips, and pushes anything that looks like Bluetooth far below zero so it
//! can never win against a wired board.

use serialport::SerialPortType;
use tracing::debug;

/// A currently attached serial device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialCandidate {
    pub device: String,
    pub manufacturer: String,
    pub product: String,
    pub description: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl SerialCandidate {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Hardware id in the `USB VID:PID=xxxx:xxxx` style used by port listings.
    pub fn hwid(&self) -> String {
        match (self.vid, self.pid) {
            (Some(v), Some(p)) => format!("USB VID:PID={v:04X}:{p:04X}"),
            _ => "n/a".into(),
        }
    }
}

impl From<serialport::SerialPortInfo> for SerialCandidate {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut c = SerialCandidate::new(info.port_name);
        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                c.manufacturer = usb.manufacturer.unwrap_or_default();
                c.product = usb.product.unwrap_or_default();
                c.description = if c.product.is_empty() {
                    "n/a".into()
                } else {
                    c.product.clone()
                };
                c.vid = Some(usb.vid);
                c.pid = Some(usb.pid);
            }
            SerialPortType::BluetoothPort => c.description = "Bluetooth".into(),
            SerialPortType::PciPort => c.description = "PCI".into(),
            SerialPortType::Unknown => c.description = "n/a".into(),
        }
        c
    }
}

/// Enumerates attached serial ports. An enumeration failure reads as "nothing attached".
pub fn list_candidates() -> Vec<SerialCandidate> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(SerialCandidate::from).collect(),
        Err(e) => {
            debug!("serial enumeration failed: {e}");
            Vec::new()
        }
    }
}

const BLUETOOTH_MARKERS: [&str; 2] = ["bluetooth", "rfcomm"];

const DEVICE_BONUSES: [(&str, i32); 4] = [
    ("usbmodem", 100),
    ("usbserial", 90),
    ("ttyacm", 80),
    ("ttyusb", 70),
];

const VENDOR_HINTS: [(&str, i32); 7] = [
    ("espressif", 20),
    ("cp210", 10),
    ("wch", 8),
    ("silicon labs", 8),
    ("ch340", 8),
    ("cdc", 5),
    ("usb jtag", 6),
];

/// Heuristic score for "this looks like the display board".
pub fn score(c: &SerialCandidate) -> i32 {
    let dev = c.device.to_lowercase();
    let man = c.manufacturer.to_lowercase();
    let prod = c.product.to_lowercase();
    let desc = c.description.to_lowercase();

    let mut score = 0;

    if BLUETOOTH_MARKERS
        .iter()
        .any(|k| dev.contains(k) || desc.contains(k) || man.contains(k) || prod.contains(k))
    {
        score -= 100;
    }

    for (pat, bonus) in DEVICE_BONUSES {
        if dev.contains(pat) {
            score += bonus;
        }
    }
    // macOS callout device
    if dev.starts_with("/dev/cu.") {
        score += 5;
    }

    for (hint, bonus) in VENDOR_HINTS {
        if man.contains(hint) || prod.contains(hint) || desc.contains(hint) {
            score += bonus;
        }
    }

    if c.vid.is_some() && c.pid.is_some() {
        score += 3;
    }

    score
}

/// Picks the device to open, or `None` when nothing is attached.
///
/// A `preferred` device that is still present wins outright. Otherwise the
/// highest score wins, earliest candidate on ties. When nothing scores above
/// zero the first enumerated candidate is returned; that order is whatever
/// the platform reports, so this last fallback is weak.
pub fn select(candidates: &[SerialCandidate], preferred: Option<&str>) -> Option<String> {
    let first = candidates.first()?;

    if let Some(p) = preferred {
        if candidates.iter().any(|c| c.device == p) {
            return Some(p.to_string());
        }
    }

    let mut best = first;
    let mut best_score = score(first);
    for c in &candidates[1..] {
        let s = score(c);
        if s > best_score {
            best = c;
            best_score = s;
        }
    }

    if best_score <= 0 {
        return Some(first.device.clone());
    }
    Some(best.device.clone())
}
