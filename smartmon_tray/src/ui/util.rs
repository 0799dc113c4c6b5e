//! Small UI helpers: human-readable sizes, durations, truncation.

/// Formats a size given in KB.
pub fn human_kb(kb: u64) -> String {
    const K: f64 = 1024.0;
    let kb = kb as f64;
    if kb < K {
        return format!("{kb:.0}KB");
    }
    let mb = kb / K;
    if mb < K {
        return format!("{mb:.1}MB");
    }
    let gb = mb / K;
    if gb < K {
        return format!("{gb:.1}GB");
    }
    let tb = gb / K;
    format!("{tb:.2}TB")
}

pub fn human_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let mins = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

pub fn truncate_middle(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max {
        return s.to_string();
    }
    if max <= 3 {
        return "...".into();
    }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(len - right).collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(human_kb(512), "512KB");
        assert_eq!(human_kb(16 * 1024 * 1024), "16.0GB");
    }

    #[test]
    fn uptimes() {
        assert_eq!(human_uptime(59), "0m");
        assert_eq!(human_uptime(3_660), "1h 1m");
        assert_eq!(human_uptime(90_061), "1d 1h 1m");
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_middle("/dev/ttyACM0", 20), "/dev/ttyACM0");
        assert_eq!(truncate_middle("/dev/cu.usbmodem14101", 11), "/dev...4101");
        assert_eq!(truncate_middle("abcdef", 2), "...");
    }
}
