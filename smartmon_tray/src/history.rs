//! Bounded history buffers for the sparklines.

use std::collections::VecDeque;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if dq.len() == cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Values pulled out of each transmitted record, one entry per record.
pub struct RecordHistory {
    pub cpu: VecDeque<u64>,
    pub rx: VecDeque<u64>,
    pub tx: VecDeque<u64>,
    cap: usize,
}

impl RecordHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cpu: VecDeque::with_capacity(cap),
            rx: VecDeque::with_capacity(cap),
            tx: VecDeque::with_capacity(cap),
            cap,
        }
    }

    // Missing net rates (first record, failed query) count as zero.
    pub fn push(&mut self, cpu: f64, rx: Option<f64>, tx: Option<f64>) {
        let clamp = |v: f64| v.max(0.0).round() as u64;
        push_capped(&mut self.cpu, clamp(cpu.min(100.0)), self.cap);
        push_capped(&mut self.rx, clamp(rx.unwrap_or(0.0)), self.cap);
        push_capped(&mut self.tx, clamp(tx.unwrap_or(0.0)), self.cap);
    }
}
