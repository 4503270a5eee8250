//! Metrics exporters. An exporter consumes a [`GlobalMetrics`] snapshot and
//! writes formatted output. A benchmark harness or CLI driving these is left
//! to the embedder; only the exporter interface and the two built-in formats
//! live here.

use std::collections::HashMap;
use std::fmt::Write as _;

/// A single channel's point-in-time counters, as produced by
/// [`super::ActiveRecorder::snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelSnapshot {
    pub sent: u64,
    pub recv: u64,
    pub dropped: u64,
    pub closed: bool,
    pub try_send_ok: u64,
    pub try_send_fail: u64,
    pub try_recv_ok: u64,
    pub try_recv_empty: u64,
    pub send_p50_ns: f64,
    pub send_p95_ns: f64,
    pub send_p99_ns: f64,
    pub recv_p50_ns: f64,
    pub recv_p95_ns: f64,
    pub recv_p99_ns: f64,
    pub send_first_ns: u64,
    pub send_last_ns: u64,
    pub recv_first_ns: u64,
    pub recv_last_ns: u64,
}

impl ChannelSnapshot {
    fn span_secs(first: u64, last: u64) -> f64 {
        if last <= first {
            0.0
        } else {
            (last - first) as f64 / 1e9
        }
    }

    pub fn ns_by_op(&self) -> f64 {
        if self.sent + self.recv == 0 {
            0.0
        } else {
            (self.send_p50_ns + self.recv_p50_ns) / 2.0
        }
    }

    pub fn send_ops_per_sec(&self) -> f64 {
        let span = Self::span_secs(self.send_first_ns, self.send_last_ns);
        if span == 0.0 { 0.0 } else { self.sent as f64 / span }
    }

    pub fn recv_ops_per_sec(&self) -> f64 {
        let span = Self::span_secs(self.recv_first_ns, self.recv_last_ns);
        if span == 0.0 { 0.0 } else { self.recv as f64 / span }
    }

    pub fn drop_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.dropped as f64 / self.sent as f64
        }
    }

    pub fn try_send_failure_rate(&self) -> f64 {
        let total = self.try_send_ok + self.try_send_fail;
        if total == 0 {
            0.0
        } else {
            self.try_send_fail as f64 / total as f64
        }
    }

    pub fn try_recv_empty_rate(&self) -> f64 {
        let total = self.try_recv_ok + self.try_recv_empty;
        if total == 0 {
            0.0
        } else {
            self.try_recv_empty as f64 / total as f64
        }
    }
}

/// A full metrics snapshot across every still-live registered channel.
#[derive(Debug, Clone, Default)]
pub struct GlobalMetrics {
    pub timestamp_ns: u64,
    pub channels: HashMap<String, ChannelSnapshot>,
}

/// Formats a [`GlobalMetrics`] snapshot as output.
pub trait Exporter {
    fn export(&self, metrics: &GlobalMetrics) -> String;
}

/// A human-readable, column-aligned table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableExporter;

impl Exporter for TableExporter {
    fn export(&self, metrics: &GlobalMetrics) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "timestamp_ns: {}", metrics.timestamp_ns);
        let _ = writeln!(
            out,
            "{:<24} {:>10} {:>10} {:>10} {:>8} {:>10} {:>10}",
            "channel", "sent", "recv", "dropped", "closed", "send_p99", "recv_p99"
        );
        let mut ids: Vec<_> = metrics.channels.keys().collect();
        ids.sort();
        for id in ids {
            let s = &metrics.channels[id];
            let _ = writeln!(
                out,
                "{:<24} {:>10} {:>10} {:>10} {:>8} {:>10.1} {:>10.1}",
                id, s.sent, s.recv, s.dropped, s.closed, s.send_p99_ns, s.recv_p99_ns
            );
        }
        out
    }
}

/// A CSV export: one header row, one row per channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn export(&self, metrics: &GlobalMetrics) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "channel,sent,recv,dropped,closed,try_send_ok,try_send_fail,try_recv_ok,try_recv_empty,\
             send_p50_ns,send_p95_ns,send_p99_ns,recv_p50_ns,recv_p95_ns,recv_p99_ns,\
             send_ops_per_sec,recv_ops_per_sec,drop_rate,try_send_failure_rate,try_recv_empty_rate"
        );
        let mut ids: Vec<_> = metrics.channels.keys().collect();
        ids.sort();
        for id in ids {
            let s = &metrics.channels[id];
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.6},{:.6},{:.6}",
                id,
                s.sent,
                s.recv,
                s.dropped,
                s.closed,
                s.try_send_ok,
                s.try_send_fail,
                s.try_recv_ok,
                s.try_recv_empty,
                s.send_p50_ns,
                s.send_p95_ns,
                s.send_p99_ns,
                s.recv_p50_ns,
                s.recv_p95_ns,
                s.recv_p99_ns,
                s.send_ops_per_sec(),
                s.recv_ops_per_sec(),
                s.drop_rate(),
                s.try_send_failure_rate(),
                s.try_recv_empty_rate(),
            );
        }
        out
    }
}
