//! Metrics instrumentation: a capability the kernel invokes on every
//! send/recv/drop/wake event. Disabled by default (the `metrics` feature
//! gates [`ActiveRecorder`]); every kernel always holds a `Handle`, which is
//! the zero-cost [`NoopRecorder`] unless a `metrics_id` was supplied at
//! construction. Active recorders register into a lazily-initialized
//! process-wide registry so [`export_global`] can enumerate them.

mod quantile;
pub mod export;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Instant;

use quantile::P2Quantile;

/// What kind of value was dropped by a bounded kernel's drop policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropKind {
    Oldest,
    Newest,
}

/// The capability every kernel invokes on its lifecycle events. Implemented
/// by [`NoopRecorder`] (always available, zero-cost) and, behind the
/// `metrics` feature, [`ActiveRecorder`].
pub trait Recorder: fmt::Debug + Send + Sync {
    fn record_send(&self, duration_nanos: u64);
    fn record_recv(&self, duration_nanos: u64);
    fn record_try_send(&self, ok: bool);
    fn record_try_recv(&self, ok: bool);
    fn record_drop(&self, kind: DropKind);
    fn record_wake(&self, woken: u64);
    fn record_close(&self);
}

pub(crate) type Handle = Arc<dyn Recorder>;

/// The always-available no-op recorder. Every call is an empty, inlined
/// function body -- the optimizer removes it entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    #[inline]
    fn record_send(&self, _: u64) {}
    #[inline]
    fn record_recv(&self, _: u64) {}
    #[inline]
    fn record_try_send(&self, _: bool) {}
    #[inline]
    fn record_try_recv(&self, _: bool) {}
    #[inline]
    fn record_drop(&self, _: DropKind) {}
    #[inline]
    fn record_wake(&self, _: u64) {}
    #[inline]
    fn record_close(&self) {}
}

/// A tiny linear congruential generator used to decide, per operation,
/// whether to pay for a quantile update this time. Not cryptographic --
/// just cheap and reproducible from a seed.
#[derive(Debug)]
struct Lcg(AtomicU64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(AtomicU64::new(seed | 1))
    }

    /// Returns a value in `[0, 1)`.
    fn next_f64(&self) -> f64 {
        // Numerical Recipes constants.
        let prev = self.0.load(Ordering::Relaxed);
        let next = prev.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0.store(next, Ordering::Relaxed);
        (next >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    recv: AtomicU64,
    dropped_oldest: AtomicU64,
    dropped_newest: AtomicU64,
    try_send_ok: AtomicU64,
    try_send_fail: AtomicU64,
    try_recv_ok: AtomicU64,
    try_recv_empty: AtomicU64,
    wake_events: AtomicU64,
    closed: AtomicU64,
}

/// The active recorder: per-channel counters plus P² quantile estimators
/// for send/recv latency, sampled through [`Lcg`] at `sample_rate`.
#[derive(Debug)]
pub struct ActiveRecorder {
    id: String,
    counters: Counters,
    lcg: Lcg,
    sample_rate: f64,
    send_quantiles: Mutex<[P2Quantile; 3]>,
    recv_quantiles: Mutex<[P2Quantile; 3]>,
    send_first_ns: AtomicU64,
    send_last_ns: AtomicU64,
    recv_first_ns: AtomicU64,
    recv_last_ns: AtomicU64,
    start: Instant,
}

impl ActiveRecorder {
    /// Registers a new active recorder under `id` in the global registry and
    /// returns a shared handle to it. `sample_rate` is clamped to `[0, 1]`.
    pub fn new(id: impl Into<String>, sample_rate: f64) -> Arc<Self> {
        let id = id.into();
        let rec = Arc::new(Self {
            id: id.clone(),
            counters: Counters::default(),
            lcg: Lcg::new(splitmix_seed(&id)),
            sample_rate: sample_rate.clamp(0.0, 1.0),
            send_quantiles: Mutex::new([P2Quantile::new(0.50), P2Quantile::new(0.95), P2Quantile::new(0.99)]),
            recv_quantiles: Mutex::new([P2Quantile::new(0.50), P2Quantile::new(0.95), P2Quantile::new(0.99)]),
            send_first_ns: AtomicU64::new(0),
            send_last_ns: AtomicU64::new(0),
            recv_first_ns: AtomicU64::new(0),
            recv_last_ns: AtomicU64::new(0),
            start: Instant::now(),
        });
        registry().lock().unwrap().insert(id, Arc::downgrade(&rec));
        rec
    }

    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    /// Computes a point-in-time, read-only snapshot of this channel's
    /// counters and quantiles.
    pub fn snapshot(&self) -> export::ChannelSnapshot {
        let send_q = self.send_quantiles.lock().unwrap();
        let recv_q = self.recv_quantiles.lock().unwrap();
        export::ChannelSnapshot {
            sent: self.counters.sent.load(Ordering::Relaxed),
            recv: self.counters.recv.load(Ordering::Relaxed),
            dropped: self.counters.dropped_oldest.load(Ordering::Relaxed) + self.counters.dropped_newest.load(Ordering::Relaxed),
            closed: self.counters.closed.load(Ordering::Relaxed) > 0,
            try_send_ok: self.counters.try_send_ok.load(Ordering::Relaxed),
            try_send_fail: self.counters.try_send_fail.load(Ordering::Relaxed),
            try_recv_ok: self.counters.try_recv_ok.load(Ordering::Relaxed),
            try_recv_empty: self.counters.try_recv_empty.load(Ordering::Relaxed),
            send_p50_ns: send_q[0].estimate(),
            send_p95_ns: send_q[1].estimate(),
            send_p99_ns: send_q[2].estimate(),
            recv_p50_ns: recv_q[0].estimate(),
            recv_p95_ns: recv_q[1].estimate(),
            recv_p99_ns: recv_q[2].estimate(),
            send_first_ns: self.send_first_ns.load(Ordering::Relaxed),
            send_last_ns: self.send_last_ns.load(Ordering::Relaxed),
            recv_first_ns: self.recv_first_ns.load(Ordering::Relaxed),
            recv_last_ns: self.recv_last_ns.load(Ordering::Relaxed),
        }
    }
}

impl Recorder for ActiveRecorder {
    fn record_send(&self, duration_nanos: u64) {
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        let now = self.now_ns();
        self.send_first_ns.compare_exchange(0, now, Ordering::Relaxed, Ordering::Relaxed).ok();
        self.send_last_ns.store(now, Ordering::Relaxed);
        if self.lcg.next_f64() < self.sample_rate {
            let mut q = self.send_quantiles.lock().unwrap();
            for est in q.iter_mut() {
                est.observe(duration_nanos as f64);
            }
        }
    }

    fn record_recv(&self, duration_nanos: u64) {
        self.counters.recv.fetch_add(1, Ordering::Relaxed);
        let now = self.now_ns();
        self.recv_first_ns.compare_exchange(0, now, Ordering::Relaxed, Ordering::Relaxed).ok();
        self.recv_last_ns.store(now, Ordering::Relaxed);
        if self.lcg.next_f64() < self.sample_rate {
            let mut q = self.recv_quantiles.lock().unwrap();
            for est in q.iter_mut() {
                est.observe(duration_nanos as f64);
            }
        }
    }

    fn record_try_send(&self, ok: bool) {
        if ok {
            self.counters.try_send_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.try_send_fail.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_try_recv(&self, ok: bool) {
        if ok {
            self.counters.try_recv_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.try_recv_empty.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_drop(&self, kind: DropKind) {
        match kind {
            DropKind::Oldest => self.counters.dropped_oldest.fetch_add(1, Ordering::Relaxed),
            DropKind::Newest => self.counters.dropped_newest.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_wake(&self, woken: u64) {
        self.counters.wake_events.fetch_add(woken, Ordering::Relaxed);
    }

    fn record_close(&self) {
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
    }
}

fn splitmix_seed(id: &str) -> u64 {
    let mut h: u64 = 0x9E3779B97F4A7C15;
    for b in id.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0xBF58476D1CE4E5B9);
    }
    h | 1
}

type Registry = Mutex<HashMap<String, Weak<ActiveRecorder>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Builds a [`export::GlobalMetrics`] snapshot of every still-live
/// registered channel. Channels whose handles have all been dropped are
/// pruned from the registry as a side effect.
pub fn export_global() -> export::GlobalMetrics {
    let mut reg = registry().lock().unwrap();
    reg.retain(|_, weak| weak.strong_count() > 0);
    let channels = reg
        .iter()
        .filter_map(|(id, weak)| weak.upgrade().map(|rec| (id.clone(), rec.snapshot())))
        .collect();
    export::GlobalMetrics {
        timestamp_ns: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
        channels,
    }
}

/// Returns the zero-cost no-op recorder, used when a channel is constructed
/// without a `metrics_id`.
pub(crate) fn noop() -> Handle {
    Arc::new(NoopRecorder)
}

/// Returns an active recorder handle for `id` with the given sample rate.
/// Requires the `metrics` feature; without it, always returns the no-op
/// handle.
pub(crate) fn active_or_noop(id: Option<&str>, sample_rate: f64) -> Handle {
    match id {
        #[cfg(feature = "metrics")]
        Some(id) => ActiveRecorder::new(id.to_string(), sample_rate),
        _ => noop(),
    }
}
