//! Queue backends shared by the MPSC and MPMC kernels: a fixed-capacity
//! ring (used for `bounded`, the `sliding-oldest`/`sliding-newest` drop
//! policies, and `latest-only`, which are all the same ring under different
//! overflow rules -- see the GLOSSARY) and a segmented unbounded buffer.

use std::collections::VecDeque;

use crate::util::DropPolicy;

/// Outcome of pushing into a [`Ring`] under its configured drop policy.
pub enum PushOutcome<T> {
    /// The value was stored; nothing was evicted.
    Stored,
    /// The value was stored after evicting the oldest buffered value
    /// (`DropPolicy::Oldest`).
    StoredEvictedOldest(T),
    /// The incoming value was rejected and is handed back
    /// (`DropPolicy::Newest` / `DropPolicy::LatestOnly` when occupied).
    Rejected(T),
    /// The ring is full and the policy is `Block`; the caller must suspend.
    WouldBlock(T),
}

/// A fixed-capacity ring buffer. `capacity == 0` is a valid, always-full
/// ring used by MPSC/MPMC's rendezvous mode -- pushes into it always report
/// `WouldBlock` (or the appropriate drop outcome), which is exactly the
/// "no room, ever, unless handed off directly" behavior rendezvous needs.
#[derive(Debug)]
pub struct Ring<T> {
    buf: VecDeque<T>,
    capacity: usize,
    policy: DropPolicy,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self { buf: VecDeque::with_capacity(capacity.min(4096)), capacity, policy }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.buf.len() < self.capacity
    }

    /// Pushes `v` according to the ring's drop policy.
    pub fn push(&mut self, v: T) -> PushOutcome<T> {
        if self.buf.len() < self.capacity {
            self.buf.push_back(v);
            return PushOutcome::Stored;
        }

        match self.policy {
            DropPolicy::Block => PushOutcome::WouldBlock(v),
            DropPolicy::Oldest => {
                let evicted = self.buf.pop_front();
                self.buf.push_back(v);
                match evicted {
                    Some(ev) => PushOutcome::StoredEvictedOldest(ev),
                    None => PushOutcome::Stored,
                }
            }
            DropPolicy::Newest => PushOutcome::Rejected(v),
            DropPolicy::LatestOnly => {
                // capacity is always 1 for latest-only rings; replace in place.
                let evicted = self.buf.pop_front();
                self.buf.push_back(v);
                match evicted {
                    Some(ev) => PushOutcome::StoredEvictedOldest(ev),
                    None => PushOutcome::Stored,
                }
            }
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.buf.pop_front()
    }

    /// Inserts `v` directly, bypassing the capacity check. Used only for a
    /// rendezvous hand-off on a capacity-0 ring, where the caller has
    /// already verified a receiver is waiting to pop it immediately --
    /// `push` itself would always report `WouldBlock` on such a ring.
    pub fn force_push(&mut self, v: T) {
        self.buf.push_back(v);
    }
}

/// Default chunk size for [`Chunked`].
pub const CHUNK_SIZE: usize = 128;

/// An unbounded, segmented FIFO: a `VecDeque` of fixed-size chunk deques.
/// This amortizes allocation the way a linked list of arrays would, without
/// requiring unsafe intrusive pointers: push/pop only touch the head/tail
/// chunk and are O(1) amortized.
#[derive(Debug)]
pub struct Chunked<T> {
    chunks: VecDeque<VecDeque<T>>,
    chunk_size: usize,
    len: usize,
}

impl<T> Chunked<T> {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunks: VecDeque::new(), chunk_size: chunk_size.max(1), len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, v: T) {
        if self.chunks.back().map_or(true, |c| c.len() >= self.chunk_size) {
            self.chunks.push_back(VecDeque::with_capacity(self.chunk_size));
        }
        self.chunks.back_mut().unwrap().push_back(v);
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        loop {
            let chunk = self.chunks.front_mut()?;
            if let Some(v) = chunk.pop_front() {
                if chunk.is_empty() {
                    self.chunks.pop_front();
                }
                self.len -= 1;
                return Some(v);
            }
            self.chunks.pop_front();
        }
    }
}

/// A plain growable-array unbounded buffer, selected by `unbounded({chunked:
/// false})`.
#[derive(Debug, Default)]
pub struct Growable<T> {
    buf: VecDeque<T>,
}

impl<T> Growable<T> {
    pub fn new() -> Self {
        Self { buf: VecDeque::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, v: T) {
        self.buf.push_back(v);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.buf.pop_front()
    }
}

/// The backing storage an unbounded MPSC/MPMC kernel selects between.
#[derive(Debug)]
pub enum Unbounded<T> {
    Chunked(Chunked<T>),
    Growable(Growable<T>),
}

impl<T> Unbounded<T> {
    pub fn new(chunked: bool) -> Self {
        if chunked {
            Unbounded::Chunked(Chunked::new(CHUNK_SIZE))
        } else {
            Unbounded::Growable(Growable::new())
        }
    }

    pub fn push(&mut self, v: T) {
        match self {
            Unbounded::Chunked(c) => c.push(v),
            Unbounded::Growable(g) => g.push(v),
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        match self {
            Unbounded::Chunked(c) => c.pop(),
            Unbounded::Growable(g) => g.pop(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Unbounded::Chunked(c) => c.len(),
            Unbounded::Growable(g) => g.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
