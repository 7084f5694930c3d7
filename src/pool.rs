//! Fixed pool of frame-buffer slots shared by producer and backend
//!
//! Frame buffers are large contiguous allocations, so they are pooled and
//! recycled rather than allocated per frame. The pool keeps a small fixed
//! table of slots (frequently just two, for double-buffering); each slot is
//! `Free`, `CheckedOut` to the producer, or `PendingDispatch` to the sink's
//! backend.
//!
//! # Invariants
//!
//! 1. A slot's memory is owned by exactly one party at a time: the pool
//!    (`Free`), the producer's [`RawFrame`](crate::frame::RawFrame)
//!    (`CheckedOut`), or the backend's
//!    [`DispatchedFrame`](crate::frame::DispatchedFrame) (`PendingDispatch`).
//! 2. The number of checked-out slots never exceeds the pool capacity;
//!    exhaustion is reported as backpressure, never silently dropped.
//! 3. Every slot transition happens under the single pool mutex, so the
//!    producer's checkout/submit and the backend's asynchronous completions
//!    can never race a slot into two owners.
//! 4. Slot hand-offs are fenced by a generation counter. Aborting or
//!    stopping the stream bumps the generation, so a completion (or discard)
//!    issued against an older session can never free a slot that has since
//!    been handed to someone else.
//!
//! Memory moves in and out of slots without copying: checkout takes the
//! `BytesMut` block out of the slot, completion moves it back with its
//! allocation intact. Steady-state streaming does not allocate.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use bytes::BytesMut;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::format::FrameFormat;
use crate::sink::SinkState;
use crate::stats::SinkStats;

/// Checkout behavior when no slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPolicy {
    /// Suspend the caller until a slot frees up or the stream is aborted
    Block,
    /// Fail immediately with `NoBufferAvailable`
    Fail,
}

/// Buffer pool configuration
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of buffer slots; clamped to at least 1
    pub capacity: usize,
    /// What `get` does when every slot is taken
    pub checkout: CheckoutPolicy,
    /// Depth of the outbound queue between `send` and the backing device;
    /// submitting into a full queue is reported as `Overflow`
    pub dispatch_depth: usize,
    /// Require one submit between checkouts; a second concurrent checkout
    /// fails with `ProtocolViolation`. For devices that support a single
    /// in-flight frame.
    pub strict_alternation: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            capacity: 2, // double-buffering
            checkout: CheckoutPolicy::Block,
            dispatch_depth: 2,
            strict_alternation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotStatus {
    Free,
    CheckedOut,
    PendingDispatch,
}

pub(crate) struct Slot {
    pub(crate) status: SlotStatus,
    /// Present while the pool owns the memory; taken by checkout, returned
    /// by completion or discard. `None` on a `Free` slot means the next
    /// checkout allocates.
    pub(crate) memory: Option<BytesMut>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            status: SlotStatus::Free,
            memory: None,
        }
    }
}

/// Identity of one slot hand-off: index plus the session generation it was
/// issued under. A token from a bumped generation matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotToken {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

pub(crate) struct PoolInner {
    pub(crate) state: SinkState,
    pub(crate) format: Option<FrameFormat>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) generation: u64,
    pub(crate) outstanding: usize,
    pub(crate) next_seq: u64,
    pub(crate) session: CancellationToken,
    pub(crate) epoch: Instant,
}

/// State shared between a sink, its outstanding frames, and its backend
/// completions.
pub(crate) struct PoolShared {
    pub(crate) name: &'static str,
    pub(crate) opts: PoolOptions,
    pub(crate) inner: Mutex<PoolInner>,
    /// Wakes the producer blocked in checkout when a slot frees up
    pub(crate) free_slots: Notify,
    pub(crate) stats: SinkStats,
}

impl PoolShared {
    pub(crate) fn new(name: &'static str, mut opts: PoolOptions) -> Self {
        opts.capacity = opts.capacity.max(1);
        Self {
            name,
            opts,
            inner: Mutex::new(PoolInner {
                state: SinkState::Idle,
                format: None,
                slots: Vec::new(),
                generation: 0,
                outstanding: 0,
                next_seq: 0,
                session: CancellationToken::new(),
                epoch: Instant::now(),
            }),
            free_slots: Notify::new(),
            stats: SinkStats::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap()
    }

    /// (Re)build the slot table for a newly negotiated format.
    pub(crate) fn rebuild_slots(inner: &mut PoolInner, capacity: usize) {
        inner.slots = (0..capacity).map(|_| Slot::empty()).collect();
        inner.outstanding = 0;
    }

    /// Return a checked-out slot without a submit. Called when the producer
    /// drops a `RawFrame` it never sent; a stale token is ignored.
    pub(crate) fn cancel_checkout(&self, token: SlotToken, memory: BytesMut) {
        let mut inner = self.lock();
        if token.generation != inner.generation {
            return;
        }
        let slot = &mut inner.slots[token.index];
        if slot.status != SlotStatus::CheckedOut {
            return;
        }
        slot.memory = Some(memory);
        slot.status = SlotStatus::Free;
        inner.outstanding -= 1;
        drop(inner);
        self.stats.record_discard();
        self.free_slots.notify_one();
    }

    /// Completion path: the backend is done with a dispatched frame and its
    /// memory becomes reusable. A stale token (the session was aborted or
    /// stopped since dispatch) must not resurrect the slot; the late memory
    /// is simply discarded.
    pub(crate) fn recycle(&self, token: SlotToken, memory: BytesMut) {
        let mut inner = self.lock();
        if token.generation != inner.generation
            || inner.slots[token.index].status != SlotStatus::PendingDispatch
        {
            drop(inner);
            self.stats.record_stale_completion();
            return;
        }
        let slot = &mut inner.slots[token.index];
        slot.memory = Some(memory);
        slot.status = SlotStatus::Free;
        drop(inner);
        self.free_slots.notify_one();
    }
}
