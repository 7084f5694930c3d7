//! Shared sink core: lifecycle enforcement plus pool traffic
//!
//! Every sink variant delegates to [`SinkCore`], so the legality rules of
//! the streaming lifecycle live in exactly one place and cannot drift apart
//! between the gadget, movie, display and null implementations.

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;
use crate::format::FrameFormat;
use crate::frame::{DispatchedFrame, RawFrame, Timestamp};
use crate::pool::{CheckoutPolicy, PoolOptions, PoolShared, SlotStatus, SlotToken};
use crate::sink::state::SinkState;
use crate::stats::SinkStats;

/// Lifecycle, format and buffer-pool state shared by a sink, its
/// outstanding frames, and its backend completions.
///
/// Clones share the same underlying sink; this is how an abort can be
/// raced against a blocked checkout from another task.
#[derive(Clone)]
pub struct SinkCore {
    shared: Arc<PoolShared>,
}

impl SinkCore {
    /// Create a core with the given pool configuration
    pub fn new(name: &'static str, opts: PoolOptions) -> Self {
        Self {
            shared: Arc::new(PoolShared::new(name, opts)),
        }
    }

    /// Sink name used in logs
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> SinkState {
        self.shared.lock().state
    }

    /// Negotiated format, if one has been set
    pub fn format(&self) -> Option<FrameFormat> {
        self.shared.lock().format
    }

    /// Activity counters
    pub fn stats(&self) -> &SinkStats {
        &self.shared.stats
    }

    /// Record the negotiated format and size the buffer pool for it.
    ///
    /// Legal in `Idle` and `Configured`; renegotiating after streaming
    /// requires `stream_off` first.
    pub fn set_format(&self, format: FrameFormat) -> Result<(), SinkError> {
        let mut inner = self.shared.lock();
        if !inner.state.can_transition_to(SinkState::Configured) {
            return Err(SinkError::invalid_state("set_format", inner.state));
        }
        inner.format = Some(format);
        PoolShared::rebuild_slots(&mut inner, self.shared.opts.capacity);
        inner.state = SinkState::Configured;
        drop(inner);
        debug!("{}: format set to {}", self.shared.name, format);
        Ok(())
    }

    /// Enter `Streaming`, starting a fresh session.
    ///
    /// Returns `false` as a no-op when already streaming; the sinks rely on
    /// this to avoid spawning a second dispatch task.
    pub fn stream_on(&self) -> Result<bool, SinkError> {
        let mut inner = self.shared.lock();
        if inner.state == SinkState::Streaming {
            return Ok(false);
        }
        if !inner.state.can_transition_to(SinkState::Streaming) {
            return Err(SinkError::invalid_state("stream_on", inner.state));
        }
        inner.state = SinkState::Streaming;
        inner.session = CancellationToken::new();
        inner.epoch = Instant::now();
        inner.next_seq = 0;
        let format = inner.format;
        drop(inner);
        if let Some(format) = format {
            info!("{}: streaming on ({})", self.shared.name, format);
        }
        Ok(true)
    }

    /// Check out a writable frame buffer.
    ///
    /// With `CheckoutPolicy::Block` the call suspends until a slot frees up
    /// or the stream is aborted; with `CheckoutPolicy::Fail` pool exhaustion
    /// returns `NoBufferAvailable` immediately.
    pub async fn checkout(&self) -> Result<RawFrame, SinkError> {
        loop {
            // Created before the slot check so a completion arriving between
            // unlock and await leaves a stored wakeup instead of being lost.
            let wait = self.shared.free_slots.notified();

            let session = {
                let mut inner = self.shared.lock();
                match inner.state {
                    SinkState::Streaming => {}
                    SinkState::Aborting => return Err(SinkError::Aborted),
                    state => return Err(SinkError::invalid_state("get", state)),
                }
                if self.shared.opts.strict_alternation && inner.outstanding > 0 {
                    return Err(SinkError::protocol(
                        "checkout while a previous frame is still checked out",
                    ));
                }
                let format = match inner.format {
                    Some(format) => format,
                    None => return Err(SinkError::protocol("streaming without a negotiated format")),
                };

                if let Some(index) = inner
                    .slots
                    .iter()
                    .position(|slot| slot.status == SlotStatus::Free)
                {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    let timestamp = Timestamp::from_duration(inner.epoch.elapsed());
                    let memory = match inner.slots[index].memory.take() {
                        Some(mut memory) => {
                            memory.clear();
                            memory
                        }
                        None => BytesMut::with_capacity(format.frame_bytes()),
                    };
                    inner.slots[index].status = SlotStatus::CheckedOut;
                    inner.outstanding += 1;
                    let token = SlotToken {
                        index,
                        generation: inner.generation,
                    };
                    return Ok(RawFrame::checked_out(
                        Arc::clone(&self.shared),
                        token,
                        memory,
                        format,
                        seq,
                        timestamp,
                    ));
                }

                if self.shared.opts.checkout == CheckoutPolicy::Fail {
                    return Err(SinkError::NoBufferAvailable);
                }
                inner.session.clone()
            };

            self.shared.stats.record_checkout_wait();
            tokio::select! {
                _ = wait => {}
                _ = session.cancelled() => return Err(SinkError::Aborted),
            }
        }
    }

    /// Submit a filled frame for dispatch, transferring ownership to the
    /// sink.
    ///
    /// The returned [`DispatchedFrame`] is what the sink forwards to its
    /// backing device; completing (or dropping) it frees the slot.
    pub fn submit(&self, frame: RawFrame) -> Result<DispatchedFrame, SinkError> {
        let mut inner = self.shared.lock();
        match inner.state {
            SinkState::Streaming => {}
            SinkState::Aborting => return Err(SinkError::Aborted),
            state => return Err(SinkError::invalid_state("send", state)),
        }
        let want = match inner.format {
            Some(format) => format,
            None => return Err(SinkError::protocol("streaming without a negotiated format")),
        };
        if frame.format() != want {
            // Hand the frame back untouched; it stays checked out.
            return Err(SinkError::FormatMismatch {
                want,
                got: frame.format(),
                rejected: frame,
            });
        }

        let (token, data, format, seq, timestamp) = frame.into_parts();
        let token = match token {
            Some(token) => token,
            None => return Err(SinkError::protocol("frame was already submitted")),
        };
        if token.generation != inner.generation {
            return Err(SinkError::protocol("frame belongs to a previous session"));
        }
        if inner.slots[token.index].status != SlotStatus::CheckedOut {
            return Err(SinkError::protocol(
                "submitted frame's slot is not checked out",
            ));
        }

        inner.slots[token.index].status = SlotStatus::PendingDispatch;
        inner.outstanding -= 1;
        drop(inner);

        self.shared.stats.record_submit(data.len());
        Ok(DispatchedFrame::pending(
            Arc::clone(&self.shared),
            token,
            data,
            format,
            seq,
            timestamp,
        ))
    }

    /// Take a just-dispatched frame back as a checked-out one.
    ///
    /// Used by sinks whose dispatch queue turned out to be full, so `send`
    /// can hand the frame back inside `Overflow` instead of dropping it.
    /// Returns `None` if an abort invalidated the frame in the meantime.
    pub fn reclaim(&self, frame: DispatchedFrame) -> Option<RawFrame> {
        let (token, data, format, seq, timestamp) = frame.into_parts();
        let token = token?;
        let mut inner = self.shared.lock();
        if token.generation != inner.generation
            || inner.slots[token.index].status != SlotStatus::PendingDispatch
        {
            return None;
        }
        inner.slots[token.index].status = SlotStatus::CheckedOut;
        inner.outstanding += 1;
        Some(RawFrame::checked_out(
            Arc::clone(&self.shared),
            token,
            data,
            format,
            seq,
            timestamp,
        ))
    }

    /// Cancel in-flight and future `get`/`send` calls.
    ///
    /// Wakes a blocked checkout exactly once with `Aborted` and invalidates
    /// every outstanding frame; the underlying device keeps running until
    /// `stream_off`. Idempotent while already aborting.
    pub fn abort(&self) -> Result<(), SinkError> {
        let session = {
            let mut inner = self.shared.lock();
            if inner.state == SinkState::Aborting {
                return Ok(());
            }
            if !inner.state.can_transition_to(SinkState::Aborting) {
                return Err(SinkError::invalid_state("abort_stream", inner.state));
            }
            inner.state = SinkState::Aborting;
            // Fence: anything issued before this point can no longer touch a
            // slot, even if its completion arrives much later.
            inner.generation += 1;
            inner.outstanding = 0;
            for slot in &mut inner.slots {
                slot.status = SlotStatus::Free;
            }
            inner.session.clone()
        };
        session.cancel();
        self.shared.stats.record_abort();
        warn!("{}: streaming aborted", self.shared.name);
        Ok(())
    }

    /// Stop the sink and return to `Idle`, releasing pool memory.
    ///
    /// Legal from any state and idempotent. All outstanding buffer
    /// ownership is invalidated; a new `set_format` is required before the
    /// next `stream_on`.
    pub fn stream_off(&self) -> Result<(), SinkError> {
        let session = {
            let mut inner = self.shared.lock();
            if inner.state == SinkState::Idle {
                return Ok(());
            }
            inner.state = SinkState::Idle;
            inner.generation += 1;
            inner.outstanding = 0;
            inner.slots.clear();
            inner.session.clone()
        };
        session.cancel();
        info!("{}: streaming off", self.shared.name);
        Ok(())
    }
}
