//! Frame types moving through the checkout/submit cycle

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::format::FrameFormat;
use crate::pool::{PoolShared, SlotToken};

/// Capture timestamp of a frame, in microseconds since the stream started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub micros: i64,
}

impl Timestamp {
    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a timestamp from a duration since stream start
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    /// Create a timestamp from an instant relative to a base
    pub fn from_instant(instant: Instant, base: Instant) -> Self {
        Self::from_duration(instant.saturating_duration_since(base))
    }

    /// Convert to a duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros as u64)
    }

    /// Absolute difference between two timestamps
    pub fn diff(&self, other: Timestamp) -> Duration {
        Duration::from_micros((self.micros - other.micros).unsigned_abs())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// A writable frame buffer checked out of a sink's pool.
///
/// The producer exclusively owns the buffer between `get` and `send`; the
/// pool slot it came from stays reserved the whole time. Submitting the
/// frame transfers ownership to the sink. Dropping it instead is the
/// explicit-discard path: the slot returns to the pool unused.
pub struct RawFrame {
    pool: Arc<PoolShared>,
    /// `None` once the frame has been submitted (ownership moved on)
    token: Option<SlotToken>,
    data: BytesMut,
    format: FrameFormat,
    seq: u64,
    timestamp: Timestamp,
}

impl RawFrame {
    pub(crate) fn checked_out(
        pool: Arc<PoolShared>,
        token: SlotToken,
        data: BytesMut,
        format: FrameFormat,
        seq: u64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            pool,
            token: Some(token),
            data,
            format,
            seq,
            timestamp,
        }
    }

    /// Pixel data written so far
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Writable pixel memory; pre-reserved for one full frame of the
    /// negotiated format
    pub fn data_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    /// Declared format of the pixel data
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Re-tag the declared format. Normally left as negotiated; a frame
    /// submitted with a differing tag is rejected with `FormatMismatch`.
    pub fn set_format(&mut self, format: FrameFormat) {
        self.format = format;
    }

    /// Sequence number assigned at checkout, starting at 0 per session
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Capture timestamp assigned at checkout
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Tear the frame apart for submission, disarming the discard-on-drop
    /// path.
    pub(crate) fn into_parts(mut self) -> (Option<SlotToken>, BytesMut, FrameFormat, u64, Timestamp) {
        let token = self.token.take();
        let data = std::mem::take(&mut self.data);
        (token, data, self.format, self.seq, self.timestamp)
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.pool
                .cancel_checkout(token, std::mem::take(&mut self.data));
        }
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("format", &self.format)
            .field("seq", &self.seq)
            .field("timestamp", &self.timestamp)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A filled frame owned by the sink, travelling to its backing device.
///
/// The backend reads the pixels, then calls [`complete`](Self::complete) (or
/// simply drops the frame) to hand the memory back to the pool. A frame that
/// outlives its session (the stream was aborted or stopped after dispatch)
/// completes into nothing: the generation fence keeps it from touching a
/// slot that has since been reissued.
pub struct DispatchedFrame {
    pool: Arc<PoolShared>,
    token: Option<SlotToken>,
    data: BytesMut,
    format: FrameFormat,
    seq: u64,
    timestamp: Timestamp,
}

impl DispatchedFrame {
    pub(crate) fn pending(
        pool: Arc<PoolShared>,
        token: SlotToken,
        data: BytesMut,
        format: FrameFormat,
        seq: u64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            pool,
            token: Some(token),
            data,
            format,
            seq,
            timestamp,
        }
    }

    /// Pixel data to dispatch
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Signal that the backing device is done with this frame's memory.
    ///
    /// Dropping the frame does the same; this name exists for call sites
    /// where the hand-back is the point.
    pub fn complete(self) {}

    pub(crate) fn into_parts(mut self) -> (Option<SlotToken>, BytesMut, FrameFormat, u64, Timestamp) {
        let token = self.token.take();
        let data = std::mem::take(&mut self.data);
        (token, data, self.format, self.seq, self.timestamp)
    }
}

impl Drop for DispatchedFrame {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.pool.recycle(token, std::mem::take(&mut self.data));
        }
    }
}

impl std::fmt::Debug for DispatchedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchedFrame")
            .field("format", &self.format)
            .field("seq", &self.seq)
            .field("timestamp", &self.timestamp)
            .field("len", &self.data.len())
            .finish()
    }
}
