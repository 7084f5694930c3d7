//! Video output sinks
//!
//! Every sink variant (USB gadget, movie writer, local display, discard)
//! implements the same [`VideoSink`] contract, so the pipeline driver can
//! stream to any of them through one interface:
//!
//! - `set_format` negotiates the frame format, then `stream_on` starts the
//!   session
//! - the steady state is the checkout/submit cycle: `get` a writable
//!   buffer, fill the pixels, `send` it back for dispatch
//! - `abort_stream` cancels a blocked `get` mid-flight; `stream_off` tears
//!   the session down and returns the sink to idle
//!
//! Lifecycle legality and buffer-pool bookkeeping are shared through
//! [`SinkCore`]; the variants differ only in where submitted frames go.

mod core;
mod display;
mod gadget;
mod movie;
mod null;
mod state;

pub use self::core::SinkCore;
pub use display::{DisplaySink, DisplaySurface};
pub use gadget::GadgetSink;
pub use movie::{FrameRecorder, MovieSink};
pub use null::NullSink;
pub use state::SinkState;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::format::FrameFormat;
use crate::frame::RawFrame;

/// The uniform operation set every video sink supports.
///
/// All methods take `&self` so a sink can be shared behind an
/// `Arc<dyn VideoSink>` and `abort_stream` can race a blocked [`get`](Self::get)
/// from another task.
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Sink name used in logs
    fn name(&self) -> &'static str;

    /// Current lifecycle state
    fn state(&self) -> SinkState;

    /// Negotiated format, if one has been set
    fn format(&self) -> Option<FrameFormat>;

    /// Declare the frame format and rate for the next session.
    ///
    /// For sinks whose format is dictated externally (the USB gadget's is
    /// chosen by the host) this simply records the already-decided value.
    fn set_format(&self, format: FrameFormat) -> Result<(), SinkError>;

    /// Start streaming; legal once configured, a no-op when already
    /// streaming
    fn stream_on(&self) -> Result<(), SinkError>;

    /// Check out a writable frame buffer to fill with pixel data.
    ///
    /// Exactly one `send` (or a drop, to discard) must balance each
    /// successful `get`. Whether pool exhaustion blocks or fails
    /// immediately is a per-sink policy.
    async fn get(&self) -> Result<RawFrame, SinkError>;

    /// Hand a filled frame to the sink for dispatch. Never blocks; a full
    /// dispatch queue is reported as `Overflow` with the frame handed back.
    fn send(&self, frame: RawFrame) -> Result<(), SinkError>;

    /// Cancel in-flight and future `get`/`send` calls without stopping the
    /// underlying device; follow with `stream_off`
    fn abort_stream(&self) -> Result<(), SinkError>;

    /// Stop the sink and return to idle; legal from any state, idempotent
    async fn stream_off(&self) -> Result<(), SinkError>;
}
