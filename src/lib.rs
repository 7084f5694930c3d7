//! Video output abstraction for camera frame pipelines
//!
//! A capture pipeline produces processed frames at its own cadence; this
//! crate delivers them to whichever output is attached (a USB video-class
//! gadget, a movie file, a local display, or nothing at all) through one
//! contract, separating concerns between:
//! - Lifecycle: the Idle → Configured → Streaming → Aborting state machine
//!   every sink shares
//! - Buffer exchange: zero-copy checkout/submit of pooled frame buffers,
//!   with bounded backpressure
//! - Dispatch: per-sink backends reached over channels and narrow traits
//!
//! # Architecture
//!
//! The producer negotiates a format once, turns streaming on, then loops
//! `get` → fill pixels → `send`. Buffers come from a small fixed pool
//! (double-buffering by default) and are recycled without reallocating;
//! when the pool is exhausted the producer either waits or backs off,
//! per-sink policy. `abort_stream` cancels a blocked `get` mid-flight from
//! another task, and `stream_off` returns the sink to idle, ready to be
//! reconfigured and restreamed.
//!
//! ```no_run
//! use framesink::{FrameFormat, NullSink, PixelFormat, VideoSink};
//!
//! # async fn run() -> Result<(), framesink::SinkError> {
//! let sink = NullSink::new();
//! sink.set_format(FrameFormat::new(640, 480, PixelFormat::Yuyv, 30))?;
//! sink.stream_on()?;
//!
//! let mut frame = sink.get().await?;
//! let frame_bytes = frame.format().frame_bytes();
//! frame.data_mut().resize(frame_bytes, 0);
//! sink.send(frame)?;
//!
//! sink.stream_off().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;
pub mod frame;
pub mod pool;
pub mod sink;
pub mod stats;

pub use error::SinkError;
pub use format::{FrameFormat, PixelFormat};
pub use frame::{DispatchedFrame, RawFrame, Timestamp};
pub use pool::{CheckoutPolicy, PoolOptions};
pub use sink::{
    DisplaySink, DisplaySurface, FrameRecorder, GadgetSink, MovieSink, NullSink, SinkCore,
    SinkState, VideoSink,
};
pub use stats::{SinkStats, StatsSummary};
