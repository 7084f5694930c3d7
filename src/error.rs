//! Error taxonomy for the sink contract

use thiserror::Error;

use crate::format::FrameFormat;
use crate::frame::RawFrame;
use crate::sink::SinkState;

/// Errors reported by sink operations.
///
/// `InvalidState` and `ProtocolViolation` indicate caller bugs and are fatal
/// to the calling operation; `NoBufferAvailable` and `Overflow` are transient
/// backpressure the caller's own flow control is expected to retry around.
/// `FormatMismatch` and `Overflow` hand the rejected frame back inside the
/// error so the buffer is never orphaned: recover it with
/// [`SinkError::into_rejected`], or drop the error to return the slot to the
/// pool.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Operation invoked outside its legal lifecycle state
    #[error("{op} is not legal while the sink is {state}")]
    InvalidState {
        op: &'static str,
        state: SinkState,
    },

    /// Every pool slot is checked out or pending dispatch
    #[error("no frame buffer is currently available")]
    NoBufferAvailable,

    /// The operation was cancelled by an abort, or the dispatch path is gone
    #[error("streaming was aborted")]
    Aborted,

    /// The submitted frame's format tag disagrees with the negotiated format
    #[error("frame format {got} does not match the negotiated format {want}")]
    FormatMismatch {
        want: FrameFormat,
        got: FrameFormat,
        rejected: RawFrame,
    },

    /// The sink's outbound dispatch queue has no free slot
    #[error("sink dispatch queue is full")]
    Overflow { rejected: RawFrame },

    /// The checkout/submit discipline was broken by the caller
    #[error("buffer exchange protocol violated: {reason}")]
    ProtocolViolation { reason: &'static str },

    /// The sink's backing device or writer failed
    #[error("sink backend failure: {0}")]
    Backend(anyhow::Error),
}

impl SinkError {
    pub(crate) fn invalid_state(op: &'static str, state: SinkState) -> Self {
        SinkError::InvalidState { op, state }
    }

    pub(crate) fn protocol(reason: &'static str) -> Self {
        SinkError::ProtocolViolation { reason }
    }

    /// Whether this error is expected transient backpressure
    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            SinkError::NoBufferAvailable | SinkError::Overflow { .. }
        )
    }

    /// Recover the frame a failed `send` handed back, if any.
    ///
    /// Returns `Some` for `FormatMismatch` and `Overflow`; the frame is still
    /// checked out and may be resubmitted or dropped to discard it.
    pub fn into_rejected(self) -> Option<RawFrame> {
        match self {
            SinkError::FormatMismatch { rejected, .. } => Some(rejected),
            SinkError::Overflow { rejected } => Some(rejected),
            _ => None,
        }
    }
}
