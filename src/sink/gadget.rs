//! USB video-class gadget sink
//!
//! Frames submitted here are queued for USB transfer to the host. The
//! transfer machinery itself (endpoint I/O, UVC request handling) lives on
//! the other side of a bounded transport channel handed out at construction:
//! the driver side pulls each [`DispatchedFrame`], performs the transfer,
//! and drops the frame when the hardware is done with its memory; that
//! drop is the completion that returns the buffer to the pool.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SinkError;
use crate::format::FrameFormat;
use crate::frame::{DispatchedFrame, RawFrame};
use crate::pool::PoolOptions;
use crate::sink::core::SinkCore;
use crate::sink::state::SinkState;
use crate::sink::VideoSink;
use crate::stats::SinkStats;

/// Sink that feeds a USB video-class gadget endpoint.
pub struct GadgetSink {
    core: SinkCore,
    transport: mpsc::Sender<DispatchedFrame>,
}

impl GadgetSink {
    /// Create the sink together with the transport side of its queue.
    ///
    /// The receiver outlives individual streaming sessions; frames still
    /// queued when a session ends are already fenced off and recycle
    /// nothing when the driver side drops them.
    pub fn new() -> (Self, mpsc::Receiver<DispatchedFrame>) {
        Self::with_options(PoolOptions::default())
    }

    pub fn with_options(opts: PoolOptions) -> (Self, mpsc::Receiver<DispatchedFrame>) {
        let (transport, rx) = mpsc::channel(opts.dispatch_depth.max(1));
        (
            Self {
                core: SinkCore::new("GadgetSink", opts),
                transport,
            },
            rx,
        )
    }

    /// Activity counters
    pub fn stats(&self) -> &SinkStats {
        self.core.stats()
    }
}

#[async_trait]
impl VideoSink for GadgetSink {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn state(&self) -> SinkState {
        self.core.state()
    }

    fn format(&self) -> Option<FrameFormat> {
        self.core.format()
    }

    /// Record the format the host negotiated over UVC.
    ///
    /// The gadget cannot choose its own format (the host's SET_FORMAT
    /// decides), so this never fails for the value itself; it only enforces
    /// that negotiation happens before streaming.
    fn set_format(&self, format: FrameFormat) -> Result<(), SinkError> {
        self.core.set_format(format)
    }

    fn stream_on(&self) -> Result<(), SinkError> {
        self.core.stream_on().map(|_| ())
    }

    async fn get(&self) -> Result<RawFrame, SinkError> {
        self.core.checkout().await
    }

    fn send(&self, frame: RawFrame) -> Result<(), SinkError> {
        let dispatched = self.core.submit(frame)?;
        match self.transport.try_send(dispatched) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => match self.core.reclaim(frame) {
                Some(rejected) => Err(SinkError::Overflow { rejected }),
                None => Err(SinkError::Aborted),
            },
            Err(TrySendError::Closed(_)) => Err(SinkError::Aborted),
        }
    }

    fn abort_stream(&self) -> Result<(), SinkError> {
        self.core.abort()
    }

    async fn stream_off(&self) -> Result<(), SinkError> {
        // The transport channel stays open: the driver side owns the
        // device across sessions
        self.core.stream_off()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::pool::CheckoutPolicy;

    fn host_fmt() -> FrameFormat {
        FrameFormat::new(640, 480, PixelFormat::Yuyv, 30)
    }

    #[tokio::test]
    async fn test_transport_receives_frames_in_order() {
        let (sink, mut transport) = GadgetSink::new();
        sink.set_format(host_fmt()).unwrap();
        sink.stream_on().unwrap();

        for i in 0..2u8 {
            let mut frame = sink.get().await.unwrap();
            frame.data_mut().extend_from_slice(&[i; 8]);
            sink.send(frame).unwrap();
        }

        let first = transport.recv().await.unwrap();
        assert_eq!(first.seq(), 0);
        assert_eq!(first.data(), &[0; 8]);
        let second = transport.recv().await.unwrap();
        assert_eq!(second.seq(), 1);
        assert_eq!(second.data(), &[1; 8]);
    }

    #[tokio::test]
    async fn test_transfer_completion_frees_slot() {
        let (sink, mut transport) = GadgetSink::with_options(PoolOptions {
            capacity: 1,
            checkout: CheckoutPolicy::Fail,
            ..Default::default()
        });
        sink.set_format(host_fmt()).unwrap();
        sink.stream_on().unwrap();

        sink.send(sink.get().await.unwrap()).unwrap();
        assert!(matches!(
            sink.get().await,
            Err(SinkError::NoBufferAvailable)
        ));

        // Transfer complete: the driver side drops the frame
        let in_flight = transport.recv().await.unwrap();
        drop(in_flight);
        assert!(sink.get().await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_full_is_overflow() {
        let (sink, transport) = GadgetSink::with_options(PoolOptions {
            capacity: 3,
            checkout: CheckoutPolicy::Fail,
            dispatch_depth: 1,
            ..Default::default()
        });
        sink.set_format(host_fmt()).unwrap();
        sink.stream_on().unwrap();

        // Nobody consumes the transport: the single queue slot fills and
        // the next submit overflows
        sink.send(sink.get().await.unwrap()).unwrap();
        let frame = sink.get().await.unwrap();
        let err = sink.send(frame).unwrap_err();
        assert!(matches!(err, SinkError::Overflow { .. }));
        assert!(err.is_backpressure());

        drop(transport);
    }

    #[tokio::test]
    async fn test_closed_transport_surfaces_as_aborted() {
        let (sink, transport) = GadgetSink::new();
        sink.set_format(host_fmt()).unwrap();
        sink.stream_on().unwrap();
        drop(transport);

        let frame = sink.get().await.unwrap();
        assert!(matches!(sink.send(frame), Err(SinkError::Aborted)));
    }

    #[tokio::test]
    async fn test_stale_queued_frame_after_restream() {
        let (sink, mut transport) = GadgetSink::with_options(PoolOptions {
            capacity: 1,
            checkout: CheckoutPolicy::Fail,
            ..Default::default()
        });
        sink.set_format(host_fmt()).unwrap();
        sink.stream_on().unwrap();
        sink.send(sink.get().await.unwrap()).unwrap();

        // Session ends with the frame still queued for transfer
        sink.stream_off().await.unwrap();
        sink.set_format(host_fmt()).unwrap();
        sink.stream_on().unwrap();
        let current = sink.get().await.unwrap();

        // The old transfer completing must not free the new session's slot
        let stale = transport.recv().await.unwrap();
        drop(stale);
        assert!(matches!(
            sink.get().await,
            Err(SinkError::NoBufferAvailable)
        ));
        assert_eq!(sink.stats().stale_completions(), 1);

        drop(current);
    }
}
