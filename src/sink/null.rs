//! Discard sink

use async_trait::async_trait;

use crate::error::SinkError;
use crate::format::FrameFormat;
use crate::frame::RawFrame;
use crate::pool::PoolOptions;
use crate::sink::core::SinkCore;
use crate::sink::state::SinkState;
use crate::sink::VideoSink;
use crate::stats::SinkStats;

/// Sink that throws every frame away.
///
/// Dispatch completes synchronously inside `send`, so the slot a frame
/// occupied is free again by the time `send` returns and checkout never has
/// to wait in the steady state. Useful when the pipeline runs headless, and
/// as the reference implementation of the buffer-exchange protocol.
pub struct NullSink {
    core: SinkCore,
}

impl NullSink {
    pub fn new() -> Self {
        Self::with_options(PoolOptions::default())
    }

    pub fn with_options(opts: PoolOptions) -> Self {
        Self {
            core: SinkCore::new("NullSink", opts),
        }
    }

    /// Activity counters
    pub fn stats(&self) -> &SinkStats {
        self.core.stats()
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSink for NullSink {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn state(&self) -> SinkState {
        self.core.state()
    }

    fn format(&self) -> Option<FrameFormat> {
        self.core.format()
    }

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
        // Discarding is consumption: complete immediately
        self.core.submit(frame)?.complete();
        Ok(())
    }

    fn abort_stream(&self) -> Result<(), SinkError> {
        self.core.abort()
    }

    async fn stream_off(&self) -> Result<(), SinkError> {
        self.core.stream_off()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::pool::CheckoutPolicy;

    fn fmt() -> FrameFormat {
        FrameFormat::new(320, 240, PixelFormat::Gray8, 15)
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let sink = NullSink::new();
        assert_eq!(sink.state(), SinkState::Idle);

        sink.set_format(fmt()).unwrap();
        assert_eq!(sink.state(), SinkState::Configured);
        assert_eq!(sink.format(), Some(fmt()));

        sink.stream_on().unwrap();
        assert_eq!(sink.state(), SinkState::Streaming);

        for i in 0..10u8 {
            let mut frame = sink.get().await.unwrap();
            frame.data_mut().extend_from_slice(&[i; 64]);
            sink.send(frame).unwrap();
        }
        assert_eq!(sink.stats().frames_submitted(), 10);

        sink.stream_off().await.unwrap();
        assert_eq!(sink.state(), SinkState::Idle);
    }

    #[tokio::test]
    async fn test_capacity_two_backpressure_scenario() {
        let sink = NullSink::with_options(PoolOptions {
            capacity: 2,
            checkout: CheckoutPolicy::Fail,
            ..Default::default()
        });
        sink.set_format(fmt()).unwrap();
        sink.stream_on().unwrap();

        let g1 = sink.get().await.unwrap();
        let g2 = sink.get().await.unwrap();
        assert!(matches!(
            sink.get().await,
            Err(SinkError::NoBufferAvailable)
        ));

        // Discard consumes synchronously, so g1's slot is free right away
        sink.send(g1).unwrap();
        let g3 = sink.get().await.unwrap();

        drop(g2);
        drop(g3);
    }

    #[tokio::test]
    async fn test_roundtrip_reconfigure() {
        let sink = NullSink::new();
        sink.set_format(fmt()).unwrap();
        sink.stream_on().unwrap();
        sink.stream_off().await.unwrap();
        sink.stream_off().await.unwrap();

        sink.set_format(fmt()).unwrap();
        assert_eq!(sink.state(), SinkState::Configured);
        assert_eq!(sink.format(), Some(fmt()));
    }

    #[tokio::test]
    async fn test_shared_handle_abort() {
        use std::sync::Arc;
        use std::time::Duration;

        let sink: Arc<dyn VideoSink> = Arc::new(NullSink::with_options(PoolOptions {
            capacity: 1,
            ..Default::default()
        }));
        sink.set_format(fmt()).unwrap();
        sink.stream_on().unwrap();

        // Hold the only buffer so the next get blocks
        let held = sink.get().await.unwrap();

        let aborter = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                sink.abort_stream().unwrap();
            })
        };

        let woken = tokio::time::timeout(Duration::from_secs(2), sink.get())
            .await
            .expect("abort must wake the blocked get");
        assert!(matches!(woken, Err(SinkError::Aborted)));
        aborter.await.unwrap();

        assert_eq!(sink.state(), SinkState::Aborting);
        sink.stream_off().await.unwrap();
        assert_eq!(sink.state(), SinkState::Idle);
        drop(held);
    }
}
