//! Local display sink
//!
//! Submitted frames are handed to a presenter task that drives the actual
//! display backend through the [`DisplaySurface`] trait; compositing and
//! window-system specifics stay behind that seam.

use std::sync::Mutex;

use async_trait::async_trait;
use log::{error, info};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::SinkError;
use crate::format::FrameFormat;
use crate::frame::{DispatchedFrame, RawFrame};
use crate::pool::PoolOptions;
use crate::sink::core::SinkCore;
use crate::sink::state::SinkState;
use crate::sink::VideoSink;
use crate::stats::SinkStats;

/// Backend seam for putting pixels on a screen.
///
/// `present` is called from the sink's presenter task, once per submitted
/// frame, in submission order. A failure is logged and the frame dropped;
/// presentation continues with the next frame.
pub trait DisplaySurface: Send {
    fn present(&mut self, frame: &DispatchedFrame) -> anyhow::Result<()>;
}

struct ActiveSession {
    tx: mpsc::Sender<DispatchedFrame>,
    presenter: JoinHandle<Box<dyn DisplaySurface>>,
}

struct DisplaySession {
    /// Parked between sessions; owned by the presenter task while streaming
    surface: Option<Box<dyn DisplaySurface>>,
    active: Option<ActiveSession>,
}

/// Sink that blits frames to a local display.
pub struct DisplaySink {
    core: SinkCore,
    queue_depth: usize,
    session: Mutex<DisplaySession>,
}

impl DisplaySink {
    pub fn new<S: DisplaySurface + 'static>(surface: S) -> Self {
        Self::with_options(surface, PoolOptions::default())
    }

    pub fn with_options<S: DisplaySurface + 'static>(surface: S, opts: PoolOptions) -> Self {
        let queue_depth = opts.dispatch_depth.max(1);
        Self {
            core: SinkCore::new("DisplaySink", opts),
            queue_depth,
            session: Mutex::new(DisplaySession {
                surface: Some(Box::new(surface)),
                active: None,
            }),
        }
    }

    /// Activity counters
    pub fn stats(&self) -> &SinkStats {
        self.core.stats()
    }
}

#[async_trait]
impl VideoSink for DisplaySink {
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
        let mut session = self.session.lock().unwrap();
        if self.core.state() == SinkState::Streaming {
            return Ok(());
        }
        let mut surface = match session.surface.take() {
            Some(surface) => surface,
            None => {
                return Err(SinkError::Backend(anyhow::anyhow!(
                    "display surface was lost by a failed presenter"
                )));
            }
        };
        if let Err(e) = self.core.stream_on() {
            session.surface = Some(surface);
            return Err(e);
        }

        let (tx, mut rx) = mpsc::channel::<DispatchedFrame>(self.queue_depth);
        let presenter = tokio::spawn(async move {
            let mut presented = 0u64;
            while let Some(frame) = rx.recv().await {
                match surface.present(&frame) {
                    Ok(()) => presented += 1,
                    Err(e) => error!("DisplaySink: present failed: {e:#}"),
                }
                frame.complete();
            }
            info!("DisplaySink: presenter finished, {} frames", presented);
            surface
        });
        session.active = Some(ActiveSession { tx, presenter });
        Ok(())
    }

    async fn get(&self) -> Result<RawFrame, SinkError> {
        self.core.checkout().await
    }

    fn send(&self, frame: RawFrame) -> Result<(), SinkError> {
        let dispatched = self.core.submit(frame)?;
        let session = self.session.lock().unwrap();
        let active = match session.active.as_ref() {
            Some(active) => active,
            None => return Err(SinkError::Aborted),
        };
        match active.tx.try_send(dispatched) {
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
        let active = self.session.lock().unwrap().active.take();
        if let Some(active) = active {
            // Closing the channel lets the presenter drain what was already
            // submitted, then hand the surface back
            drop(active.tx);
            match active.presenter.await {
                Ok(surface) => self.session.lock().unwrap().surface = Some(surface),
                Err(e) => error!("DisplaySink: presenter task failed: {e}"),
            }
        }
        self.core.stream_off()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct CountingSurface {
        presented: Arc<AtomicU64>,
        fail_on: Option<u64>,
    }

    impl DisplaySurface for CountingSurface {
        fn present(&mut self, frame: &DispatchedFrame) -> anyhow::Result<()> {
            if self.fail_on == Some(frame.seq()) {
                anyhow::bail!("simulated blit failure");
            }
            self.presented.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn fmt() -> FrameFormat {
        FrameFormat::new(64, 48, PixelFormat::Bgr24, 30)
    }

    #[tokio::test]
    async fn test_frames_reach_surface() {
        let presented = Arc::new(AtomicU64::new(0));
        let sink = DisplaySink::new(CountingSurface {
            presented: Arc::clone(&presented),
            fail_on: None,
        });

        sink.set_format(fmt()).unwrap();
        sink.stream_on().unwrap();
        for _ in 0..5 {
            let mut frame = sink.get().await.unwrap();
            frame.data_mut().extend_from_slice(&[0u8; 32]);
            sink.send(frame).unwrap();
        }
        // stream_off waits for the presenter to drain the queue
        sink.stream_off().await.unwrap();

        assert_eq!(presented.load(Ordering::Relaxed), 5);
        assert_eq!(sink.stats().frames_submitted(), 5);
    }

    #[tokio::test]
    async fn test_present_failure_is_not_fatal() {
        let presented = Arc::new(AtomicU64::new(0));
        let sink = DisplaySink::new(CountingSurface {
            presented: Arc::clone(&presented),
            fail_on: Some(1),
        });

        sink.set_format(fmt()).unwrap();
        sink.stream_on().unwrap();
        for _ in 0..4 {
            let frame = sink.get().await.unwrap();
            sink.send(frame).unwrap();
        }
        sink.stream_off().await.unwrap();

        // Frame 1 failed to blit; the other three made it
        assert_eq!(presented.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_surface_survives_restream() {
        let presented = Arc::new(AtomicU64::new(0));
        let sink = DisplaySink::new(CountingSurface {
            presented: Arc::clone(&presented),
            fail_on: None,
        });

        for _ in 0..2 {
            sink.set_format(fmt()).unwrap();
            sink.stream_on().unwrap();
            let frame = sink.get().await.unwrap();
            sink.send(frame).unwrap();
            sink.stream_off().await.unwrap();
        }

        assert_eq!(presented.load(Ordering::Relaxed), 2);
    }
}
