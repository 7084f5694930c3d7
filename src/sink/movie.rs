//! Movie-file sink
//!
//! Submitted frames are queued to a writer task that feeds a
//! [`FrameRecorder`]; container format and codec choice live behind that
//! seam. Each streaming session records to a fresh output: the recorder
//! factory is invoked at `stream_on` with a running session number, so
//! successive recordings land in `video0`, `video1`, … style targets
//! without overwriting each other.

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

/// Backend seam for writing frames into a movie file.
///
/// `write_frame` is called from the sink's writer task in submission order.
/// A write failure stops the recording: the writer finishes the file and
/// subsequent `send` calls fail with `Aborted`. `finish` runs once after the
/// last frame, when the session is being torn down.
pub trait FrameRecorder: Send {
    fn write_frame(&mut self, frame: &DispatchedFrame) -> anyhow::Result<()>;

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

type RecorderFactory = Box<dyn FnMut(u32) -> anyhow::Result<Box<dyn FrameRecorder>> + Send>;

struct ActiveSession {
    tx: mpsc::Sender<DispatchedFrame>,
    writer: JoinHandle<()>,
}

struct MovieSession {
    open_recorder: RecorderFactory,
    next_index: u32,
    active: Option<ActiveSession>,
}

/// Sink that records frames to movie files, one per streaming session.
pub struct MovieSink {
    core: SinkCore,
    queue_depth: usize,
    session: Mutex<MovieSession>,
}

impl MovieSink {
    pub fn new<R, F>(factory: F) -> Self
    where
        R: FrameRecorder + 'static,
        F: FnMut(u32) -> anyhow::Result<R> + Send + 'static,
    {
        Self::with_options(factory, PoolOptions::default())
    }

    pub fn with_options<R, F>(mut factory: F, opts: PoolOptions) -> Self
    where
        R: FrameRecorder + 'static,
        F: FnMut(u32) -> anyhow::Result<R> + Send + 'static,
    {
        let queue_depth = opts.dispatch_depth.max(1);
        Self {
            core: SinkCore::new("MovieSink", opts),
            queue_depth,
            session: Mutex::new(MovieSession {
                open_recorder: Box::new(move |index| {
                    factory(index).map(|r| Box::new(r) as Box<dyn FrameRecorder>)
                }),
                next_index: 0,
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
impl VideoSink for MovieSink {
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
        let index = session.next_index;
        let mut recorder = (session.open_recorder)(index).map_err(SinkError::Backend)?;
        self.core.stream_on()?;
        session.next_index += 1;

        let (tx, mut rx) = mpsc::channel::<DispatchedFrame>(self.queue_depth);
        let writer = tokio::spawn(async move {
            info!("MovieSink: recording {} started", index);
            let mut written = 0u64;
            while let Some(frame) = rx.recv().await {
                if let Err(e) = recorder.write_frame(&frame) {
                    // Dropping the receiver surfaces Aborted to the producer
                    error!("MovieSink: write failed, stopping recording {}: {e:#}", index);
                    frame.complete();
                    break;
                }
                written += 1;
                frame.complete();
            }
            if let Err(e) = recorder.finish() {
                error!("MovieSink: failed to finish recording {}: {e:#}", index);
            }
            info!("MovieSink: recording {} finished, {} frames", index, written);
        });
        session.active = Some(ActiveSession { tx, writer });
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
            // Close the queue, then wait for the writer to drain it and
            // finish the file before tearing the pool down
            drop(active.tx);
            if let Err(e) = active.writer.await {
                error!("MovieSink: writer task failed: {e}");
            }
        }
        self.core.stream_off()
    }
}
