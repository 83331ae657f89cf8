//! Live feeds
//!
//! An external capture pushes frames into a named feed; every
//! [`LiveFeedSource`] opened on that name receives them over its own channel
//! and serves the most recent one. Live sources are unbounded, so trim and
//! looping do not apply to them.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ledmap_core::{CanvasFrame, FrameCount, FrameSource, SourceError};
use parking_lot::Mutex;
use tracing::debug;

/// Frames buffered per subscriber before the oldest are dropped
const FEED_QUEUE_DEPTH: usize = 4;

/// Registry of named feeds
#[derive(Debug, Default)]
pub struct LiveFeeds {
    feeds: Mutex<HashMap<String, Vec<Sender<CanvasFrame>>>>,
}

impl LiveFeeds {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Producer handle for `name`
    pub fn sender(self: &Arc<Self>, name: &str) -> LiveFeedSender {
        LiveFeedSender {
            name: name.to_string(),
            feeds: Arc::clone(self),
        }
    }

    /// New source subscribed to `name`
    pub fn open(&self, name: &str, fps: f64) -> LiveFeedSource {
        let (tx, rx) = bounded(FEED_QUEUE_DEPTH);
        self.feeds
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(tx);
        LiveFeedSource {
            name: name.to_string(),
            rx,
            latest: None,
            fps,
        }
    }

    fn push(&self, name: &str, frame: &CanvasFrame) -> usize {
        let mut feeds = self.feeds.lock();
        let Some(subscribers) = feeds.get_mut(name) else {
            return 0;
        };
        subscribers.retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            // slow consumer: it will catch up with a later frame
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        subscribers.len()
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.feeds.lock().get(name).map(Vec::len).unwrap_or(0)
    }
}

/// Pushes frames into one named feed
#[derive(Debug, Clone)]
pub struct LiveFeedSender {
    name: String,
    feeds: Arc<LiveFeeds>,
}

impl LiveFeedSender {
    /// Deliver a frame to every open source; returns how many received it.
    pub fn push(&self, frame: CanvasFrame) -> usize {
        self.feeds.push(&self.name, &frame)
    }
}

/// Serves the latest frame pushed into its feed
#[derive(Debug)]
pub struct LiveFeedSource {
    name: String,
    rx: Receiver<CanvasFrame>,
    latest: Option<CanvasFrame>,
    fps: f64,
}

impl FrameSource for LiveFeedSource {
    fn frame_count(&self) -> FrameCount {
        FrameCount::Unbounded
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, _index: u64, width: u32, height: u32) -> Result<CanvasFrame, SourceError> {
        if let Some(frame) = self.rx.try_iter().last() {
            self.latest = Some(frame);
        }
        let Some(frame) = &self.latest else {
            return Err(SourceError::NoFrame(self.name.clone()));
        };
        if frame.size() == (width, height) {
            return Ok(frame.clone());
        }
        debug!(
            "Live feed '{}' delivered {}x{}, resampling to {}x{}",
            self.name,
            frame.width(),
            frame.height(),
            width,
            height
        );
        let (fw, fh) = frame.size();
        Ok(CanvasFrame::from_fn(width, height, |x, y| {
            let sx = (x as u64 * fw as u64 / width.max(1) as u64) as u32;
            let sy = (y as u64 * fh as u64 / height.max(1) as u64) as u32;
            frame.pixel(sx, sy)
        }))
    }

    fn describe(&self) -> String {
        format!("live feed '{}'", self.name)
    }
}
