//! Frame source contract
//!
//! Concrete sources (generators, decoded images, live feeds) live in
//! `ledmap-media`; the core only needs to pull a frame for an index.

use crate::error::SourceError;
use crate::frame::CanvasFrame;
use crate::transport::FrameCount;

/// Produces a frame for a requested source index
pub trait FrameSource: Send {
    /// Number of frames, or `Unbounded` for live and continuous sources
    fn frame_count(&self) -> FrameCount;

    /// Native frame rate
    fn fps(&self) -> f64;

    /// Frame at `index`, scaled or fitted to `width` x `height`.
    fn frame_at(&mut self, index: u64, width: u32, height: u32) -> Result<CanvasFrame, SourceError>;

    /// Position the source so `index` is cheap to produce next.
    fn seek(&mut self, _index: u64) {}

    /// Short human readable description for status and logs
    fn describe(&self) -> String;
}

impl std::fmt::Debug for dyn FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameSource({})", self.describe())
    }
}

/// Source that produces black frames, used as the stand-in for sources that
/// failed to load.
#[derive(Debug, Clone)]
pub struct BlankSource {
    frames: u64,
    fps: f64,
    reason: Option<String>,
}

impl BlankSource {
    pub fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            reason: None,
        }
    }

    /// Blank stand-in remembering why the real source is missing.
    pub fn degraded(reason: impl Into<String>, fps: f64) -> Self {
        Self {
            frames: 1,
            fps,
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl FrameSource for BlankSource {
    fn frame_count(&self) -> FrameCount {
        FrameCount::Finite(self.frames)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, _index: u64, width: u32, height: u32) -> Result<CanvasFrame, SourceError> {
        Ok(CanvasFrame::black(width, height))
    }

    fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("blank ({})", reason),
            None => format!("blank ({} frames)", self.frames),
        }
    }
}
