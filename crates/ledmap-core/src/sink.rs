//! Where composited frames go

use crate::frame::CanvasFrame;

/// Consumer of a player's composited frames.
///
/// `submit` is called once per tick from the player loop and must not block;
/// failures are handled and reported by the sink itself.
pub trait FrameSink: Send + Sync {
    fn submit(&self, frame: &CanvasFrame);
}

/// Discards frames
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn submit(&self, _frame: &CanvasFrame) {}
}
