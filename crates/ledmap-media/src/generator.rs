//! Procedural sources: generator plugins and the test pattern

use ledmap_core::{
    CanvasFrame, FrameCount, FrameSource, PluginInstance, PluginKind, RenderContext, SourceError,
};

use crate::{MediaError, Result};

/// Frames computed by a generator plugin
#[derive(Debug)]
pub struct GeneratorSource {
    instance: PluginInstance,
    frames: u64,
    fps: f64,
}

impl GeneratorSource {
    /// Wrap a generator instance producing `frames` frames at `fps`.
    pub fn new(instance: PluginInstance, frames: u64, fps: f64) -> Result<Self> {
        if instance.kind() != PluginKind::Generator {
            return Err(MediaError::Plugin(ledmap_core::PluginError::KindMismatch {
                plugin: instance.id().to_string(),
                expected: PluginKind::Generator,
                found: instance.kind(),
            }));
        }
        Ok(Self {
            instance,
            frames,
            fps,
        })
    }

    pub fn instance_mut(&mut self) -> &mut PluginInstance {
        &mut self.instance
    }
}

impl FrameSource for GeneratorSource {
    fn frame_count(&self) -> FrameCount {
        FrameCount::Finite(self.frames)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, index: u64, width: u32, height: u32) -> std::result::Result<CanvasFrame, SourceError> {
        if index >= self.frames {
            return Err(SourceError::Exhausted {
                index,
                length: self.frames,
            });
        }
        let ctx = RenderContext::new(width, height, index, self.fps);
        self.instance
            .try_apply(&[], &ctx)
            .map_err(|e| SourceError::Generator(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("generator '{}' ({} frames)", self.instance.id(), self.frames)
    }
}

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Color bars scrolling one column per frame
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    frames: u64,
    fps: f64,
}

impl TestPatternSource {
    pub fn new(frames: u64, fps: f64) -> Self {
        Self { frames, fps }
    }
}

impl FrameSource for TestPatternSource {
    fn frame_count(&self) -> FrameCount {
        FrameCount::Finite(self.frames)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, index: u64, width: u32, height: u32) -> std::result::Result<CanvasFrame, SourceError> {
        if index >= self.frames {
            return Err(SourceError::Exhausted {
                index,
                length: self.frames,
            });
        }
        let bar_width = (width as u64 / BARS.len() as u64).max(1);
        Ok(CanvasFrame::from_fn(width, height, |x, _| {
            let column = (x as u64 + index) / bar_width;
            BARS[(column % BARS.len() as u64) as usize]
        }))
    }

    fn describe(&self) -> String {
        format!("test pattern ({} frames)", self.frames)
    }
}
