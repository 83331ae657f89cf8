//! Clips and their declarative configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compositor::{Composite, Compositor};
use crate::events::PlayerId;
use crate::layer::{BlendMode, LayerStack};
use crate::output::OutputId;
use crate::plugin::ParamValue;
use crate::status::SyncRole;
use crate::transport::{TransportConfig, TransportController, TransportStep};

/// Opaque clip handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a layer's frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// Generator plugin; duration is clamped to the configured bounds
    Generator {
        plugin: String,
        #[serde(default)]
        params: BTreeMap<String, ParamValue>,
        #[serde(default)]
        duration_secs: Option<f64>,
    },
    /// Single still image, held for `frames`
    Image {
        path: String,
        #[serde(default = "default_still_frames")]
        frames: u64,
    },
    /// Directory of numbered images
    ImageSequence {
        path: String,
        #[serde(default = "default_fps")]
        fps: f64,
    },
    /// Built-in test pattern with `frames` frames
    TestPattern { frames: u64 },
    /// Frames pushed at runtime by an external capture
    Live { feed: String },
    /// Black frames
    Blank { frames: u64 },
}

fn default_still_frames() -> u64 {
    1
}

fn default_fps() -> f64 {
    30.0
}

impl SourceDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::Generator { .. } => "generator",
            SourceDescriptor::Image { .. } => "image",
            SourceDescriptor::ImageSequence { .. } => "image_sequence",
            SourceDescriptor::TestPattern { .. } => "test_pattern",
            SourceDescriptor::Live { .. } => "live",
            SourceDescriptor::Blank { .. } => "blank",
        }
    }
}

/// One effect in a layer's chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    pub plugin: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

/// Declarative layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub name: String,
    pub source: SourceDescriptor,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `None` means the show's default effect chain
    #[serde(default)]
    pub effects: Option<Vec<EffectConfig>>,
}

fn default_opacity() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

impl LayerConfig {
    pub fn new(name: impl Into<String>, source: SourceDescriptor) -> Self {
        Self {
            name: name.into(),
            source,
            blend_mode: BlendMode::Normal,
            opacity: 1.0,
            enabled: true,
            effects: None,
        }
    }
}

/// Crossfade into a clip when it becomes active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    #[serde(default = "default_transition")]
    pub plugin: String,
    pub frames: u32,
}

fn default_transition() -> String {
    "crossfade".to_string()
}

/// Declarative clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Base layer first; the base layer's source defines the clip length
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub transition: Option<TransitionConfig>,
}

impl ClipConfig {
    /// Clip with a single layer
    pub fn single(name: impl Into<String>, source: SourceDescriptor) -> Self {
        let name = name.into();
        Self {
            layers: vec![LayerConfig::new(name.clone(), source)],
            name,
            transport: TransportConfig::default(),
            transition: None,
        }
    }

    /// Source descriptor of the base layer
    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.layers.first().map(|l| &l.source)
    }
}

/// Declarative player: a playlist of clips rendered at a fixed rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    /// Tick rate; 0 uses the show default
    #[serde(default)]
    pub fps: f64,
    pub playlist: Vec<ClipConfig>,
    /// Wrap to the first clip after the last one completes
    #[serde(default)]
    pub playlist_loop: bool,
    #[serde(default)]
    pub role: SyncRole,
    /// Outputs this player drives; `None` means all
    #[serde(default)]
    pub outputs: Option<Vec<OutputId>>,
    #[serde(default = "default_true")]
    pub autoplay: bool,
}

impl PlayerConfig {
    pub fn new(id: PlayerId, name: impl Into<String>, playlist: Vec<ClipConfig>) -> Self {
        Self {
            id,
            name: name.into(),
            fps: 0.0,
            playlist,
            playlist_loop: false,
            role: SyncRole::Autonomous,
            outputs: None,
            autoplay: true,
        }
    }
}

/// A loaded clip: transport plus its layer stack
#[derive(Debug)]
pub struct Clip {
    pub id: ClipId,
    pub name: String,
    pub transport: TransportController,
    pub layers: LayerStack,
    pub transition: Option<TransitionConfig>,
}

/// One rendered tick of a clip
#[derive(Debug, Clone)]
pub struct ClipFrame {
    pub step: TransportStep,
    pub composite: Composite,
}

impl Clip {
    pub fn new(name: impl Into<String>, transport: TransportController, layers: LayerStack) -> Self {
        Self {
            id: ClipId::new(),
            name: name.into(),
            transport,
            layers,
            transition: None,
        }
    }

    /// Advance the transport one tick and composite the mapped index.
    pub fn render_next(&mut self, compositor: &mut Compositor) -> ClipFrame {
        let step = self.transport.step();
        let composite = compositor.compose(&mut self.layers, step.index);
        ClipFrame { step, composite }
    }

    /// Rewind to tick 0 and seek every source to the in point.
    pub fn rewind(&mut self) {
        self.transport.reset();
        let in_point = self.transport.window().map(|(i, _)| i).unwrap_or(0);
        self.layers.seek_all(in_point);
    }

    /// Seek the transport and every source to `frame`, clamped into the
    /// trim window.
    pub fn seek(&mut self, frame: u64) {
        let frame = self.transport.clamp_frame(frame);
        self.transport.seek(frame);
        self.layers.seek_all(frame);
    }

    /// Transport config used to build this clip, for reuse on reload
    pub fn transport_config(&self) -> TransportConfig {
        self.transport.config().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_descriptor_tagged() {
        let json = r#"{"type": "generator", "plugin": "rainbow", "duration_secs": 4.0}"#;
        let desc: SourceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.kind(), "generator");
        if let SourceDescriptor::Generator {
            plugin,
            params,
            duration_secs,
        } = desc
        {
            assert_eq!(plugin, "rainbow");
            assert!(params.is_empty());
            assert_eq!(duration_secs, Some(4.0));
        }
    }

    #[test]
    fn test_layer_config_defaults() {
        let json = r#"{"source": {"type": "blank", "frames": 3}}"#;
        let layer: LayerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(layer.opacity, 1.0);
        assert!(layer.enabled);
        assert_eq!(layer.blend_mode, BlendMode::Normal);
        assert!(layer.effects.is_none());
    }

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use crate::error::SourceError;
    use crate::frame::CanvasFrame;
    use crate::source::FrameSource;
    use crate::transport::FrameCount;

    struct Tracked {
        frames: u64,
        sought: Arc<AtomicU64>,
    }

    impl FrameSource for Tracked {
        fn frame_count(&self) -> FrameCount {
            FrameCount::Finite(self.frames)
        }

        fn fps(&self) -> f64 {
            30.0
        }

        fn frame_at(&mut self, _index: u64, width: u32, height: u32) -> Result<CanvasFrame, SourceError> {
            Ok(CanvasFrame::solid(width, height, [0, 0, 0]))
        }

        fn seek(&mut self, index: u64) {
            self.sought.store(index, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "tracked".into()
        }
    }

    #[test]
    fn test_seek_outside_trim_reaches_sources_clamped() {
        let sought = Arc::new(AtomicU64::new(0));
        let mut layers = LayerStack::new();
        layers.add_layer(
            "base",
            Box::new(Tracked {
                frames: 100,
                sought: sought.clone(),
            }),
        );
        let transport = TransportController::new(
            TransportConfig {
                in_point: 10,
                out_point: Some(40),
                ..Default::default()
            },
            FrameCount::Finite(100),
        );
        let mut clip = Clip::new("trimmed", transport, layers);

        clip.seek(90);
        assert_eq!(sought.load(Ordering::SeqCst), 39);
        assert_eq!(clip.transport.step().index, 39);

        clip.seek(2);
        assert_eq!(sought.load(Ordering::SeqCst), 10);
        assert_eq!(clip.transport.step().index, 10);
    }

    #[test]
    fn test_single_layer_clip() {
        let clip = ClipConfig::single("intro", SourceDescriptor::TestPattern { frames: 10 });
        assert_eq!(clip.layers.len(), 1);
        assert_eq!(clip.source(), Some(&SourceDescriptor::TestPattern { frames: 10 }));
    }
}
