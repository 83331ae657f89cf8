//! ledmap Core - Domain Model
//!
//! This crate contains the I/O-free part of ledmap:
//! - Canvas frames and the plugin contract (effects, generators, transitions)
//! - Transport state machine mapping ticks to source indices
//! - Layer stacks and the compositor
//! - LED object / output topology and universe packing
//! - Replay recordings, events and status types

pub use glam::Vec2;

pub mod error;
pub mod frame;

// Plugins & compositing
pub mod compositor;
pub mod effects;
pub mod layer;
pub mod plugin;

// Playback
pub mod clip;
pub mod sink;
pub mod source;
pub mod transport;

// Routing
pub mod output;
pub mod recording;
pub mod topology;

// Observability
pub mod events;
pub mod logging;
pub mod status;

// --- Re-exports grouped by category ---

pub use error::{ConfigError, CoreError, PluginError, Result, SourceError};
pub use frame::{CanvasFrame, BYTES_PER_PIXEL};

// Plugins & compositing
pub use compositor::{Composite, Compositor, DisabledEffect, SkippedLayer};
pub use layer::{BlendMode, Layer, LayerStack};
pub use plugin::{
    ParamSpec, ParamType, ParamValue, ParamValues, Plugin, PluginDescriptor, PluginInstance,
    PluginKind, PluginRegistry, RenderContext,
};

// Playback
pub use clip::{
    Clip, ClipConfig, ClipFrame, ClipId, EffectConfig, LayerConfig, PlayerConfig, SourceDescriptor,
    TransitionConfig,
};
pub use sink::{FrameSink, NullSink};
pub use source::{BlankSource, FrameSource};
pub use transport::{
    FrameCount, GeneratorBounds, PlaybackMode, TransportConfig, TransportController,
    TransportStep,
};

// Routing
pub use output::{DeltaConfig, OutputConfig, OutputId, ARTNET_PORT, MAX_UNIVERSE};
pub use recording::{RecordedFrame, RecordingBuilder, RecordingMetadata, ReplayRecording};
pub use topology::{
    BitDepth, ChannelOrder, LedObject, ObjectMapping, PixelSlot, Topology, UniverseAssignment,
    UniverseBuffer, UNIVERSE_SIZE,
};

// Observability
pub use events::{EventBus, PlayerId, ShowEvent};
pub use logging::LogConfig;
pub use status::{
    EffectStatus, LayerStatus, OutputStatus, PlayState, PlayerStatus, ReplayStatus,
    StatusSnapshot, SyncRole,
};
