//! Building sources and clips from their descriptions

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ledmap_core::{
    BlankSource, Clip, ClipConfig, EffectConfig, FrameCount, FrameSource, GeneratorBounds, Layer,
    LayerConfig, LayerStack, PluginKind, PluginRegistry, SourceDescriptor, SourceError,
    TransportController,
};
use tracing::{info, warn};

use crate::generator::{GeneratorSource, TestPatternSource};
use crate::image_decoder::StillImageSource;
use crate::live::LiveFeeds;
use crate::sequence::ImageSequenceSource;
use crate::Result;

/// Everything needed to turn descriptors into live objects
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub registry: Arc<PluginRegistry>,
    pub feeds: Arc<LiveFeeds>,
    pub bounds: GeneratorBounds,
    /// Applied to layers that declare no effect chain
    pub default_effects: Vec<EffectConfig>,
    /// Relative media paths are resolved against this
    pub media_root: PathBuf,
    pub canvas: (u32, u32),
}

impl SourceContext {
    pub fn new(registry: Arc<PluginRegistry>, canvas: (u32, u32)) -> Self {
        Self {
            registry,
            feeds: LiveFeeds::new(),
            bounds: GeneratorBounds::default(),
            default_effects: Vec::new(),
            media_root: PathBuf::from("."),
            canvas,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.media_root.join(path)
        }
    }
}

/// Open the source a descriptor names. `fps` is used by sources without a
/// native rate (generators, stills, test patterns).
pub fn open_source(
    descriptor: &SourceDescriptor,
    ctx: &SourceContext,
    fps: f64,
) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match descriptor {
        SourceDescriptor::Generator {
            plugin,
            params,
            duration_secs,
        } => {
            let instance = ctx
                .registry
                .instantiate_as(plugin, PluginKind::Generator, params)?;
            let frames = ctx.bounds.frames(fps, *duration_secs);
            Box::new(GeneratorSource::new(instance, frames, fps)?)
        }
        SourceDescriptor::Image { path, frames } => {
            Box::new(StillImageSource::open(ctx.resolve(path), *frames, fps)?)
        }
        SourceDescriptor::ImageSequence { path, fps } => {
            Box::new(ImageSequenceSource::open(ctx.resolve(path), *fps)?)
        }
        SourceDescriptor::TestPattern { frames } => Box::new(TestPatternSource::new(*frames, fps)),
        SourceDescriptor::Live { feed } => Box::new(ctx.feeds.open(feed, fps)),
        SourceDescriptor::Blank { frames } => Box::new(BlankSource::new(*frames, fps)),
    };
    Ok(source)
}

/// Build one layer. A source that fails to open is replaced by a blank
/// stand-in and its error returned next to the layer.
pub fn build_layer(
    config: &LayerConfig,
    ctx: &SourceContext,
    fps: f64,
) -> (Layer, Option<SourceError>) {
    let (source, error): (Box<dyn FrameSource>, _) = match open_source(&config.source, ctx, fps) {
        Ok(source) => (source, None),
        Err(e) => {
            warn!(
                "Layer '{}': {} source failed to load, using blank: {}",
                config.name,
                config.source.kind(),
                e
            );
            let error = SourceError::from(e);
            (
                Box::new(BlankSource::degraded(error.to_string(), fps)),
                Some(error),
            )
        }
    };

    let mut layer = Layer::new(0, config.name.clone(), source)
        .with_blend_mode(config.blend_mode)
        .with_opacity(config.opacity);
    layer.enabled = config.enabled;

    let effects = config.effects.as_ref().unwrap_or(&ctx.default_effects);
    for effect in effects {
        match ctx
            .registry
            .instantiate_as(&effect.plugin, PluginKind::Effect, &effect.params)
        {
            Ok(instance) => {
                layer.add_effect(instance);
            }
            Err(e) => warn!("Layer '{}': skipping effect: {}", config.name, e),
        }
    }
    (layer, error)
}

/// Build a clip. Sources that fail to open are replaced by blank stand-ins
/// and returned alongside with their layer id; the clip itself always loads.
pub fn load_clip(
    config: &ClipConfig,
    ctx: &SourceContext,
    fps: f64,
) -> (Clip, Vec<(u64, SourceError)>) {
    let mut errors = Vec::new();
    let mut layers = LayerStack::new();
    for layer_config in &config.layers {
        let (layer, error) = build_layer(layer_config, ctx, fps);
        let id = layers.push(layer);
        if let Some(error) = error {
            errors.push((id, error));
        }
    }
    if layers.is_empty() {
        warn!("Clip '{}' has no layers, playing blank", config.name);
        layers.push(Layer::new(0, "blank", Box::new(BlankSource::new(1, fps))));
    }

    let total = layers
        .base()
        .map(|l| l.source.frame_count())
        .unwrap_or(FrameCount::Finite(1));
    let transport = TransportController::new(config.transport.clone(), total);
    let mut clip = Clip::new(config.name.clone(), transport, layers);
    clip.transition = config.transition.clone();

    info!(
        "Loaded clip '{}' ({} layers, {:?} frames)",
        clip.name,
        clip.layers.len(),
        total
    );
    (clip, errors)
}
