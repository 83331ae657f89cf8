//! Layer compositor
//!
//! Layers are composited base first. The base layer seeds the accumulator as
//! is; every later layer is blended over it through a cached blend plugin
//! instance. There is exactly one cached instance per blend mode; opacity is a
//! parameter set on the instance for each use.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::effects::BlendPlugin;
use crate::error::SourceError;
use crate::frame::CanvasFrame;
use crate::layer::{BlendMode, LayerStack};
use crate::plugin::{ParamValue, PluginInstance, PluginRegistry, RenderContext};

/// A layer that produced nothing this tick
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLayer {
    pub layer_id: u64,
    pub error: SourceError,
}

/// An effect that failed this tick and is now disabled
#[derive(Debug, Clone, PartialEq)]
pub struct DisabledEffect {
    pub layer_id: u64,
    pub index: usize,
    pub plugin_id: String,
    pub reason: String,
}

/// Output of one compositing pass
#[derive(Debug, Clone)]
pub struct Composite {
    pub frame: CanvasFrame,
    /// Layers treated as transparent because their source failed
    pub skipped: Vec<SkippedLayer>,
    /// Effects that were disabled during this pass
    pub disabled: Vec<DisabledEffect>,
}

/// Merges a layer stack into one canvas frame
pub struct Compositor {
    width: u32,
    height: u32,
    blend_pool: HashMap<BlendMode, PluginInstance>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("cached_blends", &self.blend_pool.len())
            .finish()
    }
}

impl Compositor {
    /// Build a compositor for a `width` x `height` canvas. Blend plugins are
    /// resolved from `registry`, falling back to the builtin implementation.
    pub fn new(registry: &PluginRegistry, width: u32, height: u32) -> Self {
        let blend_pool = BlendMode::all()
            .iter()
            .map(|mode| {
                let instance = registry.instantiate(mode.plugin_id()).unwrap_or_else(|e| {
                    debug!("{}; using builtin blend", e);
                    PluginInstance::new(Arc::new(BlendPlugin::new(*mode)))
                });
                (*mode, instance)
            })
            .collect();
        Self {
            width,
            height,
            blend_pool,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of cached blend instances (one per mode)
    pub fn cached_blends(&self) -> usize {
        self.blend_pool.len()
    }

    /// Composite every enabled layer at source index `index`.
    ///
    /// A layer whose source fails is left out and reported in
    /// [`Composite::skipped`]; the frame is still produced.
    pub fn compose(&mut self, layers: &mut LayerStack, index: u64) -> Composite {
        let mut acc = CanvasFrame::black(self.width, self.height);
        let mut skipped = Vec::new();
        let mut disabled = Vec::new();

        for (ordinal, layer) in layers.layers_mut().iter_mut().enumerate() {
            if !layer.enabled {
                continue;
            }

            let raw = match layer.source.frame_at(index, self.width, self.height) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(
                        "Layer {} ('{}') skipped at frame {}: {}",
                        layer.id, layer.name, index, error
                    );
                    skipped.push(SkippedLayer {
                        layer_id: layer.id,
                        error,
                    });
                    continue;
                }
            };

            let ctx = RenderContext::new(self.width, self.height, index, layer.source.fps());
            let mut contribution = raw;
            for (i, effect) in layer.effect_chain.iter_mut().enumerate() {
                let (out, newly_disabled) = effect.apply_contained(&contribution, &ctx);
                if newly_disabled {
                    disabled.push(DisabledEffect {
                        layer_id: layer.id,
                        index: i,
                        plugin_id: effect.id().to_string(),
                        reason: effect.failure().unwrap_or_default().to_string(),
                    });
                }
                contribution = out;
            }

            if ordinal == 0 {
                acc = contribution;
                continue;
            }

            acc = self.blend(layer.blend_mode, &acc, &contribution, layer.opacity, &ctx);
        }

        Composite {
            frame: acc,
            skipped,
            disabled,
        }
    }

    /// Blend `top` over `base` with the cached instance for `mode`.
    pub fn blend(
        &mut self,
        mode: BlendMode,
        base: &CanvasFrame,
        top: &CanvasFrame,
        opacity: f32,
        ctx: &RenderContext,
    ) -> CanvasFrame {
        let Some(instance) = self.blend_pool.get_mut(&mode) else {
            return base.clone();
        };
        if let Err(e) = instance.set_param("opacity", ParamValue::Float(opacity)) {
            warn!("Blend '{}' rejected opacity: {}", mode.plugin_id(), e);
        }
        match instance.try_apply(&[base, top], ctx) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Blend '{}' failed: {}", mode.plugin_id(), e);
                base.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BlankSource, FrameSource};
    use crate::transport::FrameCount;

    struct Solid {
        rgb: [u8; 3],
        frames: u64,
    }

    impl FrameSource for Solid {
        fn frame_count(&self) -> FrameCount {
            FrameCount::Finite(self.frames)
        }

        fn fps(&self) -> f64 {
            30.0
        }

        fn frame_at(&mut self, index: u64, width: u32, height: u32) -> Result<CanvasFrame, SourceError> {
            if index >= self.frames {
                return Err(SourceError::Exhausted {
                    index,
                    length: self.frames,
                });
            }
            Ok(CanvasFrame::solid(width, height, self.rgb))
        }

        fn describe(&self) -> String {
            "solid".to_string()
        }
    }

    fn solid(rgb: [u8; 3], frames: u64) -> Box<dyn FrameSource> {
        Box::new(Solid { rgb, frames })
    }

    #[test]
    fn test_base_layer_ignores_blend_and_opacity() {
        let registry = PluginRegistry::with_builtins();
        let mut compositor = Compositor::new(&registry, 2, 2);
        let mut stack = LayerStack::new();
        let id = stack.add_layer("base", solid([100, 150, 200], 10));
        stack.set_blend_mode(id, BlendMode::Multiply).unwrap();
        stack.set_opacity(id, 0.2).unwrap();

        let out = compositor.compose(&mut stack, 0);
        assert_eq!(out.frame.pixel(1, 1), [100, 150, 200]);
    }

    #[test]
    fn test_layers_blend_with_opacity() {
        let registry = PluginRegistry::with_builtins();
        let mut compositor = Compositor::new(&registry, 1, 1);
        let mut stack = LayerStack::new();
        stack.add_layer("base", solid([0, 0, 0], 10));
        let top = stack.add_layer("top", solid([200, 100, 50], 10));
        stack.set_opacity(top, 0.5).unwrap();

        let out = compositor.compose(&mut stack, 0);
        assert_eq!(out.frame.pixel(0, 0), [100, 50, 25]);
        assert_eq!(compositor.cached_blends(), BlendMode::all().len());
    }

    #[test]
    fn test_failing_layer_is_transparent() {
        let registry = PluginRegistry::with_builtins();
        let mut compositor = Compositor::new(&registry, 1, 1);
        let mut stack = LayerStack::new();
        stack.add_layer("base", solid([10, 20, 30], 10));
        let short = stack.add_layer("short", solid([255, 255, 255], 2));

        let out = compositor.compose(&mut stack, 5);
        assert_eq!(out.frame.pixel(0, 0), [10, 20, 30]);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].layer_id, short);
    }

    #[test]
    fn test_disabled_layer_is_bypassed() {
        let registry = PluginRegistry::with_builtins();
        let mut compositor = Compositor::new(&registry, 1, 1);
        let mut stack = LayerStack::new();
        stack.add_layer("base", Box::new(BlankSource::new(5, 30.0)));
        let top = stack.add_layer("top", solid([255, 0, 0], 5));
        stack.set_blend_mode(top, BlendMode::Add).unwrap();
        stack.set_enabled(top, false).unwrap();

        let out = compositor.compose(&mut stack, 0);
        assert!(out.frame.is_black());
    }

    #[test]
    fn test_effect_chain_runs_in_order() {
        let registry = PluginRegistry::with_builtins();
        let mut compositor = Compositor::new(&registry, 1, 1);
        let mut stack = LayerStack::new();
        let id = stack.add_layer("base", solid([100, 100, 100], 5));
        let layer = stack.get_layer_mut(id).unwrap();

        let mut brightness = registry.instantiate("brightness").unwrap();
        brightness
            .set_param("level", ParamValue::Float(2.0))
            .unwrap();
        layer.add_effect(brightness);
        layer.add_effect(registry.instantiate("invert").unwrap());

        // 100 * 2 = 200, inverted = 55
        let out = compositor.compose(&mut stack, 0);
        assert_eq!(out.frame.pixel(0, 0), [55, 55, 55]);
    }
}
