//! Layer system for compositing
//!
//! A clip owns a [`LayerStack`]: an ordered list of layers, each with its own
//! frame source, effect chain, blend mode and opacity. A layer's ordinal is
//! simply its position in the stack, so ordinals are always dense.

use serde::{Deserialize, Serialize};

use crate::plugin::{ParamValue, PluginInstance};
use crate::source::FrameSource;
use crate::{CoreError, Result};

/// Blend modes for layer compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Top replaces base (default)
    #[default]
    Normal,
    /// Add colors (lighten)
    Add,
    /// Subtract colors (darken)
    Subtract,
    /// Multiply colors (darken)
    Multiply,
    /// Screen colors (lighten)
    Screen,
    /// Overlay (combination of multiply and screen)
    Overlay,
    /// Lighten only (max)
    Lighten,
    /// Darken only (min)
    Darken,
    /// Difference
    Difference,
}

impl BlendMode {
    /// Registry id of the plugin implementing this mode
    pub fn plugin_id(&self) -> &'static str {
        match self {
            BlendMode::Normal => "blend.normal",
            BlendMode::Add => "blend.add",
            BlendMode::Subtract => "blend.subtract",
            BlendMode::Multiply => "blend.multiply",
            BlendMode::Screen => "blend.screen",
            BlendMode::Overlay => "blend.overlay",
            BlendMode::Lighten => "blend.lighten",
            BlendMode::Darken => "blend.darken",
            BlendMode::Difference => "blend.difference",
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Add => "Add",
            BlendMode::Subtract => "Subtract",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Lighten => "Lighten",
            BlendMode::Darken => "Darken",
            BlendMode::Difference => "Difference",
        }
    }

    /// List all available blend modes
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Add,
            BlendMode::Subtract,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Lighten,
            BlendMode::Darken,
            BlendMode::Difference,
        ]
    }

    /// Blend one normalized channel of `top` over `base`.
    pub fn blend_channel(&self, base: f32, top: f32) -> f32 {
        let out = match self {
            BlendMode::Normal => top,
            BlendMode::Add => base + top,
            BlendMode::Subtract => base - top,
            BlendMode::Multiply => base * top,
            BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            BlendMode::Overlay => {
                if base < 0.5 {
                    2.0 * base * top
                } else {
                    1.0 - 2.0 * (1.0 - base) * (1.0 - top)
                }
            }
            BlendMode::Lighten => base.max(top),
            BlendMode::Darken => base.min(top),
            BlendMode::Difference => (base - top).abs(),
        };
        out.clamp(0.0, 1.0)
    }

    /// Blend one pixel, then mix the result back over `base` by `opacity`.
    pub fn blend_pixel(&self, base: [u8; 3], top: [u8; 3], opacity: f32) -> [u8; 3] {
        let opacity = opacity.clamp(0.0, 1.0);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let b = base[c] as f32 / 255.0;
            let t = top[c] as f32 / 255.0;
            let blended = self.blend_channel(b, t);
            let mixed = b * (1.0 - opacity) + blended * opacity;
            out[c] = (mixed * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

/// A single layer in a clip
#[derive(Debug)]
pub struct Layer {
    /// Unique identifier within its stack
    pub id: u64,
    /// Display name of the layer
    pub name: String,
    /// Blend mode for compositing; ignored for the base layer
    pub blend_mode: BlendMode,
    /// 0.0 = transparent, 1.0 = opaque
    pub opacity: f32,
    /// Disabled layers are bypassed by the compositor
    pub enabled: bool,
    /// Effects applied in order to the source frame
    pub effect_chain: Vec<PluginInstance>,
    /// Where this layer's pixels come from
    pub source: Box<dyn FrameSource>,
}

impl Layer {
    /// Create a new layer
    pub fn new(id: u64, name: impl Into<String>, source: Box<dyn FrameSource>) -> Self {
        Self {
            id,
            name: name.into(),
            blend_mode: BlendMode::default(),
            opacity: 1.0,
            enabled: true,
            effect_chain: Vec::new(),
            source,
        }
    }

    /// Set blend mode
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Set opacity
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.set_opacity(opacity);
        self
    }

    /// Set opacity, clamped to 0.0-1.0
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() {
            0.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
    }

    /// Rename the layer
    pub fn rename(&mut self, new_name: impl Into<String>) {
        self.name = new_name.into();
    }

    /// Replace the frame source, returning the old one.
    pub fn replace_source(&mut self, source: Box<dyn FrameSource>) -> Box<dyn FrameSource> {
        std::mem::replace(&mut self.source, source)
    }

    /// Append an effect; returns its chain index.
    pub fn add_effect(&mut self, effect: PluginInstance) -> usize {
        self.effect_chain.push(effect);
        self.effect_chain.len() - 1
    }

    /// Insert an effect at `index` (clamped to the chain length).
    pub fn insert_effect(&mut self, index: usize, effect: PluginInstance) {
        let index = index.min(self.effect_chain.len());
        self.effect_chain.insert(index, effect);
    }

    pub fn remove_effect(&mut self, index: usize) -> Option<PluginInstance> {
        if index < self.effect_chain.len() {
            Some(self.effect_chain.remove(index))
        } else {
            None
        }
    }

    /// Move an effect within the chain
    pub fn move_effect(&mut self, from: usize, to: usize) -> bool {
        let len = self.effect_chain.len();
        if from >= len || to >= len {
            return false;
        }
        let effect = self.effect_chain.remove(from);
        self.effect_chain.insert(to, effect);
        true
    }

    /// Update one effect parameter; applied on the next frame.
    pub fn set_effect_param(&mut self, index: usize, name: &str, value: ParamValue) -> Result<()> {
        let effect = self
            .effect_chain
            .get_mut(index)
            .ok_or_else(|| CoreError::not_found("effect", index))?;
        effect.set_param(name, value).map_err(CoreError::from)
    }

    /// Re-enable effects that were disabled after a failure.
    pub fn reset_effect_failures(&mut self) {
        for effect in &mut self.effect_chain {
            effect.reset_failure();
        }
    }

    /// Effects that were disabled after failing, with the failure reason
    pub fn failed_effects(&self) -> impl Iterator<Item = (usize, &PluginInstance)> {
        self.effect_chain
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_disabled())
    }
}

/// Ordered layers of one clip
#[derive(Debug)]
pub struct LayerStack {
    /// Index in this vec is the layer ordinal
    layers: Vec<Layer>,
    /// Next available layer ID
    next_id: u64,
}

impl LayerStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            next_id: 1,
        }
    }

    /// Create and append a layer; returns its id.
    pub fn add_layer(&mut self, name: impl Into<String>, source: Box<dyn FrameSource>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.layers.push(Layer::new(id, name, source));
        id
    }

    /// Append a prepared layer, assigning a fresh id if it has none.
    pub fn push(&mut self, mut layer: Layer) -> u64 {
        if layer.id == 0 || self.get_layer(layer.id).is_some() {
            layer.id = self.next_id;
        }
        self.next_id = self.next_id.max(layer.id + 1);
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// Remove a layer by ID. Ordinals above it shift down.
    pub fn remove_layer(&mut self, id: u64) -> Option<Layer> {
        let index = self.ordinal_of(id)?;
        Some(self.layers.remove(index))
    }

    /// Get a layer by ID
    pub fn get_layer(&self, id: u64) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Get a mutable layer by ID
    pub fn get_layer_mut(&mut self, id: u64) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// Layer lookup that reports a miss as an error
    pub fn layer_mut(&mut self, id: u64) -> Result<&mut Layer> {
        self.get_layer_mut(id)
            .ok_or_else(|| CoreError::not_found("layer", id))
    }

    /// Position of a layer in compositing order
    pub fn ordinal_of(&self, id: u64) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Layers in compositing order, base first
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// The base layer, if any
    pub fn base(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// Move layer up in stack (composited later)
    pub fn move_layer_up(&mut self, id: u64) -> bool {
        if let Some(index) = self.ordinal_of(id) {
            if index + 1 < self.layers.len() {
                self.layers.swap(index, index + 1);
                return true;
            }
        }
        false
    }

    /// Move layer down in stack (composited earlier)
    pub fn move_layer_down(&mut self, id: u64) -> bool {
        if let Some(index) = self.ordinal_of(id) {
            if index > 0 {
                self.layers.swap(index, index - 1);
                return true;
            }
        }
        false
    }

    /// Move layer to a specific ordinal
    pub fn move_layer_to(&mut self, id: u64, new_index: usize) -> bool {
        if let Some(old_index) = self.ordinal_of(id) {
            if new_index < self.layers.len() {
                let layer = self.layers.remove(old_index);
                self.layers.insert(new_index, layer);
                return true;
            }
        }
        false
    }

    pub fn set_opacity(&mut self, id: u64, opacity: f32) -> Result<()> {
        self.layer_mut(id)?.set_opacity(opacity);
        Ok(())
    }

    pub fn set_blend_mode(&mut self, id: u64, mode: BlendMode) -> Result<()> {
        self.layer_mut(id)?.blend_mode = mode;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: u64, enabled: bool) -> Result<()> {
        self.layer_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Rename a layer
    pub fn rename_layer(&mut self, id: u64, new_name: impl Into<String>) -> bool {
        if let Some(layer) = self.get_layer_mut(id) {
            layer.rename(new_name);
            true
        } else {
            false
        }
    }

    /// Seek every layer's source.
    pub fn seek_all(&mut self, index: u64) {
        for layer in &mut self.layers {
            layer.source.seek(index);
        }
    }

    /// Get number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Drop all layers and their sources
    pub fn clear(&mut self) {
        self.layers.clear();
    }
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}
