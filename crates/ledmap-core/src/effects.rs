//! Builtin plugins
//!
//! Registered by [`PluginRegistry::with_builtins`]: five effects, four
//! generators, the crossfade transition and one blend plugin per blend mode.

use std::sync::Arc;

use crate::error::PluginError;
use crate::frame::CanvasFrame;
use crate::layer::BlendMode;
use crate::plugin::{
    ParamSpec, ParamValues, Plugin, PluginDescriptor, PluginKind, PluginRegistry, RenderContext,
};

/// Register every builtin plugin. Builtin ids never collide, so failures
/// here would be a programming error and are only logged.
pub fn register_builtins(registry: &mut PluginRegistry) {
    let builtins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(Brightness::new()),
        Arc::new(Invert::new()),
        Arc::new(Tint::new()),
        Arc::new(Mirror::new()),
        Arc::new(Strobe::new()),
        Arc::new(SolidColor::new()),
        Arc::new(Rainbow::new()),
        Arc::new(Gradient::new()),
        Arc::new(Chase::new()),
        Arc::new(Crossfade::new()),
    ];
    let blends = BlendMode::all()
        .iter()
        .map(|mode| Arc::new(BlendPlugin::new(*mode)) as Arc<dyn Plugin>);

    for plugin in builtins.into_iter().chain(blends) {
        if let Err(e) = registry.register(plugin) {
            tracing::error!("Failed to register builtin plugin: {}", e);
        }
    }
}

fn scale(v: u8, factor: f32) -> u8 {
    (v as f32 * factor).round().clamp(0.0, 255.0) as u8
}

/// Multiply every channel by `level`
pub struct Brightness {
    descriptor: PluginDescriptor,
}

impl Brightness {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "brightness",
                "Brightness",
                PluginKind::Effect,
                vec![ParamSpec::float("level", 0.0, 4.0, 1.0)],
            ),
        }
    }
}

impl Plugin for Brightness {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        _ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let level = params.float("level");
        Ok(inputs[0].map_pixels(|[r, g, b]| [scale(r, level), scale(g, level), scale(b, level)]))
    }
}

/// Invert colors, optionally blended with the original by `amount`
pub struct Invert {
    descriptor: PluginDescriptor,
}

impl Invert {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "invert",
                "Invert",
                PluginKind::Effect,
                vec![ParamSpec::float("amount", 0.0, 1.0, 1.0)],
            ),
        }
    }
}

impl Plugin for Invert {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        _ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let amount = params.float("amount");
        let mix = |v: u8| {
            let inv = 255.0 - v as f32;
            (v as f32 * (1.0 - amount) + inv * amount).round() as u8
        };
        Ok(inputs[0].map_pixels(|[r, g, b]| [mix(r), mix(g), mix(b)]))
    }
}

/// Multiply by a color
pub struct Tint {
    descriptor: PluginDescriptor,
}

impl Tint {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "tint",
                "Tint",
                PluginKind::Effect,
                vec![ParamSpec::color("color", [255, 255, 255])],
            ),
        }
    }
}

impl Plugin for Tint {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        _ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let [tr, tg, tb] = params.color("color");
        let mul = |v: u8, t: u8| ((v as u16 * t as u16 + 127) / 255) as u8;
        Ok(inputs[0].map_pixels(|[r, g, b]| [mul(r, tr), mul(g, tg), mul(b, tb)]))
    }
}

/// Mirror horizontally and/or vertically
pub struct Mirror {
    descriptor: PluginDescriptor,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "mirror",
                "Mirror",
                PluginKind::Effect,
                vec![
                    ParamSpec::boolean("horizontal", true),
                    ParamSpec::boolean("vertical", false),
                ],
            ),
        }
    }
}

impl Plugin for Mirror {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        _ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let input = inputs[0];
        let (w, h) = input.size();
        let horizontal = params.bool("horizontal");
        let vertical = params.bool("vertical");
        Ok(CanvasFrame::from_fn(w, h, |x, y| {
            let sx = if horizontal { w - 1 - x } else { x };
            let sy = if vertical { h - 1 - y } else { y };
            input.pixel(sx, sy)
        }))
    }
}

/// Blank every other period of `period` frames
pub struct Strobe {
    descriptor: PluginDescriptor,
}

impl Strobe {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "strobe",
                "Strobe",
                PluginKind::Effect,
                vec![ParamSpec::int("period", 1, 120, 4)],
            ),
        }
    }
}

impl Plugin for Strobe {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let period = params.int("period").max(1) as u64;
        if (ctx.frame_index / period) % 2 == 0 {
            Ok(inputs[0].clone())
        } else {
            let (w, h) = inputs[0].size();
            Ok(CanvasFrame::black(w, h))
        }
    }
}

/// Single color generator
pub struct SolidColor {
    descriptor: PluginDescriptor,
}

impl SolidColor {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "solid_color",
                "Solid Color",
                PluginKind::Generator,
                vec![ParamSpec::color("color", [255, 255, 255])],
            ),
        }
    }
}

impl Plugin for SolidColor {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        _inputs: &[&CanvasFrame],
        params: &ParamValues,
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        Ok(CanvasFrame::solid(ctx.width, ctx.height, params.color("color")))
    }
}

/// Convert HSV (all in 0..1) to RGB8
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = h.rem_euclid(1.0) * 6.0;
    let i = h.floor() as u32 % 6;
    let f = h - h.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

/// Horizontal hue sweep scrolling over time
pub struct Rainbow {
    descriptor: PluginDescriptor,
}

impl Rainbow {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "rainbow",
                "Rainbow",
                PluginKind::Generator,
                vec![
                    ParamSpec::float("speed", -10.0, 10.0, 0.25),
                    ParamSpec::float("scale", 0.01, 10.0, 1.0),
                    ParamSpec::float("saturation", 0.0, 1.0, 1.0),
                ],
            ),
        }
    }
}

impl Plugin for Rainbow {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        _inputs: &[&CanvasFrame],
        params: &ParamValues,
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let speed = params.float("speed");
        let scale = params.float("scale");
        let saturation = params.float("saturation");
        let offset = (ctx.time_secs() as f32) * speed;
        let width = ctx.width.max(1) as f32;
        Ok(CanvasFrame::from_fn(ctx.width, ctx.height, |x, _| {
            hsv_to_rgb(x as f32 / width * scale + offset, saturation, 1.0)
        }))
    }
}

/// Linear gradient between two colors
pub struct Gradient {
    descriptor: PluginDescriptor,
}

impl Gradient {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "gradient",
                "Gradient",
                PluginKind::Generator,
                vec![
                    ParamSpec::color("start", [0, 0, 0]),
                    ParamSpec::color("end", [255, 255, 255]),
                    ParamSpec::boolean("vertical", false),
                ],
            ),
        }
    }
}

impl Plugin for Gradient {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        _inputs: &[&CanvasFrame],
        params: &ParamValues,
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let start = params.color("start");
        let end = params.color("end");
        let vertical = params.bool("vertical");
        let span = if vertical { ctx.height } else { ctx.width }.saturating_sub(1).max(1) as f32;
        Ok(CanvasFrame::from_fn(ctx.width, ctx.height, |x, y| {
            let t = if vertical { y } else { x } as f32 / span;
            let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            [lerp(start[0], end[0]), lerp(start[1], end[1]), lerp(start[2], end[2])]
        }))
    }
}

/// A lit band moving across the canvas, one column per frame
pub struct Chase {
    descriptor: PluginDescriptor,
}

impl Chase {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "chase",
                "Chase",
                PluginKind::Generator,
                vec![
                    ParamSpec::color("color", [255, 255, 255]),
                    ParamSpec::int("width", 1, 1024, 1),
                ],
            ),
        }
    }
}

impl Plugin for Chase {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        _inputs: &[&CanvasFrame],
        params: &ParamValues,
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let color = params.color("color");
        let band = params.int("width").max(1) as u64;
        let width = ctx.width.max(1) as u64;
        let head = ctx.frame_index % width;
        Ok(CanvasFrame::from_fn(ctx.width, ctx.height, |x, _| {
            let behind = (head + width - x as u64) % width;
            if behind < band {
                color
            } else {
                [0, 0, 0]
            }
        }))
    }
}

/// Linear mix from input 0 to input 1 by `progress`
pub struct Crossfade {
    descriptor: PluginDescriptor,
}

impl Crossfade {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(
                "crossfade",
                "Crossfade",
                PluginKind::Transition,
                vec![ParamSpec::float("progress", 0.0, 1.0, 0.0)],
            ),
        }
    }
}

impl Plugin for Crossfade {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        _ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let t = params.float("progress");
        let lerp = |a: u8, b: u8| (a as f32 * (1.0 - t) + b as f32 * t).round() as u8;
        Ok(inputs[0].zip_map(inputs[1], |a, b| {
            [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2])]
        }))
    }
}

/// Layer blend as a two-input plugin: input 0 is the accumulator, input 1
/// the layer contribution. `opacity` mixes the blended result back over the
/// accumulator.
pub struct BlendPlugin {
    mode: BlendMode,
    descriptor: PluginDescriptor,
}

impl BlendPlugin {
    pub fn new(mode: BlendMode) -> Self {
        Self {
            mode,
            descriptor: PluginDescriptor::new(
                mode.plugin_id(),
                mode.name(),
                PluginKind::Transition,
                vec![ParamSpec::float("opacity", 0.0, 1.0, 1.0)],
            ),
        }
    }
}

impl Plugin for BlendPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        _ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let opacity = params.float("opacity");
        Ok(inputs[0].zip_map(inputs[1], |base, top| {
            self.mode.blend_pixel(base, top, opacity)
        }))
    }
}
