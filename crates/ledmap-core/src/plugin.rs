//! Plugin contract: effects, generators and transitions
//!
//! Every frame transform in the engine is a [`Plugin`] resolved by a stable
//! string id through a [`PluginRegistry`]. Each plugin declares a parameter
//! schema which the registry validates once at registration time; live
//! [`PluginInstance`]s then hold the current parameter values and can be
//! mutated between frames without restarting anything.
//!
//! Registries are constructed explicitly and injected where needed, so tests
//! can start from an empty or builtin-only registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::frame::CanvasFrame;

/// What a plugin does with frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// One frame in, one frame out
    Effect,
    /// No input, produces a frame for the requested index
    Generator,
    /// Two frames in (from, to), one frame out
    Transition,
}

impl PluginKind {
    /// Number of input frames `apply` expects
    pub fn arity(&self) -> usize {
        match self {
            PluginKind::Effect => 1,
            PluginKind::Generator => 0,
            PluginKind::Transition => 2,
        }
    }
}

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Float,
    Int,
    Bool,
    Color,
}

/// Parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Color([u8; 3]),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Color(_) => ParamType::Color,
        }
    }

    /// Convert to `ty` where the conversion is lossless enough to be
    /// unambiguous (numbers convert between int and float).
    fn coerce(self, ty: ParamType) -> Option<ParamValue> {
        match (self, ty) {
            (ParamValue::Float(v), ParamType::Float) => Some(ParamValue::Float(v)),
            (ParamValue::Int(v), ParamType::Float) => Some(ParamValue::Float(v as f32)),
            (ParamValue::Int(v), ParamType::Int) => Some(ParamValue::Int(v)),
            (ParamValue::Float(v), ParamType::Int) => Some(ParamValue::Int(v.round() as i64)),
            (ParamValue::Bool(v), ParamType::Bool) => Some(ParamValue::Bool(v)),
            (ParamValue::Color(v), ParamType::Color) => Some(ParamValue::Color(v)),
            _ => None,
        }
    }
}

/// Schema entry for one plugin parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    /// Lower bound for numeric parameters
    pub min: f32,
    /// Upper bound for numeric parameters
    pub max: f32,
    pub default: ParamValue,
}

impl ParamSpec {
    pub fn float(name: &str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name: name.to_string(),
            ty: ParamType::Float,
            min,
            max,
            default: ParamValue::Float(default),
        }
    }

    pub fn int(name: &str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name: name.to_string(),
            ty: ParamType::Int,
            min: min as f32,
            max: max as f32,
            default: ParamValue::Int(default),
        }
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            ty: ParamType::Bool,
            min: 0.0,
            max: 1.0,
            default: ParamValue::Bool(default),
        }
    }

    pub fn color(name: &str, default: [u8; 3]) -> Self {
        Self {
            name: name.to_string(),
            ty: ParamType::Color,
            min: 0.0,
            max: 255.0,
            default: ParamValue::Color(default),
        }
    }

    /// Check that name, range and default agree.
    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("parameter with empty name".to_string());
        }
        if self.default.param_type() != self.ty {
            return Err(format!("default of '{}' is not a {:?}", self.name, self.ty));
        }
        if !(self.min <= self.max) {
            return Err(format!("'{}' has min > max", self.name));
        }
        let in_range = match self.default {
            ParamValue::Float(v) => v >= self.min && v <= self.max,
            ParamValue::Int(v) => (v as f32) >= self.min && (v as f32) <= self.max,
            _ => true,
        };
        if !in_range {
            return Err(format!("default of '{}' lies outside its range", self.name));
        }
        Ok(())
    }

    /// Type-check and clamp a value against this spec.
    fn accept(&self, plugin: &str, value: ParamValue) -> Result<ParamValue, PluginError> {
        let value = value
            .coerce(self.ty)
            .ok_or_else(|| PluginError::TypeMismatch {
                plugin: plugin.to_string(),
                name: self.name.clone(),
                expected: self.ty,
            })?;
        Ok(match value {
            ParamValue::Float(v) if v.is_nan() => self.default,
            ParamValue::Float(v) => ParamValue::Float(v.clamp(self.min, self.max)),
            ParamValue::Int(v) => ParamValue::Int(v.clamp(self.min as i64, self.max as i64)),
            other => other,
        })
    }
}

/// Identity and schema of a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// Stable registry key, e.g. `"brightness"`
    pub id: String,
    pub name: String,
    pub kind: PluginKind,
    pub params: Vec<ParamSpec>,
}

impl PluginDescriptor {
    pub fn new(id: &str, name: &str, kind: PluginKind, params: Vec<ParamSpec>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Current parameter values of an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamValues(BTreeMap<String, ParamValue>);

impl ParamValues {
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(ParamValue::Float(v)) => v,
            Some(ParamValue::Int(v)) => v as f32,
            _ => 0.0,
        }
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.get(name) {
            Some(ParamValue::Int(v)) => v,
            Some(ParamValue::Float(v)) => v as i64,
            _ => 0,
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ParamValue::Bool(true)))
    }

    pub fn color(&self, name: &str) -> [u8; 3] {
        match self.get(name) {
            Some(ParamValue::Color(c)) => c,
            _ => [0, 0, 0],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

/// Per-call information for plugins whose output depends on time or size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub width: u32,
    pub height: u32,
    /// Source frame index being produced
    pub frame_index: u64,
    /// Source frame rate, used to turn indices into seconds
    pub fps: f64,
}

impl RenderContext {
    pub fn new(width: u32, height: u32, frame_index: u64, fps: f64) -> Self {
        Self {
            width,
            height,
            frame_index,
            fps,
        }
    }

    /// Seconds since frame 0
    pub fn time_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_index as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// The capability every effect, generator and transition implements.
///
/// `inputs` holds exactly `kind().arity()` frames; the instance wrapper checks
/// this before calling.
pub trait Plugin: Send + Sync + 'static {
    fn descriptor(&self) -> &PluginDescriptor;

    fn apply(
        &self,
        inputs: &[&CanvasFrame],
        params: &ParamValues,
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError>;
}

/// Live, mutable use of a plugin inside a chain
#[derive(Clone)]
pub struct PluginInstance {
    plugin: Arc<dyn Plugin>,
    params: ParamValues,
    /// Set when `apply` failed; the instance then passes frames through.
    failure: Option<String>,
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id())
            .field("params", &self.params)
            .field("failure", &self.failure)
            .finish()
    }
}

impl PluginInstance {
    /// Instantiate with schema defaults.
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        let mut params = ParamValues::default();
        for spec in &plugin.descriptor().params {
            params.set(spec.name.clone(), spec.default);
        }
        Self {
            plugin,
            params,
            failure: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.plugin.descriptor().id
    }

    pub fn kind(&self) -> PluginKind {
        self.plugin.descriptor().kind
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        self.plugin.descriptor()
    }

    pub fn params(&self) -> &ParamValues {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name)
    }

    /// Update a parameter; takes effect on the next frame produced.
    pub fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), PluginError> {
        let descriptor = self.plugin.descriptor();
        let spec = descriptor
            .param(name)
            .ok_or_else(|| PluginError::UnknownParameter {
                plugin: descriptor.id.clone(),
                name: name.to_string(),
            })?;
        let value = spec.accept(&descriptor.id, value)?;
        self.params.set(name, value);
        Ok(())
    }

    /// Apply several parameters, stopping at the first invalid one.
    pub fn set_params<'a>(
        &mut self,
        values: impl IntoIterator<Item = (&'a String, &'a ParamValue)>,
    ) -> Result<(), PluginError> {
        for (name, value) in values {
            self.set_param(name, *value)?;
        }
        Ok(())
    }

    /// Why this instance was disabled, if it was.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_disabled(&self) -> bool {
        self.failure.is_some()
    }

    /// Re-enable an instance after a failure.
    pub fn reset_failure(&mut self) {
        self.failure = None;
    }

    /// Run the plugin without containment.
    pub fn try_apply(
        &self,
        inputs: &[&CanvasFrame],
        ctx: &RenderContext,
    ) -> Result<CanvasFrame, PluginError> {
        let descriptor = self.plugin.descriptor();
        let expected = descriptor.kind.arity();
        if inputs.len() != expected {
            return Err(PluginError::Arity {
                plugin: descriptor.id.clone(),
                expected,
                got: inputs.len(),
            });
        }
        self.plugin.apply(inputs, &self.params, ctx)
    }

    /// Run an effect with failure containment.
    ///
    /// A disabled instance returns its input unchanged. A failing instance is
    /// disabled for subsequent frames and returns its input for this one.
    /// The returned flag is true only on the call that disabled it.
    pub fn apply_contained(&mut self, frame: &CanvasFrame, ctx: &RenderContext) -> (CanvasFrame, bool) {
        if self.failure.is_some() {
            return (frame.clone(), false);
        }
        match self.try_apply(&[frame], ctx) {
            Ok(out) => (out, false),
            Err(e) => {
                warn!("Disabling plugin '{}': {}", self.id(), e);
                self.failure = Some(e.to_string());
                (frame.clone(), true)
            }
        }
    }
}

/// Plugins available to the process, keyed by stable id
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.plugins.keys().collect();
        ids.sort();
        f.debug_struct("PluginRegistry").field("plugins", &ids).finish()
    }
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the builtin plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::effects::register_builtins(&mut registry);
        info!("Plugin registry ready with {} builtins", registry.len());
        registry
    }

    /// Register a plugin after validating its descriptor.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let descriptor = plugin.descriptor();
        let invalid = |reason: String| PluginError::InvalidSchema {
            plugin: descriptor.id.clone(),
            reason,
        };

        if descriptor.id.is_empty() {
            return Err(invalid("empty id".to_string()));
        }
        if self.plugins.contains_key(&descriptor.id) {
            return Err(PluginError::DuplicateId(descriptor.id.clone()));
        }
        for (i, spec) in descriptor.params.iter().enumerate() {
            spec.validate().map_err(invalid)?;
            if descriptor.params[..i].iter().any(|p| p.name == spec.name) {
                return Err(invalid(format!("parameter '{}' declared twice", spec.name)));
            }
        }

        self.plugins.insert(descriptor.id.clone(), plugin);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// New instance with schema defaults
    pub fn instantiate(&self, id: &str) -> Result<PluginInstance, PluginError> {
        self.get(id)
            .map(PluginInstance::new)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))
    }

    /// New instance of a plugin of the given kind, with initial parameters.
    pub fn instantiate_as(
        &self,
        id: &str,
        kind: PluginKind,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<PluginInstance, PluginError> {
        let mut instance = self.instantiate(id)?;
        if instance.kind() != kind {
            return Err(PluginError::KindMismatch {
                plugin: id.to_string(),
                expected: kind,
                found: instance.kind(),
            });
        }
        instance.set_params(params)?;
        Ok(instance)
    }

    /// Sorted ids of all plugins of one kind
    pub fn ids(&self, kind: PluginKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .plugins
            .values()
            .filter(|p| p.descriptor().kind == kind)
            .map(|p| p.descriptor().id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing {
        descriptor: PluginDescriptor,
    }

    impl Plugin for Failing {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn apply(
            &self,
            _inputs: &[&CanvasFrame],
            _params: &ParamValues,
            _ctx: &RenderContext,
        ) -> Result<CanvasFrame, PluginError> {
            Err(PluginError::Apply {
                plugin: self.descriptor.id.clone(),
                reason: "boom".to_string(),
            })
        }
    }

    fn failing(id: &str, params: Vec<ParamSpec>) -> Arc<dyn Plugin> {
        Arc::new(Failing {
            descriptor: PluginDescriptor::new(id, "Failing", PluginKind::Effect, params),
        })
    }

    #[test]
    fn test_register_rejects_bad_schema() {
        let mut registry = PluginRegistry::new();
        let bad_default = failing("bad", vec![ParamSpec::float("gain", 0.0, 1.0, 2.0)]);
        assert!(matches!(
            registry.register(bad_default),
            Err(PluginError::InvalidSchema { .. })
        ));

        let dup_param = failing(
            "dup",
            vec![
                ParamSpec::float("gain", 0.0, 1.0, 0.5),
                ParamSpec::boolean("gain", false),
            ],
        );
        assert!(registry.register(dup_param).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut registry = PluginRegistry::new();
        registry.register(failing("fx", vec![])).unwrap();
        assert_eq!(
            registry.register(failing("fx", vec![])),
            Err(PluginError::DuplicateId("fx".to_string()))
        );
    }

    #[test]
    fn test_set_param_clamps_and_type_checks() {
        let mut registry = PluginRegistry::new();
        registry
            .register(failing(
                "fx",
                vec![
                    ParamSpec::float("gain", 0.0, 2.0, 1.0),
                    ParamSpec::boolean("on", true),
                ],
            ))
            .unwrap();
        let mut instance = registry.instantiate("fx").unwrap();

        instance.set_param("gain", ParamValue::Float(5.0)).unwrap();
        assert_eq!(instance.param("gain"), Some(ParamValue::Float(2.0)));

        instance.set_param("gain", ParamValue::Int(1)).unwrap();
        assert_eq!(instance.param("gain"), Some(ParamValue::Float(1.0)));

        assert!(matches!(
            instance.set_param("on", ParamValue::Float(1.0)),
            Err(PluginError::TypeMismatch { .. })
        ));
        assert!(matches!(
            instance.set_param("missing", ParamValue::Bool(true)),
            Err(PluginError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_failing_instance_is_disabled_and_passes_through() {
        let mut instance = PluginInstance::new(failing("fx", vec![]));
        let frame = CanvasFrame::solid(2, 2, [1, 2, 3]);
        let ctx = RenderContext::new(2, 2, 0, 30.0);

        let (out, newly_disabled) = instance.apply_contained(&frame, &ctx);
        assert_eq!(out, frame);
        assert!(newly_disabled);
        assert!(instance.is_disabled());

        let (out, newly_disabled) = instance.apply_contained(&frame, &ctx);
        assert_eq!(out, frame);
        assert!(!newly_disabled);
    }

    #[test]
    fn test_instantiate_as_checks_kind() {
        let registry = PluginRegistry::with_builtins();
        let err = registry
            .instantiate_as("brightness", PluginKind::Generator, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PluginError::KindMismatch { .. }));
    }

    #[test]
    fn test_param_value_deserializes_untagged() {
        let v: ParamValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, ParamValue::Int(3));
        let v: ParamValue = serde_json::from_str("0.25").unwrap();
        assert_eq!(v, ParamValue::Float(0.25));
        let v: ParamValue = serde_json::from_str("[255, 0, 10]").unwrap();
        assert_eq!(v, ParamValue::Color([255, 0, 10]));
    }
}
