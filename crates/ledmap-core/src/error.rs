//! Error types for the core domain model
//!
//! The per-tick failure classes (`SourceError`, `PluginError`) are kept as
//! standalone enums so the unit that raised them can contain them; only
//! construction-time failures travel out through `CoreError`.

use thiserror::Error;

use crate::plugin::{ParamType, PluginKind};

/// Failure producing a frame from a source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Requested index is beyond the end of a finite source
    #[error("source exhausted at frame {index} (length {length})")]
    Exhausted { index: u64, length: u64 },

    /// Decoding or loading failed
    #[error("decode failed: {0}")]
    Decode(String),

    /// Source could not be opened at all
    #[error("failed to open source: {0}")]
    Open(String),

    /// Live feed has not delivered a frame yet
    #[error("no frame available from live feed '{0}'")]
    NoFrame(String),

    /// Generator plugin failed
    #[error("generator failed: {0}")]
    Generator(String),
}

/// Rejected topology or show configuration entry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An LED object needs more channels than its universes provide
    #[error("object '{object}' needs {needed} pixels but its universes hold {available}")]
    CapacityExceeded {
        object: String,
        needed: usize,
        available: usize,
    },

    /// Start channel outside 1..=512
    #[error("object '{object}' has invalid start channel {channel} (must be 1-512)")]
    InvalidStartChannel { object: String, channel: u16 },

    /// Sample point lies outside the canvas
    #[error("object '{object}' point ({x}, {y}) is outside the {width}x{height} canvas")]
    PointOutsideCanvas {
        object: String,
        x: f32,
        y: f32,
        width: u32,
        height: u32,
    },

    /// Universe is claimed by more than one output
    #[error("universe {universe} of output {output} is already routed to output {owner}")]
    UniverseConflict { universe: u16, output: u64, owner: u64 },

    /// Universe outside the 15-bit Art-Net port-address range
    #[error("universe {0} exceeds the Art-Net port-address range")]
    UniverseOutOfRange(u16),

    /// Destination is not a valid address
    #[error("output {output} has invalid destination '{destination}'")]
    InvalidDestination { output: u64, destination: String },

    /// Duplicate identifier
    #[error("duplicate {kind} id {id}")]
    Duplicate { kind: &'static str, id: String },

    /// Catch-all for malformed entries
    #[error("invalid {entry}: {reason}")]
    Invalid { entry: String, reason: String },
}

/// Failure registering, configuring or running a plugin
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("plugin id '{0}' is already registered")]
    DuplicateId(String),

    #[error("plugin '{plugin}' declares an invalid schema: {reason}")]
    InvalidSchema { plugin: String, reason: String },

    #[error("plugin '{plugin}' has no parameter '{name}'")]
    UnknownParameter { plugin: String, name: String },

    #[error("parameter '{name}' of plugin '{plugin}' expects {expected:?}")]
    TypeMismatch {
        plugin: String,
        name: String,
        expected: ParamType,
    },

    #[error("plugin '{plugin}' is a {found:?} plugin, expected {expected:?}")]
    KindMismatch {
        plugin: String,
        expected: PluginKind,
        found: PluginKind,
    },

    #[error("plugin '{plugin}' takes {expected} input frame(s), got {got}")]
    Arity {
        plugin: String,
        expected: usize,
        got: usize,
    },

    #[error("plugin '{plugin}' failed: {reason}")]
    Apply { plugin: String, reason: String },
}

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Trim window would be empty or out of range
    #[error("invalid trim window {in_point}..{out_point} for {total} frames")]
    InvalidTrim {
        in_point: u64,
        out_point: u64,
        total: u64,
    },

    /// Frame buffer does not match its declared size
    #[error("frame size mismatch: expected {expected} bytes, got {actual} bytes")]
    FrameSizeMismatch { expected: usize, actual: usize },

    /// Recording timestamps must be non-decreasing
    #[error("recording frame {index} goes back in time ({timestamp}s)")]
    NonMonotonicRecording { index: usize, timestamp: f64 },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl CoreError {
    /// Shorthand for a lookup miss.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidTrim {
            in_point: 40,
            out_point: 10,
            total: 100,
        };
        assert_eq!(err.to_string(), "invalid trim window 40..10 for 100 frames");
    }

    #[test]
    fn test_config_error_names_object() {
        let err = ConfigError::CapacityExceeded {
            object: "bar-left".to_string(),
            needed: 200,
            available: 170,
        };
        let msg = err.to_string();
        assert!(msg.contains("bar-left"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_source_error_converts() {
        let err: CoreError = SourceError::Decode("bad png".to_string()).into();
        assert!(matches!(err, CoreError::Source(SourceError::Decode(_))));
    }
}
