//! ledmap IO - Show and recording files
//!
//! - [`show`]: versioned show file (TOML, JSON or RON) with migration of
//!   older schema versions
//! - [`recording`]: replay recordings with hex-encoded DMX frames
//! - [`format`]: extension-based format selection and size-limited reads

pub mod error;
pub mod format;
pub mod recording;
pub mod show;

pub use error::{IoError, Result};
pub use format::FileFormat;
pub use recording::{
    load_recording, save_recording, RecordingHeader, MAX_RECORDING_FILE_SIZE,
    RECORDING_FORMAT_VERSION,
};
pub use show::{
    load_show, save_show, CanvasConfig, ShowConfig, MAX_SHOW_FILE_SIZE, SHOW_SCHEMA_VERSION,
};
