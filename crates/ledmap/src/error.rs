//! Show-level errors

use ledmap_control::ControlError;
use ledmap_core::ConfigError;
use ledmap_io::IoError;
use ledmap_media::MediaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShowError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Io(#[from] IoError),

    /// A topology change was rejected; the current topology stays active
    #[error("topology rejected: {}", describe(.0))]
    TopologyRejected(Vec<ConfigError>),

    #[error("No recording in progress")]
    NotRecording,

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

fn describe(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ShowError>;
