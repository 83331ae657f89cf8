//! Error types for network output
use ledmap_core::{CoreError, OutputId};
use thiserror::Error;

/// Output and replay errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// A socket failed; the output skips this tick and retries on the next
    #[error("Transmission error on output {output}: {message}")]
    Transmission { output: OutputId, message: String },

    /// Destination cannot be resolved to a socket address
    #[error("Invalid destination for output {output}: {destination}")]
    InvalidDestination {
        output: OutputId,
        destination: String,
    },

    #[error("Output {0} not found")]
    OutputNotFound(OutputId),

    #[error("No recording loaded")]
    NoRecording,

    #[error("Malformed Art-Net packet: {0}")]
    MalformedPacket(String),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
