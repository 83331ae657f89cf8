//! Error types for show and recording files.

/// Result type alias for file operations.
pub type Result<T> = std::result::Result<T, IoError>;

/// Error type for loading and saving show and recording files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// RON parse failed
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// RON serialization failed
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    /// TOML parse failed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// File extension is not one of the supported formats
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// File exceeds the size limit
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge {
        /// Actual size in bytes
        size: u64,
        /// Limit in bytes
        limit: u64,
    },

    /// Written by a newer version than this build understands
    #[error("Unsupported schema version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Newest supported version
        supported: u32,
    },

    /// Structurally valid file with invalid content
    #[error("Invalid show file: {0}")]
    InvalidShow(String),

    /// Recording payload is inconsistent
    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    /// Hex-encoded DMX data could not be decoded
    #[error("Invalid DMX data in frame {frame}: {source}")]
    Hex {
        /// Index of the offending frame
        frame: usize,
        /// Decoder error
        source: hex::FromHexError,
    },

    /// Domain validation failed
    #[error(transparent)]
    Core(#[from] ledmap_core::CoreError),
}
