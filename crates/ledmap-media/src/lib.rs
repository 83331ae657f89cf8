//! ledmap Media - Frame Sources and Playback
//!
//! This crate turns clip descriptions into frames:
//! - Frame sources: generators, still images, image sequences, test
//!   patterns, live feeds
//! - The player state machine and its paced tick loop
//! - The player manager, which also synchronizes slaves to a master

use ledmap_core::{CoreError, PluginError, SourceError};
use thiserror::Error;

pub mod generator;
pub mod image_decoder;
pub mod live;
pub mod loader;
pub mod manager;
pub mod player;
pub mod runner;
pub mod sequence;

pub use generator::{GeneratorSource, TestPatternSource};
pub use image_decoder::StillImageSource;
pub use live::{LiveFeedSender, LiveFeedSource, LiveFeeds};
pub use loader::{load_clip, open_source, SourceContext};
pub use manager::{PlayerManager, Synchronizer};
pub use player::{Player, TickReport};
pub use runner::{CommandOutput, PlayerCommand, PlayerHandle, PlayerRunner};
pub use sequence::ImageSequenceSource;

/// Media errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to open file: {0}")]
    FileOpen(String),

    #[error("Decoder error: {0}")]
    DecoderError(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Player {0} not found")]
    PlayerNotFound(u64),

    #[error("Clip index {index} out of range (playlist has {len} clips)")]
    ClipIndex { index: usize, len: usize },

    #[error("No clip loaded")]
    NoClip,

    #[error("Player {0} is not running")]
    Disconnected(u64),

    #[error("Player {0} did not answer in time")]
    Timeout(u64),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

impl From<MediaError> for SourceError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::FileOpen(msg) => SourceError::Open(msg),
            MediaError::Source(e) => e,
            other => SourceError::Decode(other.to_string()),
        }
    }
}

/// Result type for media operations
pub type Result<T> = std::result::Result<T, MediaError>;
