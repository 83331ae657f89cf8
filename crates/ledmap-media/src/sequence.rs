//! Image sequence source (directory of numbered frames)

use std::path::{Path, PathBuf};

use ledmap_core::{CanvasFrame, FrameCount, FrameSource, SourceError};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::image_decoder::{fit_image, is_supported_image};
use crate::{MediaError, Result};

/// Maximum number of frames to load in a sequence
///
/// This limit prevents memory exhaustion and long loading times when users
/// accidentally select a directory with thousands of files.
#[cfg(not(test))]
pub const MAX_SEQUENCE_FRAMES: usize = 5000;
#[cfg(test)]
pub const MAX_SEQUENCE_FRAMES: usize = 10;

/// Directory of images played back at a fixed rate
///
/// Frames are decoded lazily; the most recent one is cached so repeated
/// requests for the same index (speed < 1, hold-and-blank) are cheap.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    directory: PathBuf,
    frames: Vec<PathBuf>,
    fps: f64,
    cached: Option<(u64, CanvasFrame)>,
}

impl ImageSequenceSource {
    /// Load an image sequence from a directory
    ///
    /// # Arguments
    /// * `directory` - Path to directory containing numbered images
    /// * `fps` - Frame rate for playback (e.g., 30.0)
    pub fn open<P: AsRef<Path>>(directory: P, fps: f64) -> Result<Self> {
        let directory = directory.as_ref();

        if !directory.is_dir() {
            return Err(MediaError::FileOpen(format!(
                "Directory not found: {}",
                directory.display()
            )));
        }

        let mut frames = Vec::new();
        for entry in WalkDir::new(directory)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if frames.len() >= MAX_SEQUENCE_FRAMES {
                warn!(
                    "Image sequence exceeded limit of {} frames. Truncating sequence from {}",
                    MAX_SEQUENCE_FRAMES,
                    directory.display()
                );
                break;
            }

            let path = entry.path();
            if path.is_file() && is_supported_image(path) {
                frames.push(path.to_path_buf());
            }
        }

        if frames.is_empty() {
            return Err(MediaError::DecoderError(format!(
                "No image files found in directory: {}",
                directory.display()
            )));
        }

        info!(
            "Image sequence loaded: {} frames @ {:.2} fps from {}",
            frames.len(),
            fps,
            directory.display()
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            frames,
            fps,
            cached: None,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn frame_count(&self) -> FrameCount {
        FrameCount::Finite(self.frames.len() as u64)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, index: u64, width: u32, height: u32) -> std::result::Result<CanvasFrame, SourceError> {
        if let Some((cached_index, frame)) = &self.cached {
            if *cached_index == index && frame.size() == (width, height) {
                return Ok(frame.clone());
            }
        }

        let path = self
            .frames
            .get(index as usize)
            .ok_or(SourceError::Exhausted {
                index,
                length: self.frames.len() as u64,
            })?;
        debug!("Decoding sequence frame {}: {}", index, path.display());
        let image = image::open(path)
            .map_err(|e| SourceError::Decode(format!("{}: {}", path.display(), e)))?;

        let frame = fit_image(&image, width, height);
        self.cached = Some((index, frame.clone()));
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!(
            "image sequence {} ({} frames)",
            self.directory.display(),
            self.frames.len()
        )
    }
}
