//! Still image source
//!
//! Images are decoded once with the `image` crate and scaled to the canvas on
//! first use. The scaled frame is cached per canvas size.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage};
use ledmap_core::{CanvasFrame, FrameCount, FrameSource, SourceError};
use tracing::info;

use crate::{MediaError, Result};

/// Scale a decoded image to exactly `width` x `height`.
pub(crate) fn fit_image(image: &DynamicImage, width: u32, height: u32) -> CanvasFrame {
    if width == 0 || height == 0 {
        return CanvasFrame::black(width, height);
    }
    let rgb = if image.width() == width && image.height() == height {
        image.to_rgb8()
    } else {
        image.resize_exact(width, height, FilterType::Triangle).to_rgb8()
    };
    match CanvasFrame::from_rgb(width, height, rgb.into_raw()) {
        Ok(frame) => frame,
        Err(_) => CanvasFrame::black(width, height),
    }
}

/// Check if a file is a supported image format
pub fn is_supported_image(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext_str = ext.to_string_lossy().to_lowercase();
        matches!(
            ext_str.as_str(),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "webp"
        )
    } else {
        false
    }
}

/// A single image held for a fixed number of frames
pub struct StillImageSource {
    image: DynamicImage,
    description: String,
    frames: u64,
    fps: f64,
    cached: Option<CanvasFrame>,
}

impl std::fmt::Debug for StillImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StillImageSource")
            .field("description", &self.description)
            .field("frames", &self.frames)
            .finish()
    }
}

impl StillImageSource {
    /// Load a still image from a file
    pub fn open<P: AsRef<Path>>(path: P, frames: u64, fps: f64) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MediaError::FileOpen(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let image = image::open(path)
            .map_err(|e| MediaError::DecoderError(format!("Failed to load image: {}", e)))?;

        info!(
            "Still image loaded: {}x{} from {}",
            image.width(),
            image.height(),
            path.display()
        );

        Ok(Self::from_image(image, path.display().to_string(), frames, fps))
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: DynamicImage, description: String, frames: u64, fps: f64) -> Self {
        Self {
            image,
            description,
            frames: frames.max(1),
            fps,
            cached: None,
        }
    }
}

impl FrameSource for StillImageSource {
    fn frame_count(&self) -> FrameCount {
        FrameCount::Finite(self.frames)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_at(&mut self, index: u64, width: u32, height: u32) -> std::result::Result<CanvasFrame, SourceError> {
        if index >= self.frames {
            return Err(SourceError::Exhausted {
                index,
                length: self.frames,
            });
        }
        if let Some(frame) = &self.cached {
            if frame.size() == (width, height) {
                return Ok(frame.clone());
            }
        }
        let frame = fit_image(&self.image, width, height);
        self.cached = Some(frame.clone());
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("image {}", self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_still_image_scaled_and_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])).save(&path).unwrap();

        let mut source = StillImageSource::open(&path, 5, 30.0).unwrap();
        assert_eq!(source.frame_count(), FrameCount::Finite(5));
        let frame = source.frame_at(4, 2, 2).unwrap();
        assert_eq!(frame.size(), (2, 2));
        assert_eq!(frame.pixel(1, 1), [255, 0, 0]);
        assert!(source.frame_at(5, 2, 2).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = StillImageSource::open("/nonexistent/image.png", 1, 30.0).unwrap_err();
        assert!(matches!(err, MediaError::FileOpen(_)));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_image(Path::new("a.PNG")));
        assert!(is_supported_image(Path::new("b.jpeg")));
        assert!(!is_supported_image(Path::new("c.txt")));
    }
}
