//! Recording file
//!
//! A recording is stored as a header followed by its frames in order. Each
//! frame carries its timestamp and the concatenated universe payloads as a
//! hex string, which keeps JSON and RON files readable and diffable.

use std::path::Path;

use chrono::{DateTime, Utc};
use ledmap_core::{RecordedFrame, RecordingMetadata, ReplayRecording, UNIVERSE_SIZE};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IoError, Result};
use crate::format::{load_document, save_document, FileFormat};

/// Current recording file version
pub const RECORDING_FORMAT_VERSION: u32 = 1;

/// Maximum accepted recording file size (256 MB)
pub const MAX_RECORDING_FILE_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub format_version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub frame_count: usize,
    pub total_duration: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub point_count: usize,
    pub universes: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FrameRecord {
    timestamp: f64,
    dmx_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RecordingFile {
    header: RecordingHeader,
    frames: Vec<FrameRecord>,
}

fn check_format(path: &Path) -> Result<()> {
    match FileFormat::from_path(path)? {
        FileFormat::Json | FileFormat::Ron => Ok(()),
        FileFormat::Toml => Err(IoError::UnsupportedFormat("toml".to_string())),
    }
}

/// Write a recording as JSON or RON, by extension.
pub fn save_recording(recording: &ReplayRecording, path: &Path) -> Result<()> {
    check_format(path)?;
    let meta = recording.metadata();
    let file = RecordingFile {
        header: RecordingHeader {
            format_version: RECORDING_FORMAT_VERSION,
            name: meta.name.clone(),
            created_at: meta.created_at,
            frame_count: meta.frame_count,
            total_duration: meta.total_duration,
            canvas_width: meta.canvas_width,
            canvas_height: meta.canvas_height,
            point_count: meta.point_count,
            universes: meta.universes.clone(),
        },
        frames: recording
            .frames()
            .iter()
            .map(|frame| FrameRecord {
                timestamp: frame.timestamp,
                dmx_data: hex::encode(&frame.dmx_data),
            })
            .collect(),
    };
    save_document(&file, path)?;
    info!(
        "Saved recording '{}' ({} frames) to {}",
        meta.name,
        meta.frame_count,
        path.display()
    );
    Ok(())
}

/// Read a recording written by [`save_recording`].
pub fn load_recording(path: &Path) -> Result<ReplayRecording> {
    check_format(path)?;
    let file: RecordingFile = load_document(path, MAX_RECORDING_FILE_SIZE)?;
    let header = file.header;

    if header.format_version > RECORDING_FORMAT_VERSION {
        return Err(IoError::UnsupportedVersion {
            found: header.format_version,
            supported: RECORDING_FORMAT_VERSION,
        });
    }
    if header.frame_count != file.frames.len() {
        return Err(IoError::InvalidRecording(format!(
            "header declares {} frames, file holds {}",
            header.frame_count,
            file.frames.len()
        )));
    }

    let frame_len = header.universes.len() * UNIVERSE_SIZE;
    let mut frames = Vec::with_capacity(file.frames.len());
    for (index, record) in file.frames.into_iter().enumerate() {
        let dmx_data = hex::decode(&record.dmx_data)
            .map_err(|source| IoError::Hex { frame: index, source })?;
        if dmx_data.len() != frame_len {
            return Err(IoError::InvalidRecording(format!(
                "frame {} carries {} bytes, expected {}",
                index,
                dmx_data.len(),
                frame_len
            )));
        }
        frames.push(RecordedFrame {
            timestamp: record.timestamp,
            dmx_data,
        });
    }

    let metadata = RecordingMetadata {
        name: header.name,
        created_at: header.created_at,
        frame_count: header.frame_count,
        total_duration: header.total_duration,
        canvas_width: header.canvas_width,
        canvas_height: header.canvas_height,
        point_count: header.point_count,
        universes: header.universes,
    };
    let recording = ReplayRecording::new(metadata, frames)?;
    info!(
        "Loaded recording '{}' ({} frames, {:.2}s) from {}",
        recording.name(),
        recording.len(),
        recording.duration(),
        path.display()
    );
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledmap_core::RecordingBuilder;
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> ReplayRecording {
        let mut builder = RecordingBuilder::new("sample", (16, 2), 20, vec![0, 1]);
        for i in 0..3u8 {
            let mut data = vec![0u8; 2 * UNIVERSE_SIZE];
            data[0] = i;
            data[UNIVERSE_SIZE] = 255 - i;
            builder.push(i as f64 * 0.25, data);
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_json_and_ron_preserve_recording() {
        let dir = tempdir().unwrap();
        let original = sample();
        for name in ["take.json", "take.ron"] {
            let path = dir.path().join(name);
            save_recording(&original, &path).unwrap();
            let loaded = load_recording(&path).unwrap();
            assert_eq!(loaded.metadata(), original.metadata(), "{}", name);
            assert_eq!(loaded.frames(), original.frames(), "{}", name);
        }
    }

    #[test]
    fn test_dmx_data_is_hex() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.json");
        save_recording(&sample(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"dmx_data\": \"02000000"));
        assert!(text.contains("\"format_version\": 1"));
    }

    #[test]
    fn test_rejects_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.toml");
        assert!(matches!(
            save_recording(&sample(), &path),
            Err(IoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rejects_inconsistent_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.json");
        save_recording(&sample(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();

        fs::write(&path, text.replace("\"frame_count\": 3", "\"frame_count\": 4")).unwrap();
        assert!(matches!(
            load_recording(&path),
            Err(IoError::InvalidRecording(_))
        ));

        fs::write(&path, text.replacen("\"dmx_data\": \"", "\"dmx_data\": \"zz", 1)).unwrap();
        assert!(matches!(
            load_recording(&path),
            Err(IoError::Hex { frame: 0, .. })
        ));
    }
}
