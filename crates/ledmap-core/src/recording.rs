//! Recorded DMX timelines for replay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topology::{UniverseBuffer, UNIVERSE_SIZE};
use crate::{CoreError, Result};

/// Descriptive header of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub frame_count: usize,
    /// Timestamp of the last frame, in seconds
    pub total_duration: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Total sampled points of the topology it was recorded from
    pub point_count: usize,
    /// Universes in the order their payloads are concatenated
    pub universes: Vec<u16>,
}

/// One sample: seconds since the start and raw DMX bytes
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub timestamp: f64,
    /// Universe payloads concatenated in `RecordingMetadata::universes` order
    pub dmx_data: Vec<u8>,
}

/// Immutable recorded DMX timeline
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecording {
    metadata: RecordingMetadata,
    frames: Vec<RecordedFrame>,
}

impl ReplayRecording {
    /// Assemble a recording, checking that timestamps never go backwards.
    /// `frame_count` and `total_duration` are derived from the frames.
    pub fn new(mut metadata: RecordingMetadata, frames: Vec<RecordedFrame>) -> Result<Self> {
        let mut last = 0.0_f64;
        for (index, frame) in frames.iter().enumerate() {
            if !frame.timestamp.is_finite() || frame.timestamp < last {
                return Err(CoreError::NonMonotonicRecording {
                    index,
                    timestamp: frame.timestamp,
                });
            }
            last = frame.timestamp;
        }
        metadata.frame_count = frames.len();
        metadata.total_duration = last;
        Ok(Self { metadata, frames })
    }

    pub fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.metadata.total_duration
    }

    /// Index of the frame showing at `t` seconds: the last frame whose
    /// timestamp is not after `t`.
    pub fn index_at(&self, t: f64) -> Option<usize> {
        let after = self.frames.partition_point(|f| f.timestamp <= t);
        after.checked_sub(1)
    }

    /// Split a frame into per-universe payloads. A short final chunk is
    /// zero padded.
    pub fn universe_payloads(&self, frame: &RecordedFrame) -> Vec<(u16, UniverseBuffer)> {
        self.metadata
            .universes
            .iter()
            .zip(frame.dmx_data.chunks(UNIVERSE_SIZE))
            .map(|(universe, chunk)| {
                let mut buffer = [0u8; UNIVERSE_SIZE];
                buffer[..chunk.len()].copy_from_slice(chunk);
                (*universe, buffer)
            })
            .collect()
    }
}

/// Accumulates frames into a [`ReplayRecording`]
#[derive(Debug, Clone)]
pub struct RecordingBuilder {
    metadata: RecordingMetadata,
    frames: Vec<RecordedFrame>,
}

impl RecordingBuilder {
    pub fn new(name: impl Into<String>, canvas: (u32, u32), point_count: usize, universes: Vec<u16>) -> Self {
        Self {
            metadata: RecordingMetadata {
                name: name.into(),
                created_at: Utc::now(),
                frame_count: 0,
                total_duration: 0.0,
                canvas_width: canvas.0,
                canvas_height: canvas.1,
                point_count,
                universes,
            },
            frames: Vec::new(),
        }
    }

    pub fn universes(&self) -> &[u16] {
        &self.metadata.universes
    }

    /// Append one sample
    pub fn push(&mut self, timestamp: f64, dmx_data: Vec<u8>) {
        self.frames.push(RecordedFrame {
            timestamp,
            dmx_data,
        });
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn finish(self) -> Result<ReplayRecording> {
        ReplayRecording::new(self.metadata, self.frames)
    }
}
