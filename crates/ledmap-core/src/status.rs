//! Status snapshot types
//!
//! Everything here is plain serializable data so a control surface can poll it
//! or have it pushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clip::ClipId;
use crate::events::PlayerId;
use crate::layer::BlendMode;
use crate::output::OutputId;

/// Player state machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Synchronization role of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRole {
    Master,
    Slave,
    #[default]
    Autonomous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectStatus {
    pub plugin: String,
    /// Failure that disabled this effect
    pub disabled: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStatus {
    pub id: u64,
    pub ordinal: usize,
    pub name: String,
    pub blend_mode: BlendMode,
    pub opacity: f32,
    pub enabled: bool,
    pub source: String,
    pub effects: Vec<EffectStatus>,
    /// Source failure on the most recent tick
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub id: PlayerId,
    pub name: String,
    pub state: PlayState,
    pub role: SyncRole,
    pub clip_index: Option<usize>,
    pub clip_id: Option<ClipId>,
    pub clip_name: Option<String>,
    /// Source index rendered on the last tick
    pub frame_index: u64,
    pub ticks: u64,
    /// Slave waiting for the master to come back into range
    pub holding: bool,
    pub layers: Vec<LayerStatus>,
}

impl PlayerStatus {
    pub fn idle(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: PlayState::Stopped,
            role: SyncRole::Autonomous,
            clip_index: None,
            clip_id: None,
            clip_name: None,
            frame_index: 0,
            ticks: 0,
            holding: false,
            layers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputStatus {
    pub id: OutputId,
    pub name: String,
    pub active: bool,
    pub last_send: Option<DateTime<Utc>>,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    /// Frames skipped by delta encoding or rate limiting
    pub frames_suppressed: u64,
    pub errors: u64,
    pub last_error: Option<String>,
    /// Replay currently has priority on this output
    pub replay_claimed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayStatus {
    pub active: bool,
    pub name: Option<String>,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub looping: bool,
    pub speed: f64,
    pub brightness: f32,
}

/// Whole-show status at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub players: Vec<PlayerStatus>,
    pub outputs: Vec<OutputStatus>,
    pub replay: ReplayStatus,
}

impl StatusSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerStatus> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputStatus> {
        self.outputs.iter().find(|o| o.id == id)
    }
}
