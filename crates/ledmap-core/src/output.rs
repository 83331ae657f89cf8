//! Output configuration
//!
//! An output is one Art-Net destination carrying a set of universes. The
//! network side (socket, sequence numbers, delta state) lives in
//! `ledmap-control`; this is only the static description.

use serde::{Deserialize, Serialize};

/// Unique identifier for an output
pub type OutputId = u64;

/// Well-known Art-Net UDP port
pub const ARTNET_PORT: u16 = 6454;

/// Highest universe addressable by an Art-Net port-address (15 bits)
pub const MAX_UNIVERSE: u16 = 0x7FFF;

/// Delta-encoding settings for one output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    pub enabled: bool,
    /// A send is suppressed when no channel moved by more than this
    pub threshold: u8,
    /// Force a full send once this many frames passed since the last send;
    /// 0 disables
    pub full_sync_interval: u32,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0,
            full_sync_interval: 60,
        }
    }
}

/// One Art-Net destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub id: OutputId,
    #[serde(default)]
    pub name: String,
    /// `host` or `host:port`; the port defaults to 6454
    pub destination: String,
    /// Local address to bind the transmit socket to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub universes: Vec<u16>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Maximum send rate; 0 = unlimited
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,
    #[serde(default)]
    pub artsync: bool,
    #[serde(default)]
    pub delta: DeltaConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_target_fps() -> f64 {
    44.0
}

impl OutputConfig {
    /// Create an active output with default settings
    pub fn new(id: OutputId, destination: impl Into<String>, universes: Vec<u16>) -> Self {
        Self {
            id,
            name: format!("Output {}", id),
            destination: destination.into(),
            bind_address: default_bind_address(),
            universes,
            active: true,
            target_fps: default_target_fps(),
            artsync: false,
            delta: DeltaConfig::default(),
        }
    }

    /// Destination with the Art-Net port filled in if absent
    pub fn destination_addr(&self) -> String {
        if self.destination.contains(':') {
            self.destination.clone()
        } else {
            format!("{}:{}", self.destination, ARTNET_PORT)
        }
    }

    /// Minimum interval between sends, if rate limited
    pub fn min_interval(&self) -> Option<std::time::Duration> {
        if self.target_fps > 0.0 && self.target_fps.is_finite() {
            Some(std::time::Duration::from_secs_f64(1.0 / self.target_fps))
        } else {
            None
        }
    }
}
