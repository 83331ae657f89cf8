//! Show file
//!
//! A show file describes everything a show needs at startup: canvas, LED
//! objects, outputs, players and their playlists, plus logging. It is
//! versioned by `schema_version`; older documents are migrated once while
//! loading so the rest of the program only ever sees the current shape.
//!
//! Schema history:
//! - **1**: each clip has a single `source`
//! - **2**: each clip has a `layers` stack

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ledmap_core::{
    ClipConfig, ConfigError, EffectConfig, GeneratorBounds, LayerConfig, LedObject, LogConfig,
    OutputConfig, OutputId, PlayerConfig, PlayerId, SourceDescriptor, SyncRole, Topology,
    TransitionConfig, TransportConfig,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IoError, Result};
use crate::format::{load_document, save_document};

/// Current show schema version
pub const SHOW_SCHEMA_VERSION: u32 = 2;

/// Maximum accepted show file size (16 MB)
pub const MAX_SHOW_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Canvas dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
        }
    }
}

/// Complete show description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    pub schema_version: u32,
    pub name: String,
    pub canvas: CanvasConfig,
    /// Player rate when a player does not set its own
    pub default_fps: f64,
    /// Base directory for image sources; relative to the show file
    pub media_root: Option<PathBuf>,
    /// Status snapshot period
    pub status_interval_ms: u64,
    pub replay_tick_rate: f64,
    pub generator_bounds: GeneratorBounds,
    /// Applied to layers declared without an effect chain
    pub default_effects: Vec<EffectConfig>,
    pub objects: Vec<LedObject>,
    pub outputs: Vec<OutputConfig>,
    pub players: Vec<PlayerConfig>,
    pub logging: LogConfig,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            schema_version: SHOW_SCHEMA_VERSION,
            name: "Untitled Show".to_string(),
            canvas: CanvasConfig::default(),
            default_fps: 30.0,
            media_root: None,
            status_interval_ms: 1000,
            replay_tick_rate: 44.0,
            generator_bounds: GeneratorBounds::default(),
            default_effects: Vec::new(),
            objects: Vec::new(),
            outputs: Vec::new(),
            players: Vec::new(),
            logging: LogConfig::default(),
        }
    }
}

impl ShowConfig {
    /// Validate objects and outputs. Rejected entries are left out and
    /// returned.
    pub fn build_topology(&self) -> (Topology, Vec<ConfigError>) {
        Topology::build(
            self.canvas.width,
            self.canvas.height,
            self.objects.clone(),
            self.outputs.clone(),
        )
    }

    /// Player entries that cannot be started
    pub fn player_errors(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut ids = HashSet::new();
        let mut masters = 0;
        for player in &self.players {
            if !ids.insert(player.id) {
                errors.push(ConfigError::Duplicate {
                    kind: "player",
                    id: player.id.to_string(),
                });
            }
            if player.fps < 0.0 || !player.fps.is_finite() {
                errors.push(ConfigError::Invalid {
                    entry: format!("player {}", player.id),
                    reason: format!("fps {} is not a valid rate", player.fps),
                });
            }
            if player.role == SyncRole::Master {
                masters += 1;
                if masters > 1 {
                    errors.push(ConfigError::Invalid {
                        entry: format!("player {}", player.id),
                        reason: "only one player can be master".to_string(),
                    });
                }
            }
        }
        errors
    }
}

/// Load a show file, migrating older schema versions.
///
/// A relative (or missing) `media_root` is resolved against the directory
/// containing the show file.
pub fn load_show(path: &Path) -> Result<ShowConfig> {
    let document: ShowDocument = load_document(path, MAX_SHOW_FILE_SIZE)?;
    let mut show = document.migrate()?;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    show.media_root = Some(match show.media_root.take() {
        Some(root) if root.is_absolute() => root,
        Some(root) => base.join(root),
        None => base,
    });

    info!(
        "Loaded show '{}' from {}: {} objects, {} outputs, {} players",
        show.name,
        path.display(),
        show.objects.len(),
        show.outputs.len(),
        show.players.len()
    );
    Ok(show)
}

/// Save a show file in the current schema version.
pub fn save_show(show: &ShowConfig, path: &Path) -> Result<()> {
    let mut show = show.clone();
    show.schema_version = SHOW_SCHEMA_VERSION;
    save_document(&show, path)
}

/// Show file as written on disk, any supported version
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ShowDocument {
    /// Absent in files written before versioning
    schema_version: Option<u32>,
    name: String,
    canvas: CanvasConfig,
    default_fps: f64,
    media_root: Option<PathBuf>,
    status_interval_ms: u64,
    replay_tick_rate: f64,
    generator_bounds: GeneratorBounds,
    default_effects: Vec<EffectConfig>,
    objects: Vec<LedObject>,
    outputs: Vec<OutputConfig>,
    players: Vec<PlayerDocument>,
    logging: LogConfig,
}

impl Default for ShowDocument {
    fn default() -> Self {
        let show = ShowConfig::default();
        Self {
            schema_version: None,
            name: show.name,
            canvas: show.canvas,
            default_fps: show.default_fps,
            media_root: show.media_root,
            status_interval_ms: show.status_interval_ms,
            replay_tick_rate: show.replay_tick_rate,
            generator_bounds: show.generator_bounds,
            default_effects: show.default_effects,
            objects: show.objects,
            outputs: show.outputs,
            players: Vec::new(),
            logging: show.logging,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlayerDocument {
    id: PlayerId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    fps: f64,
    #[serde(default)]
    playlist: Vec<ClipDocument>,
    #[serde(default)]
    playlist_loop: bool,
    #[serde(default)]
    role: SyncRole,
    #[serde(default)]
    outputs: Option<Vec<OutputId>>,
    #[serde(default = "default_true")]
    autoplay: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ClipDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    transport: TransportConfig,
    /// Version 1
    #[serde(default)]
    source: Option<SourceDescriptor>,
    /// Version 2
    #[serde(default)]
    layers: Option<Vec<LayerConfig>>,
    #[serde(default)]
    transition: Option<TransitionConfig>,
}

impl ShowDocument {
    fn migrate(self) -> Result<ShowConfig> {
        let version = self.schema_version.unwrap_or(1);
        if version > SHOW_SCHEMA_VERSION {
            return Err(IoError::UnsupportedVersion {
                found: version,
                supported: SHOW_SCHEMA_VERSION,
            });
        }
        if version == 0 {
            return Err(IoError::InvalidShow("schema_version 0 does not exist".into()));
        }

        let players = self
            .players
            .into_iter()
            .map(|player| player.migrate(version))
            .collect::<Result<Vec<_>>>()?;
        if version < SHOW_SCHEMA_VERSION {
            info!(
                "Migrated show '{}' from schema {} to {}",
                self.name, version, SHOW_SCHEMA_VERSION
            );
        }

        Ok(ShowConfig {
            schema_version: SHOW_SCHEMA_VERSION,
            name: self.name,
            canvas: self.canvas,
            default_fps: self.default_fps,
            media_root: self.media_root,
            status_interval_ms: self.status_interval_ms,
            replay_tick_rate: self.replay_tick_rate,
            generator_bounds: self.generator_bounds,
            default_effects: self.default_effects,
            objects: self.objects,
            outputs: self.outputs,
            players,
            logging: self.logging,
        })
    }
}

impl PlayerDocument {
    fn migrate(self, version: u32) -> Result<PlayerConfig> {
        let id = self.id;
        let playlist = self
            .playlist
            .into_iter()
            .enumerate()
            .map(|(index, clip)| {
                clip.migrate(version).map_err(|reason| {
                    IoError::InvalidShow(format!("player {} clip {}: {}", id, index, reason))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PlayerConfig {
            id,
            name: self.name,
            fps: self.fps,
            playlist,
            playlist_loop: self.playlist_loop,
            role: self.role,
            outputs: self.outputs,
            autoplay: self.autoplay,
        })
    }
}

impl ClipDocument {
    fn migrate(self, version: u32) -> std::result::Result<ClipConfig, String> {
        let layers = match (version, self.source, self.layers) {
            (1, Some(source), None) => vec![LayerConfig::new(self.name.clone(), source)],
            (1, Some(_), Some(_)) => {
                return Err("declares both `source` and `layers`".to_string());
            }
            (_, None, layers) => layers.unwrap_or_default(),
            (_, Some(_), _) => {
                return Err(format!(
                    "`source` was replaced by `layers` in schema {}",
                    SHOW_SCHEMA_VERSION
                ));
            }
        };
        Ok(ClipConfig {
            name: self.name,
            transport: self.transport,
            layers,
            transition: self.transition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const V1_TOML: &str = r#"
name = "Legacy"

[canvas]
width = 16
height = 4

[[players]]
id = 1
name = "main"

[[players.playlist]]
name = "intro"
transport = { loop_count = 2 }
source = { type = "test_pattern", frames = 48 }
"#;

    #[test]
    fn test_v1_clip_migrates_to_single_layer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.toml");
        fs::write(&path, V1_TOML).unwrap();

        let show = load_show(&path).unwrap();
        assert_eq!(show.schema_version, SHOW_SCHEMA_VERSION);
        let clip = &show.players[0].playlist[0];
        assert_eq!(clip.layers.len(), 1);
        assert_eq!(clip.layers[0].name, "intro");
        assert_eq!(
            clip.layers[0].source,
            SourceDescriptor::TestPattern { frames: 48 }
        );
        assert_eq!(clip.transport.loop_count, 2);
        assert_eq!(show.media_root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_v2_rejects_legacy_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, format!("schema_version = 2\n{}", V1_TOML)).unwrap();
        assert!(matches!(load_show(&path), Err(IoError::InvalidShow(_))));
    }

    #[test]
    fn test_newer_version_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(&path, r#"{ "schema_version": 9 }"#).unwrap();
        assert!(matches!(
            load_show(&path),
            Err(IoError::UnsupportedVersion {
                found: 9,
                supported: SHOW_SCHEMA_VERSION
            })
        ));
    }

    #[test]
    fn test_relative_media_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.json");
        fs::write(&path, r#"{ "schema_version": 2, "media_root": "media" }"#).unwrap();
        let show = load_show(&path).unwrap();
        assert_eq!(show.media_root, Some(dir.path().join("media")));
    }

    #[test]
    fn test_player_errors() {
        let mut show = ShowConfig::default();
        let mut a = PlayerConfig::new(1, "a", Vec::new());
        a.role = SyncRole::Master;
        let mut b = PlayerConfig::new(1, "b", Vec::new());
        b.role = SyncRole::Master;
        b.fps = -5.0;
        show.players = vec![a, b];

        let errors = show.player_errors();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ConfigError::Duplicate { kind: "player", .. }));
    }
}
