//! The running show
//!
//! [`ShowContext`] is built once from a [`ShowConfig`] and owns everything a
//! show needs: the plugin registry, the routing engine and its outputs, every
//! player thread, the synchronizer and the replay engine. There is no global
//! state; the control surface talks to the context.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledmap_control::{
    ControlError, DmxRecorder, OutputHub, ReplayManager, RoutedSink, RoutingEngine,
    TransportFactory, UdpTransport,
};
use ledmap_core::{
    ClipConfig, ConfigError, EventBus, LedObject, OutputConfig, OutputId, PlayState, PlayerConfig,
    PlayerId, PluginRegistry, ReplayRecording, ReplayStatus, ShowEvent, StatusSnapshot, SyncRole,
    Topology,
};
use ledmap_io::{load_recording, ShowConfig};
use ledmap_media::{
    CommandOutput, LiveFeedSender, Player, PlayerCommand, PlayerHandle, PlayerManager,
    SourceContext, Synchronizer,
};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{Result, ShowError};

pub struct ShowContext {
    name: String,
    default_fps: f64,
    status_interval: Duration,
    events: Arc<EventBus>,
    sources: Arc<SourceContext>,
    engine: Arc<RoutingEngine>,
    manager: Arc<PlayerManager>,
    synchronizer: Mutex<Option<Synchronizer>>,
    replay: Mutex<ReplayManager>,
    recorder: Mutex<Option<Arc<DmxRecorder>>>,
    /// Entries dropped while loading the show
    rejected: Vec<ConfigError>,
}

impl ShowContext {
    /// Start a show sending over UDP.
    pub fn new(show: ShowConfig) -> Result<Self> {
        Self::with_transport(show, UdpTransport::factory())
    }

    /// Start a show with a custom packet transport.
    pub fn with_transport(show: ShowConfig, transport: TransportFactory) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(PluginRegistry::with_builtins());

        let (topology, mut rejected) = show.build_topology();
        let hub = Arc::new(OutputHub::new(transport, events.clone()));
        let engine = Arc::new(RoutingEngine::new(topology, hub));

        let sources = Arc::new(SourceContext {
            bounds: show.generator_bounds,
            default_effects: show.default_effects.clone(),
            media_root: show.media_root.clone().unwrap_or_else(|| PathBuf::from(".")),
            ..SourceContext::new(registry, (show.canvas.width, show.canvas.height))
        });

        let manager = Arc::new(PlayerManager::new());
        let synchronizer = Synchronizer::spawn(manager.clone(), &events)?;
        let replay = ReplayManager::new(engine.clone(), events.clone(), show.replay_tick_rate);

        let player_errors = show.player_errors();
        for error in &player_errors {
            warn!("Show '{}': {}", show.name, error);
        }
        rejected.extend(player_errors);

        let context = Self {
            name: show.name.clone(),
            default_fps: show.default_fps,
            status_interval: Duration::from_millis(show.status_interval_ms.max(1)),
            events,
            sources,
            engine,
            manager,
            synchronizer: Mutex::new(Some(synchronizer)),
            replay: Mutex::new(replay),
            recorder: Mutex::new(None),
            rejected,
        };

        let mut started = HashSet::new();
        for player in show.players {
            if !started.insert(player.id) {
                warn!("Player {} declared twice, keeping the first", player.id);
                continue;
            }
            context.spawn_player(player)?;
        }

        info!(
            "Show '{}' started: {} players, {} outputs, {} entries rejected",
            context.name,
            context.manager.len(),
            context.engine.topology().outputs().len(),
            context.rejected.len()
        );
        Ok(context)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn status_interval(&self) -> Duration {
        self.status_interval
    }

    /// Configuration entries dropped at load
    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }

    // ===== Players =====

    /// Start a player. A zero rate takes the show default; `autoplay`
    /// starts playback immediately.
    pub fn spawn_player(&self, mut config: PlayerConfig) -> Result<PlayerHandle> {
        if !(config.fps > 0.0 && config.fps.is_finite()) {
            config.fps = self.default_fps;
        }
        let autoplay = config.autoplay;
        let sink = Arc::new(RoutedSink::new(self.engine.clone(), config.outputs.clone()));
        let player = Player::new(config, self.sources.clone(), sink, self.events.clone());
        let handle = self.manager.spawn(player)?;
        if autoplay {
            handle.play()?;
        }
        Ok(handle)
    }

    pub fn remove_player(&self, id: PlayerId) -> Result<()> {
        Ok(self.manager.remove(id)?)
    }

    pub fn player(&self, id: PlayerId) -> Result<PlayerHandle> {
        Ok(self.manager.handle(id)?)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.manager.ids()
    }

    /// Run any player command and wait for its result.
    pub fn command(&self, id: PlayerId, command: PlayerCommand) -> Result<CommandOutput> {
        Ok(self.player(id)?.execute(command)?)
    }

    pub fn play(&self, id: PlayerId) -> Result<PlayState> {
        Ok(self.player(id)?.play()?)
    }

    pub fn pause(&self, id: PlayerId) -> Result<PlayState> {
        Ok(self.player(id)?.pause()?)
    }

    pub fn stop(&self, id: PlayerId) -> Result<PlayState> {
        Ok(self.player(id)?.stop()?)
    }

    pub fn restart(&self, id: PlayerId) -> Result<PlayState> {
        Ok(self.player(id)?.restart()?)
    }

    pub fn seek(&self, id: PlayerId, frame: u64) -> Result<()> {
        self.command(id, PlayerCommand::Seek(frame)).map(|_| ())
    }

    pub fn trim(&self, id: PlayerId, in_point: u64, out_point: u64) -> Result<()> {
        self.command(
            id,
            PlayerCommand::Trim {
                in_point,
                out_point,
            },
        )
        .map(|_| ())
    }

    pub fn set_reverse(&self, id: PlayerId, reverse: bool) -> Result<()> {
        self.command(id, PlayerCommand::Reverse(reverse)).map(|_| ())
    }

    /// Append `clip` to the playlist and switch to it. Returns its index.
    pub fn load_clip(&self, id: PlayerId, clip: ClipConfig) -> Result<usize> {
        let index = match self.command(id, PlayerCommand::AppendClip(clip))? {
            CommandOutput::Created(index) => index as usize,
            other => {
                warn!("Player {}: unexpected reply to AppendClip: {:?}", id, other);
                return Ok(0);
            }
        };
        self.command(id, PlayerCommand::SelectClip(index))?;
        Ok(index)
    }

    pub fn select_clip(&self, id: PlayerId, index: usize) -> Result<()> {
        self.command(id, PlayerCommand::SelectClip(index)).map(|_| ())
    }

    // ===== Sync =====

    pub fn set_master(&self, id: PlayerId) -> Result<()> {
        Ok(self.manager.set_master(id)?)
    }

    pub fn add_slave(&self, id: PlayerId) -> Result<()> {
        Ok(self.manager.add_slave(id)?)
    }

    pub fn set_role(&self, id: PlayerId, role: SyncRole) -> Result<()> {
        Ok(self.manager.set_role(id, role)?)
    }

    pub fn clear_master(&self) {
        self.manager.clear_master();
    }

    // ===== Topology & outputs =====

    pub fn topology(&self) -> Arc<Topology> {
        self.engine.topology()
    }

    /// Validate a new object/output set and swap it in. Nothing changes if
    /// any entry is rejected.
    pub fn reload_topology(
        &self,
        objects: Vec<LedObject>,
        outputs: Vec<OutputConfig>,
    ) -> Result<()> {
        let (width, height) = self.topology().canvas_size();
        let (topology, errors) = Topology::build(width, height, objects, outputs);
        self.swap_if_valid(topology, errors)
    }

    fn swap_if_valid(&self, topology: Topology, errors: Vec<ConfigError>) -> Result<()> {
        if !errors.is_empty() {
            warn!("Topology change rejected ({} errors)", errors.len());
            return Err(ShowError::TopologyRejected(errors));
        }
        self.engine.swap_topology(topology);
        Ok(())
    }

    fn replace_outputs(&self, outputs: Vec<OutputConfig>) -> Result<()> {
        let (topology, errors) = self.topology().with_outputs(outputs);
        self.swap_if_valid(topology, errors)
    }

    pub fn outputs(&self) -> Vec<OutputConfig> {
        self.topology().outputs().to_vec()
    }

    pub fn add_output(&self, output: OutputConfig) -> Result<()> {
        let mut outputs = self.outputs();
        outputs.push(output);
        self.replace_outputs(outputs)
    }

    pub fn update_output(&self, output: OutputConfig) -> Result<()> {
        let mut outputs = self.outputs();
        let slot = outputs
            .iter_mut()
            .find(|o| o.id == output.id)
            .ok_or(ControlError::OutputNotFound(output.id))?;
        *slot = output;
        self.replace_outputs(outputs)
    }

    pub fn remove_output(&self, id: OutputId) -> Result<()> {
        let mut outputs = self.outputs();
        let before = outputs.len();
        outputs.retain(|o| o.id != id);
        if outputs.len() == before {
            return Err(ControlError::OutputNotFound(id).into());
        }
        self.replace_outputs(outputs)
    }

    /// Producer for a named live feed
    pub fn live_feed(&self, name: &str) -> LiveFeedSender {
        self.sources.feeds.sender(name)
    }

    // ===== Replay =====

    pub fn load_replay(&self, recording: ReplayRecording) {
        self.replay.lock().load(recording);
    }

    pub fn load_replay_file(&self, path: &Path) -> Result<()> {
        let recording = load_recording(path)?;
        self.load_replay(recording);
        Ok(())
    }

    pub fn start_replay(&self) -> Result<()> {
        Ok(self.replay.lock().start()?)
    }

    pub fn stop_replay(&self) {
        self.replay.lock().stop();
    }

    pub fn set_replay_loop(&self, looping: bool) {
        self.replay.lock().set_loop(looping);
    }

    pub fn toggle_replay_loop(&self) -> bool {
        self.replay.lock().toggle_loop()
    }

    pub fn set_replay_speed(&self, speed: f64) -> Result<()> {
        Ok(self.replay.lock().set_speed(speed)?)
    }

    pub fn set_replay_brightness(&self, brightness: f32) -> Result<()> {
        Ok(self.replay.lock().set_brightness(brightness)?)
    }

    pub fn replay_status(&self) -> ReplayStatus {
        self.replay.lock().status()
    }

    // ===== Recording =====

    /// Capture everything routed from now on. A capture already running is
    /// discarded.
    pub fn start_recording(&self, name: &str) {
        let topology = self.topology();
        let recorder = Arc::new(DmxRecorder::new(
            name,
            topology.canvas_size(),
            topology.point_count(),
            topology.universes(),
        ));
        self.engine.attach_recorder(recorder.clone());
        if self.recorder.lock().replace(recorder).is_some() {
            warn!("Recording restarted, previous capture discarded");
        }
        info!("Recording '{}' started", name);
    }

    pub fn stop_recording(&self) -> Result<ReplayRecording> {
        let recorder = self.recorder.lock().take().ok_or(ShowError::NotRecording)?;
        self.engine.detach_recorder();
        let recording = recorder.finish()?;
        info!(
            "Recording '{}' stopped: {} frames",
            recording.name(),
            recording.len()
        );
        Ok(recording)
    }

    // ===== Status =====

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            timestamp: Utc::now(),
            players: self.manager.statuses(),
            outputs: self.engine.hub().statuses(),
            replay: self.replay_status(),
        }
    }

    /// New subscription to show events
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<ShowEvent> {
        self.events.subscribe()
    }

    /// Stop replay, synchronization and every player.
    pub fn shutdown(&self) {
        self.replay.lock().stop();
        if let Some(mut synchronizer) = self.synchronizer.lock().take() {
            synchronizer.stop();
        }
        if !self.manager.is_empty() {
            info!("Show '{}' shutting down", self.name);
        }
        self.manager.shutdown();
    }
}

impl Drop for ShowContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
