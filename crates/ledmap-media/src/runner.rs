//! Threaded player loop
//!
//! Each player runs on its own thread. Commands arrive over a channel and are
//! applied at the tick boundary, so a tick always runs transport, compositing
//! and output for one consistent state. Pacing is sleep based: an overrun
//! tick is followed immediately by the next one, without catch-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use ledmap_core::{
    BlendMode, ClipConfig, EffectConfig, LayerConfig, ParamValue, PlayState, PlaybackMode,
    PlayerId, PlayerStatus, SyncRole,
};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::player::Player;
use crate::{MediaError, Result};

/// How long [`PlayerHandle::execute`] waits for the player thread
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Operations applied to a running player
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Play,
    Pause,
    Stop,
    Restart,
    Seek(u64),
    Trim { in_point: u64, out_point: u64 },
    Reverse(bool),
    Speed(f64),
    LoopCount(u32),
    Mode(PlaybackMode),
    SelectClip(usize),
    AppendClip(ClipConfig),
    Unload,
    SetRole(SyncRole),
    SyncToMaster(usize),
    AddLayer(LayerConfig),
    RemoveLayer(u64),
    MoveLayer { layer: u64, ordinal: usize },
    SetOpacity { layer: u64, opacity: f32 },
    SetBlendMode { layer: u64, mode: BlendMode },
    SetEnabled { layer: u64, enabled: bool },
    RenameLayer { layer: u64, name: String },
    AddEffect { layer: u64, effect: EffectConfig },
    RemoveEffect { layer: u64, index: usize },
    MoveEffect { layer: u64, from: usize, to: usize },
    SetEffectParam {
        layer: u64,
        index: usize,
        name: String,
        value: ParamValue,
    },
    ResetEffects(u64),
}

/// What a command produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutput {
    State(PlayState),
    /// Id of a created layer, index of an added effect or clip
    Created(u64),
    Done,
}

struct Envelope {
    command: PlayerCommand,
    reply: Option<Sender<Result<CommandOutput>>>,
}

fn apply(player: &mut Player, command: PlayerCommand) -> Result<CommandOutput> {
    use CommandOutput::{Created, Done, State};
    match command {
        PlayerCommand::Play => Ok(State(player.play())),
        PlayerCommand::Pause => Ok(State(player.pause())),
        PlayerCommand::Stop => Ok(State(player.stop())),
        PlayerCommand::Restart => Ok(State(player.restart())),
        PlayerCommand::Seek(frame) => player.seek(frame).map(|_| Done),
        PlayerCommand::Trim {
            in_point,
            out_point,
        } => player.set_trim(in_point, out_point).map(|_| Done),
        PlayerCommand::Reverse(reverse) => player.set_reverse(reverse).map(|_| Done),
        PlayerCommand::Speed(speed) => player.set_speed(speed).map(|_| Done),
        PlayerCommand::LoopCount(count) => player.set_loop_count(count).map(|_| Done),
        PlayerCommand::Mode(mode) => player.set_mode(mode).map(|_| Done),
        PlayerCommand::SelectClip(index) => player.select_clip(index).map(|_| Done),
        PlayerCommand::AppendClip(config) => Ok(Created(player.append_clip(config) as u64)),
        PlayerCommand::Unload => {
            player.unload();
            Ok(Done)
        }
        PlayerCommand::SetRole(role) => {
            player.set_role(role);
            Ok(Done)
        }
        PlayerCommand::SyncToMaster(index) => {
            player.sync_to_master(index);
            Ok(Done)
        }
        PlayerCommand::AddLayer(config) => player.add_layer(&config).map(Created),
        PlayerCommand::RemoveLayer(layer) => player.remove_layer(layer).map(|_| Done),
        PlayerCommand::MoveLayer { layer, ordinal } => {
            player.move_layer(layer, ordinal).map(|_| Done)
        }
        PlayerCommand::SetOpacity { layer, opacity } => {
            player.set_layer_opacity(layer, opacity).map(|_| Done)
        }
        PlayerCommand::SetBlendMode { layer, mode } => {
            player.set_layer_blend_mode(layer, mode).map(|_| Done)
        }
        PlayerCommand::SetEnabled { layer, enabled } => {
            player.set_layer_enabled(layer, enabled).map(|_| Done)
        }
        PlayerCommand::RenameLayer { layer, name } => {
            player.rename_layer(layer, &name).map(|_| Done)
        }
        PlayerCommand::AddEffect { layer, effect } => player
            .add_effect(layer, &effect)
            .map(|index| Created(index as u64)),
        PlayerCommand::RemoveEffect { layer, index } => {
            player.remove_effect(layer, index).map(|_| Done)
        }
        PlayerCommand::MoveEffect { layer, from, to } => {
            player.move_effect(layer, from, to).map(|_| Done)
        }
        PlayerCommand::SetEffectParam {
            layer,
            index,
            name,
            value,
        } => player
            .set_effect_param(layer, index, &name, value)
            .map(|_| Done),
        PlayerCommand::ResetEffects(layer) => player.reset_effects(layer).map(|_| Done),
    }
}

/// Cloneable control handle for a running player
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    id: PlayerId,
    tx: Sender<Envelope>,
    status: Arc<RwLock<PlayerStatus>>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("command", &self.command)
            .finish()
    }
}

impl PlayerHandle {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Queue a command without waiting for it to be applied.
    pub fn send(&self, command: PlayerCommand) -> Result<()> {
        self.tx
            .send(Envelope {
                command,
                reply: None,
            })
            .map_err(|_| MediaError::Disconnected(self.id))
    }

    /// Apply a command and wait for its result.
    pub fn execute(&self, command: PlayerCommand) -> Result<CommandOutput> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Envelope {
                command,
                reply: Some(reply_tx),
            })
            .map_err(|_| MediaError::Disconnected(self.id))?;
        match reply_rx.recv_timeout(COMMAND_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(MediaError::Timeout(self.id)),
            Err(RecvTimeoutError::Disconnected) => Err(MediaError::Disconnected(self.id)),
        }
    }

    fn execute_state(&self, command: PlayerCommand) -> Result<PlayState> {
        match self.execute(command)? {
            CommandOutput::State(state) => Ok(state),
            _ => Ok(self.status().state),
        }
    }

    pub fn play(&self) -> Result<PlayState> {
        self.execute_state(PlayerCommand::Play)
    }

    pub fn pause(&self) -> Result<PlayState> {
        self.execute_state(PlayerCommand::Pause)
    }

    pub fn stop(&self) -> Result<PlayState> {
        self.execute_state(PlayerCommand::Stop)
    }

    pub fn restart(&self) -> Result<PlayState> {
        self.execute_state(PlayerCommand::Restart)
    }

    /// Status as of the last tick or command
    pub fn status(&self) -> PlayerStatus {
        self.status.read().clone()
    }
}

/// Owns a player thread; dropping it stops the thread.
pub struct PlayerRunner {
    handle: PlayerHandle,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PlayerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRunner")
            .field("id", &self.handle.id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl PlayerRunner {
    /// Move `player` onto its own thread.
    pub fn spawn(player: Player) -> Result<Self> {
        let id = player.id();
        let (tx, rx) = unbounded();
        let status = Arc::new(RwLock::new(player.status()));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let status = status.clone();
            let running = running.clone();
            thread::Builder::new()
                .name(format!("player-{}", id))
                .spawn(move || run_loop(player, rx, status, running))
                .map_err(|e| MediaError::Spawn(e.to_string()))?
        };

        Ok(Self {
            handle: PlayerHandle { id, tx, status },
            running,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Player {} thread panicked", self.handle.id);
            }
        }
    }
}

impl Drop for PlayerRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_envelope(player: &mut Player, envelope: Envelope, status: &RwLock<PlayerStatus>) {
    trace!("Player {}: {:?}", player.id(), envelope.command);
    let result = apply(player, envelope.command);
    if let Err(e) = &result {
        debug!("Player {}: command failed: {}", player.id(), e);
    }
    // callers read status right after the reply
    *status.write() = player.status();
    if let Some(reply) = envelope.reply {
        let _ = reply.send(result);
    }
}

fn run_loop(
    mut player: Player,
    rx: Receiver<Envelope>,
    status: Arc<RwLock<PlayerStatus>>,
    running: Arc<AtomicBool>,
) {
    info!("Player {} thread started", player.id());
    let interval = player.interval();

    while running.load(Ordering::Relaxed) {
        let start = Instant::now();

        if player.state() != PlayState::Playing {
            // idle: wake for commands instead of ticking
            match rx.recv_timeout(interval) {
                Ok(envelope) => {
                    handle_envelope(&mut player, envelope, &status);
                    for envelope in rx.try_iter() {
                        handle_envelope(&mut player, envelope, &status);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            continue;
        }

        for envelope in rx.try_iter() {
            handle_envelope(&mut player, envelope, &status);
        }
        if let Some(report) = player.tick() {
            trace!(
                "Player {} tick: clip {:?} frame {}",
                player.id(),
                report.clip_index,
                report.index
            );
        }
        *status.write() = player.status();

        let elapsed = start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        } else {
            debug!(
                "Player {} tick overran: {:?} > {:?}",
                player.id(),
                elapsed,
                interval
            );
        }
    }

    info!("Player {} thread stopped", player.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SourceContext;
    use ledmap_core::{EventBus, NullSink, PlayerConfig, PluginRegistry, SourceDescriptor};

    fn runner(fps: f64) -> PlayerRunner {
        let ctx = Arc::new(SourceContext::new(
            Arc::new(PluginRegistry::with_builtins()),
            (4, 4),
        ));
        let mut config = PlayerConfig::new(
            5,
            "runner",
            vec![ClipConfig::single(
                "pattern",
                SourceDescriptor::TestPattern { frames: 1000 },
            )],
        );
        config.fps = fps;
        let player = Player::new(
            config,
            ctx,
            Arc::new(NullSink),
            Arc::new(EventBus::new()),
        );
        PlayerRunner::spawn(player).unwrap()
    }

    #[test]
    fn test_commands_round_trip() {
        let runner = runner(200.0);
        let handle = runner.handle();
        assert_eq!(handle.play().unwrap(), PlayState::Playing);
        assert_eq!(handle.pause().unwrap(), PlayState::Paused);
        assert_eq!(handle.pause().unwrap(), PlayState::Paused);

        let err = handle
            .execute(PlayerCommand::Trim {
                in_point: 50,
                out_point: 10,
            })
            .unwrap_err();
        assert!(matches!(err, MediaError::Core(_)));

        let id = handle
            .execute(PlayerCommand::AddLayer(LayerConfig::new(
                "top",
                SourceDescriptor::Blank { frames: 10 },
            )))
            .unwrap();
        assert_eq!(id, CommandOutput::Created(2));
        assert_eq!(handle.status().layers.len(), 2);
    }

    #[test]
    fn test_loop_ticks_while_playing() {
        let runner = runner(200.0);
        let handle = runner.handle();
        handle.play().unwrap();
        thread::sleep(Duration::from_millis(100));
        let ticks = handle.status().ticks;
        assert!(ticks > 0);
        handle.stop().unwrap();
        let stopped = handle.status();
        assert_eq!(stopped.state, PlayState::Stopped);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(handle.status().ticks, stopped.ticks);
    }

    #[test]
    fn test_dropped_runner_disconnects_handle() {
        let runner = runner(100.0);
        let handle = runner.handle();
        drop(runner);
        assert!(matches!(
            handle.play(),
            Err(MediaError::Timeout(5)) | Err(MediaError::Disconnected(5))
        ));
    }
}
