//! Player state machine
//!
//! A player owns a playlist, the loaded clip and a compositor. Every call to
//! [`Player::tick`] runs transport, compositing and submission to the sink in
//! that order; pacing is the runner's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ledmap_core::{
    BlendMode, CanvasFrame, Clip, ClipConfig, Compositor, CoreError, EffectConfig, EffectStatus,
    EventBus, FrameSink, LayerConfig, LayerStatus, ParamValue, PlayState, PlaybackMode,
    PlayerConfig, PlayerId, PlayerStatus, PluginInstance, PluginKind, RenderContext, ShowEvent,
    SourceError, SyncRole,
};
use tracing::{debug, info, warn};

use crate::loader::{build_layer, load_clip, SourceContext};
use crate::{MediaError, Result};

/// Rate used when neither the player nor the show sets one
pub const DEFAULT_FPS: f64 = 30.0;

/// What one tick produced
#[derive(Debug, Clone)]
pub struct TickReport {
    pub frame: CanvasFrame,
    /// Source index rendered (0 while holding)
    pub index: u64,
    pub clip_index: Option<usize>,
    /// The active clip finished its last loop on this tick
    pub completed: bool,
    /// Slave waiting for the master to come back into range
    pub holding: bool,
}

/// Crossfade from the previous clip's last frame
struct ActiveTransition {
    from: CanvasFrame,
    instance: PluginInstance,
    frames: u32,
    elapsed: u32,
}

pub struct Player {
    id: PlayerId,
    name: String,
    fps: f64,
    playlist: Vec<ClipConfig>,
    playlist_loop: bool,
    role: SyncRole,
    state: PlayState,

    ctx: Arc<SourceContext>,
    sink: Arc<dyn FrameSink>,
    events: Arc<EventBus>,
    compositor: Compositor,

    clip_index: Option<usize>,
    clip: Option<Clip>,
    transition: Option<ActiveTransition>,
    holding: bool,
    ticks: u64,
    frame_index: u64,
    last_frame: Option<CanvasFrame>,
    /// Current source failure per layer, for change detection
    layer_errors: HashMap<u64, String>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("clip_index", &self.clip_index)
            .finish()
    }
}

impl Player {
    /// Create a stopped player with the first playlist entry loaded.
    pub fn new(
        config: PlayerConfig,
        ctx: Arc<SourceContext>,
        sink: Arc<dyn FrameSink>,
        events: Arc<EventBus>,
    ) -> Self {
        let fps = if config.fps > 0.0 {
            config.fps
        } else {
            DEFAULT_FPS
        };
        let (width, height) = ctx.canvas;
        let compositor = Compositor::new(&ctx.registry, width, height);

        let mut player = Self {
            id: config.id,
            name: config.name,
            fps,
            playlist: config.playlist,
            playlist_loop: config.playlist_loop,
            role: config.role,
            state: PlayState::Stopped,
            ctx,
            sink,
            events,
            compositor,
            clip_index: None,
            clip: None,
            transition: None,
            holding: false,
            ticks: 0,
            frame_index: 0,
            last_frame: None,
            layer_errors: HashMap::new(),
        };
        if !player.playlist.is_empty() {
            player.load_index(0);
        }
        info!(
            "Player {} '{}' created: {} clips @ {} fps, role {:?}",
            player.id,
            player.name,
            player.playlist.len(),
            player.fps,
            player.role
        );
        player
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Target interval between ticks
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn role(&self) -> SyncRole {
        self.role
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn clip_index(&self) -> Option<usize> {
        self.clip_index
    }

    pub fn clip(&self) -> Option<&Clip> {
        self.clip.as_ref()
    }

    pub fn playlist_len(&self) -> usize {
        self.playlist.len()
    }

    fn set_state(&mut self, state: PlayState) -> PlayState {
        if self.state != state {
            info!("Player {}: {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
            self.events.publish(ShowEvent::StateChanged {
                player: self.id,
                state,
            });
        }
        self.state
    }

    // ===== Transport control =====

    /// Stopped/Paused -> Playing. Without a loaded clip the player stays
    /// stopped.
    pub fn play(&mut self) -> PlayState {
        if self.clip.is_none() && !self.holding {
            warn!("Player {}: nothing loaded, ignoring play", self.id);
            return self.state;
        }
        self.set_state(PlayState::Playing)
    }

    /// Playing -> Paused; any other state is returned unchanged.
    pub fn pause(&mut self) -> PlayState {
        if self.state == PlayState::Playing {
            self.set_state(PlayState::Paused)
        } else {
            self.state
        }
    }

    /// Any -> Stopped, rewinding the active clip to its in point.
    pub fn stop(&mut self) -> PlayState {
        if let Some(clip) = self.clip.as_mut() {
            clip.rewind();
        }
        self.transition = None;
        self.set_state(PlayState::Stopped)
    }

    /// Any -> Playing from the first tick of the active clip.
    pub fn restart(&mut self) -> PlayState {
        if let Some(clip) = self.clip.as_mut() {
            clip.rewind();
        }
        self.transition = None;
        self.play()
    }

    fn clip_mut(&mut self) -> Result<&mut Clip> {
        self.clip.as_mut().ok_or(MediaError::NoClip)
    }

    /// Make the next tick render `frame`.
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        self.clip_mut()?.seek(frame);
        debug!("Player {}: seek to {}", self.id, frame);
        Ok(())
    }

    pub fn set_trim(&mut self, in_point: u64, out_point: u64) -> Result<()> {
        self.clip_mut()?.transport.set_trim(in_point, out_point)?;
        info!("Player {}: trim ({}, {})", self.id, in_point, out_point);
        Ok(())
    }

    pub fn set_reverse(&mut self, reverse: bool) -> Result<()> {
        self.clip_mut()?.transport.set_reverse(reverse);
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.clip_mut()?.transport.set_speed(speed);
        Ok(())
    }

    pub fn set_loop_count(&mut self, loop_count: u32) -> Result<()> {
        self.clip_mut()?.transport.set_loop_count(loop_count);
        Ok(())
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) -> Result<()> {
        self.clip_mut()?.transport.set_mode(mode);
        Ok(())
    }

    // ===== Playlist =====

    /// Append a clip to the playlist; returns its index.
    pub fn append_clip(&mut self, config: ClipConfig) -> usize {
        self.playlist.push(config);
        let index = self.playlist.len() - 1;
        if self.clip.is_none() && !self.holding {
            self.load_index(index);
        }
        index
    }

    /// Switch to playlist entry `index`.
    pub fn select_clip(&mut self, index: usize) -> Result<()> {
        if index >= self.playlist.len() {
            return Err(MediaError::ClipIndex {
                index,
                len: self.playlist.len(),
            });
        }
        self.holding = false;
        self.load_index(index);
        Ok(())
    }

    /// Drop the active clip and its sources; the player stops.
    pub fn unload(&mut self) {
        if let Some(clip) = self.clip.take() {
            info!("Player {}: unloaded clip '{}'", self.id, clip.name);
        }
        self.clip_index = None;
        self.transition = None;
        self.layer_errors.clear();
        self.set_state(PlayState::Stopped);
    }

    fn load_index(&mut self, index: usize) {
        let Some(config) = self.playlist.get(index) else {
            return;
        };
        let (clip, errors) = load_clip(config, &self.ctx, self.fps);

        self.transition = match (&clip.transition, &self.last_frame) {
            (Some(transition), Some(from)) if transition.frames > 0 => self
                .ctx
                .registry
                .instantiate_as(&transition.plugin, PluginKind::Transition, &Default::default())
                .map(|instance| ActiveTransition {
                    from: from.clone(),
                    instance,
                    frames: transition.frames,
                    elapsed: 0,
                })
                .map_err(|e| warn!("Player {}: transition unavailable: {}", self.id, e))
                .ok(),
            _ => None,
        };

        let clip_id = clip.id;
        info!(
            "Player {}: clip {} '{}' ({})",
            self.id, index, clip.name, clip_id
        );
        // release the outgoing clip's sources before reporting the change
        self.clip = Some(clip);
        self.clip_index = Some(index);
        self.layer_errors.clear();
        for (layer_id, error) in errors {
            self.report_source_error(layer_id, &error);
        }
        self.events.publish(ShowEvent::ClipChanged {
            player: self.id,
            clip_index: index,
            clip_id,
        });
    }

    fn report_source_error(&mut self, layer_id: u64, error: &SourceError) {
        let message = error.to_string();
        if self.layer_errors.get(&layer_id) == Some(&message) {
            return;
        }
        self.layer_errors.insert(layer_id, message.clone());
        self.events.publish(ShowEvent::SourceError {
            player: self.id,
            layer_id,
            message,
        });
    }

    /// Called when the active clip's loop count is exhausted.
    fn advance_after_completion(&mut self) {
        let Some(index) = self.clip_index else {
            return;
        };
        if self.role == SyncRole::Slave {
            debug!(
                "Player {}: clip {} complete, looping in place for master",
                self.id, index
            );
            return;
        }
        let next = index + 1;
        if next < self.playlist.len() {
            self.load_index(next);
        } else if self.playlist_loop {
            self.load_index(0);
        } else {
            info!("Player {}: playlist finished", self.id);
            if let Some(clip) = self.clip.as_mut() {
                clip.rewind();
            }
            self.set_state(PlayState::Stopped);
        }
    }

    // ===== Tick =====

    /// Produce and submit one frame. Returns `None` unless playing.
    pub fn tick(&mut self) -> Option<TickReport> {
        if self.state != PlayState::Playing {
            return None;
        }
        self.ticks += 1;

        if self.holding {
            let (width, height) = self.compositor.size();
            let frame = CanvasFrame::black(width, height);
            self.sink.submit(&frame);
            return Some(TickReport {
                frame,
                index: 0,
                clip_index: self.clip_index,
                completed: false,
                holding: true,
            });
        }

        let clip = self.clip.as_mut()?;
        let mut rendered = clip.render_next(&mut self.compositor);
        let completed = rendered.step.completed;

        if completed {
            let clip_index = self.clip_index.unwrap_or_default();
            self.events.publish(ShowEvent::PlaybackCompleted {
                player: self.id,
                clip_index,
            });
            let before = self.clip.as_ref().map(|c| c.id);
            self.advance_after_completion();
            if self.state != PlayState::Playing {
                return Some(TickReport {
                    frame: self
                        .last_frame
                        .clone()
                        .unwrap_or_else(|| rendered.composite.frame.clone()),
                    index: self.frame_index,
                    clip_index: self.clip_index,
                    completed,
                    holding: false,
                });
            }
            // a new clip starts on this same tick
            if self.clip.as_ref().map(|c| c.id) != before {
                let clip = self.clip.as_mut()?;
                rendered = clip.render_next(&mut self.compositor);
            }
        }

        let skipped: HashMap<u64, SourceError> = rendered
            .composite
            .skipped
            .into_iter()
            .map(|s| (s.layer_id, s.error))
            .collect();
        self.layer_errors
            .retain(|layer_id, _| skipped.contains_key(layer_id));
        for (layer_id, error) in &skipped {
            self.report_source_error(*layer_id, error);
        }
        for disabled in rendered.composite.disabled {
            self.events.publish(ShowEvent::PluginDisabled {
                player: self.id,
                layer_id: disabled.layer_id,
                plugin: disabled.plugin_id,
                reason: disabled.reason,
            });
        }

        let frame = self.apply_transition(rendered.composite.frame, rendered.step.index);
        self.sink.submit(&frame);
        self.frame_index = rendered.step.index;
        self.last_frame = Some(frame.clone());

        Some(TickReport {
            frame,
            index: rendered.step.index,
            clip_index: self.clip_index,
            completed,
            holding: false,
        })
    }

    fn apply_transition(&mut self, frame: CanvasFrame, index: u64) -> CanvasFrame {
        let Some(transition) = self.transition.as_mut() else {
            return frame;
        };
        transition.elapsed += 1;
        let progress = transition.elapsed as f32 / transition.frames as f32;
        let done = transition.elapsed >= transition.frames;

        let (width, height) = frame.size();
        let ctx = RenderContext::new(width, height, index, self.fps);
        let mixed = match transition
            .instance
            .set_param("progress", ParamValue::Float(progress))
            .and_then(|_| transition.instance.try_apply(&[&transition.from, &frame], &ctx))
        {
            Ok(mixed) => mixed,
            Err(e) => {
                warn!("Player {}: transition failed: {}", self.id, e);
                self.transition = None;
                return frame;
            }
        };
        if done {
            self.transition = None;
        }
        mixed
    }

    // ===== Synchronization =====

    /// Change sync role. A slave promoted out of its role resumes
    /// independent advancement immediately.
    pub fn set_role(&mut self, role: SyncRole) {
        if self.role == role {
            return;
        }
        info!("Player {}: role {:?} -> {:?}", self.id, self.role, role);
        let was_slave = self.role == SyncRole::Slave;
        self.role = role;
        if was_slave {
            self.holding = false;
            if self.clip.as_ref().is_some_and(|c| c.transport.is_completed()) {
                self.advance_after_completion();
            }
        }
    }

    /// Follow the master to playlist entry `index`, or hold blank when this
    /// playlist is too short.
    pub fn sync_to_master(&mut self, index: usize) {
        if index >= self.playlist.len() {
            if !self.holding {
                info!(
                    "Player {}: master at clip {}, playlist has {}; holding",
                    self.id,
                    index,
                    self.playlist.len()
                );
            }
            self.holding = true;
            return;
        }
        self.holding = false;
        if self.clip_index == Some(index) {
            if let Some(clip) = self.clip.as_mut() {
                clip.rewind();
            }
        } else {
            self.load_index(index);
        }
    }

    // ===== Layers =====

    pub fn add_layer(&mut self, config: &LayerConfig) -> Result<u64> {
        let (layer, error) = build_layer(config, &self.ctx, self.fps);
        let id = self.clip_mut()?.layers.push(layer);
        if let Some(error) = error {
            self.report_source_error(id, &error);
        }
        Ok(id)
    }

    /// Remove a layer; its source is released before this returns.
    pub fn remove_layer(&mut self, layer_id: u64) -> Result<()> {
        self.clip_mut()?
            .layers
            .remove_layer(layer_id)
            .ok_or_else(|| CoreError::not_found("layer", layer_id))?;
        self.layer_errors.remove(&layer_id);
        Ok(())
    }

    pub fn move_layer(&mut self, layer_id: u64, ordinal: usize) -> Result<()> {
        if !self.clip_mut()?.layers.move_layer_to(layer_id, ordinal) {
            return Err(CoreError::not_found("layer", layer_id).into());
        }
        Ok(())
    }

    pub fn set_layer_opacity(&mut self, layer_id: u64, opacity: f32) -> Result<()> {
        Ok(self.clip_mut()?.layers.set_opacity(layer_id, opacity)?)
    }

    pub fn set_layer_blend_mode(&mut self, layer_id: u64, mode: BlendMode) -> Result<()> {
        Ok(self.clip_mut()?.layers.set_blend_mode(layer_id, mode)?)
    }

    pub fn set_layer_enabled(&mut self, layer_id: u64, enabled: bool) -> Result<()> {
        Ok(self.clip_mut()?.layers.set_enabled(layer_id, enabled)?)
    }

    pub fn rename_layer(&mut self, layer_id: u64, name: &str) -> Result<()> {
        if !self.clip_mut()?.layers.rename_layer(layer_id, name) {
            return Err(CoreError::not_found("layer", layer_id).into());
        }
        Ok(())
    }

    // ===== Effects =====

    /// Append an effect to a layer's chain; returns its position.
    pub fn add_effect(&mut self, layer_id: u64, effect: &EffectConfig) -> Result<usize> {
        let instance =
            self.ctx
                .registry
                .instantiate_as(&effect.plugin, PluginKind::Effect, &effect.params)?;
        Ok(self.clip_mut()?.layers.layer_mut(layer_id)?.add_effect(instance))
    }

    pub fn remove_effect(&mut self, layer_id: u64, index: usize) -> Result<()> {
        self.clip_mut()?
            .layers
            .layer_mut(layer_id)?
            .remove_effect(index)
            .ok_or_else(|| CoreError::not_found("effect", index))?;
        Ok(())
    }

    pub fn move_effect(&mut self, layer_id: u64, from: usize, to: usize) -> Result<()> {
        if !self
            .clip_mut()?
            .layers
            .layer_mut(layer_id)?
            .move_effect(from, to)
        {
            return Err(CoreError::not_found("effect", from).into());
        }
        Ok(())
    }

    /// Live parameter update, visible on the next tick.
    pub fn set_effect_param(
        &mut self,
        layer_id: u64,
        index: usize,
        name: &str,
        value: ParamValue,
    ) -> Result<()> {
        Ok(self
            .clip_mut()?
            .layers
            .layer_mut(layer_id)?
            .set_effect_param(index, name, value)?)
    }

    /// Re-enable effects that were disabled after a failure.
    pub fn reset_effects(&mut self, layer_id: u64) -> Result<()> {
        self.clip_mut()?
            .layers
            .layer_mut(layer_id)?
            .reset_effect_failures();
        Ok(())
    }

    // ===== Status =====

    pub fn status(&self) -> PlayerStatus {
        let mut status = PlayerStatus::idle(self.id, self.name.clone());
        status.state = self.state;
        status.role = self.role;
        status.clip_index = self.clip_index;
        status.frame_index = self.frame_index;
        status.ticks = self.ticks;
        status.holding = self.holding;
        if let Some(clip) = &self.clip {
            status.clip_id = Some(clip.id);
            status.clip_name = Some(clip.name.clone());
            status.layers = clip
                .layers
                .layers()
                .iter()
                .enumerate()
                .map(|(ordinal, layer)| LayerStatus {
                    id: layer.id,
                    ordinal,
                    name: layer.name.clone(),
                    blend_mode: layer.blend_mode,
                    opacity: layer.opacity,
                    enabled: layer.enabled,
                    source: layer.source.describe(),
                    effects: layer
                        .effect_chain
                        .iter()
                        .map(|effect| EffectStatus {
                            plugin: effect.id().to_string(),
                            disabled: effect.failure().map(str::to_string),
                        })
                        .collect(),
                    last_error: self.layer_errors.get(&layer.id).cloned(),
                })
                .collect();
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledmap_core::{PluginRegistry, SourceDescriptor, TransportConfig};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CaptureSink {
        frames: Mutex<Vec<CanvasFrame>>,
    }

    impl FrameSink for CaptureSink {
        fn submit(&self, frame: &CanvasFrame) {
            self.frames.lock().push(frame.clone());
        }
    }

    fn clip(name: &str, frames: u64, loop_count: u32) -> ClipConfig {
        let mut clip = ClipConfig::single(name, SourceDescriptor::TestPattern { frames });
        clip.transport = TransportConfig {
            loop_count,
            ..TransportConfig::default()
        };
        clip
    }

    fn player(playlist: Vec<ClipConfig>) -> (Player, Arc<CaptureSink>, Arc<EventBus>) {
        let ctx = Arc::new(SourceContext::new(
            Arc::new(PluginRegistry::with_builtins()),
            (8, 2),
        ));
        let sink = Arc::new(CaptureSink::default());
        let events = Arc::new(EventBus::new());
        let player = Player::new(
            PlayerConfig::new(1, "test", playlist),
            ctx,
            sink.clone(),
            events.clone(),
        );
        (player, sink, events)
    }

    #[test]
    fn test_state_transitions_idempotent() {
        let (mut p, _, _) = player(vec![clip("a", 10, 0)]);
        assert_eq!(p.pause(), PlayState::Stopped);
        assert_eq!(p.play(), PlayState::Playing);
        assert_eq!(p.play(), PlayState::Playing);
        assert_eq!(p.pause(), PlayState::Paused);
        assert_eq!(p.pause(), PlayState::Paused);
        assert!(p.tick().is_none());
        assert_eq!(p.stop(), PlayState::Stopped);
        assert_eq!(p.restart(), PlayState::Playing);
    }

    #[test]
    fn test_stop_rewinds_to_in_point() {
        let (mut p, _, _) = player(vec![clip("a", 10, 0)]);
        p.set_trim(3, 8).unwrap();
        p.play();
        for _ in 0..4 {
            p.tick();
        }
        p.stop();
        p.play();
        assert_eq!(p.tick().unwrap().index, 3);
    }

    #[test]
    fn test_pause_freezes_position() {
        let (mut p, _, _) = player(vec![clip("a", 10, 0)]);
        p.play();
        p.tick();
        p.tick();
        p.pause();
        p.tick();
        p.play();
        assert_eq!(p.tick().unwrap().index, 2);
    }

    #[test]
    fn test_advances_through_playlist_then_stops() {
        let (mut p, _, events) = player(vec![clip("a", 2, 1), clip("b", 3, 1)]);
        let rx = events.subscribe();
        p.play();
        let indices: Vec<(Option<usize>, u64)> = (0..6)
            .filter_map(|_| p.tick())
            .map(|r| (r.clip_index, r.index))
            .collect();
        assert_eq!(
            indices,
            vec![
                (Some(0), 0),
                (Some(0), 1),
                (Some(1), 0),
                (Some(1), 1),
                (Some(1), 2),
                (Some(1), 2),
            ]
        );
        assert_eq!(p.state(), PlayState::Stopped);

        let changes: Vec<usize> = rx
            .try_iter()
            .filter_map(|e| match e {
                ShowEvent::ClipChanged { clip_index, .. } => Some(clip_index),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![1]);
    }

    #[test]
    fn test_playlist_loop_wraps_to_first() {
        let (mut p, _, _) = player(vec![clip("a", 2, 1), clip("b", 1, 1)]);
        p.playlist_loop = true;
        p.play();
        for _ in 0..3 {
            p.tick();
        }
        assert_eq!(p.clip_index(), Some(1));
        p.tick();
        assert_eq!(p.clip_index(), Some(0));
        assert_eq!(p.state(), PlayState::Playing);
    }

    #[test]
    fn test_slave_loops_in_place_and_holds() {
        let (mut p, sink, _) = player(vec![clip("a", 2, 1), clip("b", 2, 1)]);
        p.set_role(SyncRole::Slave);
        p.play();
        for _ in 0..5 {
            p.tick();
        }
        assert_eq!(p.clip_index(), Some(0));

        p.sync_to_master(7);
        assert!(p.is_holding());
        let report = p.tick().unwrap();
        assert!(report.holding);
        assert!(sink.frames.lock().last().unwrap().is_black());

        p.sync_to_master(1);
        assert!(!p.is_holding());
        assert_eq!(p.clip_index(), Some(1));
    }

    #[test]
    fn test_promoted_slave_resumes_advancing() {
        let (mut p, _, _) = player(vec![clip("a", 2, 1), clip("b", 2, 1)]);
        p.set_role(SyncRole::Slave);
        p.play();
        for _ in 0..3 {
            p.tick();
        }
        assert_eq!(p.clip_index(), Some(0));
        p.set_role(SyncRole::Autonomous);
        assert_eq!(p.clip_index(), Some(1));
    }

    #[test]
    fn test_failed_source_reported_once() {
        let bad = ClipConfig::single(
            "bad",
            SourceDescriptor::Image {
                path: "/missing/file.png".into(),
                frames: 1,
            },
        );
        let ctx = Arc::new(SourceContext::new(
            Arc::new(PluginRegistry::with_builtins()),
            (2, 2),
        ));
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        let mut p = Player::new(
            PlayerConfig::new(3, "bad", vec![bad]),
            ctx,
            Arc::new(ledmap_core::NullSink),
            events,
        );
        p.play();
        let frame = p.tick().unwrap().frame;
        assert!(frame.is_black());
        let errors = rx
            .try_iter()
            .filter(|e| matches!(e, ShowEvent::SourceError { player: 3, .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_layer_crud_and_status() {
        let (mut p, _, _) = player(vec![clip("a", 10, 0)]);
        let id = p
            .add_layer(&LayerConfig::new(
                "overlay",
                SourceDescriptor::Blank { frames: 10 },
            ))
            .unwrap();
        p.set_layer_opacity(id, 2.0).unwrap();
        p.set_layer_blend_mode(id, BlendMode::Screen).unwrap();
        p.add_effect(
            id,
            &EffectConfig {
                plugin: "invert".into(),
                params: Default::default(),
            },
        )
        .unwrap();
        p.set_effect_param(id, 0, "amount", ParamValue::Float(0.5))
            .unwrap();
        p.move_layer(id, 0).unwrap();

        let status = p.status();
        assert_eq!(status.layers.len(), 2);
        assert_eq!(status.layers[0].id, id);
        assert_eq!(status.layers[0].opacity, 1.0);
        assert_eq!(status.layers[0].blend_mode, BlendMode::Screen);
        assert_eq!(status.layers[0].effects[0].plugin, "invert");

        p.remove_layer(id).unwrap();
        assert!(p.remove_layer(id).is_err());
        assert_eq!(p.status().layers.len(), 1);
    }

    #[test]
    fn test_crossfade_into_next_clip() {
        let mut a = ClipConfig::single(
            "white",
            SourceDescriptor::Generator {
                plugin: "solid_color".into(),
                params: Default::default(),
                duration_secs: Some(1.0),
            },
        );
        a.transport.out_point = Some(1);
        a.transport.loop_count = 1;
        let mut b = ClipConfig::single("black", SourceDescriptor::Blank { frames: 10 });
        b.transition = Some(ledmap_core::TransitionConfig {
            plugin: "crossfade".into(),
            frames: 2,
        });
        let (mut p, _, _) = player(vec![a, b]);
        p.play();
        assert_eq!(p.tick().unwrap().frame.pixel(0, 0), [255, 255, 255]);
        // first frame of the new clip is halfway through the fade
        let mid = p.tick().unwrap().frame.pixel(0, 0);
        assert!(mid[0] > 100 && mid[0] < 160, "{:?}", mid);
        assert!(p.tick().unwrap().frame.is_black());
    }
}
