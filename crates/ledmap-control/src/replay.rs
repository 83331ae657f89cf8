//! Recorded DMX playback
//!
//! The replay manager plays a [`ReplayRecording`] on its own thread, sending
//! the recorded universe payloads straight to the output hub. While it runs
//! it claims every output owning one of the recording's universes, so live
//! frames for those outputs are dropped and the replay buffer wins.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ledmap_core::{
    EventBus, OutputId, ReplayRecording, ReplayStatus, ShowEvent, UniverseBuffer,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::ControlError;
use crate::hub::{SendOutcome, Source, UniverseFrame};
use crate::routing::{group_by_output, RoutingEngine};
use crate::Result;

/// Default replay tick rate
pub const DEFAULT_TICK_RATE: f64 = 44.0;

#[derive(Debug, Clone, Copy)]
struct Settings {
    looping: bool,
    speed: f64,
    brightness: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            looping: false,
            speed: 1.0,
            brightness: 1.0,
        }
    }
}

struct Shared {
    running: AtomicBool,
    settings: Mutex<Settings>,
    status: RwLock<ReplayStatus>,
}

/// Scale every channel, saturating at 255.
pub fn apply_brightness(buffer: &mut UniverseBuffer, brightness: f32) {
    if (brightness - 1.0).abs() < f32::EPSILON {
        return;
    }
    for value in buffer.iter_mut() {
        *value = (*value as f32 * brightness).round().clamp(0.0, 255.0) as u8;
    }
}

pub struct ReplayManager {
    engine: Arc<RoutingEngine>,
    events: Arc<EventBus>,
    interval: Duration,
    recording: Option<Arc<ReplayRecording>>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ReplayManager {
    pub fn new(engine: Arc<RoutingEngine>, events: Arc<EventBus>, tick_rate: f64) -> Self {
        let tick_rate = if tick_rate > 0.0 && tick_rate.is_finite() {
            tick_rate
        } else {
            DEFAULT_TICK_RATE
        };
        let settings = Settings::default();
        Self {
            engine,
            events,
            interval: Duration::from_secs_f64(1.0 / tick_rate),
            recording: None,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                status: RwLock::new(ReplayStatus {
                    speed: settings.speed,
                    brightness: settings.brightness,
                    ..ReplayStatus::default()
                }),
                settings: Mutex::new(settings),
            }),
            thread: None,
        }
    }

    /// Load a recording, stopping any replay in progress.
    pub fn load(&mut self, recording: ReplayRecording) {
        self.stop();
        info!(
            "Replay loaded '{}': {} frames, {:.2}s",
            recording.name(),
            recording.len(),
            recording.duration()
        );
        let mut status = self.shared.status.write();
        status.name = Some(recording.name().to_string());
        status.duration_secs = recording.duration();
        status.position_secs = 0.0;
        drop(status);
        self.recording = Some(Arc::new(recording));
    }

    pub fn recording(&self) -> Option<&ReplayRecording> {
        self.recording.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start from the beginning. A running replay is restarted.
    pub fn start(&mut self) -> Result<()> {
        let recording = self.recording.clone().ok_or(ControlError::NoRecording)?;
        if recording.is_empty() {
            return Err(ControlError::InvalidParameter(format!(
                "recording '{}' has no frames",
                recording.name()
            )));
        }
        self.stop();

        let topology = self.engine.topology();
        let mut claimed = BTreeSet::new();
        for universe in &recording.metadata().universes {
            match topology.owner_of(*universe) {
                Some(output) => {
                    claimed.insert(output);
                }
                None => debug!("Replay universe {} has no output", universe),
            }
        }
        let claimed: Vec<OutputId> = claimed.into_iter().collect();
        self.engine.hub().claim(&claimed);

        self.shared.running.store(true, Ordering::SeqCst);
        {
            let mut status = self.shared.status.write();
            status.active = true;
            status.position_secs = 0.0;
        }

        let worker = ReplayWorker {
            recording: recording.clone(),
            engine: self.engine.clone(),
            events: self.events.clone(),
            shared: self.shared.clone(),
            interval: self.interval,
        };
        let handle = thread::Builder::new()
            .name("replay".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.status.write().active = false;
                self.engine.hub().release_all();
                ControlError::Spawn(e.to_string())
            })?;
        self.thread = Some(handle);

        info!("Replay '{}' started on outputs {:?}", recording.name(), claimed);
        self.events.publish(ShowEvent::ReplayStarted {
            name: recording.name().to_string(),
        });
        Ok(())
    }

    /// Stop playback and hand the outputs back to live players.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Replay thread panicked");
                self.engine.hub().release_all();
                self.shared.status.write().active = false;
            }
        }
    }

    pub fn set_loop(&self, looping: bool) {
        self.shared.settings.lock().looping = looping;
        self.shared.status.write().looping = looping;
    }

    pub fn toggle_loop(&self) -> bool {
        let looping = !self.shared.settings.lock().looping;
        self.set_loop(looping);
        looping
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        if !(speed > 0.0 && speed.is_finite()) {
            return Err(ControlError::InvalidParameter(format!(
                "replay speed must be positive, got {}",
                speed
            )));
        }
        self.shared.settings.lock().speed = speed;
        self.shared.status.write().speed = speed;
        Ok(())
    }

    pub fn set_brightness(&self, brightness: f32) -> Result<()> {
        if !(brightness >= 0.0 && brightness.is_finite()) {
            return Err(ControlError::InvalidParameter(format!(
                "replay brightness must be non-negative, got {}",
                brightness
            )));
        }
        self.shared.settings.lock().brightness = brightness;
        self.shared.status.write().brightness = brightness;
        Ok(())
    }

    pub fn status(&self) -> ReplayStatus {
        self.shared.status.read().clone()
    }
}

impl Drop for ReplayManager {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReplayWorker {
    recording: Arc<ReplayRecording>,
    engine: Arc<RoutingEngine>,
    events: Arc<EventBus>,
    shared: Arc<Shared>,
    interval: Duration,
}

impl ReplayWorker {
    fn run(self) {
        let duration = self.recording.duration();
        let mut position = 0.0_f64;
        let mut last_tick = Instant::now();

        while self.shared.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();
            let settings = *self.shared.settings.lock();
            position += tick_start.duration_since(last_tick).as_secs_f64() * settings.speed;
            last_tick = tick_start;

            if position > duration {
                if settings.looping {
                    position = if duration > 0.0 { position % duration } else { 0.0 };
                } else {
                    position = duration;
                }
            }
            self.send(position, settings.brightness);
            self.shared.status.write().position_secs = position;

            if position >= duration && !settings.looping {
                info!("Replay '{}' finished", self.recording.name());
                break;
            }

            let elapsed = tick_start.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.engine.hub().release_all();
        self.shared.status.write().active = false;
        self.events.publish(ShowEvent::ReplayStopped {
            name: self.recording.name().to_string(),
        });
    }

    fn send(&self, position: f64, brightness: f32) {
        let Some(index) = self.recording.index_at(position) else {
            return;
        };
        let frame = &self.recording.frames()[index];
        let mut packed: BTreeMap<u16, UniverseBuffer> = BTreeMap::new();
        for (universe, mut buffer) in self.recording.universe_payloads(frame) {
            apply_brightness(&mut buffer, brightness);
            packed.insert(universe, buffer);
        }

        let topology = self.engine.topology();
        let grouped: BTreeMap<OutputId, UniverseFrame> = group_by_output(&topology, &packed);
        for (output, universes) in grouped {
            let outcome = self.engine.hub().submit(output, &universes, Source::Replay);
            if outcome == SendOutcome::Failed {
                warn!("Replay frame {} failed on output {}", index, output);
            }
        }
    }
}
