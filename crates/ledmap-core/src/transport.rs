//! Transport: maps a virtual tick counter to a concrete source index
//!
//! The controller keeps a fractional tick position `v` that advances by
//! `speed` every step and is truncated when sampled. The trim window
//! `in_point..out_point` has duration `D`; linear and random playback wrap
//! every `D` ticks, bounce playback every `2(D-1)` ticks (one there-and-back
//! cycle). Every wrap is a loop boundary; with `loop_count = N` the Nth
//! boundary completes the clip, exactly once.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Length of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameCount {
    Finite(u64),
    /// Live or continuous; trim and looping do not apply
    Unbounded,
}

impl FrameCount {
    pub fn finite(&self) -> Option<u64> {
        match self {
            FrameCount::Finite(n) => Some(*n),
            FrameCount::Unbounded => None,
        }
    }
}

/// How positions inside the trim window are traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Linear,
    /// Triangle wave: forward to the last frame then back to the first
    Bounce,
    /// Jump to a random start offset at every loop boundary
    Random,
}

/// Transport settings of a clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub in_point: u64,
    /// Exclusive end of the trim window; `None` means the end of the source
    pub out_point: Option<u64>,
    pub reverse: bool,
    /// Ticks of `v` per scheduler tick
    pub speed: f64,
    /// 0 = loop forever
    pub loop_count: u32,
    pub mode: PlaybackMode,
    /// Random mode: ticks between re-randomizations, 0 = only at loop boundaries
    pub random_frame_count: u64,
    /// Random mode: fixed seed for reproducible playback
    pub random_seed: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            in_point: 0,
            out_point: None,
            reverse: false,
            speed: 1.0,
            loop_count: 0,
            mode: PlaybackMode::Linear,
            random_frame_count: 0,
            random_seed: None,
        }
    }
}

/// Duration bounds for generator clips
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorBounds {
    pub default_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for GeneratorBounds {
    fn default() -> Self {
        Self {
            default_secs: 30.0,
            min_secs: 1.0,
            max_secs: 60.0,
        }
    }
}

impl GeneratorBounds {
    /// Clamped duration in seconds
    pub fn duration_secs(&self, requested: Option<f64>) -> f64 {
        let secs = requested
            .filter(|s| s.is_finite())
            .unwrap_or(self.default_secs);
        secs.clamp(self.min_secs, self.max_secs.max(self.min_secs))
    }

    /// Frame count `D = fps * duration` for a generator
    pub fn frames(&self, fps: f64, requested: Option<f64>) -> u64 {
        (fps.max(0.0) * self.duration_secs(requested)).round() as u64
    }
}

/// Result of one transport step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStep {
    /// Source index to render this tick
    pub index: u64,
    /// A loop boundary was crossed on this tick (at most `loop_count` times)
    pub wrapped: bool,
    /// The final loop boundary was crossed on this tick; fires once
    pub completed: bool,
}

/// Maps ticks to source indices for one clip
#[derive(Debug, Clone)]
pub struct TransportController {
    config: TransportConfig,
    total: FrameCount,
    /// Virtual tick position
    v: f64,
    /// Cycle number of the last sampled tick
    cycle: u64,
    loops_done: u32,
    completion_fired: bool,
    rng: StdRng,
    random_offset: u64,
    /// Tick at which `random_offset` was chosen
    random_anchor: u64,
}

impl TransportController {
    /// Create a controller for a source of `total` frames, normalizing the
    /// trim window into range.
    pub fn new(config: TransportConfig, total: FrameCount) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let mut controller = Self {
            config,
            total,
            v: 0.0,
            cycle: 0,
            loops_done: 0,
            completion_fired: false,
            rng: StdRng::seed_from_u64(seed),
            random_offset: 0,
            random_anchor: 0,
        };
        controller.normalize_window();
        controller.config.speed = sanitize_speed(controller.config.speed);
        controller.reset();
        controller
    }

    fn normalize_window(&mut self) {
        if let FrameCount::Finite(total) = self.total {
            let out = self.config.out_point.unwrap_or(total).min(total);
            let in_point = self.config.in_point.min(out.saturating_sub(1));
            self.config.in_point = in_point;
            self.config.out_point = Some(out);
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn total(&self) -> FrameCount {
        self.total
    }

    /// Trim window as `(in_point, out_point)`; `None` for unbounded sources.
    pub fn window(&self) -> Option<(u64, u64)> {
        match self.total {
            FrameCount::Finite(total) => Some((
                self.config.in_point,
                self.config.out_point.unwrap_or(total),
            )),
            FrameCount::Unbounded => None,
        }
    }

    /// Effective duration `D`; `None` for unbounded sources.
    pub fn duration(&self) -> Option<u64> {
        self.window().map(|(i, o)| o.saturating_sub(i))
    }

    /// Current virtual tick position
    pub fn position(&self) -> f64 {
        self.v
    }

    /// Loop boundaries crossed so far
    pub fn loops_completed(&self) -> u32 {
        self.loops_done
    }

    pub fn is_completed(&self) -> bool {
        self.completion_fired
    }

    /// Set the trim window. `out_point` is clamped to the source length;
    /// an empty window is rejected and leaves the transport unchanged.
    pub fn set_trim(&mut self, in_point: u64, out_point: u64) -> Result<()> {
        let FrameCount::Finite(total) = self.total else {
            return Ok(());
        };
        let out = out_point.min(total);
        if in_point >= out {
            return Err(CoreError::InvalidTrim {
                in_point,
                out_point,
                total,
            });
        }
        self.config.in_point = in_point;
        self.config.out_point = Some(out);
        self.restart_position();
        Ok(())
    }

    pub fn set_reverse(&mut self, reverse: bool) {
        self.config.reverse = reverse;
    }

    /// Negative and non-finite speeds are clamped to 0 (use `reverse`).
    pub fn set_speed(&mut self, speed: f64) {
        self.config.speed = sanitize_speed(speed);
    }

    pub fn set_loop_count(&mut self, loop_count: u32) {
        self.config.loop_count = loop_count;
        self.completion_fired = loop_count > 0 && self.loops_done >= loop_count;
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.config.mode = mode;
        self.cycle = self.cycle_of(self.v.floor() as u64);
    }

    /// Back to tick 0 with loop accounting cleared. The random sequence
    /// restarts from its seed.
    pub fn reset(&mut self) {
        if let Some(seed) = self.config.random_seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.loops_done = 0;
        self.completion_fired = false;
        self.restart_position();
    }

    fn restart_position(&mut self) {
        self.v = 0.0;
        self.cycle = 0;
        self.random_anchor = 0;
        self.random_offset = self.pick_offset();
    }

    /// `frame` clamped into the trim window
    pub fn clamp_frame(&self, frame: u64) -> u64 {
        match self.window() {
            Some((in_point, out_point)) if out_point > in_point => {
                frame.clamp(in_point, out_point - 1)
            }
            Some((in_point, _)) => in_point,
            None => frame,
        }
    }

    /// Position the transport so the next step renders `frame` (clamped into
    /// the trim window). Loop accounting is kept.
    pub fn seek(&mut self, frame: u64) {
        let Some((in_point, out_point)) = self.window() else {
            self.v = frame as f64;
            return;
        };
        let d = out_point.saturating_sub(in_point);
        if d == 0 {
            return;
        }
        let p = self.clamp_frame(frame) - in_point;
        let tick = if self.config.reverse { d - 1 - p } else { p };
        self.v = tick as f64;
        self.cycle = 0;
        self.random_anchor = tick;
        self.random_offset = tick;
    }

    fn pick_offset(&mut self) -> u64 {
        match self.duration() {
            Some(d) if d > 0 && self.config.mode == PlaybackMode::Random => {
                self.rng.random_range(0..d)
            }
            _ => 0,
        }
    }

    fn cycle_len(&self) -> u64 {
        let d = self.duration().unwrap_or(0);
        if self.config.mode == PlaybackMode::Bounce && d > 1 {
            2 * (d - 1)
        } else {
            d
        }
    }

    fn cycle_of(&self, tick: u64) -> u64 {
        match self.cycle_len() {
            0 => 0,
            len => tick / len,
        }
    }

    /// Produce the index for the current tick and advance by `speed`.
    pub fn step(&mut self) -> TransportStep {
        let tick = self.v.floor() as u64;
        self.v += self.config.speed;

        let Some((in_point, out_point)) = self.window() else {
            return TransportStep {
                index: tick,
                wrapped: false,
                completed: false,
            };
        };

        let d = out_point.saturating_sub(in_point);
        if d == 0 {
            let completed = !self.completion_fired;
            self.completion_fired = true;
            return TransportStep {
                index: in_point,
                wrapped: false,
                completed,
            };
        }

        let mut step = TransportStep {
            index: in_point,
            wrapped: false,
            completed: false,
        };

        let cycle = self.cycle_of(tick);
        if cycle > self.cycle {
            let crossed = cycle - self.cycle;
            self.cycle = cycle;
            for _ in 0..crossed {
                if self.config.loop_count == 0 || self.loops_done < self.config.loop_count {
                    self.loops_done += 1;
                    step.wrapped = true;
                    if self.config.loop_count > 0
                        && self.loops_done == self.config.loop_count
                        && !self.completion_fired
                    {
                        self.completion_fired = true;
                        step.completed = true;
                    }
                }
            }
            if self.config.mode == PlaybackMode::Random {
                self.random_anchor = tick;
                self.random_offset = self.pick_offset();
            }
        }

        let p = match self.config.mode {
            PlaybackMode::Linear => tick % d,
            PlaybackMode::Bounce => {
                let len = self.cycle_len();
                let q = tick % len;
                if q < d {
                    q
                } else {
                    len - q
                }
            }
            PlaybackMode::Random => {
                let every = self.config.random_frame_count;
                if every > 0 && tick.saturating_sub(self.random_anchor) >= every {
                    self.random_anchor = tick;
                    self.random_offset = self.pick_offset();
                }
                (self.random_offset + tick.saturating_sub(self.random_anchor)) % d
            }
        };

        step.index = if self.config.reverse {
            in_point + (d - 1 - p)
        } else {
            in_point + p
        };
        step
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.max(0.0)
    } else {
        1.0
    }
}
