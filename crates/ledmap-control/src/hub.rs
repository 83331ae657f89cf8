//! Per-output senders
//!
//! The hub owns one channel per output: its transport, Art-Net sequence
//! counter, delta state and statistics, each behind its own mutex so live
//! players and the replay engine can submit concurrently. A failing output
//! only affects itself.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ledmap_core::{
    EventBus, OutputConfig, OutputId, OutputStatus, ShowEvent, UniverseBuffer,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::dmx::{
    build_dmx_packet, build_sync_packet, next_sequence, PacketTransport, TransportFactory,
    UdpTransport,
};
use crate::error::ControlError;

/// Jitter tolerated by the rate limiter
const RATE_SLACK: Duration = Duration::from_millis(2);

/// Per-universe payloads for one output and one tick
pub type UniverseFrame = BTreeMap<u16, UniverseBuffer>;

/// What happened to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { packets: usize, bytes: usize },
    /// No channel moved beyond the delta threshold
    Unchanged,
    /// Faster than the output's target rate
    RateLimited,
    /// Replay owns this output
    Claimed,
    Inactive,
    /// Socket buffer full; this tick's payload was dropped
    WouldBlock,
    Failed,
}

/// Who is submitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Live,
    Replay,
}

struct OutputChannel {
    config: OutputConfig,
    transport: Option<Box<dyn PacketTransport>>,
    sequence: u8,
    /// Last payload actually transmitted, per universe
    last_sent: UniverseFrame,
    /// Submissions since the last send
    frames_since_send: u32,
    last_send_at: Option<Instant>,
    replay_claimed: bool,
    stats: OutputStatus,
}

impl OutputChannel {
    fn new(config: OutputConfig) -> Self {
        let stats = OutputStatus {
            id: config.id,
            name: config.name.clone(),
            active: config.active,
            ..OutputStatus::default()
        };
        Self {
            config,
            transport: None,
            sequence: 0,
            last_sent: UniverseFrame::new(),
            frames_since_send: 0,
            last_send_at: None,
            replay_claimed: false,
            stats,
        }
    }

    /// Keep delta state and socket unless the wire side changed.
    fn reconfigure(&mut self, config: OutputConfig) {
        let rebind = config.destination != self.config.destination
            || config.bind_address != self.config.bind_address;
        if rebind {
            self.transport = None;
        }
        if rebind || config.universes != self.config.universes || config.delta != self.config.delta
        {
            self.last_sent.clear();
            self.frames_since_send = 0;
        }
        self.stats.name = config.name.clone();
        self.stats.active = config.active;
        self.config = config;
    }

    /// Every channel within `threshold` of what was last sent
    fn unchanged(&self, payload: &UniverseFrame) -> bool {
        let threshold = self.config.delta.threshold;
        payload.iter().all(|(universe, buffer)| {
            self.last_sent.get(universe).is_some_and(|last| {
                last.iter()
                    .zip(buffer.iter())
                    .all(|(a, b)| a.abs_diff(*b) <= threshold)
            })
        })
    }

    fn transmit(
        &mut self,
        frame: &UniverseFrame,
        source: Source,
        factory: &TransportFactory,
    ) -> Result<SendOutcome, ControlError> {
        if !self.config.active {
            return Ok(SendOutcome::Inactive);
        }
        if source == Source::Live && self.replay_claimed {
            return Ok(SendOutcome::Claimed);
        }

        // full-sync staleness bound counts frames, sent or not
        self.frames_since_send = self.frames_since_send.saturating_add(1);

        let now = Instant::now();
        if let (Some(min), Some(last)) = (self.config.min_interval(), self.last_send_at) {
            if now.duration_since(last) + RATE_SLACK < min {
                self.stats.frames_suppressed += 1;
                return Ok(SendOutcome::RateLimited);
            }
        }

        let payload: UniverseFrame = self
            .config
            .universes
            .iter()
            .map(|u| (*u, frame.get(u).copied().unwrap_or([0u8; 512])))
            .collect();
        if payload.is_empty() {
            return Ok(SendOutcome::Unchanged);
        }

        let delta = self.config.delta;
        if delta.enabled && !self.last_sent.is_empty() {
            let full_sync_due =
                delta.full_sync_interval > 0 && self.frames_since_send >= delta.full_sync_interval;
            if !full_sync_due && self.unchanged(&payload) {
                self.stats.frames_suppressed += 1;
                trace!("Output {}: unchanged, suppressed", self.config.id);
                return Ok(SendOutcome::Unchanged);
            }
        }

        if self.transport.is_none() {
            self.transport = Some(factory(&self.config)?);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Ok(SendOutcome::Failed);
        };

        let mut packets = 0;
        let mut bytes = 0;
        for (universe, buffer) in &payload {
            let sequence = next_sequence(self.sequence);
            let packet = build_dmx_packet(*universe, sequence, buffer);
            match transport.send(&packet) {
                Ok(()) => {
                    // numbers already on the wire are never reused
                    self.sequence = sequence;
                    packets += 1;
                    bytes += packet.len();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!(
                        "Output {}: socket busy, dropping tick payload",
                        self.config.id
                    );
                    self.stats.frames_suppressed += 1;
                    return Ok(SendOutcome::WouldBlock);
                }
                Err(e) => {
                    // reopen on the next tick
                    self.transport = None;
                    return Err(ControlError::Transmission {
                        output: self.config.id,
                        message: e.to_string(),
                    });
                }
            }
        }
        if self.config.artsync {
            let packet = build_sync_packet();
            match transport.send(&packet) {
                Ok(()) => {
                    packets += 1;
                    bytes += packet.len();
                }
                Err(e) => debug!("Output {}: ArtSync not sent: {}", self.config.id, e),
            }
        }

        self.last_sent = payload;
        self.frames_since_send = 0;
        self.last_send_at = Some(now);
        self.stats.packets_sent += packets as u64;
        self.stats.bytes_sent += bytes as u64;
        self.stats.last_send = Some(Utc::now());
        Ok(SendOutcome::Sent { packets, bytes })
    }
}

/// All output senders
pub struct OutputHub {
    channels: RwLock<BTreeMap<OutputId, Arc<Mutex<OutputChannel>>>>,
    factory: TransportFactory,
    events: Arc<EventBus>,
}

impl std::fmt::Debug for OutputHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHub")
            .field("outputs", &self.channels.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OutputHub {
    pub fn new(factory: TransportFactory, events: Arc<EventBus>) -> Self {
        Self {
            channels: RwLock::new(BTreeMap::new()),
            factory,
            events,
        }
    }

    /// Hub sending over real UDP sockets
    pub fn udp(events: Arc<EventBus>) -> Self {
        Self::new(UdpTransport::factory(), events)
    }

    /// Make the set of outputs match `outputs`. Existing outputs keep their
    /// socket and delta state unless their wire settings changed.
    pub fn configure(&self, outputs: &[OutputConfig]) {
        let mut channels = self.channels.write();
        channels.retain(|id, _| {
            let keep = outputs.iter().any(|o| o.id == *id);
            if !keep {
                info!("Output {} removed", id);
            }
            keep
        });
        for config in outputs {
            match channels.get(&config.id) {
                Some(channel) => channel.lock().reconfigure(config.clone()),
                None => {
                    info!(
                        "Output {} '{}' -> {} universes {:?}",
                        config.id,
                        config.name,
                        config.destination_addr(),
                        config.universes
                    );
                    channels.insert(
                        config.id,
                        Arc::new(Mutex::new(OutputChannel::new(config.clone()))),
                    );
                }
            }
        }
    }

    pub fn output_ids(&self) -> Vec<OutputId> {
        self.channels.read().keys().copied().collect()
    }

    fn channel(&self, output: OutputId) -> Option<Arc<Mutex<OutputChannel>>> {
        self.channels.read().get(&output).cloned()
    }

    /// Submit one tick's universes for `output`. Failures are contained:
    /// they are logged, counted and published, never returned.
    pub fn submit(&self, output: OutputId, frame: &UniverseFrame, source: Source) -> SendOutcome {
        let Some(channel) = self.channel(output) else {
            trace!("Output {} unknown, dropping frame", output);
            return SendOutcome::Inactive;
        };
        let mut channel = channel.lock();
        match channel.transmit(frame, source, &self.factory) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Output {}: {}", output, e);
                channel.stats.errors += 1;
                channel.stats.last_error = Some(e.to_string());
                drop(channel);
                self.events.publish(ShowEvent::OutputError {
                    output,
                    message: e.to_string(),
                });
                SendOutcome::Failed
            }
        }
    }

    /// Give replay priority on `outputs`; live submissions are dropped there
    /// until released.
    pub fn claim(&self, outputs: &[OutputId]) {
        for output in outputs {
            if let Some(channel) = self.channel(*output) {
                let mut channel = channel.lock();
                channel.replay_claimed = true;
                channel.stats.replay_claimed = true;
            }
        }
    }

    pub fn release_all(&self) {
        for channel in self.channels.read().values() {
            let mut channel = channel.lock();
            channel.replay_claimed = false;
            channel.stats.replay_claimed = false;
        }
    }

    pub fn status(&self, output: OutputId) -> Option<OutputStatus> {
        self.channel(output).map(|c| c.lock().stats.clone())
    }

    pub fn statuses(&self) -> Vec<OutputStatus> {
        self.channels
            .read()
            .values()
            .map(|c| c.lock().stats.clone())
            .collect()
    }
}
