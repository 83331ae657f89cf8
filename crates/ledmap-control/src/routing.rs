//! Canvas to Art-Net routing
//!
//! The engine samples a composited canvas through the current topology,
//! groups the packed universes by owning output and hands each group to the
//! output hub. The topology sits behind an `ArcSwap` so a reload never
//! blocks a player mid-tick.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use ledmap_core::{
    CanvasFrame, FrameSink, OutputId, Topology, UniverseBuffer, UNIVERSE_SIZE,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::hub::{OutputHub, SendOutcome, Source, UniverseFrame};
use crate::recorder::DmxRecorder;

/// Group packed universes by the output carrying them.
pub fn group_by_output(
    topology: &Topology,
    packed: &BTreeMap<u16, UniverseBuffer>,
) -> BTreeMap<OutputId, UniverseFrame> {
    let mut grouped: BTreeMap<OutputId, UniverseFrame> = BTreeMap::new();
    for (universe, buffer) in packed {
        if let Some(owner) = topology.owner_of(*universe) {
            grouped.entry(owner).or_default().insert(*universe, *buffer);
        }
    }
    grouped
}

pub struct RoutingEngine {
    topology: ArcSwap<Topology>,
    hub: Arc<OutputHub>,
    recorder: Mutex<Option<Arc<DmxRecorder>>>,
}

impl RoutingEngine {
    pub fn new(topology: Topology, hub: Arc<OutputHub>) -> Self {
        hub.configure(topology.outputs());
        Self {
            topology: ArcSwap::from_pointee(topology),
            hub,
            recorder: Mutex::new(None),
        }
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load_full()
    }

    pub fn hub(&self) -> &Arc<OutputHub> {
        &self.hub
    }

    /// Replace the topology; outputs are reconfigured to match.
    pub fn swap_topology(&self, topology: Topology) {
        info!(
            "Topology swapped: {} objects, {} outputs",
            topology.objects().len(),
            topology.outputs().len()
        );
        self.hub.configure(topology.outputs());
        self.topology.store(Arc::new(topology));
    }

    /// Capture every routed frame into `recorder` until detached.
    pub fn attach_recorder(&self, recorder: Arc<DmxRecorder>) {
        *self.recorder.lock() = Some(recorder);
    }

    pub fn detach_recorder(&self) -> Option<Arc<DmxRecorder>> {
        self.recorder.lock().take()
    }

    /// Route one canvas frame. With `outputs` set, only those outputs are
    /// sent to.
    pub fn route(
        &self,
        frame: &CanvasFrame,
        outputs: Option<&BTreeSet<OutputId>>,
    ) -> BTreeMap<OutputId, SendOutcome> {
        let topology = self.topology.load();
        if frame.size() != topology.canvas_size() {
            debug!(
                "Frame {:?} does not match canvas {:?}, dropped",
                frame.size(),
                topology.canvas_size()
            );
            return BTreeMap::new();
        }

        let packed = topology.pack(frame);
        let outcomes: BTreeMap<OutputId, SendOutcome> = group_by_output(&topology, &packed)
            .into_iter()
            .filter(|(output, _)| outputs.map_or(true, |set| set.contains(output)))
            .map(|(output, universes)| {
                (output, self.hub.submit(output, &universes, Source::Live))
            })
            .collect();

        if let Some(recorder) = self.recorder.lock().as_ref() {
            recorder.record(&sent_universes(&topology, &packed, &outcomes));
        }
        outcomes
    }
}

/// What actually went out this tick: every universe of each output that
/// sent, zero-filled the way the hub fills it.
fn sent_universes(
    topology: &Topology,
    packed: &BTreeMap<u16, UniverseBuffer>,
    outcomes: &BTreeMap<OutputId, SendOutcome>,
) -> UniverseFrame {
    let mut sent = UniverseFrame::new();
    for (output, outcome) in outcomes {
        if !matches!(outcome, SendOutcome::Sent { .. }) {
            continue;
        }
        let Some(config) = topology.output(*output) else {
            continue;
        };
        for universe in &config.universes {
            let buffer = packed.get(universe).copied().unwrap_or([0u8; UNIVERSE_SIZE]);
            sent.insert(*universe, buffer);
        }
    }
    sent
}

/// Frame sink routing a player's frames, optionally to a subset of outputs
pub struct RoutedSink {
    engine: Arc<RoutingEngine>,
    outputs: Option<BTreeSet<OutputId>>,
}

impl RoutedSink {
    pub fn new(engine: Arc<RoutingEngine>, outputs: Option<Vec<OutputId>>) -> Self {
        Self {
            engine,
            outputs: outputs.map(|o| o.into_iter().collect()),
        }
    }
}

impl FrameSink for RoutedSink {
    fn submit(&self, frame: &CanvasFrame) {
        self.engine.route(frame, self.outputs.as_ref());
    }
}
