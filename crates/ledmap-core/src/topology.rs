//! LED objects and the static object/output topology
//!
//! The topology is validated once when built. Offending objects and outputs
//! are dropped and reported; everything else is kept. After that it is
//! read-only and is shared by every player and the replay engine.

use std::collections::{BTreeMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::frame::CanvasFrame;
use crate::output::{OutputConfig, OutputId, MAX_UNIVERSE};

/// Channels in one DMX universe
pub const UNIVERSE_SIZE: usize = 512;

/// DMX payload of one universe
pub type UniverseBuffer = [u8; UNIVERSE_SIZE];

/// Wire order of the three color channels of a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Grb,
    Bgr,
    Rbg,
    Gbr,
    Brg,
}

impl ChannelOrder {
    /// Reorder an RGB triple into wire order
    pub fn apply(&self, [r, g, b]: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Grb => [g, r, b],
            ChannelOrder::Bgr => [b, g, r],
            ChannelOrder::Rbg => [r, b, g],
            ChannelOrder::Gbr => [g, b, r],
            ChannelOrder::Brg => [b, r, g],
        }
    }
}

/// Bits per color value on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BitDepth {
    #[default]
    Eight,
    /// Coarse/fine byte pair per value
    Sixteen,
}

impl BitDepth {
    /// DMX channels used by one value
    pub fn bytes(&self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Sixteen => 2,
        }
    }

    /// DMX channels used by one RGB pixel
    pub fn pixel_width(&self) -> usize {
        3 * self.bytes()
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(format!("unsupported bit depth {} (expected 8 or 16)", other)),
        }
    }
}

impl From<BitDepth> for u8 {
    fn from(depth: BitDepth) -> u8 {
        match depth {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

/// Where an object's pixels start in a universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseAssignment {
    pub universe: u16,
    /// 1-based DMX channel
    #[serde(default = "default_start_channel")]
    pub start_channel: u16,
}

fn default_start_channel() -> u16 {
    1
}

impl UniverseAssignment {
    pub fn new(universe: u16, start_channel: u16) -> Self {
        Self {
            universe,
            start_channel,
        }
    }
}

/// A named fixture or group sampling points from the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedObject {
    pub name: String,
    /// Canvas-space pixel coordinates, in wire order
    pub points: Vec<Vec2>,
    /// Filled in order; a pixel never straddles two universes
    pub assignments: Vec<UniverseAssignment>,
    #[serde(default)]
    pub channel_order: ChannelOrder,
    #[serde(default)]
    pub bit_depth: BitDepth,
}

impl LedObject {
    pub fn new(name: impl Into<String>, points: Vec<Vec2>, assignments: Vec<UniverseAssignment>) -> Self {
        Self {
            name: name.into(),
            points,
            assignments,
            channel_order: ChannelOrder::Rgb,
            bit_depth: BitDepth::Eight,
        }
    }

    /// Points laid out in a horizontal row at `y`, one per pixel from `x0`
    pub fn strip(name: impl Into<String>, x0: u32, y: u32, count: u32, universe: u16) -> Self {
        let points = (0..count)
            .map(|i| Vec2::new((x0 + i) as f32, y as f32))
            .collect();
        Self::new(name, points, vec![UniverseAssignment::new(universe, 1)])
    }
}

/// Precomputed destination of one sampled point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSlot {
    pub x: u32,
    pub y: u32,
    pub universe: u16,
    /// 0-based byte offset in the universe payload
    pub offset: usize,
}

/// An accepted object with its slots resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMapping {
    pub name: String,
    pub channel_order: ChannelOrder,
    pub bit_depth: BitDepth,
    pub slots: Vec<PixelSlot>,
}

/// Validated objects and outputs
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    width: u32,
    height: u32,
    objects: Vec<LedObject>,
    mappings: Vec<ObjectMapping>,
    outputs: Vec<OutputConfig>,
    universe_owner: BTreeMap<u16, OutputId>,
}

impl Topology {
    /// Topology with no objects and no outputs
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            objects: Vec::new(),
            mappings: Vec::new(),
            outputs: Vec::new(),
            universe_owner: BTreeMap::new(),
        }
    }

    /// Validate and build. Rejected entries are left out and returned.
    pub fn build(
        width: u32,
        height: u32,
        objects: Vec<LedObject>,
        outputs: Vec<OutputConfig>,
    ) -> (Self, Vec<ConfigError>) {
        let mut topology = Self::empty(width, height);
        let mut errors = Vec::new();

        for output in outputs {
            match topology.check_output(&output) {
                Ok(()) => {
                    for universe in &output.universes {
                        topology.universe_owner.insert(*universe, output.id);
                    }
                    topology.outputs.push(output);
                }
                Err(e) => {
                    warn!("Rejected output {}: {}", output.id, e);
                    errors.push(e);
                }
            }
        }

        let mut names = HashSet::new();
        for object in objects {
            if !names.insert(object.name.clone()) {
                let e = ConfigError::Duplicate {
                    kind: "object",
                    id: object.name.clone(),
                };
                warn!("Rejected object: {}", e);
                errors.push(e);
                continue;
            }
            match topology.map_object(&object) {
                Ok(mapping) => {
                    for slot in &mapping.slots {
                        if !topology.universe_owner.contains_key(&slot.universe) {
                            warn!(
                                "Object '{}' uses universe {} which no output carries",
                                object.name, slot.universe
                            );
                            break;
                        }
                    }
                    topology.mappings.push(mapping);
                    topology.objects.push(object);
                }
                Err(e) => {
                    warn!("Rejected object '{}': {}", object.name, e);
                    errors.push(e);
                }
            }
        }

        info!(
            "Topology: {} objects ({} points), {} outputs, {} universes, {} rejected",
            topology.objects.len(),
            topology.point_count(),
            topology.outputs.len(),
            topology.universe_owner.len(),
            errors.len()
        );
        (topology, errors)
    }

    /// Same objects with a different output set
    pub fn with_outputs(&self, outputs: Vec<OutputConfig>) -> (Self, Vec<ConfigError>) {
        Self::build(self.width, self.height, self.objects.clone(), outputs)
    }

    fn check_output(&self, output: &OutputConfig) -> Result<(), ConfigError> {
        if self.outputs.iter().any(|o| o.id == output.id) {
            return Err(ConfigError::Duplicate {
                kind: "output",
                id: output.id.to_string(),
            });
        }
        if !is_valid_destination(&output.destination_addr()) {
            return Err(ConfigError::InvalidDestination {
                output: output.id,
                destination: output.destination.clone(),
            });
        }
        let mut seen = HashSet::new();
        for universe in &output.universes {
            if *universe > MAX_UNIVERSE {
                return Err(ConfigError::UniverseOutOfRange(*universe));
            }
            if let Some(owner) = self.universe_owner.get(universe) {
                return Err(ConfigError::UniverseConflict {
                    universe: *universe,
                    output: output.id,
                    owner: *owner,
                });
            }
            if !seen.insert(*universe) {
                return Err(ConfigError::Duplicate {
                    kind: "universe",
                    id: universe.to_string(),
                });
            }
        }
        Ok(())
    }

    fn map_object(&self, object: &LedObject) -> Result<ObjectMapping, ConfigError> {
        for p in &object.points {
            let inside = p.x.is_finite()
                && p.y.is_finite()
                && p.x >= 0.0
                && p.y >= 0.0
                && p.x < self.width as f32
                && p.y < self.height as f32;
            if !inside {
                return Err(ConfigError::PointOutsideCanvas {
                    object: object.name.clone(),
                    x: p.x,
                    y: p.y,
                    width: self.width,
                    height: self.height,
                });
            }
        }

        let width = object.bit_depth.pixel_width();
        let mut offsets = Vec::new();
        for assignment in &object.assignments {
            if assignment.universe > MAX_UNIVERSE {
                return Err(ConfigError::UniverseOutOfRange(assignment.universe));
            }
            if assignment.start_channel == 0 || assignment.start_channel as usize > UNIVERSE_SIZE {
                return Err(ConfigError::InvalidStartChannel {
                    object: object.name.clone(),
                    channel: assignment.start_channel,
                });
            }
            let mut offset = assignment.start_channel as usize - 1;
            while offset + width <= UNIVERSE_SIZE {
                offsets.push((assignment.universe, offset));
                offset += width;
            }
        }

        if object.points.len() > offsets.len() {
            return Err(ConfigError::CapacityExceeded {
                object: object.name.clone(),
                needed: object.points.len(),
                available: offsets.len(),
            });
        }

        let slots = object
            .points
            .iter()
            .zip(offsets)
            .map(|(p, (universe, offset))| PixelSlot {
                x: p.x as u32,
                y: p.y as u32,
                universe,
                offset,
            })
            .collect();

        Ok(ObjectMapping {
            name: object.name.clone(),
            channel_order: object.channel_order,
            bit_depth: object.bit_depth,
            slots,
        })
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn objects(&self) -> &[LedObject] {
        &self.objects
    }

    pub fn mappings(&self) -> &[ObjectMapping] {
        &self.mappings
    }

    pub fn outputs(&self) -> &[OutputConfig] {
        &self.outputs
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputConfig> {
        self.outputs.iter().find(|o| o.id == id)
    }

    /// Output carrying `universe`
    pub fn owner_of(&self, universe: u16) -> Option<OutputId> {
        self.universe_owner.get(&universe).copied()
    }

    /// Every routed universe, ascending
    pub fn universes(&self) -> Vec<u16> {
        self.universe_owner.keys().copied().collect()
    }

    /// Total sampled points across accepted objects
    pub fn point_count(&self) -> usize {
        self.mappings.iter().map(|m| m.slots.len()).sum()
    }

    /// Sample `frame` and pack every routed universe.
    ///
    /// Universes no object writes to are still present, all zero.
    pub fn pack(&self, frame: &CanvasFrame) -> BTreeMap<u16, UniverseBuffer> {
        let mut buffers: BTreeMap<u16, UniverseBuffer> = self
            .universe_owner
            .keys()
            .map(|u| (*u, [0u8; UNIVERSE_SIZE]))
            .collect();

        for mapping in &self.mappings {
            for slot in &mapping.slots {
                let Some(buffer) = buffers.get_mut(&slot.universe) else {
                    continue;
                };
                let values = mapping.channel_order.apply(frame.pixel(slot.x, slot.y));
                match mapping.bit_depth {
                    BitDepth::Eight => {
                        buffer[slot.offset..slot.offset + 3].copy_from_slice(&values);
                    }
                    BitDepth::Sixteen => {
                        for (i, v) in values.iter().enumerate() {
                            let wide = *v as u16 * 257;
                            buffer[slot.offset + 2 * i] = (wide >> 8) as u8;
                            buffer[slot.offset + 2 * i + 1] = (wide & 0xFF) as u8;
                        }
                    }
                }
            }
        }
        buffers
    }
}

fn is_valid_destination(addr: &str) -> bool {
    if addr.parse::<std::net::SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && port.parse::<u16>().is_ok()
                && host
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order_grb() {
        assert_eq!(ChannelOrder::Grb.apply([10, 20, 30]), [20, 10, 30]);
        assert_eq!(ChannelOrder::Brg.apply([10, 20, 30]), [30, 10, 20]);
    }

    #[test]
    fn test_pack_grb_at_start_channel() {
        let mut object = LedObject::new(
            "px",
            vec![Vec2::new(0.0, 0.0)],
            vec![UniverseAssignment::new(1, 10)],
        );
        object.channel_order = ChannelOrder::Grb;
        let (topology, errors) = Topology::build(
            2,
            2,
            vec![object],
            vec![OutputConfig::new(1, "127.0.0.1", vec![1])],
        );
        assert!(errors.is_empty());

        let frame = CanvasFrame::solid(2, 2, [10, 20, 30]);
        let buffers = topology.pack(&frame);
        let u1 = &buffers[&1];
        assert_eq!(&u1[9..12], &[20, 10, 30]);
        assert_eq!(u1[8], 0);
        assert_eq!(u1[12], 0);
    }

    #[test]
    fn test_sixteen_bit_coarse_fine() {
        let mut object = LedObject::new(
            "wide",
            vec![Vec2::new(0.0, 0.0)],
            vec![UniverseAssignment::new(0, 1)],
        );
        object.bit_depth = BitDepth::Sixteen;
        let (topology, _) = Topology::build(
            1,
            1,
            vec![object],
            vec![OutputConfig::new(1, "127.0.0.1", vec![0])],
        );
        let buffers = topology.pack(&CanvasFrame::solid(1, 1, [255, 128, 0]));
        assert_eq!(&buffers[&0][0..6], &[255, 255, 128, 128, 0, 0]);
    }

    #[test]
    fn test_pixels_never_straddle_universes() {
        // 171 pixels: 170 fit in universe 0 (510 channels), one spills over
        let object = LedObject::new(
            "long",
            (0..171).map(|i| Vec2::new(i as f32, 0.0)).collect(),
            vec![UniverseAssignment::new(0, 1), UniverseAssignment::new(1, 1)],
        );
        let (topology, errors) = Topology::build(
            200,
            1,
            vec![object],
            vec![OutputConfig::new(1, "127.0.0.1", vec![0, 1])],
        );
        assert!(errors.is_empty());
        let slots = &topology.mappings()[0].slots;
        assert_eq!(slots[169].universe, 0);
        assert_eq!(slots[169].offset, 507);
        assert_eq!(slots[170].universe, 1);
        assert_eq!(slots[170].offset, 0);
    }

    #[test]
    fn test_only_offending_entries_rejected() {
        let good = LedObject::strip("good", 0, 0, 10, 0);
        let too_long = LedObject::strip("too-long", 0, 1, 180, 0);
        let outside = LedObject::new(
            "outside",
            vec![Vec2::new(500.0, 0.0)],
            vec![UniverseAssignment::new(0, 1)],
        );
        let outputs = vec![
            OutputConfig::new(1, "127.0.0.1", vec![0]),
            OutputConfig::new(2, "127.0.0.2", vec![0, 5]),
            OutputConfig::new(3, "not a host", vec![7]),
        ];
        let (topology, errors) = Topology::build(200, 2, vec![good, too_long, outside], outputs);

        assert_eq!(topology.objects().len(), 1);
        assert_eq!(topology.outputs().len(), 1);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| matches!(
            e,
            ConfigError::UniverseConflict {
                universe: 0,
                output: 2,
                owner: 1
            }
        )));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_bit_depth_serde() {
        let depth: BitDepth = serde_json::from_str("16").unwrap();
        assert_eq!(depth, BitDepth::Sixteen);
        assert!(serde_json::from_str::<BitDepth>("12").is_err());
    }
}
