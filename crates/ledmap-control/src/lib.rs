//! ledmap Control - Art-Net output
//!
//! This crate turns composited canvas frames into Art-Net traffic:
//! - **DMX**: ArtDmx / ArtSync packet codec and packet transports
//! - **Hub**: one sender per output with delta encoding, rate limiting and
//!   replay priority
//! - **Routing**: canvas sampling through the LED topology, grouped per output
//! - **Replay**: recorded DMX playback that pre-empts live output
//! - **Recorder**: capture of routed frames for later replay
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ledmap_control::{MemoryNetwork, OutputHub, RoutingEngine};
//! use ledmap_core::{CanvasFrame, EventBus, LedObject, OutputConfig, Topology};
//!
//! let network = MemoryNetwork::new();
//! let hub = Arc::new(OutputHub::new(network.factory(), Arc::new(EventBus::new())));
//! let (topology, errors) = Topology::build(
//!     4,
//!     1,
//!     vec![LedObject::strip("bar", 0, 0, 4, 0)],
//!     vec![OutputConfig::new(1, "127.0.0.1", vec![0])],
//! );
//! assert!(errors.is_empty());
//!
//! let engine = RoutingEngine::new(topology, hub);
//! engine.route(&CanvasFrame::solid(4, 1, [255, 0, 0]), None);
//! assert_eq!(network.packets(1).len(), 1);
//! ```

#![allow(missing_docs)]

/// Art-Net codec and transports
pub mod dmx;
/// Error types
pub mod error;
/// Per-output senders
pub mod hub;
/// Routed frame capture
pub mod recorder;
/// Recorded DMX playback
pub mod replay;
/// Canvas to output routing
pub mod routing;

// Re-exports
pub use dmx::{
    build_dmx_packet, build_sync_packet, parse_packet, ArtPacket, MemoryNetwork, PacketTransport,
    TransportFactory, UdpTransport,
};
pub use error::{ControlError, Result};
pub use hub::{OutputHub, SendOutcome, Source, UniverseFrame};
pub use recorder::DmxRecorder;
pub use replay::{apply_brightness, ReplayManager, DEFAULT_TICK_RATE};
pub use routing::{group_by_output, RoutedSink, RoutingEngine};
