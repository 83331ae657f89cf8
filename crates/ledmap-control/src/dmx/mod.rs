//! DMX output over Art-Net
//!
//! ## Art-Net
//!
//! Art-Net is a UDP protocol for DMX transmission over Ethernet.
//! - Well-known port 6454, also used as the source port
//! - 15-bit port-address, so up to 32768 universes
//! - Sequence numbers so receivers can drop reordered packets
//! - ArtSync to latch all universes of a frame at once
//!
//! ## Example Usage
//!
//! ```rust
//! use ledmap_control::dmx::{build_dmx_packet, parse_packet, ArtPacket};
//!
//! let mut channels = [0u8; 512];
//! channels[0] = 255;
//! let packet = build_dmx_packet(1, 1, &channels);
//! assert!(matches!(parse_packet(&packet), Ok(ArtPacket::Dmx { universe: 1, .. })));
//! ```

pub mod artnet;
pub mod transport;

pub use artnet::{
    build_dmx_packet, build_sync_packet, next_sequence, parse_packet, ArtPacket,
};
pub use transport::{
    resolve_destination, MemoryNetwork, MemoryTransport, PacketTransport, TransportFactory,
    UdpTransport,
};
