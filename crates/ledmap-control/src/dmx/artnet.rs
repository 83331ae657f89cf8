//! Art-Net protocol implementation (Art-Net 4)
//!
//! Only the two packets a sender needs are built: ArtDmx (OpDmx) carrying one
//! universe and ArtSync (OpSync) telling receivers to latch what they have
//! buffered. A small parser exists for inspection and tests.

use ledmap_core::{UniverseBuffer, MAX_UNIVERSE, UNIVERSE_SIZE};

use crate::{error::ControlError, Result};

/// Packet identifier at the start of every Art-Net packet
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";
/// OpDmx opcode (little-endian on the wire)
pub const OP_DMX: u16 = 0x5000;
/// OpSync opcode (little-endian on the wire)
pub const OP_SYNC: u16 = 0x5200;
/// Protocol revision (big-endian on the wire)
pub const PROTOCOL_VERSION: u16 = 14;

/// ArtDmx header length
pub const DMX_HEADER_LEN: usize = 18;
/// ArtSync total length
pub const SYNC_LEN: usize = 14;

/// Build an ArtDmx packet for one universe.
///
/// `sequence` 0 disables receiver-side reordering; senders cycle 1..=255.
pub fn build_dmx_packet(universe: u16, sequence: u8, channels: &UniverseBuffer) -> Vec<u8> {
    let mut packet = vec![0u8; DMX_HEADER_LEN + UNIVERSE_SIZE];

    // Header: "Art-Net\0"
    packet[0..8].copy_from_slice(ARTNET_ID);

    // OpCode: OpDmx (0x5000)
    packet[8..10].copy_from_slice(&OP_DMX.to_le_bytes());

    // Protocol version (14)
    packet[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());

    packet[12] = sequence;

    // Physical (0)
    packet[13] = 0;

    // Universe (15-bit Port-Address)
    packet[14..16].copy_from_slice(&(universe & MAX_UNIVERSE).to_le_bytes());

    // Length (512 channels, big-endian)
    packet[16..18].copy_from_slice(&(UNIVERSE_SIZE as u16).to_be_bytes());

    packet[DMX_HEADER_LEN..].copy_from_slice(channels);

    packet
}

/// Build an ArtSync packet.
pub fn build_sync_packet() -> Vec<u8> {
    let mut packet = vec![0u8; SYNC_LEN];
    packet[0..8].copy_from_slice(ARTNET_ID);
    packet[8..10].copy_from_slice(&OP_SYNC.to_le_bytes());
    packet[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    // Aux1, Aux2 stay 0
    packet
}

/// Next ArtDmx sequence number, skipping 0
pub fn next_sequence(sequence: u8) -> u8 {
    match sequence {
        255 => 1,
        s => s + 1,
    }
}

/// Decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtPacket {
    Dmx {
        sequence: u8,
        universe: u16,
        data: Vec<u8>,
    },
    Sync,
}

/// Parse an ArtDmx or ArtSync packet.
pub fn parse_packet(packet: &[u8]) -> Result<ArtPacket> {
    if packet.len() < 12 || &packet[0..8] != ARTNET_ID {
        return Err(ControlError::MalformedPacket("missing Art-Net header".into()));
    }
    let opcode = u16::from_le_bytes([packet[8], packet[9]]);
    match opcode {
        OP_SYNC if packet.len() >= SYNC_LEN => Ok(ArtPacket::Sync),
        OP_DMX if packet.len() >= DMX_HEADER_LEN => {
            let length = u16::from_be_bytes([packet[16], packet[17]]) as usize;
            let data = packet
                .get(DMX_HEADER_LEN..DMX_HEADER_LEN + length)
                .ok_or_else(|| {
                    ControlError::MalformedPacket(format!(
                        "ArtDmx declares {} channels, carries {}",
                        length,
                        packet.len() - DMX_HEADER_LEN
                    ))
                })?;
            Ok(ArtPacket::Dmx {
                sequence: packet[12],
                universe: u16::from_le_bytes([packet[14], packet[15]]),
                data: data.to_vec(),
            })
        }
        other => Err(ControlError::MalformedPacket(format!(
            "unsupported opcode 0x{:04x}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artnet_packet_structure() {
        let channels = [0u8; 512];
        let packet = build_dmx_packet(0, 1, &channels);

        // Check header
        assert_eq!(&packet[0..8], b"Art-Net\0");

        // Check OpCode (little-endian)
        assert_eq!(packet[8], 0x00);
        assert_eq!(packet[9], 0x50);

        // Check protocol version (big-endian)
        assert_eq!(packet[10], 0);
        assert_eq!(packet[11], 14);

        // Check length (big-endian)
        assert_eq!(packet[16], 0x02);
        assert_eq!(packet[17], 0x00);

        // Total packet size
        assert_eq!(packet.len(), 18 + 512);
    }

    #[test]
    fn test_universe_little_endian() {
        let packet = build_dmx_packet(0x0123, 7, &[0u8; 512]);
        assert_eq!(packet[14], 0x23);
        assert_eq!(packet[15], 0x01);
        assert_eq!(packet[12], 7);
    }

    #[test]
    fn test_sync_packet() {
        let packet = build_sync_packet();
        assert_eq!(packet.len(), 14);
        assert_eq!(&packet[8..10], &[0x00, 0x52]);
        assert_eq!(parse_packet(&packet).unwrap(), ArtPacket::Sync);
    }

    #[test]
    fn test_parse_dmx() {
        let mut channels = [0u8; 512];
        channels[0] = 20;
        channels[511] = 9;
        let packet = build_dmx_packet(3, 42, &channels);
        match parse_packet(&packet).unwrap() {
            ArtPacket::Dmx {
                sequence,
                universe,
                data,
            } => {
                assert_eq!(sequence, 42);
                assert_eq!(universe, 3);
                assert_eq!(data.len(), 512);
                assert_eq!((data[0], data[511]), (20, 9));
            }
            ArtPacket::Sync => panic!("expected ArtDmx"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_packet(b"not artnet at all").is_err());
        let mut truncated = build_dmx_packet(0, 1, &[0u8; 512]);
        truncated.truncate(100);
        assert!(parse_packet(&truncated).is_err());
    }

    #[test]
    fn test_sequence_skips_zero() {
        assert_eq!(next_sequence(1), 2);
        assert_eq!(next_sequence(255), 1);
    }
}
