//! Packet transports
//!
//! A transport carries already-encoded packets for one output. The UDP
//! transport owns the output's socket; the in-memory one records packets so
//! routing can be tested without a network.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use ledmap_core::{OutputConfig, OutputId, ARTNET_PORT};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

use crate::{error::ControlError, Result};

/// Sends packets for one output. `send` must not block: a transport that
/// cannot accept a packet right now returns `ErrorKind::WouldBlock`.
pub trait PacketTransport: Send {
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;

    fn describe(&self) -> String;
}

/// Opens the transport for an output
pub type TransportFactory =
    Arc<dyn Fn(&OutputConfig) -> Result<Box<dyn PacketTransport>> + Send + Sync>;

/// Resolve an output's destination address.
pub fn resolve_destination(config: &OutputConfig) -> Result<SocketAddr> {
    let invalid = || ControlError::InvalidDestination {
        output: config.id,
        destination: config.destination.clone(),
    };
    config
        .destination_addr()
        .to_socket_addrs()
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}

/// Non-blocking UDP socket bound to the Art-Net port
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    /// Bind the output's socket so packets leave from port 6454, which some
    /// receivers require. Address and port reuse let every output hold its
    /// own socket on that port.
    pub fn open(config: &OutputConfig) -> Result<Self> {
        let target = resolve_destination(config)?;
        let failed = |message: String| ControlError::Transmission {
            output: config.id,
            message,
        };

        let bind = (config.bind_address.as_str(), ARTNET_PORT)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| failed(format!("invalid bind address {}", config.bind_address)))?;
        let socket = bind_reusable(bind)
            .map_err(|e| failed(format!("cannot bind {}: {}", bind, e)))?;

        info!(
            "Art-Net output {} bound {} -> {}",
            config.id,
            socket.local_addr()?,
            target
        );
        Ok(Self { socket, target })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn factory() -> TransportFactory {
        Arc::new(|config| Ok(Box::new(UdpTransport::open(config)?) as Box<dyn PacketTransport>))
    }
}

fn bind_reusable(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

impl PacketTransport for UdpTransport {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self.socket.send_to(packet, self.target).map(|_| ())
    }

    fn describe(&self) -> String {
        format!("udp {}", self.target)
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    packets: BTreeMap<OutputId, Vec<Vec<u8>>>,
    failing: HashSet<OutputId>,
    blocked: HashSet<OutputId>,
    /// Packets accepted before the output starts reporting `WouldBlock`
    budgets: BTreeMap<OutputId, usize>,
}

/// In-memory network collecting every packet per output
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> TransportFactory {
        let network = self.clone();
        Arc::new(move |config| {
            resolve_destination(config)?;
            Ok(Box::new(MemoryTransport {
                output: config.id,
                network: network.clone(),
            }) as Box<dyn PacketTransport>)
        })
    }

    /// Packets sent by `output`, oldest first
    pub fn packets(&self, output: OutputId) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .packets
            .get(&output)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_packets(&self) -> usize {
        self.state.lock().packets.values().map(Vec::len).sum()
    }

    pub fn clear(&self) {
        self.state.lock().packets.clear();
    }

    /// Make sends on `output` fail with a connection error.
    pub fn set_failing(&self, output: OutputId, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(output);
        } else {
            state.failing.remove(&output);
        }
    }

    /// Accept `budget` more packets on `output`, then report `WouldBlock`.
    /// `None` removes the limit.
    pub fn set_packet_budget(&self, output: OutputId, budget: Option<usize>) {
        let mut state = self.state.lock();
        match budget {
            Some(budget) => state.budgets.insert(output, budget),
            None => state.budgets.remove(&output),
        };
    }

    /// Make sends on `output` report `WouldBlock`.
    pub fn set_blocked(&self, output: OutputId, blocked: bool) {
        let mut state = self.state.lock();
        if blocked {
            state.blocked.insert(output);
        } else {
            state.blocked.remove(&output);
        }
    }
}

/// One output's end of a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryTransport {
    output: OutputId,
    network: MemoryNetwork,
}

impl PacketTransport for MemoryTransport {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let mut state = self.network.state.lock();
        if state.failing.contains(&self.output) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "simulated failure",
            ));
        }
        if state.blocked.contains(&self.output) {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if let Some(budget) = state.budgets.get_mut(&self.output) {
            if *budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            *budget -= 1;
        }
        state
            .packets
            .entry(self.output)
            .or_default()
            .push(packet.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory output {}", self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_destination() {
        let config = OutputConfig::new(1, "127.0.0.1", vec![0]);
        assert_eq!(
            resolve_destination(&config).unwrap(),
            "127.0.0.1:6454".parse().unwrap()
        );

        let config = OutputConfig::new(2, "invalid:address", vec![0]);
        assert!(matches!(
            resolve_destination(&config),
            Err(ControlError::InvalidDestination { output: 2, .. })
        ));
    }

    #[test]
    fn test_memory_network_records_and_fails() {
        let network = MemoryNetwork::new();
        let config = OutputConfig::new(4, "127.0.0.1", vec![0]);
        let mut transport = (network.factory())(&config).unwrap();

        transport.send(b"one").unwrap();
        network.set_blocked(4, true);
        assert_eq!(
            transport.send(b"two").unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
        network.set_blocked(4, false);
        network.set_failing(4, true);
        assert!(transport.send(b"three").is_err());
        assert_eq!(network.packets(4), vec![b"one".to_vec()]);
    }

    #[test]
    fn test_udp_transport_sends() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        let mut config = OutputConfig::new(1, format!("127.0.0.1:{}", port), vec![0]);
        config.bind_address = "127.0.0.1".into();

        let mut transport = UdpTransport::open(&config).unwrap();
        transport.send(b"Art-Net\0").unwrap();

        let mut buf = [0u8; 64];
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(1)))
            .unwrap();
        let (len, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"Art-Net\0");
        assert_eq!(from.port(), ARTNET_PORT);
    }

    #[test]
    fn test_every_output_sends_from_artnet_port() {
        let first = UdpTransport::open(&OutputConfig::new(1, "127.0.0.1", vec![0])).unwrap();
        let second = UdpTransport::open(&OutputConfig::new(2, "127.0.0.1", vec![1])).unwrap();
        assert_eq!(first.local_addr().unwrap().port(), ARTNET_PORT);
        assert_eq!(second.local_addr().unwrap().port(), ARTNET_PORT);
    }

    #[test]
    fn test_bad_bind_address_is_transmission_error() {
        let mut config = OutputConfig::new(3, "127.0.0.1", vec![0]);
        config.bind_address = "not an address".into();
        assert!(matches!(
            UdpTransport::open(&config),
            Err(ControlError::Transmission { output: 3, .. })
        ));
    }
}
