//! Link layer abstraction for the BLE transfer engine
//!
//! Defines the contract the transfer engine consumes: packet size limits,
//! non-blocking send attempts, readiness signals and disconnect notification.
//! Platform code (CoreBluetooth, Android GATT, BlueZ) implements [`BleLink`];
//! everything above it is hardware independent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a remote BLE peer.
///
/// Platforms hand out different identifier shapes (CoreBluetooth UUIDs,
/// Android MAC addresses), so the engine only ever compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// GATT characteristic a packet travelled over.
///
/// Each characteristic is an independent logical channel for reassembly:
/// bytes written by a central never interleave with notifications from a
/// peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Characteristic {
    /// Central → peripheral writes
    Write,
    /// Peripheral → central notifications
    Notify,
}

impl Characteristic {
    /// Characteristic UUID (short form)
    pub fn uuid(&self) -> u16 {
        match self {
            Characteristic::Write => 0xDF02,
            Characteristic::Notify => 0xDF03,
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Characteristic::Write => write!(f, "write"),
            Characteristic::Notify => write!(f, "notify"),
        }
    }
}

/// Result of handing one packet to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The link took the packet; its bytes count as sent.
    Accepted,
    /// Buffers are full. Nothing was sent; a readiness signal follows.
    NotReady,
    /// Hard failure reported by the platform stack.
    Failed(String),
}

/// How many packets a link takes per readiness signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Keep writing until the link reports `NotReady` (write-without-response).
    #[default]
    BackToBack,
    /// One packet, then wait for the readiness signal (write-with-response).
    OnePerReady,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::BackToBack => write!(f, "back-to-back"),
            WriteMode::OnePerReady => write!(f, "one-per-ready"),
        }
    }
}

/// Per-connection capabilities, decided when the connection is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkCapabilities {
    pub write_mode: WriteMode,
}

impl LinkCapabilities {
    pub fn new(write_mode: WriteMode) -> Self {
        Self { write_mode }
    }
}

/// The radio as seen by the transfer engine.
///
/// Every method must return without blocking. Readiness and disconnects are
/// reported out of band as [`LinkEvent`]s.
#[cfg_attr(test, mockall::automock)]
pub trait BleLink: Send {
    /// Largest packet the peer accepts right now. Queried before every packet.
    fn max_packet_size(&self, peer: &PeerId) -> usize;

    /// Attempt to hand one packet to the radio.
    fn try_send(&mut self, peer: &PeerId, packet: &[u8]) -> SendOutcome;

    /// Whether `peer` is in the connected set.
    fn is_connected(&self, peer: &PeerId) -> bool;

    /// Write capabilities negotiated for `peer`'s connection.
    fn capabilities(&self, peer: &PeerId) -> LinkCapabilities;
}

/// Events from the link layer to the transfer engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Buffer pressure cleared for `peer`
    ReadyForData { peer: PeerId },
    /// Connection established with a peer
    PeerConnected { peer: PeerId },
    /// A peer disconnected
    PeerDisconnected { peer: PeerId },
    /// One inbound packet
    PacketReceived {
        peer: PeerId,
        characteristic: Characteristic,
        data: Vec<u8>,
    },
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::ReadyForData { peer } => write!(f, "ReadyForData {{ peer: {} }}", peer),
            LinkEvent::PeerConnected { peer } => write!(f, "PeerConnected {{ peer: {} }}", peer),
            LinkEvent::PeerDisconnected { peer } => {
                write!(f, "PeerDisconnected {{ peer: {} }}", peer)
            }
            LinkEvent::PacketReceived {
                peer,
                characteristic,
                data,
            } => write!(
                f,
                "PacketReceived {{ peer: {}, characteristic: {}, data_len: {} }}",
                peer,
                characteristic,
                data.len()
            ),
        }
    }
}
