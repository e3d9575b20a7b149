// In-memory BLE link
//
// Simulates the radio between a local node and any number of peers. Each
// peer has a bounded write buffer; `flush` plays the role of the air,
// delivering buffered packets to the remote side and raising readiness
// signals where a writer is waiting. Used by the CLI simulator and tests.

use crate::transport::abstraction::{
    BleLink, Characteristic, LinkCapabilities, LinkEvent, PeerId, SendOutcome, WriteMode,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

/// Link parameters for one simulated peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    /// Largest packet accepted
    pub mtu: usize,
    /// Packets the link buffers before reporting not-ready
    pub buffer_packets: usize,
    pub write_mode: WriteMode,
}

impl Default for PeerProfile {
    fn default() -> Self {
        Self {
            mtu: 20,
            buffer_packets: 4,
            write_mode: WriteMode::BackToBack,
        }
    }
}

struct PeerSlot {
    profile: PeerProfile,
    in_flight: VecDeque<Vec<u8>>,
    owes_ready: bool,
    fail_next: Option<String>,
    remote: Option<UnboundedSender<LinkEvent>>,
}

struct Air {
    local: PeerId,
    events: UnboundedSender<LinkEvent>,
    peers: HashMap<PeerId, PeerSlot>,
    /// Delivery log, kept only while recording is on
    delivered: Option<HashMap<PeerId, Vec<Vec<u8>>>>,
}

/// Shared-state loopback link; clones observe and drive the same radio
#[derive(Clone)]
pub struct LoopbackLink {
    air: Arc<Mutex<Air>>,
}

impl LoopbackLink {
    /// `events` receives readiness and connection events for the local side
    pub fn new(local: PeerId, events: UnboundedSender<LinkEvent>) -> Self {
        Self {
            air: Arc::new(Mutex::new(Air {
                local,
                events,
                peers: HashMap::new(),
                delivered: None,
            })),
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.air.lock().local.clone()
    }

    /// Connect `peer`. Packets reaching it are forwarded to `remote` as
    /// `PacketReceived` events when a sender is given.
    pub fn connect(
        &self,
        peer: PeerId,
        mut profile: PeerProfile,
        remote: Option<UnboundedSender<LinkEvent>>,
    ) {
        profile.buffer_packets = profile.buffer_packets.max(1);
        let mut air = self.air.lock();
        if let Some(remote) = &remote {
            let _ = remote.send(LinkEvent::PeerConnected {
                peer: air.local.clone(),
            });
        }
        air.peers.insert(
            peer.clone(),
            PeerSlot {
                profile,
                in_flight: VecDeque::new(),
                owes_ready: false,
                fail_next: None,
                remote,
            },
        );
        debug!("Loopback: {} connected (mtu {})", peer, profile.mtu);
        let _ = air.events.send(LinkEvent::PeerConnected { peer });
    }

    /// Drop the link to `peer`, losing whatever it still had buffered
    pub fn disconnect(&self, peer: &PeerId) -> bool {
        let mut air = self.air.lock();
        let Some(slot) = air.peers.remove(peer) else {
            return false;
        };
        debug!(
            "Loopback: {} disconnected with {} packet(s) unsent",
            peer,
            slot.in_flight.len()
        );
        if let Some(remote) = &slot.remote {
            let _ = remote.send(LinkEvent::PeerDisconnected {
                peer: air.local.clone(),
            });
        }
        let _ = air.events.send(LinkEvent::PeerDisconnected { peer: peer.clone() });
        true
    }

    /// Renegotiate the MTU; applies to the next packet cut
    pub fn set_mtu(&self, peer: &PeerId, mtu: usize) {
        if let Some(slot) = self.air.lock().peers.get_mut(peer) {
            slot.profile.mtu = mtu;
        }
    }

    /// Make the next write to `peer` fail with `reason`
    pub fn fail_next_send(&self, peer: &PeerId, reason: impl Into<String>) {
        if let Some(slot) = self.air.lock().peers.get_mut(peer) {
            slot.fail_next = Some(reason.into());
        }
    }

    /// Deliver every buffered packet and raise owed readiness signals.
    /// Returns the number of packets delivered.
    pub fn flush(&self) -> usize {
        let mut guard = self.air.lock();
        let Air {
            local,
            events,
            peers,
            delivered,
        } = &mut *guard;

        let mut count = 0;
        for (peer, slot) in peers.iter_mut() {
            while let Some(packet) = slot.in_flight.pop_front() {
                trace!("Loopback: {} bytes over the air to {}", packet.len(), peer);
                if let Some(remote) = &slot.remote {
                    let _ = remote.send(LinkEvent::PacketReceived {
                        peer: local.clone(),
                        characteristic: Characteristic::Write,
                        data: packet.clone(),
                    });
                }
                if let Some(log) = delivered.as_mut() {
                    log.entry(peer.clone()).or_default().push(packet);
                }
                count += 1;
            }
            if slot.owes_ready {
                slot.owes_ready = false;
                let _ = events.send(LinkEvent::ReadyForData { peer: peer.clone() });
            }
        }
        count
    }

    /// Flush on a fixed tick until the local event receiver goes away
    pub async fn run_air(self, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            if self.air.lock().events.is_closed() {
                break;
            }
            self.flush();
        }
    }

    /// Start or stop logging delivered packets. Stopping discards the log.
    pub fn record_deliveries(&self, enabled: bool) {
        let mut air = self.air.lock();
        if !enabled {
            air.delivered = None;
        } else if air.delivered.is_none() {
            air.delivered = Some(HashMap::new());
        }
    }

    /// Packets delivered to `peer` while recording, in order
    pub fn delivered(&self, peer: &PeerId) -> Vec<Vec<u8>> {
        self.air
            .lock()
            .delivered
            .as_ref()
            .and_then(|log| log.get(peer).cloned())
            .unwrap_or_default()
    }

    /// Packets written but not yet flushed
    pub fn in_flight(&self, peer: &PeerId) -> usize {
        self.air
            .lock()
            .peers
            .get(peer)
            .map(|slot| slot.in_flight.len())
            .unwrap_or(0)
    }
}

impl BleLink for LoopbackLink {
    fn max_packet_size(&self, peer: &PeerId) -> usize {
        self.air
            .lock()
            .peers
            .get(peer)
            .map(|slot| slot.profile.mtu)
            .unwrap_or(0)
    }

    fn try_send(&mut self, peer: &PeerId, packet: &[u8]) -> SendOutcome {
        let mut air = self.air.lock();
        let Some(slot) = air.peers.get_mut(peer) else {
            return SendOutcome::Failed(format!("{} is not connected", peer));
        };
        if let Some(reason) = slot.fail_next.take() {
            return SendOutcome::Failed(reason);
        }
        if packet.len() > slot.profile.mtu {
            return SendOutcome::Failed(format!(
                "packet of {} bytes exceeds MTU {}",
                packet.len(),
                slot.profile.mtu
            ));
        }
        if slot.in_flight.len() >= slot.profile.buffer_packets {
            slot.owes_ready = true;
            return SendOutcome::NotReady;
        }
        slot.in_flight.push_back(packet.to_vec());
        if slot.profile.write_mode == WriteMode::OnePerReady {
            slot.owes_ready = true;
        }
        SendOutcome::Accepted
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.air.lock().peers.contains_key(peer)
    }

    fn capabilities(&self, peer: &PeerId) -> LinkCapabilities {
        let write_mode = self
            .air
            .lock()
            .peers
            .get(peer)
            .map(|slot| slot.profile.write_mode)
            .unwrap_or_default();
        LinkCapabilities::new(write_mode)
    }
}
