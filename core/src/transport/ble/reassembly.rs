/// Inbound message reassembly
///
/// Packets from one peer on one characteristic form a boundary-less byte
/// stream. With an end-of-data marker configured, bytes accumulate until the
/// marker shows up and everything before it is emitted as one message.
/// Without a marker every packet is a message of its own.

use super::fragment::EndMarker;
use crate::config::TransferConfig;
use crate::transport::abstraction::{Characteristic, PeerId};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors for reassembly
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("Message from {peer} exceeds {limit} bytes")]
    MessageTooLarge { peer: PeerId, limit: usize },
}

/// Result of feeding one packet
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reassembled {
    /// Completed messages in stream order
    pub messages: Vec<Vec<u8>>,
    /// One entry per message discarded for size
    pub dropped: Vec<ReassemblyError>,
}

/// Per-peer, per-characteristic accumulator
#[derive(Debug)]
pub struct Reassembler {
    marker: Option<EndMarker>,
    max_message_size: usize,
    buffers: HashMap<(PeerId, Characteristic), Vec<u8>>,
}

impl Reassembler {
    pub fn new(marker: Option<EndMarker>, max_message_size: usize) -> Self {
        Self {
            marker: marker.filter(|m| !m.is_empty()),
            max_message_size,
            buffers: HashMap::new(),
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.end_marker.clone(), config.max_message_size)
    }

    /// Append a packet and return every message it completed, in order.
    ///
    /// Any message longer than `max_message_size`, complete or still
    /// buffered, is dropped and reported in `Reassembled::dropped`. The
    /// other messages of the same packet are still delivered.
    pub fn on_packet_received(
        &mut self,
        peer: &PeerId,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Reassembled {
        let mut out = Reassembled::default();
        let limit = self.max_message_size;

        let Some(marker) = self.marker.as_ref().map(EndMarker::bytes) else {
            if data.len() > limit {
                warn!(
                    "Dropping {} byte packet from {} on {}: over {} bytes",
                    data.len(),
                    peer,
                    characteristic,
                    limit
                );
                out.dropped.push(ReassemblyError::MessageTooLarge {
                    peer: peer.clone(),
                    limit,
                });
            } else {
                out.messages.push(data.to_vec());
            }
            return out;
        };

        let key = (peer.clone(), characteristic);
        let buffer = self.buffers.entry(key.clone()).or_default();

        // A marker may straddle the previous packet boundary
        let mut search_from = buffer.len().saturating_sub(marker.len() - 1);
        buffer.extend_from_slice(data);

        let mut consumed = 0;
        while let Some(pos) = buffer[search_from..]
            .windows(marker.len())
            .position(|window| window == marker)
        {
            let at = search_from + pos;
            if at - consumed > limit {
                warn!(
                    "Dropping {} byte message from {} on {}: over {} bytes",
                    at - consumed,
                    peer,
                    characteristic,
                    limit
                );
                out.dropped.push(ReassemblyError::MessageTooLarge {
                    peer: peer.clone(),
                    limit,
                });
            } else {
                debug!(
                    "Reassembled {} byte message from {} on {}",
                    at - consumed,
                    peer,
                    characteristic
                );
                out.messages.push(buffer[consumed..at].to_vec());
            }
            consumed = at + marker.len();
            search_from = consumed;
        }
        buffer.drain(..consumed);

        if buffer.len() > limit {
            warn!(
                "Dropping {} buffered bytes from {} on {}: no end marker within {} bytes",
                buffer.len(),
                peer,
                characteristic,
                limit
            );
            out.dropped.push(ReassemblyError::MessageTooLarge {
                peer: peer.clone(),
                limit,
            });
            self.buffers.remove(&key);
        } else if buffer.is_empty() {
            self.buffers.remove(&key);
        }

        out
    }

    /// Discard partial messages from `peer`, returning the bytes dropped
    pub fn on_peer_disconnected(&mut self, peer: &PeerId) -> usize {
        let mut dropped = 0;
        self.buffers.retain(|(owner, _), buffer| {
            if owner == peer {
                dropped += buffer.len();
                false
            } else {
                true
            }
        });
        if dropped > 0 {
            debug!("Discarded {} partial bytes from disconnected {}", dropped, peer);
        }
        dropped
    }

    /// Bytes waiting for a marker on one channel
    pub fn buffered_len(&self, peer: &PeerId, characteristic: Characteristic) -> usize {
        self.buffers
            .get(&(peer.clone(), characteristic))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// No partial message is buffered for anyone
    pub fn is_idle(&self) -> bool {
        self.buffers.values().all(Vec::is_empty)
    }
}
