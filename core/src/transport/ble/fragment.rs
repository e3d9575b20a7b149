/// Lazy packet cutting for outbound transfers
///
/// A transfer is written to the link as the byte stream `payload ‖ marker`.
/// Packets are cut one at a time at the link's current maximum size, so a
/// renegotiated MTU takes effect on the very next packet while bytes already
/// sent are never resent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for packet cutting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("Maximum packet size must be positive")]
    ZeroPacketSize,
}

/// End-of-data marker delimiting logical messages on the packet stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndMarker {
    /// Marker bytes (hex in serialized config)
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
    /// Append the marker to the last data packet when it fits
    #[serde(default = "default_coalesce")]
    coalesce: bool,
}

fn default_coalesce() -> bool {
    true
}

impl EndMarker {
    /// Create a marker. Returns `None` for an empty byte sequence, which
    /// could never delimit anything.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return None;
        }
        Some(Self {
            bytes,
            coalesce: true,
        })
    }

    /// Always send the marker in packets of its own
    pub fn separate(mut self) -> Self {
        self.coalesce = false;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn coalesces(&self) -> bool {
        self.coalesce
    }
}

mod hex_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(D::Error::custom)
    }
}

/// Cut the packet starting at stream `offset`.
///
/// Returns `Ok(None)` once payload and marker are fully emitted. Data packets
/// are `payload[offset..min(offset + max, len)]`; the marker follows the
/// payload, coalesced into the final data packet when it fits and allowed,
/// otherwise split across packets of its own.
pub fn next_packet(
    payload: &[u8],
    marker: Option<&EndMarker>,
    offset: usize,
    max_packet_size: usize,
) -> Result<Option<Vec<u8>>, FragmentError> {
    if max_packet_size == 0 {
        return Err(FragmentError::ZeroPacketSize);
    }

    let marker_bytes = marker.map(EndMarker::bytes).unwrap_or_default();
    if offset >= payload.len() + marker_bytes.len() {
        return Ok(None);
    }

    if offset < payload.len() {
        let end = offset.saturating_add(max_packet_size).min(payload.len());
        let mut packet = Vec::with_capacity(max_packet_size);
        packet.extend_from_slice(&payload[offset..end]);

        let coalesce = marker.map(EndMarker::coalesces).unwrap_or(false);
        let room = max_packet_size - packet.len();
        if end == payload.len() && coalesce && marker_bytes.len() <= room {
            packet.extend_from_slice(marker_bytes);
        }
        return Ok(Some(packet));
    }

    let start = offset - payload.len();
    let end = start.saturating_add(max_packet_size).min(marker_bytes.len());
    Ok(Some(marker_bytes[start..end].to_vec()))
}

/// Splits payloads into link-sized packets
#[derive(Debug, Clone, Default)]
pub struct Fragmenter {
    marker: Option<EndMarker>,
}

impl Fragmenter {
    /// Create a fragmenter; `None` sends payloads without delimiters
    pub fn new(marker: Option<EndMarker>) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> Option<&EndMarker> {
        self.marker.as_ref()
    }

    /// Total stream length of `payload` on the wire, marker included
    pub fn stream_len(&self, payload: &[u8]) -> usize {
        payload.len() + self.marker.as_ref().map(EndMarker::len).unwrap_or(0)
    }

    /// Cut the packet at `offset` (see [`next_packet`])
    pub fn next_packet(
        &self,
        payload: &[u8],
        offset: usize,
        max_packet_size: usize,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        next_packet(payload, self.marker.as_ref(), offset, max_packet_size)
    }

    /// Cut the whole stream at a fixed packet size
    pub fn fragment(
        &self,
        payload: &[u8],
        max_packet_size: usize,
    ) -> Result<Vec<Vec<u8>>, FragmentError> {
        let mut packets = Vec::new();
        let mut offset = 0;
        while let Some(packet) = self.next_packet(payload, offset, max_packet_size)? {
            offset += packet.len();
            packets.push(packet);
        }
        Ok(packets)
    }
}
