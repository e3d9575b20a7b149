// blelink core: chunked data transfer over BLE
//
// A transfer is a whole payload destined for one connected peer. The engine
// cuts it into link-sized packets, honours the link's flow control and
// optional pacing, and reports exactly one terminal outcome per transfer.
// The receiving side stitches packets back together at an end-of-data marker.

pub mod config;
pub mod transport;

use thiserror::Error;

pub use config::{ConfigError, PacingMode, TransferConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use transport::abstraction::{
    BleLink, Characteristic, LinkCapabilities, LinkEvent, PeerId, SendOutcome, WriteMode,
};
pub use transport::ble::{
    EndMarker, FragmentError, Fragmenter, InboundMessage, LoopbackLink, Pacing, PeerProfile,
    PendingTransfer, Reassembled, ReassemblyError, Reassembler, TransferHandle, TransferId,
    TransferOutcome, TransferQueue, TransferService, TransferTask,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Terminal failure of a transfer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Destination was not connected when the transfer was enqueued
    #[error("Peer not connected")]
    NotConnected,
    /// Destination dropped while the transfer was queued or in flight
    #[error("Peer disconnected")]
    Disconnected,
    /// The link reported a hard failure
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
    /// The executor stopped before the transfer finished
    #[error("Transfer service shut down")]
    Shutdown,
}

impl From<FragmentError> for TransferError {
    fn from(err: FragmentError) -> Self {
        TransferError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_error_maps_to_internal() {
        let err: TransferError = FragmentError::ZeroPacketSize.into();
        assert!(matches!(err, TransferError::Internal(_)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(TransferError::NotConnected.to_string(), "Peer not connected");
        assert_eq!(
            TransferError::Transport("gatt 133".into()).to_string(),
            "Transport error: gatt 133"
        );
    }
}
