/// BLE chunked transfer
///
/// - **fragment**: cutting `payload ‖ marker` into link-sized packets
/// - **task**: one logical send with its cursor, pacing and callback
/// - **queue**: the FIFO engine driving tasks against a [`BleLink`]
/// - **reassembly**: marker-delimited inbound message reconstruction
/// - **service**: tokio executor serialising commands and link events
/// - **loopback**: in-memory link for simulation and tests
///
/// Platform code (Swift/Kotlin/BlueZ) owns the radio and feeds events in.
///
/// [`BleLink`]: crate::transport::abstraction::BleLink

pub mod fragment;
pub mod loopback;
pub mod queue;
pub mod reassembly;
pub mod service;
pub mod task;

pub use fragment::{EndMarker, FragmentError, Fragmenter};
pub use loopback::{LoopbackLink, PeerProfile};
pub use queue::{DrainStatus, EngineState, TransferQueue};
pub use reassembly::{Reassembled, ReassemblyError, Reassembler};
pub use service::{InboundMessage, PendingTransfer, TransferHandle, TransferService};
pub use task::{CompletionCallback, Pacing, TransferId, TransferOutcome, TransferTask};
