// Transport module: link abstraction and the BLE transfer engine

pub mod abstraction;
pub mod ble;

pub use abstraction::{
    BleLink, Characteristic, LinkCapabilities, LinkEvent, PeerId, SendOutcome, WriteMode,
};
pub use ble::{TransferHandle, TransferQueue, TransferService};
