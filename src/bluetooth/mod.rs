//! Bluetooth adapter drivers.
//!
//! `local` drives the host's own BlueZ adapter, `remote` stands in for an
//! adapter that lives on another box and is managed out of band.

pub mod local;
pub mod remote;

pub use local::LocalBluetoothDevice;
pub use remote::RemoteBluetoothDevice;
