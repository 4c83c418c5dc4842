//! PC/SC transport for MIFARE readers
//!
//! This crate implements the `CardTransport` trait from `mifare-apdu-core`
//! on top of the PC/SC API, and adds reader discovery plus a background
//! [`ReaderMonitor`] that reports card insertion and removal.
//!
//! # Examples
//!
//! ```no_run
//! use mifare_transport_pcsc::{CardEvent, MonitorConfig, PcscDeviceManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PcscDeviceManager::new()?;
//! let mut monitor = manager.monitor(None, MonitorConfig::default())?;
//! let (_, events) = monitor.subscribe_channel();
//! monitor.start()?;
//!
//! for event in events.iter() {
//!     if let CardEvent::Added { reader, atr, .. } = event {
//!         println!("{reader}: {}", hex::encode_upper(&atr));
//!         break;
//!     }
//! }
//! monitor.stop()?;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
pub mod event;
mod manager;
mod monitor;
mod reader;
mod transport;

pub use config::{DEFAULT_POLL_INTERVAL, MonitorConfig, PcscConfig, ShareMode};
pub use error::{PcscError, Result};
pub use event::{CardEvent, CardEventHandler, ChannelSubscriber};
pub use manager::{PcscDeviceManager, select_reader};
pub use monitor::{
    ConnectionHandle, PcscBackend, ReaderBackend, ReaderMonitor, ReaderStatus, SubscriptionId,
};
pub use reader::{CONTACTLESS_MARKER, PcscReader};
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Disposition, Protocols};
