//! Configuration options for PC/SC transport

use std::time::Duration;

use pcsc::{Disposition, Protocols, ShareMode as PcscShareMode};

/// Default interval between two reader polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
    /// Direct connection to the reader
    Direct,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
            ShareMode::Direct => Self::Direct,
        }
    }
}

/// Configuration options for PC/SC transport
#[derive(Debug, Clone, Copy)]
pub struct PcscConfig {
    /// Sharing mode for card connections
    pub share_mode: ShareMode,

    /// Preferred protocols for card communication
    pub protocols: Protocols,

    /// Automatically reconnect if the card is reset
    pub auto_reconnect: bool,

    /// What happens to the card when the connection is dropped
    pub disposition: Disposition,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: Protocols::ANY,
            auto_reconnect: true,
            disposition: Disposition::LeaveCard,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set whether to automatically reconnect
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Set the disposition applied on disconnect
    pub const fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }
}

/// Configuration of the reader monitor
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Interval between two status polls
    pub poll_interval: Duration,
    /// Settings used for the connections the monitor opens
    pub pcsc: PcscConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            pcsc: PcscConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Set the poll interval
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the connection settings
    pub const fn with_pcsc_config(mut self, pcsc: PcscConfig) -> Self {
        self.pcsc = pcsc;
        self
    }
}
