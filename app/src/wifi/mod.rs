pub mod attempt;
pub mod control;
pub mod fallback;
pub mod mode;
pub mod monitor;
pub mod nmcli;
pub mod poller;
pub mod service;
pub mod state;

#[cfg(test)]
mod tests;

pub use control::{AccessPoint, ConnectionInfo, NetworkProfile, SavedProfile, WifiControl};
pub use monitor::ConnectionEvent;
pub use nmcli::NmcliControl;
pub use service::{ConnectivityService, StatusReport};
pub use state::{ConnectivityState, StateEvent};

// Cadences and windows, in milliseconds.
pub(crate) const MONITOR_INTERVAL: u64 = 5_000;
pub(crate) const POLL_INTERVAL: u64 = 10_000;
pub(crate) const CONNECTED_GRACE: u64 = 5_000;
pub(crate) const ATTEMPT_SETTLE_DELAY: u64 = 5_000;
pub(crate) const CONNECT_TIMEOUT: u64 = 60_000;
pub(crate) const VERIFY_DELAY: u64 = 2_000;
pub(crate) const VERIFY_RETRY_DELAY: u64 = 3_000;

pub(crate) const MIN_PASSWORD_LEN: usize = 8;
