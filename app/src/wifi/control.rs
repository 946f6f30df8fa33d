use crate::error::PapertrailResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub signal: u8,
    pub security: String,
    pub frequency_mhz: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub ssid: String,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub signal: u8,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SavedProfile {
    pub ssid: String,
    pub auto_connect: bool,
    pub priority: i32,
}

#[derive(Clone, Debug)]
pub struct NetworkProfile {
    pub ssid: String,
    pub password: Option<String>,
    pub auto_connect: bool,
}

/// Boundary to the OS WiFi control plane. Operations may take seconds and
/// may fail unpredictably; callers own all retry and recovery policy.
#[async_trait]
pub trait WifiControl: Send + Sync {
    async fn scan(&self) -> PapertrailResult<Vec<AccessPoint>>;

    async fn current_connection(&self) -> PapertrailResult<Option<ConnectionInfo>>;

    async fn connect(&self, ssid: &str, password: &str) -> PapertrailResult<()>;

    async fn disconnect(&self) -> PapertrailResult<()>;

    /// Checks whether `ssid` is in range without leaving the current network.
    async fn is_visible(&self, ssid: &str) -> PapertrailResult<bool>;

    /// Brings up a saved profile by identity; credentials are already known
    /// to the control plane from a prior successful join.
    async fn activate(&self, ssid: &str) -> PapertrailResult<()>;

    async fn list_saved(&self) -> PapertrailResult<Vec<SavedProfile>>;

    async fn remove_saved(&self, ssid: &str) -> PapertrailResult<()>;

    async fn save_profile(&self, profile: &NetworkProfile) -> PapertrailResult<()>;
}
