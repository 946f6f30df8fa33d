use super::control::WifiControl;
use crate::{
    config::ConfigStore,
    error::{PapertrailError, PapertrailResult},
};

use std::sync::Arc;

/// Remembers the network the device was on before hotspot-seeking started,
/// and restores it when a hotspot join times out.
pub struct FallbackManager {
    control: Arc<dyn WifiControl>,
    config: Arc<ConfigStore>,
}

impl FallbackManager {
    pub fn new(control: Arc<dyn WifiControl>, config: Arc<ConfigStore>) -> Self {
        FallbackManager { control, config }
    }

    /// Persists the current network as the fallback record, unless the
    /// device is already on the hotspot target or on nothing at all.
    pub async fn snapshot_current(&self) -> PapertrailResult<()> {
        let hotspot = self.config.hotspot();
        match self.control.current_connection().await? {
            Some(current) if current.ssid != hotspot.ssid => {
                log::info!("Saving fallback network: {}", current.ssid);
                self.config.set_fallback_network(&current.ssid);
                self.config.save()?;
            }
            Some(_) => log::debug!("Already on the hotspot target, nothing to snapshot"),
            None => log::debug!("Not connected, nothing to snapshot"),
        }
        Ok(())
    }

    /// Reactivates the saved fallback network. Succeeds trivially when no
    /// record exists. The record is kept on failure so a later attempt can
    /// still use it.
    pub async fn reconnect(&self) -> PapertrailResult<()> {
        let Some(fallback) = self.config.fallback_network() else {
            log::debug!("No fallback network saved");
            return Ok(());
        };

        log::info!("Reconnecting to fallback network {}", fallback.ssid);
        if let Err(e) = self.control.disconnect().await {
            log::debug!("Disconnect before fallback reconnect failed: {e}");
        }

        self.control.activate(&fallback.ssid).await.map_err(|e| {
            log::warn!("Fallback reconnect to {} failed: {e}", fallback.ssid);
            PapertrailError::FallbackReconnectFailed
        })
    }

    pub fn clear(&self) -> PapertrailResult<()> {
        self.config.clear_fallback_network();
        self.config.save()
    }
}
