use crate::error::PapertrailResult;

use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::PathBuf,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

pub const DEFAULT_HOTSPOT_SSID: &str = "Papertrail-Setup";
pub const DEFAULT_HOTSPOT_PASSWORD: &str = "papertrail";

const CONFIG_FILE: &str = "network.json";

pub fn default_config_path() -> PathBuf {
    env::var("PAPERTRAIL_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/papertrail"))
        .join(CONFIG_FILE)
}

/// The mobile-hotspot network the device seeks while a client wants to talk
/// to it. A saved value overrides the built-in default.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HotspotConfig {
    pub ssid: String,
    pub password: String,
    pub updated_at: u64,
}

/// The network the device was on before it started seeking the hotspot.
/// At most one record exists; it is overwritten, never appended.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FallbackNetworkConfig {
    pub ssid: String,
    pub saved_at: u64,
}

#[derive(Default, Deserialize, Serialize)]
struct ConfigData {
    hotspot: Option<HotspotConfig>,
    fallback_network: Option<FallbackNetworkConfig>,
    onboarding_completed: bool,
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<ConfigData>,
}

impl ConfigStore {
    /// Loads the store from `path`, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn open(path: PathBuf) -> Self {
        let data = match fs::read(&path) {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Config file {} is corrupt: {e}", path.display());
                    ConfigData::default()
                }
            },
            Err(_) => {
                log::info!("No config file at {}, using defaults", path.display());
                ConfigData::default()
            }
        };

        ConfigStore {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn hotspot(&self) -> HotspotConfig {
        self.data
            .lock()
            .unwrap()
            .hotspot
            .clone()
            .unwrap_or_else(|| HotspotConfig {
                ssid: DEFAULT_HOTSPOT_SSID.to_string(),
                password: DEFAULT_HOTSPOT_PASSWORD.to_string(),
                updated_at: 0,
            })
    }

    pub fn set_hotspot(&self, ssid: &str, password: &str) {
        self.data.lock().unwrap().hotspot = Some(HotspotConfig {
            ssid: ssid.to_string(),
            password: password.to_string(),
            updated_at: unix_now(),
        });
    }

    pub fn fallback_network(&self) -> Option<FallbackNetworkConfig> {
        self.data.lock().unwrap().fallback_network.clone()
    }

    pub fn set_fallback_network(&self, ssid: &str) {
        self.data.lock().unwrap().fallback_network = Some(FallbackNetworkConfig {
            ssid: ssid.to_string(),
            saved_at: unix_now(),
        });
    }

    pub fn clear_fallback_network(&self) {
        self.data.lock().unwrap().fallback_network = None;
    }

    pub fn is_onboarding_completed(&self) -> bool {
        self.data.lock().unwrap().onboarding_completed
    }

    pub fn set_onboarding_completed(&self) {
        self.data.lock().unwrap().onboarding_completed = true;
    }

    pub fn save(&self) -> PapertrailResult<()> {
        let serialized = serde_json::to_string_pretty(&*self.data.lock().unwrap())?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_path() -> PathBuf {
        env::temp_dir().join(format!(
            "papertraild-config-test-{}-{}.json",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ))
    }

    #[test]
    fn defaults_apply_without_a_saved_file() {
        let store = ConfigStore::open(temp_path());
        let hotspot = store.hotspot();
        assert_eq!(hotspot.ssid, DEFAULT_HOTSPOT_SSID);
        assert_eq!(hotspot.password, DEFAULT_HOTSPOT_PASSWORD);
        assert!(store.fallback_network().is_none());
        assert!(!store.is_onboarding_completed());
    }

    #[test]
    fn saved_values_survive_reopen() {
        let path = temp_path();
        let store = ConfigStore::open(path.clone());
        store.set_hotspot("MyPhone", "hunter2hunter2");
        store.set_fallback_network("HomeWifi");
        store.set_onboarding_completed();
        store.save().unwrap();

        let reopened = ConfigStore::open(path.clone());
        assert_eq!(reopened.hotspot().ssid, "MyPhone");
        assert_eq!(reopened.fallback_network().unwrap().ssid, "HomeWifi");
        assert!(reopened.is_onboarding_completed());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn fallback_record_is_overwritten_not_appended() {
        let store = ConfigStore::open(temp_path());
        store.set_fallback_network("First");
        store.set_fallback_network("Second");
        assert_eq!(store.fallback_network().unwrap().ssid, "Second");

        store.clear_fallback_network();
        assert!(store.fallback_network().is_none());
    }
}
