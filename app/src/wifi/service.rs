use super::{
    control::{AccessPoint, ConnectionInfo, NetworkProfile, SavedProfile, WifiControl},
    fallback::FallbackManager,
    mode::{Mode, ModeTracker},
    monitor::{run_monitor, ConnectionMonitor, ConnectionObserver},
    poller::run_poller,
    state::{ConnectivityState, StateMachine, StateObserver},
    MIN_PASSWORD_LEN,
};
use crate::{
    config::ConfigStore,
    error::{PapertrailError, PapertrailResult},
};

use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusReport {
    pub state: ConnectivityState,
    pub mode: Mode,
    pub hotspot_ssid: String,
    pub connection: Option<ConnectionInfo>,
}

/// Shared by the poller, the monitor, the attempt orchestrator and the
/// public facade. The state cell and the in-flight marker are the only
/// shared mutable values; both sit behind mutexes with short, non-awaiting
/// critical sections.
pub(crate) struct ServiceInner {
    pub(super) control: Arc<dyn WifiControl>,
    pub(super) config: Arc<ConfigStore>,
    pub(super) machine: StateMachine,
    pub(super) monitor: ConnectionMonitor,
    pub(super) mode: ModeTracker,
    pub(super) fallback: FallbackManager,
    pub(super) attempt: Mutex<Option<watch::Sender<bool>>>,
    pub(super) attempt_scheduled: AtomicBool,
    pub(super) poke_tx: mpsc::Sender<()>,
    pub(super) shutdown: watch::Sender<bool>,
}

impl ServiceInner {
    /// Triggers the abort capability of the in-flight attempt, if any.
    /// Idempotent, and harmless after the attempt has settled.
    pub(super) fn abort_attempt(&self) {
        if let Some(abort) = self.attempt.lock().unwrap().as_ref() {
            let _ = abort.send(true);
        }
    }

    /// Hotspot-seeking runs while a client is attached, and always before
    /// onboarding has completed.
    pub(super) fn seeking_active(&self) -> bool {
        self.mode.mode() == Mode::Stopped || !self.config.is_onboarding_completed()
    }
}

/// The connectivity service. One instance is constructed by the
/// composition root and injected where needed.
pub struct ConnectivityService {
    pub(super) inner: Arc<ServiceInner>,
    poke_rx: Mutex<Option<mpsc::Receiver<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl ConnectivityService {
    pub fn new(control: Arc<dyn WifiControl>, config: Arc<ConfigStore>) -> Self {
        let (poke_tx, poke_rx) = mpsc::channel(1);
        let (shutdown, _) = watch::channel(false);

        let inner = Arc::new(ServiceInner {
            fallback: FallbackManager::new(Arc::clone(&control), Arc::clone(&config)),
            control,
            config,
            machine: StateMachine::new(),
            monitor: ConnectionMonitor::new(),
            mode: ModeTracker::new(),
            attempt: Mutex::new(None),
            attempt_scheduled: AtomicBool::new(false),
            poke_tx,
            shutdown,
        });

        ConnectivityService {
            inner,
            poke_rx: Mutex::new(Some(poke_rx)),
            tasks: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Starts the hotspot poller and the connection monitor.
    pub fn initialize(&self) -> PapertrailResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(PapertrailError::AlreadyInProgress);
        }
        let poke_rx = self
            .poke_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(PapertrailError::NotInitialized)?;

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(tokio::spawn(run_poller(Arc::clone(&self.inner), poke_rx)));
        tasks.push(tokio::spawn(run_monitor(Arc::clone(&self.inner))));

        log::info!("Connectivity service initialized");
        Ok(())
    }

    /// Stops both loops, cancels any in-flight attempt and drops all
    /// observers. The service cannot be re-initialized afterwards.
    pub fn dispose(&self) {
        let _ = self.inner.shutdown.send(true);
        self.inner.abort_attempt();

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.inner.machine.clear_observers();
        self.inner.monitor.clear_observers();
        self.initialized.store(false, Ordering::SeqCst);

        log::info!("Connectivity service disposed");
    }

    pub fn state(&self) -> ConnectivityState {
        self.inner.machine.state()
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode.mode()
    }

    /// Called whenever a UI client attaches or detaches.
    pub async fn set_client_count(&self, count: u32) {
        let (previous, current) = self.inner.mode.set_count(count);

        if previous == 0 && current > 0 {
            log::info!("UI client attached, requesting immediate hotspot evaluation");
            let _ = self.inner.poke_tx.try_send(());
        } else if previous > 0 && current == 0 {
            log::info!("Last UI client detached");
            let state = self.inner.machine.state();
            if matches!(
                state,
                ConnectivityState::WaitingForHotspot | ConnectivityState::Connecting
            ) {
                self.inner.abort_attempt();
                self.inner.machine.set(ConnectivityState::Idle);
            }
        }
    }

    pub fn on_state_change(&self, observer: StateObserver) -> usize {
        self.inner.machine.subscribe(observer)
    }

    pub fn unsubscribe_state(&self, token: usize) {
        self.inner.machine.unsubscribe(token);
    }

    pub fn on_connection_change(&self, observer: ConnectionObserver) -> usize {
        self.inner.monitor.subscribe(observer)
    }

    pub fn unsubscribe_connection(&self, token: usize) {
        self.inner.monitor.unsubscribe(token);
    }

    /// The UI confirms it rendered the connected screen, so the poller
    /// stops re-emitting the notification.
    pub fn notify_connected_screen_displayed(&self) {
        self.inner.machine.mark_screen_shown();
    }

    pub async fn current_connection(&self) -> PapertrailResult<Option<ConnectionInfo>> {
        self.inner.control.current_connection().await
    }

    pub async fn scan(&self) -> PapertrailResult<Vec<AccessPoint>> {
        self.inner.control.scan().await
    }

    pub async fn saved_networks(&self) -> PapertrailResult<Vec<SavedProfile>> {
        self.inner.control.list_saved().await
    }

    pub async fn forget_network(&self, ssid: &str) -> PapertrailResult<()> {
        self.inner.control.remove_saved(ssid).await
    }

    pub async fn save_network(&self, profile: &NetworkProfile) -> PapertrailResult<()> {
        self.inner.control.save_profile(profile).await
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport {
            state: self.state(),
            mode: self.mode(),
            hotspot_ssid: self.inner.config.hotspot().ssid,
            connection: self.current_connection().await.unwrap_or(None),
        }
    }

    /// Replaces the hotspot target. Intentionally invalidates the current
    /// connection: the device disconnects and seeks the new target.
    pub async fn set_hotspot_config(&self, ssid: &str, password: &str) -> PapertrailResult<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(PapertrailError::NotInitialized);
        }

        let ssid = ssid.trim();
        if ssid.is_empty() {
            return Err(PapertrailError::Validation(
                "ssid must not be empty".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(PapertrailError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        log::info!("Hotspot target changed to {ssid}");
        self.inner.config.set_hotspot(ssid, password);
        self.inner.config.save()?;

        if let Err(e) = self.inner.fallback.snapshot_current().await {
            log::warn!("Failed to snapshot fallback network: {e}");
        }

        // Same rule as the mode switch: a target change makes the running
        // attempt meaningless.
        self.inner.abort_attempt();

        if let Err(e) = self.inner.control.disconnect().await {
            log::debug!("Disconnect after hotspot change failed: {e}");
        }

        self.inner.machine.set(ConnectivityState::WaitingForHotspot);
        self.inner.machine.clear_screen_shown();
        Ok(())
    }
}
