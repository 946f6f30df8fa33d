use super::attempt::attempt_connection;
use super::control::{
    AccessPoint, ConnectionInfo, NetworkProfile, SavedProfile, WifiControl,
};
use super::fallback::FallbackManager;
use super::poller::evaluate;
use super::service::ConnectivityService;
use super::state::ConnectivityState;
use super::{ATTEMPT_SETTLE_DELAY, CONNECTED_GRACE, CONNECT_TIMEOUT, VERIFY_DELAY};
use crate::config::{ConfigStore, DEFAULT_HOTSPOT_SSID};
use crate::error::{PapertrailError, PapertrailResult};

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::time::sleep;

static CONFIG_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Copy, PartialEq)]
enum ConnectBehavior {
    /// connect() returns Ok and, when `join_on_success` is set, moves the
    /// current connection onto the requested ssid.
    Succeed,
    /// connect() fails like a wrong password.
    Reject,
    /// connect() never resolves.
    Hang,
}

struct MockControl {
    visible: AtomicBool,
    current: Mutex<Option<ConnectionInfo>>,
    behavior: Mutex<ConnectBehavior>,
    join_on_success: AtomicBool,
    activate_ok: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    activate_calls: AtomicUsize,
}

impl MockControl {
    fn new() -> Self {
        MockControl {
            visible: AtomicBool::new(false),
            current: Mutex::new(None),
            behavior: Mutex::new(ConnectBehavior::Succeed),
            join_on_success: AtomicBool::new(true),
            activate_ok: AtomicBool::new(true),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            activate_calls: AtomicUsize::new(0),
        }
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    fn set_current(&self, ssid: Option<&str>) {
        *self.current.lock().unwrap() = ssid.map(connection);
    }

    fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

fn connection(ssid: &str) -> ConnectionInfo {
    ConnectionInfo {
        ssid: ssid.to_string(),
        ip_address: Some("192.168.43.17".to_string()),
        mac_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
        signal: 64,
    }
}

#[async_trait]
impl WifiControl for MockControl {
    async fn scan(&self) -> PapertrailResult<Vec<AccessPoint>> {
        Ok(Vec::new())
    }

    async fn current_connection(&self) -> PapertrailResult<Option<ConnectionInfo>> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn connect(&self, ssid: &str, _password: &str) -> PapertrailResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            ConnectBehavior::Succeed => {
                if self.join_on_success.load(Ordering::SeqCst) {
                    *self.current.lock().unwrap() = Some(connection(ssid));
                }
                Ok(())
            }
            ConnectBehavior::Reject => Err(PapertrailError::AuthFailed),
            ConnectBehavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn disconnect(&self) -> PapertrailResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        Ok(())
    }

    async fn is_visible(&self, _ssid: &str) -> PapertrailResult<bool> {
        Ok(self.visible.load(Ordering::SeqCst))
    }

    async fn activate(&self, ssid: &str) -> PapertrailResult<()> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        if self.activate_ok.load(Ordering::SeqCst) {
            *self.current.lock().unwrap() = Some(connection(ssid));
            Ok(())
        } else {
            Err(PapertrailError::ConnectionFailed)
        }
    }

    async fn list_saved(&self) -> PapertrailResult<Vec<SavedProfile>> {
        Ok(Vec::new())
    }

    async fn remove_saved(&self, _ssid: &str) -> PapertrailResult<()> {
        Ok(())
    }

    async fn save_profile(&self, _profile: &NetworkProfile) -> PapertrailResult<()> {
        Ok(())
    }
}

fn temp_config() -> Arc<ConfigStore> {
    let path = std::env::temp_dir().join(format!(
        "papertraild-wifi-test-{}-{}.json",
        std::process::id(),
        CONFIG_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    Arc::new(ConfigStore::open(path))
}

fn service_with_mock() -> (ConnectivityService, Arc<MockControl>) {
    let control = Arc::new(MockControl::new());
    let config = temp_config();
    let service = ConnectivityService::new(control.clone(), config);
    (service, control)
}

fn recorded_states(service: &ConnectivityService) -> Arc<Mutex<Vec<ConnectivityState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    service.on_state_change(Box::new(move |new, _| {
        sink.lock().unwrap().push(new);
    }));
    states
}

#[tokio::test(start_paused = true)]
async fn second_attempt_is_rejected_while_one_is_in_flight() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Hang);

    let handle = {
        let inner = Arc::clone(&service.inner);
        tokio::spawn(async move { attempt_connection(&inner).await })
    };
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(service.state(), ConnectivityState::Connecting);
    assert!(matches!(
        attempt_connection(&service.inner).await,
        Err(PapertrailError::AlreadyInProgress)
    ));
    assert_eq!(service.state(), ConnectivityState::Connecting);

    service.inner.abort_attempt();
    assert!(matches!(
        handle.await.unwrap(),
        Err(PapertrailError::Aborted)
    ));
    // The canceller owns the resulting state; the attempt itself must not
    // have moved it.
    assert_eq!(service.state(), ConnectivityState::Connecting);

    // The slot is free again.
    control.set_behavior(ConnectBehavior::Succeed);
    assert!(attempt_connection(&service.inner).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn connected_state_survives_the_grace_period() {
    let (service, control) = service_with_mock();
    control.set_current(Some("HomeWifi"));
    service.inner.machine.set(ConnectivityState::Connected);

    evaluate(&service.inner).await;
    assert_eq!(service.state(), ConnectivityState::Connected);

    sleep(Duration::from_millis(CONNECTED_GRACE / 2)).await;
    evaluate(&service.inner).await;
    assert_eq!(service.state(), ConnectivityState::Connected);

    sleep(Duration::from_millis(CONNECTED_GRACE / 2)).await;
    evaluate(&service.inner).await;
    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
}

#[tokio::test(start_paused = true)]
async fn detaching_the_last_client_cancels_the_attempt() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Hang);
    service.set_client_count(1).await;

    let handle = {
        let inner = Arc::clone(&service.inner);
        tokio::spawn(async move { attempt_connection(&inner).await })
    };
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(service.state(), ConnectivityState::Connecting);

    service.set_client_count(0).await;

    assert!(matches!(
        handle.await.unwrap(),
        Err(PapertrailError::Aborted)
    ));
    assert_eq!(service.state(), ConnectivityState::Idle);
}

#[tokio::test(start_paused = true)]
async fn verification_failure_ends_in_waiting_not_connected() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Succeed);
    control.join_on_success.store(false, Ordering::SeqCst);

    let result = attempt_connection(&service.inner).await;

    assert!(matches!(result, Err(PapertrailError::VerificationFailed)));
    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
    assert_eq!(control.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn verified_join_clears_fallback_and_completes_onboarding() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    service.inner.config.set_fallback_network("HomeWifi");
    assert!(!service.inner.config.is_onboarding_completed());

    let result = attempt_connection(&service.inner).await;

    assert!(result.is_ok());
    assert_eq!(service.state(), ConnectivityState::Connected);
    assert!(service.inner.config.fallback_network().is_none());
    assert!(service.inner.config.is_onboarding_completed());
}

#[tokio::test(start_paused = true)]
async fn timeout_recovers_onto_the_fallback_network() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Hang);
    service.inner.config.set_fallback_network("HomeWifi");
    let states = recorded_states(&service);

    let result = attempt_connection(&service.inner).await;

    assert!(matches!(result, Err(PapertrailError::Timeout)));
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ConnectivityState::Connecting,
            ConnectivityState::ReconnectingFallback,
            ConnectivityState::Disconnected,
        ]
    );
    assert_eq!(control.activate_calls.load(Ordering::SeqCst), 1);
    // The record stays; only a verified hotspot join clears it.
    assert!(service.inner.config.fallback_network().is_some());
}

#[tokio::test(start_paused = true)]
async fn timeout_with_failed_fallback_ends_in_error() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Hang);
    control.activate_ok.store(false, Ordering::SeqCst);
    service.inner.config.set_fallback_network("HomeWifi");

    let result = attempt_connection(&service.inner).await;

    assert!(matches!(result, Err(PapertrailError::Timeout)));
    assert_eq!(service.state(), ConnectivityState::Error);
    assert!(service.inner.config.fallback_network().is_some());
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_ends_in_error() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Reject);

    let result = attempt_connection(&service.inner).await;

    assert!(matches!(result, Err(PapertrailError::AuthFailed)));
    assert_eq!(service.state(), ConnectivityState::Error);
}

#[tokio::test(start_paused = true)]
async fn vanished_target_fails_without_touching_state() {
    let (service, control) = service_with_mock();
    control.set_visible(false);
    service.inner.machine.set(ConnectivityState::WaitingForHotspot);

    let result = attempt_connection(&service.inner).await;

    assert!(matches!(result, Err(PapertrailError::NetworkNotFound)));
    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
    assert_eq!(control.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn invisible_hotspot_never_starts_an_attempt() {
    let (service, control) = service_with_mock();
    control.set_visible(false);
    control.set_current(Some("HomeWifi"));
    service.set_client_count(1).await;

    for _ in 0..3 {
        evaluate(&service.inner).await;
        sleep(Duration::from_millis(200)).await;
    }

    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
    assert_eq!(control.connect_calls(), 0);
    assert!(!service.inner.attempt_scheduled.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn visible_hotspot_joins_after_the_settle_delay() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_current(Some("HomeWifi"));
    service.set_client_count(1).await;

    evaluate(&service.inner).await;

    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
    assert!(service.inner.attempt_scheduled.load(Ordering::SeqCst));
    assert_eq!(
        service.inner.config.fallback_network().unwrap().ssid,
        "HomeWifi"
    );

    sleep(Duration::from_millis(ATTEMPT_SETTLE_DELAY + VERIFY_DELAY + 1_000)).await;

    assert_eq!(service.state(), ConnectivityState::Connected);
    assert_eq!(control.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduled_attempt_is_skipped_when_preconditions_change() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_current(Some("HomeWifi"));
    service.set_client_count(1).await;

    evaluate(&service.inner).await;
    assert!(service.inner.attempt_scheduled.load(Ordering::SeqCst));

    // Client detaches during the settle delay: state leaves
    // WaitingForHotspot, so the timer must fire into a no-op.
    service.set_client_count(0).await;
    assert_eq!(service.state(), ConnectivityState::Idle);

    sleep(Duration::from_millis(ATTEMPT_SETTLE_DELAY + 1_000)).await;

    assert_eq!(service.state(), ConnectivityState::Idle);
    assert_eq!(control.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn driving_mode_reconciles_passively_after_onboarding() {
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_current(Some("HomeWifi"));
    service.inner.config.set_onboarding_completed();
    service.inner.machine.set(ConnectivityState::WaitingForHotspot);

    evaluate(&service.inner).await;
    assert_eq!(service.state(), ConnectivityState::Idle);
    assert_eq!(control.connect_calls(), 0);

    control.set_current(None);
    service.inner.machine.set(ConnectivityState::WaitingForHotspot);
    evaluate(&service.inner).await;
    assert_eq!(service.state(), ConnectivityState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn poller_flips_straight_to_connected_on_the_hotspot() {
    let (service, control) = service_with_mock();
    control.set_current(Some(DEFAULT_HOTSPOT_SSID));

    evaluate(&service.inner).await;

    assert_eq!(service.state(), ConnectivityState::Connected);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_screen_triggers_a_reemit() {
    let (service, control) = service_with_mock();
    control.set_current(Some(DEFAULT_HOTSPOT_SSID));
    let states = recorded_states(&service);

    evaluate(&service.inner).await;
    evaluate(&service.inner).await;
    assert_eq!(states.lock().unwrap().len(), 2);

    // Once the UI confirms, the poller goes quiet.
    service.notify_connected_screen_displayed();
    evaluate(&service.inner).await;
    assert_eq!(states.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn error_state_resets_before_the_next_seek() {
    let (service, control) = service_with_mock();
    control.set_visible(false);
    service.set_client_count(1).await;
    service.inner.machine.set(ConnectivityState::Error);

    evaluate(&service.inner).await;

    // Reset to Idle, then parked on WaitingForHotspot for the next tick.
    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
}

#[tokio::test(start_paused = true)]
async fn hotspot_config_update_invalidates_the_session() {
    let (service, control) = service_with_mock();
    control.set_current(Some(DEFAULT_HOTSPOT_SSID));
    service.initialize().unwrap();
    service.inner.machine.set(ConnectivityState::Connected);
    service.notify_connected_screen_displayed();

    service
        .set_hotspot_config("NewPhone", "longpassword")
        .await
        .unwrap();

    assert_eq!(service.state(), ConnectivityState::WaitingForHotspot);
    assert!(!service.inner.machine.screen_shown());
    assert_eq!(control.disconnect_calls.load(Ordering::SeqCst), 1);
    // The network we sat on is the old target, which differs from the new
    // one, so it became the fallback.
    assert_eq!(
        service.inner.config.fallback_network().unwrap().ssid,
        DEFAULT_HOTSPOT_SSID
    );
    assert_eq!(service.inner.config.hotspot().ssid, "NewPhone");

    service.dispose();
}

#[tokio::test(start_paused = true)]
async fn hotspot_config_rejects_bad_input_without_side_effects() {
    let (service, control) = service_with_mock();
    control.set_current(Some("HomeWifi"));
    service.initialize().unwrap();

    assert!(matches!(
        service.set_hotspot_config("", "longpassword").await,
        Err(PapertrailError::Validation(_))
    ));
    assert!(matches!(
        service.set_hotspot_config("NewPhone", "short").await,
        Err(PapertrailError::Validation(_))
    ));

    assert_eq!(control.disconnect_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.inner.config.hotspot().ssid, DEFAULT_HOTSPOT_SSID);

    service.dispose();
}

#[tokio::test(start_paused = true)]
async fn hotspot_config_requires_an_initialized_service() {
    let (service, _control) = service_with_mock();

    assert!(matches!(
        service.set_hotspot_config("NewPhone", "longpassword").await,
        Err(PapertrailError::NotInitialized)
    ));
}

#[tokio::test(start_paused = true)]
async fn service_cannot_be_initialized_twice() {
    let (service, _control) = service_with_mock();

    service.initialize().unwrap();
    assert!(service.initialize().is_err());

    service.dispose();
    assert!(service.initialize().is_err());
}

#[tokio::test(start_paused = true)]
async fn snapshot_skips_the_hotspot_itself() {
    let (service, control) = service_with_mock();
    let fallback = FallbackManager::new(
        control.clone() as Arc<dyn WifiControl>,
        Arc::clone(&service.inner.config),
    );

    control.set_current(Some(DEFAULT_HOTSPOT_SSID));
    fallback.snapshot_current().await.unwrap();
    assert!(service.inner.config.fallback_network().is_none());

    control.set_current(None);
    fallback.snapshot_current().await.unwrap();
    assert!(service.inner.config.fallback_network().is_none());

    control.set_current(Some("HomeWifi"));
    fallback.snapshot_current().await.unwrap();
    assert_eq!(
        service.inner.config.fallback_network().unwrap().ssid,
        "HomeWifi"
    );
}

#[tokio::test(start_paused = true)]
async fn fallback_reconnect_without_a_record_is_trivial() {
    let (service, control) = service_with_mock();
    let fallback = FallbackManager::new(
        control.clone() as Arc<dyn WifiControl>,
        Arc::clone(&service.inner.config),
    );

    assert!(fallback.reconnect().await.is_ok());
    assert_eq!(control.activate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn attempt_deadline_matches_the_contract() {
    // The full timeout path must consume the whole deadline, not fire
    // early.
    let (service, control) = service_with_mock();
    control.set_visible(true);
    control.set_behavior(ConnectBehavior::Hang);

    let started = tokio::time::Instant::now();
    let result = attempt_connection(&service.inner).await;

    assert!(matches!(result, Err(PapertrailError::Timeout)));
    assert!(started.elapsed() >= Duration::from_millis(CONNECT_TIMEOUT));
}
