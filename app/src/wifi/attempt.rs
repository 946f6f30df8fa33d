use super::{
    service::ServiceInner, state::ConnectivityState, ATTEMPT_SETTLE_DELAY, CONNECT_TIMEOUT,
    VERIFY_DELAY, VERIFY_RETRY_DELAY,
};
use crate::error::{PapertrailError, PapertrailResult};

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};
use tokio::{sync::watch, time::sleep};

/// Arms the settle-delay timer for a connection attempt. Preconditions are
/// re-checked at fire time; the world may have changed during the delay.
pub(super) fn schedule_attempt(inner: &Arc<ServiceInner>) {
    if inner.attempt_scheduled.swap(true, Ordering::SeqCst) {
        log::debug!("Connection attempt already scheduled");
        return;
    }

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let mut shutdown = inner.shutdown.subscribe();
        tokio::select! {
            _ = sleep(Duration::from_millis(ATTEMPT_SETTLE_DELAY)) => {}
            _ = shutdown.changed() => {
                inner.attempt_scheduled.store(false, Ordering::SeqCst);
                return;
            }
        }
        inner.attempt_scheduled.store(false, Ordering::SeqCst);

        if !inner.seeking_active() || inner.machine.state() != ConnectivityState::WaitingForHotspot
        {
            log::debug!("Skipping scheduled connection attempt, preconditions changed");
            return;
        }

        match attempt_connection(&inner).await {
            Ok(()) => log::info!("Hotspot join verified"),
            Err(e) => log::warn!("Connection attempt failed: {e}"),
        }
    });
}

/// Drives one cancellable, timed hotspot join. At most one attempt may be
/// in flight; a concurrent call fails fast instead of queueing.
pub(super) async fn attempt_connection(inner: &Arc<ServiceInner>) -> PapertrailResult<()> {
    let mut abort = {
        let mut slot = inner.attempt.lock().unwrap();
        if slot.is_some() {
            return Err(PapertrailError::AlreadyInProgress);
        }
        let (tx, rx) = watch::channel(false);
        *slot = Some(tx);
        rx
    };

    let result = run_attempt(inner, &mut abort).await;

    inner.attempt.lock().unwrap().take();
    result
}

async fn run_attempt(
    inner: &Arc<ServiceInner>,
    abort: &mut watch::Receiver<bool>,
) -> PapertrailResult<()> {
    let hotspot = inner.config.hotspot();

    // The target may have disappeared between scheduling and firing.
    if !inner.control.is_visible(&hotspot.ssid).await.unwrap_or(false) {
        log::debug!("Hotspot {} no longer visible", hotspot.ssid);
        return Err(PapertrailError::NetworkNotFound);
    }

    inner.machine.set(ConnectivityState::Connecting);
    log::info!("Connecting to hotspot {}", hotspot.ssid);

    let connect_result = tokio::select! {
        result = inner.control.connect(&hotspot.ssid, &hotspot.password) => result,
        _ = sleep(Duration::from_millis(CONNECT_TIMEOUT)) => {
            log::warn!(
                "Connect to {} timed out after {}s",
                hotspot.ssid,
                CONNECT_TIMEOUT / 1000
            );
            inner.machine.set(ConnectivityState::ReconnectingFallback);
            match inner.fallback.reconnect().await {
                Ok(()) => {
                    inner.machine.set(ConnectivityState::Disconnected);
                }
                Err(e) => {
                    log::error!("{e}");
                    inner.machine.set(ConnectivityState::Error);
                }
            }
            return Err(PapertrailError::Timeout);
        }
        // The canceller owns the resulting state, not us.
        _ = async { let _ = abort.wait_for(|aborted| *aborted).await; } => {
            log::info!("Connection attempt aborted");
            return Err(PapertrailError::Aborted);
        }
    };

    if let Err(e) = connect_result {
        log::error!("Connect to {} failed: {e}", hotspot.ssid);
        inner.machine.set(ConnectivityState::Error);
        return Err(e);
    }

    // NetworkManager reports activation success optimistically; confirm the
    // device actually sits on the target before trusting it.
    sleep(Duration::from_millis(VERIFY_DELAY)).await;
    if !verify_joined(inner, &hotspot.ssid).await {
        sleep(Duration::from_millis(VERIFY_RETRY_DELAY)).await;
        if !verify_joined(inner, &hotspot.ssid).await {
            log::warn!("Connect reported success but device is not on {}", hotspot.ssid);
            inner.machine.set(ConnectivityState::WaitingForHotspot);
            return Err(PapertrailError::VerificationFailed);
        }
    }

    inner.machine.set(ConnectivityState::Connected);
    if let Err(e) = inner.fallback.clear() {
        log::warn!("Failed to clear fallback record: {e}");
    }
    if !inner.config.is_onboarding_completed() {
        inner.config.set_onboarding_completed();
        if let Err(e) = inner.config.save() {
            log::warn!("Failed to persist onboarding flag: {e}");
        }
        log::info!("Onboarding completed");
    }
    Ok(())
}

async fn verify_joined(inner: &Arc<ServiceInner>, ssid: &str) -> bool {
    match inner.control.current_connection().await {
        Ok(Some(current)) => current.ssid == ssid,
        Ok(None) => false,
        Err(e) => {
            log::debug!("Verification query failed: {e}");
            false
        }
    }
}
