use super::{
    attempt::schedule_attempt, service::ServiceInner, state::ConnectivityState, CONNECTED_GRACE,
    POLL_INTERVAL,
};

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};

pub(super) async fn run_poller(inner: Arc<ServiceInner>, mut poke: mpsc::Receiver<()>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut ticker = interval(Duration::from_millis(POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::debug!("Hotspot poller started");
    loop {
        tokio::select! {
            _ = ticker.tick() => evaluate(&inner).await,
            Some(()) = poke.recv() => {
                log::debug!("Out-of-band hotspot evaluation");
                evaluate(&inner).await;
            }
            _ = shutdown.changed() => {
                log::debug!("Hotspot poller stopped");
                break;
            }
        }
    }
}

/// One decision tick: read connectivity, mode and state, then seek the
/// hotspot, wait, retry or stand down.
pub(super) async fn evaluate(inner: &Arc<ServiceInner>) {
    let hotspot = inner.config.hotspot();
    let current = match inner.control.current_connection().await {
        Ok(current) => current,
        Err(e) => {
            log::debug!("Connectivity query failed: {e}");
            None
        }
    };
    let on_hotspot = current
        .as_ref()
        .is_some_and(|connection| connection.ssid == hotspot.ssid);

    if on_hotspot {
        if inner.machine.state() != ConnectivityState::Connected {
            inner.machine.set(ConnectivityState::Connected);
        } else if inner.mode.count() == 0 && !inner.machine.screen_shown() {
            // The UI never confirmed the connected screen; give it another
            // chance to render it.
            log::debug!("Re-emitting connected notification");
            inner.machine.reemit();
        }
        return;
    }

    if inner.machine.state() == ConnectivityState::Connected {
        let within_grace = inner
            .machine
            .connected_since()
            .is_some_and(|entered| entered.elapsed() < Duration::from_millis(CONNECTED_GRACE));
        if within_grace {
            // Query timing can report a stale miss right after a join.
            return;
        }
        inner.machine.set(ConnectivityState::WaitingForHotspot);
    }

    if !inner.seeking_active() {
        reconcile_passive(inner, current.is_some());
        return;
    }

    match inner.machine.state() {
        ConnectivityState::Error => {
            // Allow a fresh attempt cycle.
            inner.machine.set(ConnectivityState::Idle);
        }
        ConnectivityState::Connecting | ConnectivityState::ReconnectingFallback => return,
        _ => {}
    }

    let visible = match inner.control.is_visible(&hotspot.ssid).await {
        Ok(visible) => visible,
        Err(e) => {
            log::debug!("Hotspot visibility check failed: {e}");
            false
        }
    };

    if !visible {
        // Stay on the current network and retry next tick.
        if inner.machine.state() != ConnectivityState::WaitingForHotspot {
            inner.machine.set(ConnectivityState::WaitingForHotspot);
        }
        return;
    }

    if let Err(e) = inner.fallback.snapshot_current().await {
        log::warn!("Failed to snapshot fallback network: {e}");
    }
    inner.machine.set(ConnectivityState::WaitingForHotspot);
    schedule_attempt(inner);
}

fn reconcile_passive(inner: &Arc<ServiceInner>, connected_to_something: bool) {
    match inner.machine.state() {
        ConnectivityState::Connected => {
            inner.machine.set(ConnectivityState::Disconnected);
        }
        ConnectivityState::Idle | ConnectivityState::Disconnected => {}
        _ => {
            inner.machine.set(if connected_to_something {
                ConnectivityState::Idle
            } else {
                ConnectivityState::Disconnected
            });
        }
    }
}
