use super::{control::ConnectionInfo, service::ServiceInner, MONITOR_INTERVAL};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connected: bool,
    pub ssid: Option<String>,
}

pub type ConnectionObserver = Box<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Edge detector over the connected/disconnected boolean. Never reads or
/// writes the state machine.
pub struct ConnectionMonitor {
    last_connected: Mutex<Option<bool>>,
    observers: Mutex<HashMap<usize, ConnectionObserver>>,
    next_token: AtomicUsize,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        ConnectionMonitor {
            last_connected: Mutex::new(None),
            observers: Mutex::new(HashMap::new()),
            next_token: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self, observer: ConnectionObserver) -> usize {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().unwrap().insert(token, observer);
        token
    }

    pub fn unsubscribe(&self, token: usize) {
        self.observers.lock().unwrap().remove(&token);
    }

    pub fn clear_observers(&self) {
        self.observers.lock().unwrap().clear();
    }

    /// Feeds one connectivity sample; notifies only on a flip. The first
    /// sample primes the detector silently (subscribers get their initial
    /// value at registration).
    pub fn observe(&self, current: Option<&ConnectionInfo>) {
        let connected = current.is_some();
        {
            let mut last = self.last_connected.lock().unwrap();
            match *last {
                Some(previous) if previous == connected => return,
                None => {
                    *last = Some(connected);
                    return;
                }
                _ => *last = Some(connected),
            }
        }

        let event = ConnectionEvent {
            connected,
            ssid: current.map(|info| info.ssid.clone()),
        };
        log::info!(
            "Connection changed: {}",
            if connected { "connected" } else { "disconnected" }
        );

        let observers = self.observers.lock().unwrap();
        for (token, observer) in observers.iter() {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                log::error!("Connection observer {token} panicked");
            }
        }
    }
}

pub(super) async fn run_monitor(inner: Arc<ServiceInner>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut ticker = interval(Duration::from_millis(MONITOR_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::debug!("Connection monitor started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match inner.control.current_connection().await {
                    Ok(current) => inner.monitor.observe(current.as_ref()),
                    Err(e) => log::debug!("Connectivity poll failed: {e}"),
                }
            }
            _ = shutdown.changed() => {
                log::debug!("Connection monitor stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ssid: &str) -> ConnectionInfo {
        ConnectionInfo {
            ssid: ssid.to_string(),
            ip_address: None,
            mac_address: None,
            signal: 70,
        }
    }

    #[test]
    fn notifies_only_on_edges() {
        let monitor = ConnectionMonitor::new();
        let events = std::sync::Arc::new(Mutex::new(Vec::new()));

        let sink = std::sync::Arc::clone(&events);
        monitor.subscribe(Box::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));

        let home = sample("HomeWifi");
        monitor.observe(Some(&home)); // primes silently
        monitor.observe(Some(&home));
        monitor.observe(None);
        monitor.observe(None);
        monitor.observe(Some(&home));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[0].connected);
        assert!(events[0].ssid.is_none());
        assert!(events[1].connected);
        assert_eq!(events[1].ssid.as_deref(), Some("HomeWifi"));
    }
}
