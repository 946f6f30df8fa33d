use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    #[default]
    Idle,
    Disconnected,
    Connecting,
    Connected,
    WaitingForHotspot,
    ReconnectingFallback,
    Error,
}

impl Display for ConnectivityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Idle => write!(f, "idle"),
            ConnectivityState::Disconnected => write!(f, "disconnected"),
            ConnectivityState::Connecting => write!(f, "connecting"),
            ConnectivityState::Connected => write!(f, "connected"),
            ConnectivityState::WaitingForHotspot => write!(f, "waiting_for_hotspot"),
            ConnectivityState::ReconnectingFallback => write!(f, "reconnecting_fallback"),
            ConnectivityState::Error => write!(f, "error"),
        }
    }
}

/// One state transition, as delivered to observers and UI subscribers.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StateEvent {
    pub state: ConnectivityState,
    pub previous: ConnectivityState,
}

pub type StateObserver = Box<dyn Fn(ConnectivityState, ConnectivityState) + Send + Sync>;

struct StateCell {
    state: ConnectivityState,
    connected_at: Option<Instant>,
    screen_shown: bool,
}

/// Holds the connectivity state. `set` is the only writer; transitions are
/// synchronous and never block.
pub struct StateMachine {
    cell: Mutex<StateCell>,
    observers: Mutex<HashMap<usize, StateObserver>>,
    next_token: AtomicUsize,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            cell: Mutex::new(StateCell {
                state: ConnectivityState::Idle,
                connected_at: None,
                screen_shown: false,
            }),
            observers: Mutex::new(HashMap::new()),
            next_token: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.cell.lock().unwrap().state
    }

    /// Applies a transition. A no-op when `new` equals the current state:
    /// no observer fires and the `Connected` entry timestamp is untouched.
    pub fn set(&self, new: ConnectivityState) -> bool {
        let previous = {
            let mut cell = self.cell.lock().unwrap();
            if cell.state == new {
                return false;
            }
            let previous = cell.state;
            if new == ConnectivityState::Connected {
                cell.connected_at = Some(Instant::now());
                cell.screen_shown = false;
            } else if previous == ConnectivityState::Connected {
                cell.connected_at = None;
            }
            cell.state = new;
            previous
        };

        log::info!("Connectivity state: {previous} -> {new}");
        self.notify(new, previous);
        true
    }

    /// Re-delivers the current state to observers. Used when the UI missed
    /// the connected confirmation and needs another chance to render it.
    pub fn reemit(&self) {
        let state = self.state();
        self.notify(state, state);
    }

    fn notify(&self, new: ConnectivityState, previous: ConnectivityState) {
        let observers = self.observers.lock().unwrap();
        for (token, observer) in observers.iter() {
            // A panicking observer must not corrupt the transition or
            // starve the remaining observers.
            if panic::catch_unwind(AssertUnwindSafe(|| observer(new, previous))).is_err() {
                log::error!("State observer {token} panicked");
            }
        }
    }

    pub fn connected_since(&self) -> Option<Instant> {
        self.cell.lock().unwrap().connected_at
    }

    pub fn screen_shown(&self) -> bool {
        self.cell.lock().unwrap().screen_shown
    }

    pub fn mark_screen_shown(&self) {
        self.cell.lock().unwrap().screen_shown = true;
    }

    pub fn clear_screen_shown(&self) {
        self.cell.lock().unwrap().screen_shown = false;
    }

    pub fn subscribe(&self, observer: StateObserver) -> usize {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn transitions_notify_with_new_and_previous() {
        let machine = StateMachine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        machine.subscribe(Box::new(move |new, previous| {
            sink.lock().unwrap().push((new, previous));
        }));

        machine.set(ConnectivityState::WaitingForHotspot);
        machine.set(ConnectivityState::Connecting);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (ConnectivityState::WaitingForHotspot, ConnectivityState::Idle),
                (
                    ConnectivityState::Connecting,
                    ConnectivityState::WaitingForHotspot
                ),
            ]
        );
    }

    #[tokio::test]
    async fn noop_transition_fires_nothing_and_keeps_timestamp() {
        let machine = StateMachine::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        machine.subscribe(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(machine.set(ConnectivityState::Connected));
        let entered = machine.connected_since().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!machine.set(ConnectivityState::Connected));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(machine.connected_since().unwrap(), entered);
    }

    #[tokio::test]
    async fn entering_connected_resets_screen_flag_and_leaving_clears_timestamp() {
        let machine = StateMachine::new();

        machine.set(ConnectivityState::Connected);
        assert!(!machine.screen_shown());
        machine.mark_screen_shown();
        assert!(machine.screen_shown());

        machine.set(ConnectivityState::Disconnected);
        assert!(machine.connected_since().is_none());

        machine.set(ConnectivityState::Connected);
        assert!(!machine.screen_shown());
    }

    #[tokio::test]
    async fn unsubscribed_observer_stops_receiving() {
        let machine = StateMachine::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        let token = machine.subscribe(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        machine.set(ConnectivityState::Disconnected);
        machine.unsubscribe(token);
        machine.set(ConnectivityState::Idle);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_observer_does_not_block_the_rest() {
        let machine = StateMachine::new();
        let fired = Arc::new(AtomicUsize::new(0));

        machine.subscribe(Box::new(|_, _| panic!("render crashed")));
        let counter = Arc::clone(&fired);
        machine.subscribe(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        machine.set(ConnectivityState::Disconnected);
        machine.set(ConnectivityState::Idle);

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(machine.state(), ConnectivityState::Idle);
    }

    #[tokio::test]
    async fn reemit_delivers_current_state_twice() {
        let machine = StateMachine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        machine.subscribe(Box::new(move |new, previous| {
            sink.lock().unwrap().push((new, previous));
        }));

        machine.set(ConnectivityState::Connected);
        machine.reemit();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            (ConnectivityState::Connected, ConnectivityState::Connected)
        );
    }
}
