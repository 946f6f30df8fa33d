use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    sync::Mutex,
};

/// Driving: no UI client attached, passive monitoring only.
/// Stopped: at least one client attached, actively seeking the hotspot.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Driving,
    Stopped,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Driving => write!(f, "driving"),
            Mode::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counts attached UI clients; the mode is derived, never stored. Edge
/// actions on 0 -> n and n -> 0 belong to the service layer.
pub struct ModeTracker {
    clients: Mutex<u32>,
}

impl ModeTracker {
    pub fn new() -> Self {
        ModeTracker {
            clients: Mutex::new(0),
        }
    }

    pub fn set_count(&self, count: u32) -> (u32, u32) {
        let mut clients = self.clients.lock().unwrap();
        let previous = *clients;
        *clients = count;
        (previous, count)
    }

    pub fn count(&self) -> u32 {
        *self.clients.lock().unwrap()
    }

    pub fn mode(&self) -> Mode {
        if self.count() > 0 {
            Mode::Stopped
        } else {
            Mode::Driving
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_derived_from_the_client_count() {
        let tracker = ModeTracker::new();
        assert_eq!(tracker.mode(), Mode::Driving);

        assert_eq!(tracker.set_count(2), (0, 2));
        assert_eq!(tracker.mode(), Mode::Stopped);

        assert_eq!(tracker.set_count(0), (2, 0));
        assert_eq!(tracker.mode(), Mode::Driving);
    }
}
