use std::sync::RwLock;

use gpio::StateSink;
use shared::domain::PsuState;
use tracing::info;

use crate::broadcast::Broadcaster;

/// Cached PSU state. Written only from the GPIO controller's critical
/// section; readers never touch hardware.
pub struct StateStore {
    state: RwLock<PsuState>,
    broadcaster: Broadcaster,
}

impl StateStore {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            state: RwLock::new(PsuState::without_gpio()),
            broadcaster,
        }
    }

    pub fn get(&self) -> PsuState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the cached state and broadcasts it. Returns false, without
    /// broadcasting, when the value is unchanged.
    pub fn update(&self, new_state: PsuState) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == new_state {
            return false;
        }
        info!(
            has_gpio = new_state.has_gpio,
            is_on = new_state.is_on,
            "psu state changed"
        );
        *state = new_state;
        self.broadcaster.on_state_change(new_state);
        true
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}

impl StateSink for StateStore {
    fn publish(&self, is_on: bool) {
        self.update(PsuState::with_gpio(is_on));
    }
}
