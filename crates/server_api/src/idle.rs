//! Powers the PSU off after a period without printer activity.
//!
//! The host forwards every queued G-code line through [`IdleMonitor::record_gcode`].
//! Lines on the ignore list (temperature polling by default) do not count as
//! activity. Once the timer expires with the PSU still on, the monitor takes
//! the same path as a `turn_psu_off` request and then waits for the next
//! activity before arming again.

use std::{sync::Arc, time::Duration};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{store::StateStore, turn_psu_off, ApiContext};

#[derive(Debug, Clone)]
pub struct IdleSettings {
    pub enabled: bool,
    pub timeout: Duration,
    pub ignore_commands: Vec<String>,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_secs(30 * 60),
            ignore_commands: parse_ignore_list("M105"),
        }
    }
}

/// Splits a comma separated list of G-code words, e.g. `"M105, M115"`.
pub fn parse_ignore_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}

#[derive(Clone)]
pub struct IdleMonitor {
    settings: Arc<IdleSettings>,
    store: Arc<StateStore>,
    activity: Arc<Notify>,
}

impl IdleMonitor {
    pub fn new(settings: IdleSettings, store: Arc<StateStore>) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            activity: Arc::new(Notify::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Restarts the idle timer unless the line is ignored, the monitor is
    /// disabled, or the PSU is not on. Returns whether the timer restarted.
    pub fn record_gcode(&self, line: &str) -> bool {
        if !self.settings.enabled || !self.store.get().is_on {
            return false;
        }
        let Some(word) = line.split_whitespace().next() else {
            return false;
        };
        let word = word.to_ascii_uppercase();
        if self.settings.ignore_commands.contains(&word) {
            return false;
        }
        debug!(gcode = %word, "printer activity; idle timer restarted");
        self.activity.notify_one();
        true
    }

    pub async fn run(self, ctx: ApiContext) {
        if !self.settings.enabled {
            return;
        }
        info!(timeout = ?self.settings.timeout, "idle power-off armed");
        loop {
            tokio::select! {
                _ = self.activity.notified() => continue,
                _ = tokio::time::sleep(self.settings.timeout) => {}
            }

            let state = self.store.get();
            if state.has_gpio && state.is_on {
                info!(timeout = ?self.settings.timeout, "idle timeout reached; switching psu off");
                if let Err(error) = turn_psu_off(&ctx).await {
                    warn!(?error, "idle power-off failed");
                }
            }
            self.activity.notified().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/idle_tests.rs"]
mod tests;
