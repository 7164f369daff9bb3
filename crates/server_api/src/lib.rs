use std::{sync::Arc, time::Duration};

use gpio::{GpioController, HardwareError, LineConfig, Transition};
use serde::Serialize;
use shared::{
    domain::PsuState,
    error::{ApiError, ErrorCode},
    protocol::{Ack, Command, UiSettings},
};
use tracing::{debug, error, info, warn};

mod broadcast;
pub mod idle;
mod store;

pub use broadcast::{Broadcaster, Subscription};
pub use idle::{IdleMonitor, IdleSettings};
pub use store::StateStore;

#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<StateStore>,
    pub controller: Option<GpioController>,
    pub idle: IdleMonitor,
    pub ui: UiSettings,
    pub shutdown_command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub line: LineConfig,
    pub ui: UiSettings,
    pub idle: IdleSettings,
    pub shutdown_command: Option<String>,
    pub broadcast_capacity: usize,
}

/// Reply to a dispatched [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    State(PsuState),
    Ack(Ack),
}

impl ApiContext {
    /// Claims the PSU line and seeds the store from a first read. A failed
    /// probe leaves the service running without GPIO.
    pub async fn start(options: ServiceOptions) -> Self {
        let store = Arc::new(StateStore::new(Broadcaster::new(
            options.broadcast_capacity,
        )));
        let timeout = options.line.timeout;
        let controller = match gpio::probe(&options.line) {
            Ok(handle) => Some(GpioController::new(handle, store.clone(), timeout)),
            Err(error) => {
                warn!(%error, pin = options.line.pin, "psu gpio unavailable; running without power control");
                None
            }
        };
        Self::with_controller(store, controller, options)
            .seeded()
            .await
    }

    /// Assembles a context around an already built controller.
    pub fn with_controller(
        store: Arc<StateStore>,
        controller: Option<GpioController>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            idle: IdleMonitor::new(options.idle, store.clone()),
            store,
            controller,
            ui: options.ui,
            shutdown_command: options.shutdown_command,
        }
    }

    pub async fn seeded(self) -> Self {
        if let Some(controller) = &self.controller {
            let is_on = controller.read().await;
            // a degraded first read publishes nothing; the line is still ours
            self.store.update(PsuState::with_gpio(is_on));
            info!(bcm_pin = controller.bcm_pin(), is_on, "psu line ready");
        }
        self
    }

    pub fn has_gpio(&self) -> bool {
        self.controller.is_some()
    }

    pub fn subscribe(&self) -> Subscription {
        self.store.broadcaster().subscribe()
    }
}

pub fn get_psu_state(ctx: &ApiContext) -> PsuState {
    ctx.store.get()
}

pub fn ui_settings(ctx: &ApiContext) -> UiSettings {
    ctx.ui
}

/// Switches the PSU off. The new state reaches clients through the push
/// channel; the reply is an empty acknowledgement.
pub async fn turn_psu_off(ctx: &ApiContext) -> Result<Ack, ApiError> {
    info!("switching psu off");
    let Some(controller) = &ctx.controller else {
        warn!("no gpio line claimed; ignoring turn off");
        return Ok(Ack {});
    };

    match controller.set_off().await.map_err(hardware)? {
        Transition::Switched => {
            if let Some(command) = &ctx.shutdown_command {
                spawn_shutdown(command.clone());
            }
        }
        Transition::AlreadyOff => info!("psu already off"),
    }
    Ok(Ack {})
}

pub async fn handle_command(ctx: &ApiContext, body: &[u8]) -> Result<CommandReply, ApiError> {
    let command = Command::parse(body)?;
    debug!(command = command.name(), "dispatching psu command");
    match command {
        Command::GetState => Ok(CommandReply::State(get_psu_state(ctx))),
        Command::TurnOff => turn_psu_off(ctx).await.map(CommandReply::Ack),
    }
}

/// Feeds one queued G-code line to the idle monitor.
pub fn record_activity(ctx: &ApiContext, gcode: &str) -> bool {
    ctx.idle.record_gcode(gcode)
}

/// Re-reads the line at a fixed interval so external changes reach the
/// store. Returns immediately when no line was claimed.
pub async fn run_sensing(ctx: ApiContext, interval: Duration) {
    let Some(controller) = ctx.controller else {
        return;
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        controller.read().await;
    }
}

fn spawn_shutdown(command: String) {
    tokio::spawn(async move {
        info!(%command, "shutting down host");
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .await
        {
            Ok(status) if status.success() => {}
            Ok(status) => error!(%command, %status, "host shutdown command failed"),
            Err(error) => error!(%command, %error, "host shutdown command could not start"),
        }
    });
}

fn hardware(err: HardwareError) -> ApiError {
    let code = match err {
        HardwareError::Timeout(_) => ErrorCode::HardwareTimeout,
        HardwareError::Unavailable(_) | HardwareError::Io(_) => ErrorCode::HardwareUnavailable,
    };
    error!(error = %err, "psu gpio operation failed");
    ApiError::new(code, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
