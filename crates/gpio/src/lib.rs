//! Exclusive access to the GPIO line that drives the PSU relay.
//!
//! [`probe`] claims the pin once at startup. The resulting [`PinHandle`] is
//! wrapped in a [`GpioController`], which serializes every hardware call and
//! reports each completed operation to a [`StateSink`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod controller;
mod pinmap;
#[cfg(feature = "rpi")]
mod rpi;
mod simulated;

pub use controller::{GpioController, StateSink, Transition};
pub use pinmap::board_to_bcm;
#[cfg(feature = "rpi")]
pub use rpi::RppalLine;
pub use simulated::SimulatedLine;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("gpio line unavailable: {0}")]
    Unavailable(String),
    #[error("gpio operation exceeded {0:?}")]
    Timeout(Duration),
    #[error("gpio operation failed: {0}")]
    Io(String),
}

/// Raw access to one output line. Calls may block on I/O; the controller
/// runs them on the blocking pool.
pub trait LineDriver: Send + 'static {
    fn is_high(&mut self) -> Result<bool, HardwareError>;
    fn set_high(&mut self, high: bool) -> Result<(), HardwareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Rppal,
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinNumbering {
    Board,
    Bcm,
}

#[derive(Debug, Clone)]
pub struct LineConfig {
    pub driver: DriverKind,
    pub numbering: PinNumbering,
    pub pin: u8,
    /// Relay is "on" at HIGH instead of LOW.
    pub invert: bool,
    pub board_revision: u8,
    pub timeout: Duration,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Rppal,
            numbering: PinNumbering::Board,
            pin: 0,
            invert: false,
            board_revision: 3,
            timeout: Duration::from_millis(500),
        }
    }
}

impl LineConfig {
    pub(crate) fn on_is_high(&self) -> bool {
        self.invert
    }

    /// Resolves the configured pin to its BCM number.
    pub fn bcm_pin(&self) -> Result<u8, HardwareError> {
        match self.numbering {
            PinNumbering::Bcm => Ok(self.pin),
            PinNumbering::Board => board_to_bcm(self.pin, self.board_revision).ok_or_else(|| {
                HardwareError::Unavailable(format!(
                    "board pin {} (revision {}) is not a gpio pin",
                    self.pin, self.board_revision
                ))
            }),
        }
    }
}

/// A claimed line, already driven to the "on" level.
pub struct PinHandle {
    driver: Box<dyn LineDriver>,
    bcm_pin: u8,
    on_is_high: bool,
}

impl PinHandle {
    pub fn new(driver: Box<dyn LineDriver>, bcm_pin: u8, on_is_high: bool) -> Self {
        Self {
            driver,
            bcm_pin,
            on_is_high,
        }
    }

    pub fn bcm_pin(&self) -> u8 {
        self.bcm_pin
    }
}

/// Claims the configured pin as an output at the "on" level.
pub fn probe(config: &LineConfig) -> Result<PinHandle, HardwareError> {
    let bcm_pin = config.bcm_pin()?;
    let on_is_high = config.on_is_high();
    let driver: Box<dyn LineDriver> = match config.driver {
        #[cfg(feature = "rpi")]
        DriverKind::Rppal => Box::new(RppalLine::claim(bcm_pin, on_is_high)?),
        #[cfg(not(feature = "rpi"))]
        DriverKind::Rppal => {
            return Err(HardwareError::Unavailable(
                "built without raspberry pi support".into(),
            ))
        }
        DriverKind::Simulated => Box::new(SimulatedLine::new(on_is_high)),
    };
    tracing::info!(bcm_pin, on_is_high, driver = ?config.driver, "claimed psu gpio line");
    Ok(PinHandle::new(driver, bcm_pin, on_is_high))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
