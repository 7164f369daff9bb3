use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{HardwareError, LineDriver, PinHandle};

/// Receives the logical PSU level after every completed hardware operation.
/// Called with the line lock held, so calls arrive in completion order.
pub trait StateSink: Send + Sync + 'static {
    fn publish(&self, is_on: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Switched,
    AlreadyOff,
}

#[derive(Clone)]
pub struct GpioController {
    line: Arc<Mutex<Box<dyn LineDriver>>>,
    last_known: Arc<AtomicBool>,
    sink: Arc<dyn StateSink>,
    on_is_high: bool,
    bcm_pin: u8,
    timeout: Duration,
}

struct Publisher {
    last_known: Arc<AtomicBool>,
    sink: Arc<dyn StateSink>,
    abandoned: Arc<AtomicBool>,
}

impl Publisher {
    fn publish(&self, is_on: bool) {
        if self.abandoned.load(Ordering::SeqCst) {
            warn!(is_on, "gpio operation finished after its caller gave up; next read resyncs");
            return;
        }
        self.last_known.store(is_on, Ordering::SeqCst);
        self.sink.publish(is_on);
    }
}

impl GpioController {
    pub fn new(handle: PinHandle, sink: Arc<dyn StateSink>, timeout: Duration) -> Self {
        Self {
            line: Arc::new(Mutex::new(handle.driver)),
            // probe leaves the line at the "on" level
            last_known: Arc::new(AtomicBool::new(true)),
            sink,
            on_is_high: handle.on_is_high,
            bcm_pin: handle.bcm_pin,
            timeout,
        }
    }

    pub fn bcm_pin(&self) -> u8 {
        self.bcm_pin
    }

    pub fn last_known(&self) -> bool {
        self.last_known.load(Ordering::SeqCst)
    }

    /// Current logical level. On timeout or driver failure the last known
    /// value is returned instead.
    pub async fn read(&self) -> bool {
        let on_is_high = self.on_is_high;
        let result = self
            .with_line(move |driver, publisher| {
                let is_on = driver.is_high()? == on_is_high;
                publisher.publish(is_on);
                Ok(is_on)
            })
            .await;
        match result {
            Ok(is_on) => is_on,
            Err(error) => {
                let fallback = self.last_known();
                warn!(%error, fallback, bcm_pin = self.bcm_pin, "degraded gpio read");
                fallback
            }
        }
    }

    /// Drives the line to the "off" level. No write happens when it is
    /// already off.
    pub async fn set_off(&self) -> Result<Transition, HardwareError> {
        let on_is_high = self.on_is_high;
        self.with_line(move |driver, publisher| {
            if driver.is_high()? != on_is_high {
                publisher.publish(false);
                return Ok(Transition::AlreadyOff);
            }
            driver.set_high(!on_is_high)?;
            publisher.publish(false);
            Ok(Transition::Switched)
        })
        .await
    }

    async fn with_line<T, F>(&self, op: F) -> Result<T, HardwareError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LineDriver, &Publisher) -> Result<T, HardwareError> + Send + 'static,
    {
        let abandoned = Arc::new(AtomicBool::new(false));
        let publisher = Publisher {
            last_known: self.last_known.clone(),
            sink: self.sink.clone(),
            abandoned: abandoned.clone(),
        };
        let line = self.line.clone();

        let run = async move {
            let mut guard = line.lock_owned().await;
            tokio::task::spawn_blocking(move || op(&mut **guard, &publisher))
                .await
                .map_err(|e| HardwareError::Io(e.to_string()))?
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                abandoned.store(true, Ordering::SeqCst);
                debug!(bcm_pin = self.bcm_pin, timeout = ?self.timeout, "gpio operation timed out");
                Err(HardwareError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
