use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{HardwareError, LineDriver};

/// In-memory output line for hosts without GPIO hardware.
///
/// Clones share the same line, so a test can keep one handle to inspect or
/// disturb the level while the controller owns another.
#[derive(Clone, Default)]
pub struct SimulatedLine {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    high: AtomicBool,
    writes: AtomicUsize,
    delay_ms: AtomicU64,
    fail: AtomicBool,
}

impl SimulatedLine {
    pub fn new(high: bool) -> Self {
        let line = Self::default();
        line.inner.high.store(high, Ordering::SeqCst);
        line
    }

    pub fn level_high(&self) -> bool {
        self.inner.high.load(Ordering::SeqCst)
    }

    /// Changes the level without counting a write, as an external actor would.
    pub fn force_level(&self, high: bool) {
        self.inner.high.store(high, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent operation sleep for `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.inner
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }

    fn settle(&self) -> Result<(), HardwareError> {
        let delay = self.inner.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(HardwareError::Io("simulated line fault".into()));
        }
        Ok(())
    }
}

impl LineDriver for SimulatedLine {
    fn is_high(&mut self) -> Result<bool, HardwareError> {
        self.settle()?;
        Ok(self.level_high())
    }

    fn set_high(&mut self, high: bool) -> Result<(), HardwareError> {
        self.settle()?;
        self.inner.high.store(high, Ordering::SeqCst);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
