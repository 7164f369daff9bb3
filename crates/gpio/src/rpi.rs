use rppal::gpio::{Gpio, Level, OutputPin};

use crate::{HardwareError, LineDriver};

/// Raspberry Pi output line backed by `rppal`. The pin returns to its
/// previous mode when dropped.
pub struct RppalLine {
    pin: OutputPin,
}

impl RppalLine {
    pub fn claim(bcm_pin: u8, initial_high: bool) -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        let pin = if initial_high {
            pin.into_output_high()
        } else {
            pin.into_output_low()
        };
        Ok(Self { pin })
    }
}

impl LineDriver for RppalLine {
    fn is_high(&mut self) -> Result<bool, HardwareError> {
        Ok(self.pin.is_set_high())
    }

    fn set_high(&mut self, high: bool) -> Result<(), HardwareError> {
        self.pin.write(if high { Level::High } else { Level::Low });
        Ok(())
    }
}
