//! # LED
//!
//! Logical on/off control of an indicator LED wired either way round.

use crate::gpio::{DigitalOutput, Polarity};

/// An LED on a digital output.
#[derive(Clone, Copy)]
pub struct Led<'a> {
    output: &'a dyn DigitalOutput,
    polarity: Polarity,
}

impl<'a> Led<'a> {
    /// LED lit when `output` is driven to `polarity`'s active level.
    pub const fn new(output: &'a dyn DigitalOutput, polarity: Polarity) -> Self {
        Self { output, polarity }
    }

    /// Light the LED.
    pub fn on(&self) {
        self.set(true);
    }

    /// Extinguish the LED.
    pub fn off(&self) {
        self.set(false);
    }

    /// Light or extinguish the LED.
    pub fn set(&self, lit: bool) {
        if self.polarity.active_level() == lit {
            self.output.set_high();
        } else {
            self.output.set_low();
        }
    }

    /// Whether the LED is lit.
    pub fn is_on(&self) -> bool {
        self.polarity.is_active(self.output.is_set_high())
    }

    /// Invert the LED.
    pub fn toggle(&self) {
        self.set(!self.is_on());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Pin(Cell<bool>);

    impl DigitalOutput for Pin {
        fn set_high(&self) {
            self.0.set(true);
        }

        fn set_low(&self) {
            self.0.set(false);
        }

        fn is_set_high(&self) -> bool {
            self.0.get()
        }
    }

    #[test]
    fn test_active_low_led() {
        let pin = Pin(Cell::new(true));
        let led = Led::new(&pin, Polarity::ActiveLow);
        assert!(!led.is_on());

        led.on();
        assert!(!pin.0.get());
        assert!(led.is_on());

        led.off();
        assert!(pin.0.get());
    }

    #[test]
    fn test_toggle_inverts() {
        let pin = Pin(Cell::new(false));
        let led = Led::new(&pin, Polarity::ActiveHigh);

        led.toggle();
        assert!(pin.0.get());
        led.toggle();
        assert!(!pin.0.get());
    }
}
