//! # Digital I/O Interfaces
//!
//! Single-shot pin access consumed by the switch and LED layers. Pin mode
//! and clock bring-up happen elsewhere; these traits only read or drive an
//! already configured pin.

/// A pin whose logic level can be sampled.
pub trait DigitalInput {
    /// Sample the pin once.
    fn is_high(&self) -> bool;

    /// Sample the pin once.
    #[inline]
    fn is_low(&self) -> bool {
        !self.is_high()
    }
}

/// A push-pull output pin.
///
/// Takes `&self`: output writes are single atomic register stores
/// (BSRR-style), so an LED can be driven from a shared runnable.
pub trait DigitalOutput {
    /// Drive the pin high.
    fn set_high(&self);

    /// Drive the pin low.
    fn set_low(&self);

    /// Level currently driven.
    fn is_set_high(&self) -> bool;
}

/// Which pin level means "active".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// High level is active (pull-down switch, LED to ground).
    ActiveHigh,
    /// Low level is active (pull-up switch, LED to supply).
    ActiveLow,
}

impl Polarity {
    /// Whether `level_high` is the active level.
    #[inline]
    pub const fn is_active(self, level_high: bool) -> bool {
        match self {
            Self::ActiveHigh => level_high,
            Self::ActiveLow => !level_high,
        }
    }

    /// Pin level that makes the signal active (`true` = high).
    #[inline]
    pub const fn active_level(self) -> bool {
        matches!(self, Self::ActiveHigh)
    }
}
