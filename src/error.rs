//! # Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. Nothing
//! panics or aborts: initialization errors must be handled before
//! [`Scheduler::start`](crate::scheduler::Scheduler::start), because the
//! dispatch loop itself has no error channel.

use core::fmt;

/// Error taxonomy shared by the scheduler and the transfer engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Bad tick/reload parameters or a duplicate-priority registration.
    Configuration,
    /// A required reference or buffer storage was absent.
    NullArgument,
    /// The channel already has a transfer in flight.
    ResourceBusy,
    /// The operation does not make sense for the given runnable.
    Logic,
}

/// Crate error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The tick source rejected its frequency/prescaler configuration
    TickSourceInit,
    /// The computed reload value does not fit the tick timer
    ReloadOutOfRange,
    /// The tick overflow handler could not be registered
    CallbackRegistration,
    /// Zero tick period or zero runnable periodicity
    InvalidPeriod,
    /// Another runnable already holds the requested priority slot
    SlotOccupied,
    /// Required argument absent
    NullArgument,
    /// Channel busy with an in-flight transfer
    ResourceBusy,
    /// Priority outside the runnable table
    PriorityOutOfRange,
}

impl Error {
    /// Get error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::TickSourceInit => 0x0101,
            Self::ReloadOutOfRange => 0x0102,
            Self::CallbackRegistration => 0x0103,
            Self::InvalidPeriod => 0x0104,
            Self::SlotOccupied => 0x0110,
            Self::NullArgument => 0x0200,
            Self::ResourceBusy => 0x0300,
            Self::PriorityOutOfRange => 0x0400,
        }
    }

    /// Get error description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::TickSourceInit => "tick source configuration failed",
            Self::ReloadOutOfRange => "tick reload value out of range",
            Self::CallbackRegistration => "tick callback registration failed",
            Self::InvalidPeriod => "period must be non-zero",
            Self::SlotOccupied => "priority slot already occupied",
            Self::NullArgument => "null argument",
            Self::ResourceBusy => "channel busy",
            Self::PriorityOutOfRange => "priority out of range",
        }
    }

    /// Classify the error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TickSourceInit
            | Self::ReloadOutOfRange
            | Self::CallbackRegistration
            | Self::InvalidPeriod
            | Self::SlotOccupied => ErrorKind::Configuration,
            Self::NullArgument => ErrorKind::NullArgument,
            Self::ResourceBusy => ErrorKind::ResourceBusy,
            Self::PriorityOutOfRange => ErrorKind::Logic,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

/// Crate result type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::format;

    #[test]
    fn test_taxonomy() {
        assert_eq!(Error::SlotOccupied.kind(), ErrorKind::Configuration);
        assert_eq!(Error::ReloadOutOfRange.kind(), ErrorKind::Configuration);
        assert_eq!(Error::NullArgument.kind(), ErrorKind::NullArgument);
        assert_eq!(Error::ResourceBusy.kind(), ErrorKind::ResourceBusy);
        assert_eq!(Error::PriorityOutOfRange.kind(), ErrorKind::Logic);
    }

    #[test]
    fn test_codes_are_unique() {
        let all = [
            Error::TickSourceInit,
            Error::ReloadOutOfRange,
            Error::CallbackRegistration,
            Error::InvalidPeriod,
            Error::SlotOccupied,
            Error::NullArgument,
            Error::ResourceBusy,
            Error::PriorityOutOfRange,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code(), "{:?} and {:?} share a code", a, b);
            }
        }
    }

    #[test]
    fn test_display_format() {
        assert_eq!(format!("{}", Error::ResourceBusy), "[0x0300] channel busy");
    }
}
