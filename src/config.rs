//! # Tickwork Configuration
//!
//! Compile-time constants governing the scheduler, the tick source and the
//! debounce filter. All limits are fixed at compile time. No dynamic
//! allocation.

/// Capacity of the scheduler's priority-indexed runnable table.
/// Priorities `0..MAX_RUNNABLES` are valid slot indices; slot 0 is
/// dispatched first on every pass.
pub const MAX_RUNNABLES: usize = 8;

/// Scheduler tick period in milliseconds. Every dispatch pass advances
/// the tick counter by exactly this amount.
pub const TICK_PERIOD_MS: u32 = 1;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI, no PLL).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Largest reload value the SysTick counter can hold (24-bit).
pub const SYSTICK_MAX_RELOAD: u32 = 0x00FF_FFFF;

/// Sample period of the switch debounce runnable, in milliseconds.
pub const DEBOUNCE_PERIOD_MS: u32 = 5;

/// Number of consecutive identical samples required before a switch
/// level is published. With `DEBOUNCE_PERIOD_MS` this is ~20 ms.
pub const DEBOUNCE_THRESHOLD: u8 = 4;

/// Slot of the debounce runnable. Priority 0 runs first on every pass,
/// so application runnables always observe the freshest switch state.
pub const DEBOUNCE_PRIORITY: usize = 0;

/// Half-period of the firmware's status LED blink, in milliseconds.
pub const LED_BLINK_PERIOD_MS: u32 = 500;

/// Debounce filter parameters.
///
/// Defaults to the constants above; boards with noisier switches can
/// raise `threshold` or `period_ms` without touching the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DebounceConfig {
    /// Sampling period of the debounce runnable in milliseconds.
    pub period_ms: u32,
    /// Consecutive identical samples needed to publish a new state.
    pub threshold: u8,
    /// Scheduler slot the debounce runnable occupies.
    pub priority: usize,
}

impl DebounceConfig {
    /// The reference configuration: 5 ms period, 4 samples, priority 0.
    pub const fn new() -> Self {
        Self {
            period_ms: DEBOUNCE_PERIOD_MS,
            threshold: DEBOUNCE_THRESHOLD,
            priority: DEBOUNCE_PRIORITY,
        }
    }

    /// Time an input must stay stable before its new level is published.
    /// Saturates at `u32::MAX`.
    #[inline]
    pub const fn settle_time_ms(&self) -> u32 {
        self.period_ms.saturating_mul(self.threshold as u32)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self::new()
    }
}
