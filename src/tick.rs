//! # Tick Source and Tick Handoff
//!
//! The scheduler owns exactly one hardware timer (the *tick source*). Its
//! overflow interrupt does the minimum possible work: it raises a
//! [`TickFlag`]. The dispatch loop takes the flag in main context and runs
//! the due runnables there, so interrupt latency stays bounded no matter
//! how much work the application registers.
//!
//! ```text
//!   tick ISR                         main loop
//!   ────────                         ─────────
//!   TickFlag::raise()  ──────────►   TickFlag::take() → dispatch pass
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use crate::task::Callback;

/// Failure reported by a tick source collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickSourceError {
    /// Frequency or prescaler not supported by the timer.
    Unsupported,
    /// Reload value outside the counter's width.
    OutOfRange,
    /// An overflow handler is already installed.
    AlreadyRegistered,
}

/// Hardware timer driving the scheduler tick.
///
/// The overflow handler is reached from an interrupt vector, so it must
/// live for the rest of the program.
pub trait TickSource {
    /// Configure the timer's input clock.
    fn init(&mut self, frequency_hz: u32, prescaler: u32) -> Result<(), TickSourceError>;

    /// Set the counter reload value. Fails if `value` does not fit the
    /// counter width.
    fn set_reload(&mut self, value: u32) -> Result<(), TickSourceError>;

    /// Install the handler invoked on every counter overflow, in
    /// interrupt context.
    fn register_callback(
        &mut self,
        handler: &'static (dyn Callback + Sync),
    ) -> Result<(), TickSourceError>;

    /// Start counting.
    fn start(&mut self);

    /// Stop counting.
    fn stop(&mut self);
}

/// Single-producer/single-consumer tick handoff.
///
/// Raised by the tick interrupt, taken by the dispatch loop. Ticks that
/// arrive while the flag is still raised coalesce into one pass, exactly
/// like the hardware pending bit it mirrors.
///
/// Requires native atomic swap (Armv7-M and later).
#[derive(Debug)]
pub struct TickFlag {
    pending: AtomicBool,
}

impl TickFlag {
    /// A lowered flag.
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Mark a tick as pending. Safe to call from interrupt context.
    #[inline]
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the pending tick, if any.
    #[inline]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Peek without consuming.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for TickFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl Callback for TickFlag {
    #[inline]
    fn call(&self) {
        self.raise();
    }
}
