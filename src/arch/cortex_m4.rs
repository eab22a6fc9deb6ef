//! # Cortex-M4 Port Layer
//!
//! SysTick as the scheduler's [`TickSource`].
//!
//! ## Tick Interrupt
//!
//! The `SysTick` exception handler does nothing but invoke the registered
//! overflow handler, which for the scheduler is its
//! [`TickFlag`](crate::tick::TickFlag): one atomic store. The handler slot
//! is write-once, so reaching it takes an atomic load and never masks
//! interrupts. All runnable work happens afterwards in thread mode.
//!
//! ## Interrupt Priorities
//!
//! SysTick should sit at the lowest priority (0xF0 with 4 priority bits)
//! so that the serial peripherals' interrupts, which run transfer
//! callbacks, are never delayed behind a tick.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::exception;

use crate::config::SYSTICK_MAX_RELOAD;
use crate::sync;
use crate::task::Callback;
use crate::tick::{TickSource, TickSourceError};

/// Write-once slot for the overflow handler.
///
/// Written at most once, inside a critical section, before `INSTALLED`
/// is published. Read-only from then on, so `SysTick` reads it without
/// masking interrupts.
struct HandlerSlot(UnsafeCell<Option<&'static (dyn Callback + Sync)>>);

// SAFETY: the only write happens before `INSTALLED` is set with release
// ordering; readers check `INSTALLED` with acquire ordering first.
unsafe impl Sync for HandlerSlot {}

/// Handler invoked from `SysTick`. Installed once by
/// [`SysTickSource::register_callback`].
static OVERFLOW_HANDLER: HandlerSlot = HandlerSlot(UnsafeCell::new(None));
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Lowest Cortex-M4 priority with 4 implemented priority bits.
pub const LOWEST_PRIORITY: u8 = 0xF0;

// ---------------------------------------------------------------------------
// SysTick tick source
// ---------------------------------------------------------------------------

/// SysTick timer clocked from the core clock.
pub struct SysTickSource {
    syst: SYST,
}

impl SysTickSource {
    /// Take ownership of the SysTick peripheral.
    pub fn new(syst: SYST) -> Self {
        Self { syst }
    }

    /// Give the peripheral back, stopped.
    pub fn free(mut self) -> SYST {
        self.stop();
        self.syst
    }
}

impl TickSource for SysTickSource {
    /// Only the undivided core clock is supported (`prescaler == 1`).
    fn init(&mut self, frequency_hz: u32, prescaler: u32) -> Result<(), TickSourceError> {
        if frequency_hz == 0 || prescaler != 1 {
            return Err(TickSourceError::Unsupported);
        }
        self.syst.disable_counter();
        self.syst.set_clock_source(SystClkSource::Core);
        Ok(())
    }

    fn set_reload(&mut self, value: u32) -> Result<(), TickSourceError> {
        if value == 0 || value > SYSTICK_MAX_RELOAD {
            return Err(TickSourceError::OutOfRange);
        }
        self.syst.set_reload(value);
        self.syst.clear_current();
        Ok(())
    }

    fn register_callback(
        &mut self,
        handler: &'static (dyn Callback + Sync),
    ) -> Result<(), TickSourceError> {
        sync::critical_section(|_| {
            if INSTALLED.load(Ordering::Acquire) {
                return Err(TickSourceError::AlreadyRegistered);
            }
            // SAFETY: not yet published, and the critical section keeps
            // any other writer out.
            unsafe { *OVERFLOW_HANDLER.0.get() = Some(handler) };
            INSTALLED.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn start(&mut self) {
        self.syst.clear_current();
        self.syst.enable_interrupt();
        self.syst.enable_counter();
    }

    fn stop(&mut self) {
        self.syst.disable_counter();
        self.syst.disable_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set the SysTick exception priority.
///
/// Use [`LOWEST_PRIORITY`] unless some other exception must yield to the
/// tick.
pub fn set_systick_priority(scb: &mut SCB, priority: u8) {
    // SAFETY: the scheduler holds no priority-based critical sections, so
    // changing SysTick's priority cannot break a locking invariant.
    unsafe {
        scb.set_priority(SystemHandler::SysTick, priority);
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    if !INSTALLED.load(Ordering::Acquire) {
        return;
    }
    // SAFETY: published slots are never written again.
    if let Some(handler) = unsafe { *OVERFLOW_HANDLER.0.get() } {
        handler.call();
    }
}
