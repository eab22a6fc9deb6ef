//! # Runnables
//!
//! Defines the periodic task model. A [`Runnable`] is a descriptor owned
//! by application code (static or long-lived storage); the scheduler only
//! borrows it for as long as it stays registered.
//!
//! ## Release Rule
//!
//! A runnable with periodicity `T` and first delay `D` fires on every
//! tick `t` (milliseconds since start) such that:
//!
//! ```text
//!   t >= D  and  (t - D) mod T == 0
//! ```
//!
//! and on no other tick. Runnables never run in interrupt context: the
//! scheduler invokes them from its dispatch loop.

/// A unit of work invoked from the scheduler's dispatch loop.
///
/// The "args" of a classic C task descriptor are whatever state the
/// implementor captures. Callbacks receive `&self`; state that changes
/// between invocations lives behind `Cell`/atomics.
pub trait Callback {
    /// Run the callback once.
    fn call(&self);
}

impl<F: Fn()> Callback for F {
    #[inline]
    fn call(&self) {
        self()
    }
}

/// Periodic task descriptor.
///
/// `priority` doubles as the slot index in the scheduler's table: at most
/// one runnable may occupy a given priority at a time, and lower indices
/// are dispatched first within a pass.
#[derive(Clone, Copy)]
pub struct Runnable<'a> {
    /// Work to perform. A registered runnable without a callback is
    /// skipped silently on every tick.
    pub callback: Option<&'a dyn Callback>,

    /// Release period in milliseconds. Must be non-zero.
    pub periodicity_ms: u32,

    /// Delay before the first release, in milliseconds.
    pub first_delay_ms: u32,

    /// Slot index (0 = dispatched first).
    pub priority: usize,
}

impl<'a> Runnable<'a> {
    /// Create a runnable released at `first_delay_ms`, then every
    /// `periodicity_ms`.
    pub const fn new(
        callback: &'a dyn Callback,
        periodicity_ms: u32,
        first_delay_ms: u32,
        priority: usize,
    ) -> Self {
        Self {
            callback: Some(callback),
            periodicity_ms,
            first_delay_ms,
            priority,
        }
    }

    /// A descriptor occupying `priority` that never does any work.
    pub const fn empty(periodicity_ms: u32, priority: usize) -> Self {
        Self {
            callback: None,
            periodicity_ms,
            first_delay_ms: 0,
            priority,
        }
    }

    /// Whether this runnable is released at tick `now_ms`.
    ///
    /// Always `false` for a zero periodicity; the scheduler refuses to
    /// register such a runnable anyway.
    #[inline]
    pub fn is_due(&self, now_ms: u64) -> bool {
        let delay = u64::from(self.first_delay_ms);
        let period = u64::from(self.periodicity_ms);
        period != 0 && now_ms >= delay && (now_ms - delay) % period == 0
    }
}

impl core::fmt::Debug for Runnable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runnable")
            .field("has_callback", &self.callback.is_some())
            .field("periodicity_ms", &self.periodicity_ms)
            .field("first_delay_ms", &self.first_delay_ms)
            .field("priority", &self.priority)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
