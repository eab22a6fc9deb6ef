//! # Scheduler
//!
//! Cooperative, priority-indexed periodic scheduler. There is no
//! preemption between runnables: the tick interrupt only raises a flag,
//! and the dispatch loop runs every due runnable to completion in main
//! context.
//!
//! ## States
//!
//! ```text
//!   Idle ──(tick ISR raises flag)──► Pending ──(loop takes flag)──► Dispatching
//!    ▲                                                                  │
//!    └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dispatch Pass
//!
//! 1. Scan slots in ascending priority order
//! 2. For each occupied slot with a callback, fire it if it is due at the
//!    current tick (see [`Runnable::is_due`])
//! 3. Advance the tick counter by exactly one tick period
//!
//! A long-running callback delays every later slot in the same pass and
//! the start of the next pass. Nothing bounds this.

use crate::config::MAX_RUNNABLES;
use crate::error::{Error, Result};
use crate::task::Runnable;
use crate::tick::{TickFlag, TickSource, TickSourceError};

/// Compute the tick timer reload value for `tick_period_ms` at
/// `clock_hz`: `tick_period × clock / 1000 − 1`.
pub fn reload_value(tick_period_ms: u32, clock_hz: u32) -> Result<u32> {
    if tick_period_ms == 0 {
        return Err(Error::InvalidPeriod);
    }
    let counts = u64::from(tick_period_ms) * u64::from(clock_hz) / 1000;
    counts
        .checked_sub(1)
        .and_then(|reload| u32::try_from(reload).ok())
        .ok_or(Error::ReloadOutOfRange)
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The scheduler context. One instance per microcontroller, created by
/// [`Scheduler::init`] and consumed by [`Scheduler::start`].
///
/// - `slots[p]` holds the runnable registered at priority `p`, if any
/// - Runnables are borrowed, never owned: each must outlive `'a`
/// - `N` is the table capacity (valid priorities are `0..N`)
pub struct Scheduler<'a, T, const N: usize = MAX_RUNNABLES>
where
    T: TickSource,
{
    tick_source: T,
    tick_flag: &'static TickFlag,
    slots: [Option<&'a Runnable<'a>>; N],
    now_ms: u64,
    tick_period_ms: u32,
    reload: u32,
}

impl<'a, T, const N: usize> Scheduler<'a, T, N>
where
    T: TickSource,
{
    /// Configure the tick source and build the scheduler.
    ///
    /// The tick source is set up for a `tick_period_ms` period at
    /// `clock_hz`, and its overflow handler is the `tick_flag` itself.
    /// The timer is not started until [`start`](Self::start).
    ///
    /// # Errors
    /// - `InvalidPeriod` for a zero tick period
    /// - `ReloadOutOfRange` if the reload does not fit 32 bits or the
    ///   tick source's counter
    /// - `TickSourceInit` if the tick source rejects the clock setup
    /// - `CallbackRegistration` if the overflow handler cannot be installed
    pub fn init(
        mut tick_source: T,
        tick_flag: &'static TickFlag,
        tick_period_ms: u32,
        clock_hz: u32,
    ) -> Result<Self> {
        let reload = reload_value(tick_period_ms, clock_hz).map_err(|e| {
            warn!("scheduler: bad tick parameters {=u32} ms @ {=u32} Hz", tick_period_ms, clock_hz);
            e
        })?;

        tick_source.init(clock_hz, 1).map_err(|e| {
            warn!("scheduler: tick source init failed: {}", e);
            Error::TickSourceInit
        })?;

        tick_source.set_reload(reload).map_err(|e| {
            warn!("scheduler: reload {=u32} rejected: {}", reload, e);
            match e {
                TickSourceError::OutOfRange => Error::ReloadOutOfRange,
                _ => Error::TickSourceInit,
            }
        })?;

        tick_source.register_callback(tick_flag).map_err(|e| {
            warn!("scheduler: tick callback registration failed: {}", e);
            Error::CallbackRegistration
        })?;

        info!("scheduler: {=u32} ms tick, reload {=u32}", tick_period_ms, reload);

        Ok(Self {
            tick_source,
            tick_flag,
            slots: [None; N],
            now_ms: 0,
            tick_period_ms,
            reload,
        })
    }

    /// Register a runnable in the slot named by its priority.
    ///
    /// O(1). The scheduler keeps only the reference.
    ///
    /// # Errors
    /// - `NullArgument` if `runnable` is `None`
    /// - `PriorityOutOfRange` if the priority is not a slot index
    /// - `InvalidPeriod` if the periodicity is zero
    /// - `SlotOccupied` if another runnable holds the slot; the occupant
    ///   is left untouched
    pub fn register(&mut self, runnable: Option<&'a Runnable<'a>>) -> Result<()> {
        let runnable = runnable.ok_or_else(|| {
            warn!("scheduler: register(null)");
            Error::NullArgument
        })?;

        let priority = runnable.priority;
        let slot = self.slots.get_mut(priority).ok_or_else(|| {
            warn!("scheduler: priority {=usize} out of range", priority);
            Error::PriorityOutOfRange
        })?;

        if runnable.periodicity_ms == 0 {
            warn!("scheduler: zero periodicity at priority {=usize}", priority);
            return Err(Error::InvalidPeriod);
        }

        if slot.is_some() {
            warn!("scheduler: priority {=usize} already occupied", priority);
            return Err(Error::SlotOccupied);
        }

        *slot = Some(runnable);
        debug!(
            "scheduler: registered priority {=usize} every {=u32} ms after {=u32} ms",
            priority,
            runnable.periodicity_ms,
            runnable.first_delay_ms
        );
        Ok(())
    }

    /// Vacate the slot at the runnable's declared priority.
    ///
    /// The slot is cleared unconditionally: the stored reference is *not*
    /// compared against `runnable`. Passing a stale or unrelated
    /// descriptor that shares the priority unregisters whichever runnable
    /// currently occupies the slot.
    ///
    /// # Errors
    /// - `NullArgument` if `runnable` is `None`
    /// - `PriorityOutOfRange` if the priority is not a slot index
    pub fn remove(&mut self, runnable: Option<&Runnable<'_>>) -> Result<()> {
        let runnable = runnable.ok_or_else(|| {
            warn!("scheduler: remove(null)");
            Error::NullArgument
        })?;

        let priority = runnable.priority;
        let slot = self.slots.get_mut(priority).ok_or_else(|| {
            warn!("scheduler: priority {=usize} out of range", priority);
            Error::PriorityOutOfRange
        })?;

        *slot = None;
        debug!("scheduler: removed priority {=usize}", priority);
        Ok(())
    }

    /// One dispatch pass at the current tick, then advance the tick.
    ///
    /// Normally driven by [`poll`](Self::poll); exposed so a port with its
    /// own wait primitive can run passes directly.
    pub fn dispatch(&mut self) {
        let now = self.now_ms;
        trace!("scheduler: pass at {=u64} ms", now);

        for runnable in self.slots.iter().flatten() {
            if let Some(callback) = runnable.callback {
                if runnable.is_due(now) {
                    callback.call();
                }
            }
        }

        self.now_ms += u64::from(self.tick_period_ms);
    }

    /// Run one pass if a tick is pending. Returns whether a pass ran.
    pub fn poll(&mut self) -> bool {
        if self.tick_flag.take() {
            self.dispatch();
            true
        } else {
            false
        }
    }

    /// Start the tick source and dispatch forever, spinning between ticks.
    pub fn start(self) -> ! {
        self.start_with(core::hint::spin_loop)
    }

    /// Start the tick source and dispatch forever, calling `idle` while no
    /// tick is pending.
    ///
    /// `idle` may sleep (e.g. `wfi`) as long as the tick interrupt wakes it.
    pub fn start_with<F: FnMut()>(mut self, mut idle: F) -> ! {
        info!("scheduler: start");
        self.tick_source.start();
        loop {
            if !self.poll() {
                idle();
            }
        }
    }

    /// Milliseconds covered by completed dispatch passes.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Configured tick period.
    #[inline]
    pub fn tick_period_ms(&self) -> u32 {
        self.tick_period_ms
    }

    /// Reload value programmed into the tick source.
    #[inline]
    pub fn reload(&self) -> u32 {
        self.reload
    }

    /// Whether a runnable currently holds `priority`.
    pub fn is_occupied(&self, priority: usize) -> bool {
        matches!(self.slots.get(priority), Some(Some(_)))
    }

    /// The owned tick source.
    pub fn tick_source(&self) -> &T {
        &self.tick_source
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Callback;
    use core::cell::{Cell, RefCell};
    use std::boxed::Box;
    use std::vec::Vec;

    #[derive(Default)]
    struct MockTick {
        frequency: u32,
        reload: u32,
        max_reload: u32,
        registered: bool,
        running: bool,
        fail_init: bool,
        fail_reload: bool,
        fail_register: bool,
    }

    impl MockTick {
        fn new() -> Self {
            Self {
                max_reload: 0x00FF_FFFF,
                ..Default::default()
            }
        }
    }

    impl TickSource for MockTick {
        fn init(
            &mut self,
            frequency_hz: u32,
            _prescaler: u32,
        ) -> core::result::Result<(), TickSourceError> {
            if self.fail_init {
                return Err(TickSourceError::Unsupported);
            }
            self.frequency = frequency_hz;
            Ok(())
        }

        fn set_reload(&mut self, value: u32) -> core::result::Result<(), TickSourceError> {
            if self.fail_reload {
                return Err(TickSourceError::Unsupported);
            }
            if value > self.max_reload {
                return Err(TickSourceError::OutOfRange);
            }
            self.reload = value;
            Ok(())
        }

        fn register_callback(
            &mut self,
            _handler: &'static (dyn Callback + Sync),
        ) -> core::result::Result<(), TickSourceError> {
            if self.fail_register {
                return Err(TickSourceError::AlreadyRegistered);
            }
            self.registered = true;
            Ok(())
        }

        fn start(&mut self) {
            self.running = true;
        }

        fn stop(&mut self) {
            self.running = false;
        }
    }

    /// Records the tick at which each callback fired.
    struct Probe<'c> {
        id: u8,
        clock: &'c Cell<u64>,
        log: &'c RefCell<Vec<(u8, u64)>>,
    }

    impl Callback for Probe<'_> {
        fn call(&self) {
            self.log.borrow_mut().push((self.id, self.clock.get()));
        }
    }

    fn leak_flag() -> &'static TickFlag {
        Box::leak(Box::new(TickFlag::new()))
    }

    fn run_ticks<const N: usize>(
        sched: &mut Scheduler<'_, MockTick, N>,
        clock: &Cell<u64>,
        ticks: usize,
    ) {
        for _ in 0..ticks {
            clock.set(sched.now_ms());
            sched.dispatch();
        }
    }

    #[test]
    fn test_reload_computation() {
        assert_eq!(reload_value(1, 16_000_000), Ok(15_999));
        assert_eq!(reload_value(10, 16_000_000), Ok(159_999));
        assert_eq!(reload_value(0, 16_000_000), Err(Error::InvalidPeriod));
        assert_eq!(reload_value(1, 999), Err(Error::ReloadOutOfRange));
        assert_eq!(reload_value(u32::MAX, u32::MAX), Err(Error::ReloadOutOfRange));
    }

    #[test]
    fn test_init_configures_tick_source() {
        let flag = leak_flag();
        let sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();

        assert_eq!(sched.reload(), 15_999);
        assert_eq!(sched.tick_source().reload, 15_999);
        assert_eq!(sched.tick_source().frequency, 16_000_000);
        assert!(sched.tick_source().registered);
        assert!(!sched.tick_source().running);
        assert_eq!(sched.now_ms(), 0);
    }

    #[test]
    fn test_init_failures_are_distinct() {
        let flag = leak_flag();

        let tick = MockTick { fail_init: true, ..MockTick::new() };
        let r: Result<Scheduler<'_, MockTick>> = Scheduler::init(tick, flag, 1, 16_000_000);
        assert_eq!(r.err(), Some(Error::TickSourceInit));

        // 2 s at 16 MHz does not fit a 24-bit counter
        let r: Result<Scheduler<'_, MockTick>> =
            Scheduler::init(MockTick::new(), flag, 2_000, 16_000_000);
        assert_eq!(r.err(), Some(Error::ReloadOutOfRange));

        // Any other reload failure is a tick source setup failure
        let tick = MockTick { fail_reload: true, ..MockTick::new() };
        let r: Result<Scheduler<'_, MockTick>> = Scheduler::init(tick, flag, 1, 16_000_000);
        assert_eq!(r.err(), Some(Error::TickSourceInit));

        let tick = MockTick { fail_register: true, ..MockTick::new() };
        let r: Result<Scheduler<'_, MockTick>> = Scheduler::init(tick, flag, 1, 16_000_000);
        assert_eq!(r.err(), Some(Error::CallbackRegistration));
    }

    #[test]
    fn test_register_null_and_out_of_range() {
        let far = Runnable::empty(10, 4);
        let zero = Runnable::empty(0, 1);
        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick, 4> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();

        assert_eq!(sched.register(None), Err(Error::NullArgument));
        assert_eq!(sched.register(Some(&far)), Err(Error::PriorityOutOfRange));
        assert_eq!(sched.register(Some(&zero)), Err(Error::InvalidPeriod));
        assert!(!sched.is_occupied(1));
    }

    #[test]
    fn test_duplicate_priority_keeps_first() {
        let clock = Cell::new(0);
        let log = RefCell::new(Vec::new());
        let a = Probe { id: 1, clock: &clock, log: &log };
        let b = Probe { id: 2, clock: &clock, log: &log };
        let first = Runnable::new(&a, 2, 0, 3);
        let second = Runnable::new(&b, 1, 0, 3);

        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();

        assert_eq!(sched.register(Some(&first)), Ok(()));
        assert_eq!(sched.register(Some(&second)), Err(Error::SlotOccupied));

        run_ticks(&mut sched, &clock, 5);
        assert_eq!(*log.borrow(), [(1, 0), (1, 2), (1, 4)]);
    }

    #[test]
    fn test_remove_frees_slot() {
        let a = Runnable::empty(10, 2);
        let b = Runnable::empty(20, 2);
        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();

        assert_eq!(sched.remove(None), Err(Error::NullArgument));

        sched.register(Some(&a)).unwrap();
        assert!(sched.is_occupied(2));
        sched.remove(Some(&a)).unwrap();
        assert!(!sched.is_occupied(2));
        assert_eq!(sched.register(Some(&b)), Ok(()));
    }

    #[test]
    fn test_remove_does_not_check_identity() {
        let registered = Runnable::empty(10, 5);
        let unrelated = Runnable::empty(99, 5);
        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();

        sched.register(Some(&registered)).unwrap();
        // A different descriptor sharing the priority still vacates the slot
        assert_eq!(sched.remove(Some(&unrelated)), Ok(()));
        assert!(!sched.is_occupied(5));

        // Removing from an empty slot is not an error either
        assert_eq!(sched.remove(Some(&unrelated)), Ok(()));
    }

    #[test]
    fn test_dispatch_order_is_ascending_priority() {
        let clock = Cell::new(0);
        let log = RefCell::new(Vec::new());
        let p0 = Probe { id: 0, clock: &clock, log: &log };
        let p3 = Probe { id: 3, clock: &clock, log: &log };
        let p7 = Probe { id: 7, clock: &clock, log: &log };
        let r7 = Runnable::new(&p7, 1, 0, 7);
        let r0 = Runnable::new(&p0, 1, 0, 0);
        let r3 = Runnable::new(&p3, 1, 0, 3);

        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();
        sched.register(Some(&r7)).unwrap();
        sched.register(Some(&r0)).unwrap();
        sched.register(Some(&r3)).unwrap();

        run_ticks(&mut sched, &clock, 1);
        assert_eq!(*log.borrow(), [(0, 0), (3, 0), (7, 0)]);
    }

    #[test]
    fn test_null_callback_is_skipped() {
        let silent = Runnable::empty(1, 0);
        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();
        sched.register(Some(&silent)).unwrap();

        for _ in 0..3 {
            sched.dispatch();
        }
        assert_eq!(sched.now_ms(), 3);
    }

    #[test]
    fn test_tick_advances_by_period() {
        let clock = Cell::new(0);
        let log = RefCell::new(Vec::new());
        let probe = Probe { id: 1, clock: &clock, log: &log };
        let r = Runnable::new(&probe, 10, 0, 0);

        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 5, 16_000_000).unwrap();
        sched.register(Some(&r)).unwrap();

        run_ticks(&mut sched, &clock, 5);
        assert_eq!(sched.now_ms(), 25);
        assert_eq!(*log.borrow(), [(1, 0), (1, 10), (1, 20)]);
    }

    #[test]
    fn test_poll_only_runs_on_pending_tick() {
        let hits = Cell::new(0u32);
        let bump = || hits.set(hits.get() + 1);
        let r = Runnable::new(&bump, 1, 0, 0);

        let flag = leak_flag();
        let mut sched: Scheduler<'_, MockTick> =
            Scheduler::init(MockTick::new(), flag, 1, 16_000_000).unwrap();
        sched.register(Some(&r)).unwrap();

        assert!(!sched.poll());
        assert_eq!(hits.get(), 0);

        flag.raise();
        assert!(sched.poll());
        assert_eq!(hits.get(), 1);
        assert!(!flag.is_raised());
        assert!(!sched.poll());
    }
}
