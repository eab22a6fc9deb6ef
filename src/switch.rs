//! # Switch Debouncing
//!
//! Counter-based hysteresis over raw digital inputs, run as a scheduler
//! runnable (5 ms, priority 0 in the reference configuration).
//!
//! Each sample, per input:
//!
//! - a level different from the previous raw sample restarts the count
//!   (every change is a potential bounce until proven stable)
//! - the sample is counted toward the run of identical samples
//! - once `threshold` identical samples in a row have been seen, the level
//!   is published and the count starts over
//!
//! With the defaults an input must hold its level for 4 samples (20 ms)
//! before [`Switches::state`] reports it. `state` never touches hardware.

use core::cell::Cell;

use crate::config::DebounceConfig;
use crate::gpio::{DigitalInput, Polarity};
use crate::task::{Callback, Runnable};

/// Debounced logical state of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchState {
    /// Not actuated.
    #[default]
    Released,
    /// Actuated.
    Pressed,
}

/// A monitored input and how its level maps to [`SwitchState`].
#[derive(Clone, Copy)]
pub struct Switch<'a> {
    /// Raw input pin.
    pub input: &'a dyn DigitalInput,
    /// Level at which the switch reads as pressed.
    pub polarity: Polarity,
}

impl<'a> Switch<'a> {
    /// Switch pressed when `input` reads at `polarity`'s active level.
    pub const fn new(input: &'a dyn DigitalInput, polarity: Polarity) -> Self {
        Self { input, polarity }
    }

    fn sample(&self) -> SwitchState {
        if self.polarity.is_active(self.input.is_high()) {
            SwitchState::Pressed
        } else {
            SwitchState::Released
        }
    }
}

/// Per-input filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct DebounceRecord {
    last_raw: SwitchState,
    stable: SwitchState,
    matches: u8,
}

impl DebounceRecord {
    /// Feed one raw sample. Returns `true` if the published state changed.
    fn update(&mut self, raw: SwitchState, threshold: u8) -> bool {
        if raw != self.last_raw {
            self.matches = 0;
            self.last_raw = raw;
        }
        self.matches = self.matches.saturating_add(1);

        if self.matches < threshold {
            return false;
        }
        self.matches = 0;
        let changed = self.stable != raw;
        self.stable = raw;
        changed
    }
}

/// Debounce filter over `N` switches.
///
/// Implements [`Callback`]; register [`Switches::runnable`] with the
/// scheduler. Sampling and reading both happen in main context.
pub struct Switches<'a, const N: usize> {
    switches: [Switch<'a>; N],
    records: [Cell<DebounceRecord>; N],
    config: DebounceConfig,
}

impl<'a, const N: usize> Switches<'a, N> {
    /// Filter with the reference configuration.
    pub fn new(switches: [Switch<'a>; N]) -> Self {
        Self::with_config(switches, DebounceConfig::default())
    }

    /// Filter with an explicit period/threshold/priority.
    ///
    /// A zero threshold is treated as one: every sample publishes.
    pub fn with_config(switches: [Switch<'a>; N], config: DebounceConfig) -> Self {
        Self {
            switches,
            records: core::array::from_fn(|_| Cell::new(DebounceRecord::default())),
            config,
        }
    }

    /// Runnable sampling this filter at the configured period and
    /// priority, starting at tick 0.
    pub fn runnable(&'a self) -> Runnable<'a> {
        Runnable::new(self, self.config.period_ms, 0, self.config.priority)
    }

    /// Take one sample of every switch.
    pub fn sample(&self) {
        let threshold = self.config.threshold.max(1);
        for (id, (switch, record)) in self.switches.iter().zip(&self.records).enumerate() {
            let mut r = record.get();
            if r.update(switch.sample(), threshold) {
                debug!("switch {=usize}: {}", id, r.stable);
            }
            record.set(r);
        }
    }

    /// Last published state of switch `id`, or `None` if out of range.
    #[inline]
    pub fn state(&self, id: usize) -> Option<SwitchState> {
        self.records.get(id).map(|r| r.get().stable)
    }

    /// Whether switch `id` is currently published as pressed.
    #[inline]
    pub fn is_pressed(&self, id: usize) -> bool {
        self.state(id) == Some(SwitchState::Pressed)
    }

    /// Active configuration.
    pub fn config(&self) -> DebounceConfig {
        self.config
    }
}

impl<const N: usize> Callback for Switches<'_, N> {
    fn call(&self) {
        self.sample();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
