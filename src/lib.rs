//! # Tickwork
//!
//! Concurrency core of a bare-metal ARM Cortex-M4 firmware base: a
//! cooperative periodic scheduler, interrupt-driven UART/SPI transfer
//! engines, and the switch/LED layer built on them.
//!
//! ## Overview
//!
//! There are exactly two execution contexts:
//!
//! - **Interrupt context**: the tick timer overflow, and each serial
//!   peripheral's own interrupt line
//! - **Main context**: the scheduler's dispatch loop, which runs every
//!   registered runnable
//!
//! The tick interrupt only raises a flag. The dispatch loop takes it and
//! fires the due runnables in ascending priority order, then advances the
//! millisecond tick counter by one tick period. Serial transfers never go
//! through the scheduler: their interrupt handlers move one byte per
//! interrupt and run completion callbacks directly in interrupt context.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 Application Runnables                   │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Switch debounce         │  LED                         │
//! │  switch.rs               │  led.rs                      │
//! ├──────────────────────────┼─────────────────────────────┤
//! │  Scheduler               │  Transfer engines            │
//! │  scheduler.rs            │  uart.rs · spi.rs            │
//! │  ─ register()/remove()   │  ─ transmit()/receive()      │
//! │  ─ poll()/start()        │  ─ on_interrupt()            │
//! ├──────────────────────────┼─────────────────────────────┤
//! │  Task model (task.rs)    │  Channels, buffers           │
//! │  Tick handoff (tick.rs)  │  (transfer.rs)               │
//! ├──────────────────────────┴─────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │            SysTick tick source · SysTick handler        │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically sized
//! - **No `alloc`**: pure `core`
//! - **Borrowed descriptors**: runnables and transfer buffers belong to the
//!   application; the scheduler and engines hold references
//! - **One context per peripheral**: no hidden module-level tables; the
//!   only statics are the tick flag and the SysTick port's handler slot

#![cfg_attr(not(test), no_std)]

// Must come first: defines the crate's logging macros
mod fmt;

pub mod arch;
pub mod config;
pub mod error;
pub mod gpio;
pub mod led;
pub mod scheduler;
pub mod spi;
pub mod switch;
pub mod sync;
pub mod task;
pub mod tick;
pub mod transfer;
pub mod uart;

pub use error::{Error, ErrorKind, Result};
pub use scheduler::Scheduler;
pub use task::{Callback, Runnable};
pub use tick::{TickFlag, TickSource};
pub use transfer::{ChannelState, IsrCallback, RxBuffer, SerialPort, TxBuffer};
