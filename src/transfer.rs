//! # Asynchronous Transfer Primitives
//!
//! Shared building blocks of the interrupt-driven serial engines
//! ([`uart`](crate::uart), [`spi`](crate::spi)).
//!
//! Each engine has one [`ChannelState`] per direction. Starting a transfer
//! moves the channel to `Busy` and hands the engine a buffer descriptor;
//! the peripheral's interrupt handler then moves one byte per interrupt
//! and returns the channel to `Ready` when the cursor reaches the end.
//!
//! ## Interrupt-Context Contract
//!
//! Completion and error callbacks ([`IsrCallback`]) run **inside the
//! peripheral's interrupt handler**. They must be short and must not
//! block. Unlike scheduler runnables they are neither deferred nor
//! ordered against other work.
//!
//! ## Ownership
//!
//! The caller owns the buffer memory; the engine only advances the
//! cursor. Receive buffers are slices of `Cell<u8>` so the caller keeps
//! read access to the bytes while the engine holds the descriptor. There
//! is no cancellation: a transfer whose interrupts never arrive leaves its
//! channel `Busy` for good.

use core::cell::Cell;

use crate::error::{Error, Result};

/// Callback invoked from a peripheral interrupt handler.
pub trait IsrCallback {
    /// Runs in interrupt context.
    fn call_from_isr(&self);
}

impl<F: Fn()> IsrCallback for F {
    #[inline]
    fn call_from_isr(&self) {
        self()
    }
}

/// Byte-oriented peripheral register block, one per serial instance.
///
/// Implementations map each `Flag` onto the status bit it names and onto
/// the interrupt-enable bit that makes it raise the interrupt line.
pub trait SerialPort {
    /// Status/interrupt flag identifier.
    type Flag: Copy;

    /// Read one status flag.
    fn read_flag(&self, flag: Self::Flag) -> bool;

    /// Enable the interrupt source behind `flag`.
    fn enable_interrupt(&mut self, flag: Self::Flag);

    /// Disable the interrupt source behind `flag`.
    fn disable_interrupt(&mut self, flag: Self::Flag);

    /// Acknowledge `flag` using whatever sequence the hardware requires.
    fn clear_flag(&mut self, flag: Self::Flag);

    /// Read the data register. May clear status flags as a side effect.
    fn read_data(&mut self) -> u8;

    /// Write the data register.
    fn write_data(&mut self, byte: u8);
}

/// Per-direction channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// No transfer in flight; a new one may start.
    #[default]
    Ready,
    /// A transfer is in flight.
    Busy,
}

/// Completions reported by one pass of an engine's interrupt handler.
///
/// The owning interrupt handler may use these to arm the next transfer
/// right away, still in interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsrEvents {
    /// The transmit channel returned to `Ready` during this interrupt.
    pub tx_complete: bool,
    /// The receive channel returned to `Ready` during this interrupt.
    pub rx_complete: bool,
}

/// Progress of a transfer: `cursor <= len` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Progress {
    /// Bytes moved so far.
    pub cursor: usize,
    /// Total bytes in the buffer.
    pub len: usize,
}

// ---------------------------------------------------------------------------
// Buffer descriptors
// ---------------------------------------------------------------------------

/// Outgoing buffer descriptor.
///
/// `TxBuffer::default()` has no backing storage and is rejected with
/// `NullArgument`, as is an empty slice.
#[derive(Clone, Copy, Default)]
pub struct TxBuffer<'a> {
    data: Option<&'a [u8]>,
    cursor: usize,
    on_complete: Option<&'a dyn IsrCallback>,
}

impl<'a> TxBuffer<'a> {
    /// Describe `data` for transmission.
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data: Some(data),
            cursor: 0,
            on_complete: None,
        }
    }

    /// Attach a completion callback (runs in interrupt context).
    #[must_use]
    pub const fn with_callback(mut self, on_complete: &'a dyn IsrCallback) -> Self {
        self.on_complete = Some(on_complete);
        self
    }

    /// Next byte to send, advancing the cursor.
    pub(crate) fn next_byte(&mut self) -> Option<u8> {
        let byte = *self.data?.get(self.cursor)?;
        self.cursor += 1;
        Some(byte)
    }
}

/// Incoming buffer descriptor over caller-owned cells.
///
/// Build one from a byte array with [`RxBuffer::from_mut`].
#[derive(Clone, Copy, Default)]
pub struct RxBuffer<'a> {
    data: Option<&'a [Cell<u8>]>,
    cursor: usize,
    on_complete: Option<&'a dyn IsrCallback>,
}

impl<'a> RxBuffer<'a> {
    /// Describe `data` as the receive destination.
    pub const fn new(data: &'a [Cell<u8>]) -> Self {
        Self {
            data: Some(data),
            cursor: 0,
            on_complete: None,
        }
    }

    /// Borrow a plain byte slice as receive cells.
    pub fn from_mut(data: &'a mut [u8]) -> Self {
        Self::new(Cell::from_mut(data).as_slice_of_cells())
    }

    /// Attach a completion callback (runs in interrupt context).
    #[must_use]
    pub const fn with_callback(mut self, on_complete: &'a dyn IsrCallback) -> Self {
        self.on_complete = Some(on_complete);
        self
    }

    /// Store `byte` at the cursor. Returns `false` if the buffer is full.
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        match self.data.and_then(|d| d.get(self.cursor)) {
            Some(cell) => {
                cell.set(byte);
                self.cursor += 1;
                true
            }
            None => false,
        }
    }
}

/// What the channel logic needs from a buffer descriptor.
pub(crate) trait Descriptor: Copy + Default {
    fn storage_len(&self) -> Option<usize>;
    fn cursor(&self) -> usize;
    fn reset_cursor(&mut self);
    fn on_complete(&self) -> Option<&dyn IsrCallback>;
}

impl Descriptor for TxBuffer<'_> {
    fn storage_len(&self) -> Option<usize> {
        self.data.map(<[u8]>::len)
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    fn on_complete(&self) -> Option<&dyn IsrCallback> {
        self.on_complete
    }
}

impl Descriptor for RxBuffer<'_> {
    fn storage_len(&self) -> Option<usize> {
        self.data.map(<[Cell<u8>]>::len)
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    fn on_complete(&self) -> Option<&dyn IsrCallback> {
        self.on_complete
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One direction of one peripheral: state plus the in-flight descriptor.
///
/// Only the engine's start functions and its interrupt handler touch a
/// channel; there is no lock. The busy check is what keeps a second start
/// from clobbering the descriptor.
#[derive(Default)]
pub(crate) struct Channel<B> {
    state: ChannelState,
    buffer: B,
}

impl<B: Descriptor> Channel<B> {
    /// Check that a transfer may start with `buffer`, without starting it.
    pub(crate) fn check(&self, buffer: Option<&B>) -> Result<()> {
        if self.state == ChannelState::Busy {
            return Err(Error::ResourceBusy);
        }
        match buffer.and_then(Descriptor::storage_len) {
            Some(len) if len > 0 => Ok(()),
            _ => Err(Error::NullArgument),
        }
    }

    /// Take ownership of `buffer` and go `Busy`.
    pub(crate) fn begin(&mut self, buffer: Option<B>) -> Result<()> {
        self.check(buffer.as_ref())?;
        if let Some(mut buffer) = buffer {
            buffer.reset_cursor();
            self.buffer = buffer;
            self.state = ChannelState::Busy;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn state(&self) -> ChannelState {
        self.state
    }

    #[inline]
    pub(crate) fn is_busy(&self) -> bool {
        self.state == ChannelState::Busy
    }

    /// Busy with bytes still to move.
    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        self.is_busy() && !self.is_exhausted()
    }

    /// Cursor has reached the end of the buffer.
    #[inline]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.buffer.storage_len().map_or(true, |len| self.buffer.cursor() >= len)
    }

    pub(crate) fn progress(&self) -> Option<Progress> {
        if !self.is_busy() {
            return None;
        }
        self.buffer.storage_len().map(|len| Progress {
            cursor: self.buffer.cursor(),
            len,
        })
    }

    #[cfg(test)]
    pub(crate) fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// Return to `Ready` and fire the completion callback, if any.
    /// Called from interrupt context.
    pub(crate) fn finish(&mut self) {
        self.state = ChannelState::Ready;
        if let Some(callback) = self.buffer.on_complete() {
            callback.call_from_isr();
        }
    }

    /// Once the cursor has reached the end: disarm `interrupts`, go
    /// `Ready` and fire the completion callback. Returns whether the
    /// transfer completed here.
    fn complete<P: SerialPort>(&mut self, port: &mut P, interrupts: &[P::Flag]) -> bool {
        if !(self.is_busy() && self.is_exhausted()) {
            return false;
        }
        for &flag in interrupts {
            port.disable_interrupt(flag);
        }
        self.finish();
        true
    }
}

impl Channel<TxBuffer<'_>> {
    /// Transmit half of an interrupt.
    ///
    /// `tx_empty` is the status latched on entry. Writes at most one byte,
    /// then completes the transfer if that was the last one.
    pub(crate) fn service<P: SerialPort>(
        &mut self,
        port: &mut P,
        tx_empty: bool,
        interrupts: &[P::Flag],
    ) -> bool {
        if tx_empty && self.is_pending() {
            if let Some(byte) = self.buffer.next_byte() {
                port.write_data(byte);
            }
        }
        self.complete(port, interrupts)
    }
}

impl Channel<RxBuffer<'_>> {
    /// Receive half of an interrupt.
    ///
    /// `rx_not_empty` is the status latched on entry. Reads at most one
    /// byte, then completes the transfer if the buffer is full.
    pub(crate) fn service<P: SerialPort>(
        &mut self,
        port: &mut P,
        rx_not_empty: bool,
        interrupts: &[P::Flag],
    ) -> bool {
        if rx_not_empty && self.is_pending() {
            let byte = port.read_data();
            self.buffer.push(byte);
        }
        self.complete(port, interrupts)
    }
}
