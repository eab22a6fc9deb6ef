//! # UART Transfer Engine
//!
//! Interrupt-driven, non-blocking UART transmit and receive. The caller
//! starts a transfer and returns immediately; the UART's interrupt handler
//! calls [`Uart::on_interrupt`], which moves one byte per data interrupt
//! and reports completion through the buffer's callback.
//!
//! ## Interrupt Handler Sequence
//!
//! 1. Latch every status flag (TXE, RXNE, PE, FE, NE, ORE) *before* any
//!    other register access: reading the data register clears RXNE and
//!    the error flags on most parts
//! 2. Receive path: on RXNE with bytes outstanding, read one byte
//! 3. Transmit path: on TXE with bytes outstanding, write one byte
//! 4. On a cursor reaching its end, disarm the interrupt, go `Ready` and
//!    run the completion callback
//! 5. Report each latched error to its callback, then acknowledge it
//!
//! ## Sharing With the Interrupt Handler
//!
//! The engine has no internal lock. On target, keep it in a
//! `cortex_m::interrupt::Mutex<RefCell<Uart<..>>>` and start transfers
//! inside a critical section; the vector then borrows it the same way.

use crate::error::{Error, Result};
use crate::transfer::{
    Channel, ChannelState, IsrCallback, IsrEvents, Progress, RxBuffer, SerialPort, TxBuffer,
};

/// UART status flags and their interrupt sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartFlag {
    /// Transmit data register empty
    TxEmpty,
    /// Receive data register not empty
    RxNotEmpty,
    /// Parity error
    Parity,
    /// Framing error
    Framing,
    /// Noise detected
    Noise,
    /// Overrun error
    Overrun,
}

/// Error callbacks. Each runs in interrupt context when its condition is
/// latched; a missing callback means the condition is acknowledged and
/// dropped.
#[derive(Clone, Copy, Default)]
pub struct UartCallbacks<'a> {
    /// Parity error
    pub parity: Option<&'a dyn IsrCallback>,
    /// Framing error
    pub framing: Option<&'a dyn IsrCallback>,
    /// Noise error
    pub noise: Option<&'a dyn IsrCallback>,
    /// Overrun error
    pub overrun: Option<&'a dyn IsrCallback>,
}

/// Status snapshot taken on interrupt entry.
#[derive(Debug, Clone, Copy, Default)]
struct Status {
    tx_empty: bool,
    rx_not_empty: bool,
    parity: bool,
    framing: bool,
    noise: bool,
    overrun: bool,
}

impl Status {
    fn latch<P: SerialPort<Flag = UartFlag>>(port: &P) -> Self {
        Self {
            tx_empty: port.read_flag(UartFlag::TxEmpty),
            rx_not_empty: port.read_flag(UartFlag::RxNotEmpty),
            parity: port.read_flag(UartFlag::Parity),
            framing: port.read_flag(UartFlag::Framing),
            noise: port.read_flag(UartFlag::Noise),
            overrun: port.read_flag(UartFlag::Overrun),
        }
    }
}

/// Interrupt sources armed for the duration of a receive.
const RX_INTERRUPTS: [UartFlag; 5] = [
    UartFlag::RxNotEmpty,
    UartFlag::Parity,
    UartFlag::Framing,
    UartFlag::Noise,
    UartFlag::Overrun,
];

/// One UART instance: register block plus a transmit and a receive
/// channel.
pub struct Uart<'a, P>
where
    P: SerialPort<Flag = UartFlag>,
{
    port: P,
    tx: Channel<TxBuffer<'a>>,
    rx: Channel<RxBuffer<'a>>,
    callbacks: UartCallbacks<'a>,
}

impl<'a, P> Uart<'a, P>
where
    P: SerialPort<Flag = UartFlag>,
{
    /// Wrap an initialized register block. Both channels start `Ready`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            tx: Channel::default(),
            rx: Channel::default(),
            callbacks: UartCallbacks::default(),
        }
    }

    /// Replace the error callback set.
    ///
    /// # Errors
    /// `ResourceBusy` while either direction has a transfer in flight.
    pub fn register_callbacks(&mut self, callbacks: UartCallbacks<'a>) -> Result<()> {
        if self.tx.is_busy() || self.rx.is_busy() {
            warn!("uart: callbacks changed during transfer");
            return Err(Error::ResourceBusy);
        }
        self.callbacks = callbacks;
        Ok(())
    }

    /// Start transmitting `buffer` and return immediately.
    ///
    /// Arms the transmit-empty interrupt; each following interrupt sends
    /// one byte, so an N-byte buffer takes N interrupts.
    ///
    /// # Errors
    /// - `ResourceBusy` if a transmit is in flight (its descriptor is
    ///   left untouched)
    /// - `NullArgument` if `buffer` or its storage is absent or empty
    pub fn transmit(&mut self, buffer: Option<TxBuffer<'a>>) -> Result<()> {
        self.tx.begin(buffer).map_err(|e| {
            warn!("uart: transmit rejected: {}", e);
            e
        })?;
        trace!("uart: tx start");
        self.port.enable_interrupt(UartFlag::TxEmpty);
        Ok(())
    }

    /// Start receiving into `buffer` and return immediately.
    ///
    /// Arms the data-available interrupt and the receive error
    /// interrupts.
    ///
    /// # Errors
    /// Same as [`transmit`](Self::transmit), for the receive channel.
    pub fn receive(&mut self, buffer: Option<RxBuffer<'a>>) -> Result<()> {
        self.rx.begin(buffer).map_err(|e| {
            warn!("uart: receive rejected: {}", e);
            e
        })?;
        trace!("uart: rx start");
        for flag in RX_INTERRUPTS {
            self.port.enable_interrupt(flag);
        }
        Ok(())
    }

    /// Service the UART interrupt. Call from the UART vector.
    ///
    /// Completion and error callbacks run from inside this call.
    pub fn on_interrupt(&mut self) -> IsrEvents {
        let status = Status::latch(&self.port);
        let mut events = IsrEvents::default();

        if self.rx.service(&mut self.port, status.rx_not_empty, &RX_INTERRUPTS) {
            trace!("uart: rx complete");
            events.rx_complete = true;
        }
        if self.tx.service(&mut self.port, status.tx_empty, &[UartFlag::TxEmpty]) {
            trace!("uart: tx complete");
            events.tx_complete = true;
        }

        let callbacks = self.callbacks;
        let errors = [
            (status.parity, UartFlag::Parity, callbacks.parity),
            (status.framing, UartFlag::Framing, callbacks.framing),
            (status.noise, UartFlag::Noise, callbacks.noise),
            (status.overrun, UartFlag::Overrun, callbacks.overrun),
        ];
        for (latched, flag, callback) in errors {
            if latched {
                trace!("uart: error {}", flag);
                if let Some(callback) = callback {
                    callback.call_from_isr();
                }
                self.port.clear_flag(flag);
            }
        }

        events
    }

    /// Transmit channel state.
    pub fn tx_state(&self) -> ChannelState {
        self.tx.state()
    }

    /// Receive channel state.
    pub fn rx_state(&self) -> ChannelState {
        self.rx.state()
    }

    /// Cursor/length of the in-flight transmit, if any.
    pub fn tx_progress(&self) -> Option<Progress> {
        self.tx.progress()
    }

    /// Cursor/length of the in-flight receive, if any.
    pub fn rx_progress(&self) -> Option<Progress> {
        self.rx.progress()
    }

    /// The register block.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The register block, mutably. Register-level changes while a
    /// transfer is in flight are the caller's responsibility.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give back the register block.
    pub fn release(self) -> P {
        self.port
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
