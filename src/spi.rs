//! # SPI Transfer Engine
//!
//! Interrupt-driven, non-blocking SPI transmit, receive and full-duplex
//! exchange. Same contract as the [`uart`](crate::uart) engine: one
//! transfer per direction in flight, one byte per data interrupt,
//! completion callbacks in interrupt context.
//!
//! In master mode the receive path only sees bytes while something is
//! clocking the bus; use [`Spi::exchange`] (or a concurrent transmit) to
//! generate the clock.
//!
//! Error conditions (overrun, underrun, mode fault, CRC, frame format)
//! share the SPI error interrupt, armed for the lifetime of the engine's
//! transfers and reported through [`SpiCallbacks`].

use crate::error::{Error, Result};
use crate::transfer::{
    Channel, ChannelState, IsrCallback, IsrEvents, Progress, RxBuffer, SerialPort, TxBuffer,
};

/// SPI status flags and their interrupt sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiFlag {
    /// Transmit buffer empty
    TxEmpty,
    /// Receive buffer not empty
    RxNotEmpty,
    /// Overrun
    Overrun,
    /// Underrun (slave transmit)
    Underrun,
    /// Mode fault
    ModeFault,
    /// CRC mismatch
    Crc,
    /// TI-mode frame format error
    FrameFormat,
}

const ERROR_FLAGS: [SpiFlag; 5] = [
    SpiFlag::Overrun,
    SpiFlag::Underrun,
    SpiFlag::ModeFault,
    SpiFlag::Crc,
    SpiFlag::FrameFormat,
];

/// Error callbacks, each invoked in interrupt context.
#[derive(Clone, Copy, Default)]
pub struct SpiCallbacks<'a> {
    /// Overrun
    pub overrun: Option<&'a dyn IsrCallback>,
    /// Underrun
    pub underrun: Option<&'a dyn IsrCallback>,
    /// Mode fault
    pub mode_fault: Option<&'a dyn IsrCallback>,
    /// CRC error
    pub crc: Option<&'a dyn IsrCallback>,
    /// Frame format error
    pub frame_format: Option<&'a dyn IsrCallback>,
}

impl<'a> SpiCallbacks<'a> {
    fn for_flag(&self, flag: SpiFlag) -> Option<&'a dyn IsrCallback> {
        match flag {
            SpiFlag::Overrun => self.overrun,
            SpiFlag::Underrun => self.underrun,
            SpiFlag::ModeFault => self.mode_fault,
            SpiFlag::Crc => self.crc,
            SpiFlag::FrameFormat => self.frame_format,
            SpiFlag::TxEmpty | SpiFlag::RxNotEmpty => None,
        }
    }
}

/// One SPI instance.
pub struct Spi<'a, P>
where
    P: SerialPort<Flag = SpiFlag>,
{
    port: P,
    tx: Channel<TxBuffer<'a>>,
    rx: Channel<RxBuffer<'a>>,
    callbacks: SpiCallbacks<'a>,
}

impl<'a, P> Spi<'a, P>
where
    P: SerialPort<Flag = SpiFlag>,
{
    /// Wrap an initialized register block.
    pub fn new(port: P) -> Self {
        Self {
            port,
            tx: Channel::default(),
            rx: Channel::default(),
            callbacks: SpiCallbacks::default(),
        }
    }

    /// Replace the error callback set.
    ///
    /// # Errors
    /// `ResourceBusy` while either direction is in flight.
    pub fn register_callbacks(&mut self, callbacks: SpiCallbacks<'a>) -> Result<()> {
        if self.tx.is_busy() || self.rx.is_busy() {
            warn!("spi: callbacks changed during transfer");
            return Err(Error::ResourceBusy);
        }
        self.callbacks = callbacks;
        Ok(())
    }

    /// Start transmitting `buffer`.
    ///
    /// # Errors
    /// `ResourceBusy` if a transmit is in flight, `NullArgument` if the
    /// buffer or its storage is missing.
    pub fn transmit(&mut self, buffer: Option<TxBuffer<'a>>) -> Result<()> {
        self.tx.begin(buffer).map_err(|e| {
            warn!("spi: transmit rejected: {}", e);
            e
        })?;
        trace!("spi: tx start");
        self.arm_errors();
        self.port.enable_interrupt(SpiFlag::TxEmpty);
        Ok(())
    }

    /// Start receiving into `buffer`.
    ///
    /// # Errors
    /// As for [`transmit`](Self::transmit), on the receive channel.
    pub fn receive(&mut self, buffer: Option<RxBuffer<'a>>) -> Result<()> {
        self.rx.begin(buffer).map_err(|e| {
            warn!("spi: receive rejected: {}", e);
            e
        })?;
        trace!("spi: rx start");
        self.arm_errors();
        self.port.enable_interrupt(SpiFlag::RxNotEmpty);
        Ok(())
    }

    /// Start a full-duplex transfer.
    ///
    /// Both directions are checked before either is touched, so a
    /// rejected exchange leaves both channels as they were.
    ///
    /// # Errors
    /// `ResourceBusy` if either direction is in flight, `NullArgument` if
    /// either buffer is missing.
    pub fn exchange(&mut self, tx: Option<TxBuffer<'a>>, rx: Option<RxBuffer<'a>>) -> Result<()> {
        self.tx
            .check(tx.as_ref())
            .and_then(|()| self.rx.check(rx.as_ref()))
            .map_err(|e| {
                warn!("spi: exchange rejected: {}", e);
                e
            })?;
        // Receive first so the byte clocked in by the first write is caught
        self.receive(rx)?;
        self.transmit(tx)
    }

    /// Service the SPI interrupt. Call from the SPI vector.
    pub fn on_interrupt(&mut self) -> IsrEvents {
        let rx_not_empty = self.port.read_flag(SpiFlag::RxNotEmpty);
        let tx_empty = self.port.read_flag(SpiFlag::TxEmpty);
        let errors = ERROR_FLAGS.map(|flag| self.port.read_flag(flag));
        let mut events = IsrEvents::default();

        if self.rx.service(&mut self.port, rx_not_empty, &[SpiFlag::RxNotEmpty]) {
            trace!("spi: rx complete");
            events.rx_complete = true;
        }
        if self.tx.service(&mut self.port, tx_empty, &[SpiFlag::TxEmpty]) {
            trace!("spi: tx complete");
            events.tx_complete = true;
        }

        if !self.tx.is_busy() && !self.rx.is_busy() {
            self.disarm_errors();
        }

        let callbacks = self.callbacks;
        for (flag, latched) in ERROR_FLAGS.into_iter().zip(errors) {
            if latched {
                trace!("spi: error {}", flag);
                if let Some(callback) = callbacks.for_flag(flag) {
                    callback.call_from_isr();
                }
                self.port.clear_flag(flag);
            }
        }

        events
    }

    fn arm_errors(&mut self) {
        for flag in ERROR_FLAGS {
            self.port.enable_interrupt(flag);
        }
    }

    fn disarm_errors(&mut self) {
        for flag in ERROR_FLAGS {
            self.port.disable_interrupt(flag);
        }
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

    /// The register block, mutably.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Give back the register block.
    pub fn release(self) -> P {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::collections::VecDeque;
    use std::vec::Vec;

    fn bit(flag: SpiFlag) -> u8 {
        1 << flag as u8
    }

    /// Loopback SPI: every written byte comes back on MISO.
    #[derive(Default)]
    struct Loopback {
        status: u8,
        enabled: u8,
        written: Vec<u8>,
        shift: VecDeque<u8>,
        cleared: Vec<SpiFlag>,
    }

    impl Loopback {
        fn new() -> Self {
            Self {
                status: bit(SpiFlag::TxEmpty),
                ..Default::default()
            }
        }

        fn is_enabled(&self, flag: SpiFlag) -> bool {
            self.enabled & bit(flag) != 0
        }
    }

    impl SerialPort for Loopback {
        type Flag = SpiFlag;

        fn read_flag(&self, flag: SpiFlag) -> bool {
            self.status & bit(flag) != 0
        }

        fn enable_interrupt(&mut self, flag: SpiFlag) {
            self.enabled |= bit(flag);
        }

        fn disable_interrupt(&mut self, flag: SpiFlag) {
            self.enabled &= !bit(flag);
        }

        fn clear_flag(&mut self, flag: SpiFlag) {
            self.status &= !bit(flag);
            self.cleared.push(flag);
        }

        fn read_data(&mut self) -> u8 {
            let byte = self.shift.pop_front().unwrap_or(0xFF);
            if self.shift.is_empty() {
                self.status &= !bit(SpiFlag::RxNotEmpty);
            }
            byte
        }

        fn write_data(&mut self, byte: u8) {
            self.written.push(byte);
            self.shift.push_back(byte);
            self.status |= bit(SpiFlag::RxNotEmpty);
        }
    }

    #[test]
    fn test_transmit_n_bytes_n_interrupts() {
        let fired = Cell::new(0u8);
        let done = || fired.set(fired.get() + 1);
        let mut spi = Spi::new(Loopback::new());

        spi.transmit(Some(TxBuffer::new(&[1, 2, 3]).with_callback(&done)))
            .unwrap();
        assert!(spi.port().is_enabled(SpiFlag::TxEmpty));
        assert!(spi.port().is_enabled(SpiFlag::ModeFault));

        for n in 1..=3 {
            spi.on_interrupt();
            assert_eq!(spi.port().written.len(), n);
        }
        assert_eq!(fired.get(), 1);
        assert_eq!(spi.tx_state(), ChannelState::Ready);
        assert!(!spi.port().is_enabled(SpiFlag::TxEmpty));
        assert!(!spi.port().is_enabled(SpiFlag::ModeFault));
    }

    #[test]
    fn test_exchange_loopback() {
        let mut rx = [0u8; 3];
        let rx_done = Cell::new(false);
        let on_rx = || rx_done.set(true);
        {
            let mut spi = Spi::new(Loopback::new());
            spi.exchange(
                Some(TxBuffer::new(b"SPI")),
                Some(RxBuffer::from_mut(&mut rx).with_callback(&on_rx)),
            )
            .unwrap();
            assert_eq!(spi.tx_state(), ChannelState::Busy);
            assert_eq!(spi.rx_state(), ChannelState::Busy);

            let mut completions = IsrEvents::default();
            for _ in 0..4 {
                let events = spi.on_interrupt();
                completions.tx_complete |= events.tx_complete;
                completions.rx_complete |= events.rx_complete;
            }
            assert!(completions.tx_complete && completions.rx_complete);
            assert_eq!(spi.rx_state(), ChannelState::Ready);
        }
        assert!(rx_done.get());
        assert_eq!(&rx, b"SPI");
    }

    #[test]
    fn test_exchange_rejected_leaves_both_channels() {
        let cells = [Cell::new(0u8)];
        let mut spi = Spi::new(Loopback::new());
        spi.transmit(Some(TxBuffer::new(b"busy"))).unwrap();

        assert_eq!(
            spi.exchange(Some(TxBuffer::new(b"x")), Some(RxBuffer::new(&cells))),
            Err(Error::ResourceBusy)
        );
        assert_eq!(spi.rx_state(), ChannelState::Ready);
        assert_eq!(spi.tx_progress(), Some(Progress { cursor: 0, len: 4 }));

        let mut idle = Spi::new(Loopback::new());
        assert_eq!(
            idle.exchange(Some(TxBuffer::new(b"x")), None),
            Err(Error::NullArgument)
        );
        assert_eq!(idle.tx_state(), ChannelState::Ready);
    }

    #[test]
    fn test_error_callbacks_and_acknowledge() {
        let faults = Cell::new(0u8);
        let on_mode_fault = || faults.set(faults.get() + 1);
        let mut spi = Spi::new(Loopback::new());
        spi.register_callbacks(SpiCallbacks {
            mode_fault: Some(&on_mode_fault),
            ..Default::default()
        })
        .unwrap();

        spi.port_mut().status |= bit(SpiFlag::ModeFault) | bit(SpiFlag::Crc);
        spi.on_interrupt();

        assert_eq!(faults.get(), 1);
        assert_eq!(spi.port().cleared, [SpiFlag::ModeFault, SpiFlag::Crc]);
    }

    #[test]
    fn test_each_error_reaches_its_own_callback() {
        let hits = Cell::new(0u8);
        let overrun = || hits.set(hits.get() | 1);
        let underrun = || hits.set(hits.get() | 2);
        let mode_fault = || hits.set(hits.get() | 4);
        let crc = || hits.set(hits.get() | 8);
        let frame_format = || hits.set(hits.get() | 16);
        let mut spi = Spi::new(Loopback::new());
        spi.register_callbacks(SpiCallbacks {
            overrun: Some(&overrun),
            underrun: Some(&underrun),
            mode_fault: Some(&mode_fault),
            crc: Some(&crc),
            frame_format: Some(&frame_format),
        })
        .unwrap();

        // One flag at a time: each must land on exactly its own bit
        for (flag, mask) in ERROR_FLAGS.into_iter().zip([1, 2, 4, 8, 16]) {
            hits.set(0);
            spi.port_mut().status |= bit(flag);
            spi.on_interrupt();
            assert_eq!(hits.get(), mask, "{:?}", flag);
        }

        // All at once: every callback fires, flags cleared in order
        hits.set(0);
        spi.port_mut().cleared.clear();
        for flag in ERROR_FLAGS {
            spi.port_mut().status |= bit(flag);
        }
        spi.on_interrupt();
        assert_eq!(hits.get(), 31);
        assert_eq!(spi.port().cleared, ERROR_FLAGS);
        assert!(ERROR_FLAGS.iter().all(|&f| !spi.port().read_flag(f)));
    }

    #[test]
    fn test_busy_receive_rejected() {
        let a = [Cell::new(0u8), Cell::new(0u8)];
        let b = [Cell::new(0u8)];
        let mut spi = Spi::new(Loopback::new());

        spi.receive(Some(RxBuffer::new(&a))).unwrap();
        assert_eq!(spi.receive(Some(RxBuffer::new(&b))), Err(Error::ResourceBusy));
        assert_eq!(spi.rx_progress(), Some(Progress { cursor: 0, len: 2 }));
        assert_eq!(
            spi.register_callbacks(SpiCallbacks::default()),
            Err(Error::ResourceBusy)
        );
    }
}
