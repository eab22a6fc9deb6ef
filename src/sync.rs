//! # Synchronization Primitives
//!
//! Interrupt-safe critical section for the Cortex-M4. Used where state is
//! shared with an interrupt vector and a plain atomic does not fit, such
//! as installing the tick overflow handler or borrowing a transfer engine
//! that its peripheral interrupt also services.

use cortex_m::interrupt;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit.
///
/// # Usage
/// ```ignore
/// static UART: Mutex<RefCell<Option<Uart<'static, Usart2>>>> =
///     Mutex::new(RefCell::new(None));
///
/// sync::critical_section(|cs| {
///     if let Some(uart) = UART.borrow(cs).borrow_mut().as_mut() {
///         uart.transmit(Some(TxBuffer::new(b"hello\r\n")))?;
///     }
///     Ok(())
/// })
/// ```
///
/// Keep the closure short: the tick interrupt is held off while it runs.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
