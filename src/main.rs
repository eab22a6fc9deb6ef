//! # Tickwork Example Firmware
//!
//! Nucleo-F401RE demo of the cooperative scheduler:
//!
//! | Runnable | Priority | Period | Behavior |
//! |----------|----------|--------|----------|
//! | switch debounce | 0 | 5 ms | Samples the user button (PC13, active low) |
//! | status LED | 1 | 500 ms | Blinks LD2 (PA5); held on while the button is pressed |
//!
//! The core runs from the 16 MHz HSI, so the 1 ms SysTick reload is 15 999.
//! Debounce runs first on every pass, so the LED runnable always sees the
//! state published in the same tick.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

#[cfg(feature = "defmt")]
use defmt_rtt as _;

use tickwork::arch::cortex_m4::{self, SysTickSource};
use tickwork::config::{LED_BLINK_PERIOD_MS, SYSTEM_CLOCK_HZ, TICK_PERIOD_MS};
use tickwork::gpio::Polarity;
use tickwork::led::Led;
use tickwork::switch::{Switch, Switches};
use tickwork::{Runnable, Scheduler, TickFlag};

/// Tick handoff reached from the SysTick vector.
static TICK: TickFlag = TickFlag::new();

/// Index of the user button in the switch table.
const USER_BUTTON: usize = 0;

// ---------------------------------------------------------------------------
// Board pins (raw GPIO registers, STM32F401)
// ---------------------------------------------------------------------------

mod board {
    use core::ptr;

    use tickwork::gpio::{DigitalInput, DigitalOutput};

    const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
    const GPIOAEN: u32 = 1 << 0;
    const GPIOCEN: u32 = 1 << 2;

    pub const GPIOA: usize = 0x4002_0000;
    pub const GPIOC: usize = 0x4002_0800;

    const MODER: usize = 0x00;
    const IDR: usize = 0x10;
    const ODR: usize = 0x14;
    const BSRR: usize = 0x18;

    /// Clock the GPIO ports used by the demo.
    pub fn enable_ports() {
        // SAFETY: RCC_AHB1ENR is a valid, always-mapped register; boot is
        // single-threaded and nothing else touches the clock enables.
        unsafe {
            let val = ptr::read_volatile(RCC_AHB1ENR);
            ptr::write_volatile(RCC_AHB1ENR, val | GPIOAEN | GPIOCEN);
        }
    }

    fn reg(port: usize, offset: usize) -> *mut u32 {
        (port + offset) as *mut u32
    }

    /// Pin in general-purpose output mode.
    pub struct OutputPin {
        port: usize,
        pin: u32,
    }

    impl OutputPin {
        pub fn configure(port: usize, pin: u32) -> Self {
            // SAFETY: `port` is a GPIO base with its clock enabled; the
            // read-modify-write runs once at boot with no concurrent writer.
            unsafe {
                let moder = reg(port, MODER);
                let val = ptr::read_volatile(moder) & !(0b11 << (pin * 2));
                ptr::write_volatile(moder, val | (0b01 << (pin * 2)));
            }
            Self { port, pin }
        }
    }

    impl DigitalOutput for OutputPin {
        fn set_high(&self) {
            // SAFETY: BSRR set bits only affect this pin; the write is atomic.
            unsafe { ptr::write_volatile(reg(self.port, BSRR), 1 << self.pin) }
        }

        fn set_low(&self) {
            // SAFETY: BSRR reset bits only affect this pin; the write is atomic.
            unsafe { ptr::write_volatile(reg(self.port, BSRR), 1 << (self.pin + 16)) }
        }

        fn is_set_high(&self) -> bool {
            // SAFETY: single volatile read of a clocked GPIO port's ODR.
            unsafe { ptr::read_volatile(reg(self.port, ODR)) & (1 << self.pin) != 0 }
        }
    }

    /// Pin in input mode (reset state; the Nucleo button has an external pull-up).
    pub struct InputPin {
        port: usize,
        pin: u32,
    }

    impl InputPin {
        pub fn configure(port: usize, pin: u32) -> Self {
            // SAFETY: as for `OutputPin::configure`.
            unsafe {
                let moder = reg(port, MODER);
                let val = ptr::read_volatile(moder) & !(0b11 << (pin * 2));
                ptr::write_volatile(moder, val);
            }
            Self { port, pin }
        }
    }

    impl DigitalInput for InputPin {
        fn is_high(&self) -> bool {
            // SAFETY: single volatile read of a clocked GPIO port's IDR.
            unsafe { ptr::read_volatile(reg(self.port, IDR)) & (1 << self.pin) != 0 }
        }
    }
}

/// Unwrap a boot-time result, or log the failure and park the core.
fn or_halt<T>(stage: &str, result: tickwork::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            #[cfg(feature = "defmt")]
            defmt::error!("boot: {} failed: {}", stage, e);
            #[cfg(not(feature = "defmt"))]
            let _ = (stage, e);
            loop {
                cortex_m::asm::wfi();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Registers the runnables and starts the scheduler.
/// Does not return.
#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();

    board::enable_ports();
    let led_pin = board::OutputPin::configure(board::GPIOA, 5);
    let button_pin = board::InputPin::configure(board::GPIOC, 13);

    let switches = Switches::new([Switch::new(&button_pin, Polarity::ActiveLow)]);
    let led = Led::new(&led_pin, Polarity::ActiveHigh);
    let status = || {
        if switches.is_pressed(USER_BUTTON) {
            led.on();
        } else {
            led.toggle();
        }
    };

    let debounce = switches.runnable();
    let blink = Runnable::new(&status, LED_BLINK_PERIOD_MS, 0, 1);

    cortex_m4::set_systick_priority(&mut cp.SCB, cortex_m4::LOWEST_PRIORITY);

    let mut scheduler: Scheduler<'_, SysTickSource> = or_halt(
        "scheduler init",
        Scheduler::init(
            SysTickSource::new(cp.SYST),
            &TICK,
            TICK_PERIOD_MS,
            SYSTEM_CLOCK_HZ,
        ),
    );

    or_halt("debounce register", scheduler.register(Some(&debounce)));
    or_halt("status LED register", scheduler.register(Some(&blink)));

    // Hand control to the scheduler
    scheduler.start()
}
