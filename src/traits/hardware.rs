//! Hardware abstraction traits for track output drivers.
//!
//! These are the primitives a [`MotorDriver`](crate::MotorDriver) consumes from
//! the board it runs on. Everything here is synchronous and bounded: register
//! writes, ADC reads and PWM updates never block and never fail.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`PinIo`] | Generic pin writes and direction setup (setup time only) |
//! | [`FastPorts`] | Direct port register access for interrupt-context toggling |
//! | [`AnalogSense`] | Current sense ADC channels |
//! | [`PwmControl`] | Hardware PWM duty, DCC signal delegation, DC frequency |
//! | [`Clock`] | Wrapping millisecond time source |
//!
//! A board implementing all of them is a [`TrackBoard`]. Every trait is also
//! implemented for `&T`, so several drivers can share one board:
//!
//! ```rust
//! use rs_trackdrive::config::DriverConfig;
//! use rs_trackdrive::hal::MockBoard;
//! use rs_trackdrive::MotorDriver;
//!
//! let board = MockBoard::new();
//! let main = MotorDriver::new(&board, &DriverConfig::new(3, 12)).unwrap();
//! let prog = MotorDriver::new(&board, &DriverConfig::new(11, 13)).unwrap();
//! assert_ne!(main.signal_pin(), prog.signal_pin());
//! ```

use critical_section::CriticalSection;

use crate::shadow::ShadowPorts;

pub use embedded_hal::digital::PinState;

/// Electrical direction of a pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PinDirection {
    /// High impedance input.
    Input,
    /// Push-pull output.
    Output,
}

/// Identifier of a multi-bit hardware I/O port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortId(pub u8);

/// Which register of a port a fast pin talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterKind {
    /// Output latch register (writes drive the pin).
    Output,
    /// Input register (reads sample the pin).
    Input,
}

/// Width of a port register.
///
/// 32 bits covers both 8-bit AVR style ports and 32-bit GPIO banks.
pub type PortWord = u32;

/// Execution context of a caller.
///
/// Operations that mask interrupts take one of these. A caller already running
/// with interrupts masked (inside an interrupt handler or an enclosing critical
/// section) passes its token so the operation does not re-enable interrupts
/// behind its back.
#[derive(Clone, Copy)]
pub enum ExecContext<'cs> {
    /// Normal thread context; the operation opens its own critical section.
    Thread,
    /// Already masked; the token proves it.
    Interrupt(CriticalSection<'cs>),
}

impl ExecContext<'_> {
    /// Runs `f` with interrupts masked, opening a critical section only when
    /// the caller is not already inside one.
    #[inline]
    pub fn masked<R>(self, f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
        match self {
            ExecContext::Thread => critical_section::with(f),
            ExecContext::Interrupt(cs) => f(cs),
        }
    }

    /// Returns true when the caller claimed to be in interrupt context.
    #[inline]
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, ExecContext::Interrupt(_))
    }
}

/// Generic pin I/O, used once during setup.
///
/// Too slow for per-bit signalling; see [`FastPorts`] for that.
pub trait PinIo {
    /// Drive `pin` to `state`, configuring it as an output as a side effect.
    fn write_pin(&self, pin: u8, state: PinState);

    /// Configure the electrical direction of `pin`.
    fn set_pin_direction(&self, pin: u8, direction: PinDirection);
}

/// Direct access to the port registers behind logical pins.
///
/// Implementations map a logical pin number to a port and bit once, then
/// expose whole-port reads and writes so callers can flip single bits without
/// per-toggle address computation.
pub trait FastPorts {
    /// Returns the port and bit number that `pin` lives on, if the pin exists.
    fn locate(&self, pin: u8) -> Option<(PortId, u8)>;

    /// Reads the full value of one register of `port`.
    fn read_port(&self, port: PortId, register: RegisterKind) -> PortWord;

    /// Writes the full output register of `port`.
    fn write_port(&self, port: PortId, value: PortWord);

    /// Shadow mirrors for the ports on this board that are shared between
    /// fast-written pins and other logic.
    fn shadow_ports(&self) -> &ShadowPorts;
}

/// Current sense ADC.
pub trait AnalogSense {
    /// Initialise the ADC channel on `pin` and return its zero point
    /// (the sense offset).
    fn init_channel(&self, pin: u8) -> i32;

    /// Read a raw sample from the channel on `pin`.
    ///
    /// `ctx` tells the implementation whether it may mask interrupts itself.
    fn read_channel(&self, pin: u8, ctx: ExecContext<'_>) -> i32;

    /// Largest value [`read_channel`](Self::read_channel) can report.
    fn max_reading(&self) -> i32;
}

/// Hardware PWM on the board.
pub trait PwmControl {
    /// Returns true if `pin` is driven by a hardware PWM channel.
    fn is_pwm_pin(&self, pin: u8) -> bool;

    /// Set the 8-bit duty cycle of the PWM output on `pin`.
    fn write_duty(&self, pin: u8, duty: u8);

    /// Drive the DCC signal on `pin` through the PWM peripheral
    /// (hardware-timed bit mode).
    fn set_pwm_signal(&self, pin: u8, high: bool);

    /// Adjust the PWM frequency of `pin` for DC motor output at `speed`
    /// (0..=127).
    ///
    /// Called once per DC signal update. Platforms whose default PWM
    /// frequency suits DC motors keep the no-op default.
    fn configure_dc_frequency(&self, pin: u8, speed: u8) {
        let _ = (pin, speed);
    }
}

/// Millisecond time source.
///
/// The counter wraps at `u32::MAX`; compare instants with `wrapping_sub`.
///
/// # Example
///
/// ```rust
/// use rs_trackdrive::traits::Clock;
/// use rs_trackdrive::hal::MockBoard;
///
/// let board = MockBoard::new();
/// board.set_time(u32::MAX);
/// let start = board.now_ms();
/// board.advance(10);
/// assert_eq!(board.now_ms().wrapping_sub(start), 10);
/// ```
pub trait Clock {
    /// Returns milliseconds since an arbitrary epoch, wrapping.
    fn now_ms(&self) -> u32;
}

/// Everything a [`MotorDriver`](crate::MotorDriver) needs from its board.
pub trait TrackBoard: PinIo + FastPorts + AnalogSense + PwmControl + Clock {}

impl<T> TrackBoard for T where T: PinIo + FastPorts + AnalogSense + PwmControl + Clock + ?Sized {}

// ============================================================================
// Shared-board forwarding
// ============================================================================

impl<T: PinIo + ?Sized> PinIo for &T {
    #[inline]
    fn write_pin(&self, pin: u8, state: PinState) {
        (**self).write_pin(pin, state)
    }

    #[inline]
    fn set_pin_direction(&self, pin: u8, direction: PinDirection) {
        (**self).set_pin_direction(pin, direction)
    }
}

impl<T: FastPorts + ?Sized> FastPorts for &T {
    #[inline]
    fn locate(&self, pin: u8) -> Option<(PortId, u8)> {
        (**self).locate(pin)
    }

    #[inline]
    fn read_port(&self, port: PortId, register: RegisterKind) -> PortWord {
        (**self).read_port(port, register)
    }

    #[inline]
    fn write_port(&self, port: PortId, value: PortWord) {
        (**self).write_port(port, value)
    }

    #[inline]
    fn shadow_ports(&self) -> &ShadowPorts {
        (**self).shadow_ports()
    }
}

impl<T: AnalogSense + ?Sized> AnalogSense for &T {
    #[inline]
    fn init_channel(&self, pin: u8) -> i32 {
        (**self).init_channel(pin)
    }

    #[inline]
    fn read_channel(&self, pin: u8, ctx: ExecContext<'_>) -> i32 {
        (**self).read_channel(pin, ctx)
    }

    #[inline]
    fn max_reading(&self) -> i32 {
        (**self).max_reading()
    }
}

impl<T: PwmControl + ?Sized> PwmControl for &T {
    #[inline]
    fn is_pwm_pin(&self, pin: u8) -> bool {
        (**self).is_pwm_pin(pin)
    }

    #[inline]
    fn write_duty(&self, pin: u8, duty: u8) {
        (**self).write_duty(pin, duty)
    }

    #[inline]
    fn set_pwm_signal(&self, pin: u8, high: bool) {
        (**self).set_pwm_signal(pin, high)
    }

    #[inline]
    fn configure_dc_frequency(&self, pin: u8, speed: u8) {
        (**self).configure_dc_frequency(pin, speed)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    #[inline]
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // ExecContext Tests
    // =========================================================================

    #[test]
    fn thread_context_opens_critical_section() {
        let ctx = ExecContext::Thread;
        assert!(!ctx.is_interrupt());
        assert_eq!(ctx.masked(|_| 7), 7);
    }

    #[test]
    fn interrupt_context_reuses_token() {
        critical_section::with(|cs| {
            let ctx = ExecContext::Interrupt(cs);
            assert!(ctx.is_interrupt());
            assert_eq!(ctx.masked(|_| 3), 3);
        });
    }

    // =========================================================================
    // Clock Forwarding Tests
    // =========================================================================

    struct FixedClock(u32);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn clock_forwards_through_reference() {
        let clock = FixedClock(42);
        let by_ref = &clock;
        assert_eq!(Clock::now_ms(&by_ref), 42);
    }

    #[test]
    fn port_id_ordering() {
        assert!(PortId(0) < PortId(1));
        assert_eq!(PortId(2), PortId(2));
    }
}
