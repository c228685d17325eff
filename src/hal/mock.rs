//! Mock board for testing without hardware.
//!
//! [`MockBoard`] implements every hardware trait in memory, so drivers can be
//! built, switched and overloaded on a desktop. All state sits behind `Cell`
//! and `RefCell` because the traits take `&self`, the same way several
//! drivers share one real board.
//!
//! # Layout
//!
//! | Resource | Mock behaviour |
//! |----------|----------------|
//! | Pins | 64 pins; pin `n` is bit `n % 8` of port `n / 8` |
//! | Shared ports | Ports 0..=2 are shadowed (see [`MockBoard::without_shadow`]) |
//! | Inputs | Input registers start all high, as with pull-ups |
//! | ADC | One value per pin, set with [`MockBoard::set_analog`]; default 0 |
//! | PWM | Duty and signal writes are recorded per pin |
//! | Clock | Starts at 0, moved with [`MockBoard::advance`] |
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::config::DriverConfig;
//! use rs_trackdrive::hal::MockBoard;
//! use rs_trackdrive::{MotorDriver, PowerMode, TrackId};
//!
//! let board = MockBoard::new();
//! let config = DriverConfig::new(3, 12)
//!     .with_current_sense(0, 2.0)
//!     .with_trip_ma(1000);
//! let mut driver = MotorDriver::new(&board, &config).unwrap();
//! driver.set_power(PowerMode::On);
//!
//! // Short circuit: 600 raw units = 1200 mA
//! board.set_analog(0, 600);
//! let event = driver.check_power_overload(false, TrackId::new(0)).unwrap();
//! assert!(event.is_overload());
//! assert_eq!(driver.power_mode(), PowerMode::Overload);
//! ```

use core::cell::{Cell, RefCell};

use crate::shadow::ShadowPorts;
use crate::traits::{
    AnalogSense, Clock, ExecContext, FastPorts, PinDirection, PinIo, PinState, PortId, PortWord,
    PwmControl, RegisterKind,
};

/// Number of ports on the mock board.
pub const MOCK_PORTS: usize = 8;

/// Number of pins on the mock board.
pub const MOCK_PINS: usize = MOCK_PORTS * 8;

/// Default ADC ceiling (10-bit converter).
pub const MOCK_MAX_READING: i32 = 1023;

const MAX_PWM_PINS: usize = 16;

/// In-memory board implementing every hardware trait.
///
/// # Example
///
/// ```rust
/// use rs_trackdrive::hal::MockBoard;
/// use rs_trackdrive::traits::{PinIo, PinState, PwmControl};
///
/// let board = MockBoard::new().with_pwm_pins(&[3]);
/// board.write_pin(7, PinState::High);
/// board.write_duty(3, 128);
///
/// assert_eq!(board.pin_level(7), Some(PinState::High));
/// assert!(board.output_bit(7));
/// assert_eq!(board.duty(3), Some(128));
/// assert!(board.is_pwm_pin(3));
/// ```
pub struct MockBoard {
    outputs: RefCell<[PortWord; MOCK_PORTS]>,
    inputs: RefCell<[PortWord; MOCK_PORTS]>,
    directions: RefCell<[Option<PinDirection>; MOCK_PINS]>,
    levels: RefCell<[Option<PinState>; MOCK_PINS]>,
    analog: RefCell<[i32; MOCK_PINS]>,
    duties: RefCell<[Option<u8>; MOCK_PINS]>,
    pwm_signals: RefCell<[Option<bool>; MOCK_PINS]>,
    dc_speeds: RefCell<[Option<u8>; MOCK_PINS]>,
    pwm_pins: heapless::Vec<u8, MAX_PWM_PINS>,
    max_reading: i32,
    time_ms: Cell<u32>,
    port_writes: Cell<usize>,
    adc_reads: Cell<usize>,
    shadow: ShadowPorts,
}

impl MockBoard {
    /// Creates a board with ports 0..=2 shadowed and nothing PWM capable.
    pub fn new() -> Self {
        Self {
            outputs: RefCell::new([0; MOCK_PORTS]),
            inputs: RefCell::new([0xFF; MOCK_PORTS]),
            directions: RefCell::new([None; MOCK_PINS]),
            levels: RefCell::new([None; MOCK_PINS]),
            analog: RefCell::new([0; MOCK_PINS]),
            duties: RefCell::new([None; MOCK_PINS]),
            pwm_signals: RefCell::new([None; MOCK_PINS]),
            dc_speeds: RefCell::new([None; MOCK_PINS]),
            pwm_pins: heapless::Vec::new(),
            max_reading: MOCK_MAX_READING,
            time_ms: Cell::new(0),
            port_writes: Cell::new(0),
            adc_reads: Cell::new(0),
            shadow: ShadowPorts::new(&[PortId(0), PortId(1), PortId(2)]),
        }
    }

    /// Removes all shadow registers; every fast pin writes live.
    pub fn without_shadow(mut self) -> Self {
        self.shadow = ShadowPorts::empty();
        self
    }

    /// Marks `pins` as PWM capable.
    pub fn with_pwm_pins(mut self, pins: &[u8]) -> Self {
        for &pin in pins {
            let _ = self.pwm_pins.push(pin);
        }
        self
    }

    /// Sets the ADC ceiling.
    pub fn with_max_reading(mut self, max: i32) -> Self {
        self.max_reading = max;
        self
    }

    // ------------------------------------------------------------------------
    // Stimulus
    // ------------------------------------------------------------------------

    /// Sets the value the ADC reports for `pin`.
    pub fn set_analog(&self, pin: u8, value: i32) {
        if let Some(slot) = self.analog.borrow_mut().get_mut(usize::from(pin)) {
            *slot = value;
        }
    }

    /// Drives the input register bit of `pin`.
    pub fn set_input(&self, pin: u8, state: PinState) {
        if let Some((port, bit)) = split(pin) {
            let mut inputs = self.inputs.borrow_mut();
            match state {
                PinState::High => inputs[port] |= 1 << bit,
                PinState::Low => inputs[port] &= !(1 << bit),
            }
        }
    }

    /// Sets the clock.
    pub fn set_time(&self, ms: u32) {
        self.time_ms.set(ms);
    }

    /// Moves the clock forward, wrapping like a hardware counter.
    pub fn advance(&self, ms: u32) {
        self.time_ms.set(self.time_ms.get().wrapping_add(ms));
    }

    /// Overwrites an output register without counting it as a write, e.g. to
    /// simulate sibling pins owned by other code.
    pub fn poke_port(&self, port: PortId, value: PortWord) {
        if let Some(slot) = self.outputs.borrow_mut().get_mut(usize::from(port.0)) {
            *slot = value;
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Output register bit of `pin`.
    pub fn output_bit(&self, pin: u8) -> bool {
        split(pin)
            .map(|(port, bit)| self.outputs.borrow()[port] & (1 << bit) != 0)
            .unwrap_or(false)
    }

    /// Last level written to `pin` through [`PinIo::write_pin`].
    pub fn pin_level(&self, pin: u8) -> Option<PinState> {
        self.levels.borrow().get(usize::from(pin)).copied().flatten()
    }

    /// Configured direction of `pin`.
    pub fn direction(&self, pin: u8) -> Option<PinDirection> {
        self.directions.borrow().get(usize::from(pin)).copied().flatten()
    }

    /// Last PWM duty written to `pin`.
    pub fn duty(&self, pin: u8) -> Option<u8> {
        self.duties.borrow().get(usize::from(pin)).copied().flatten()
    }

    /// Last level sent to `pin` in hardware PWM signal mode.
    pub fn pwm_signal(&self, pin: u8) -> Option<bool> {
        self.pwm_signals.borrow().get(usize::from(pin)).copied().flatten()
    }

    /// Speed of the last DC frequency adjustment requested for `pin`.
    pub fn dc_frequency_speed(&self, pin: u8) -> Option<u8> {
        self.dc_speeds.borrow().get(usize::from(pin)).copied().flatten()
    }

    /// Number of [`FastPorts::write_port`] calls so far.
    pub fn port_writes(&self) -> usize {
        self.port_writes.get()
    }

    /// Number of ADC samples taken so far.
    pub fn adc_reads(&self) -> usize {
        self.adc_reads.get()
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MockBoard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockBoard")
            .field("outputs", &*self.outputs.borrow())
            .field("inputs", &*self.inputs.borrow())
            .field("time_ms", &self.time_ms.get())
            .field("shadow", &self.shadow)
            .finish()
    }
}

fn split(pin: u8) -> Option<(usize, u8)> {
    let pin = usize::from(pin);
    (pin < MOCK_PINS).then(|| (pin / 8, (pin % 8) as u8))
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl PinIo for MockBoard {
    fn write_pin(&self, pin: u8, state: PinState) {
        self.set_pin_direction(pin, PinDirection::Output);
        if let Some(slot) = self.levels.borrow_mut().get_mut(usize::from(pin)) {
            *slot = Some(state);
        }
        if let Some((port, bit)) = split(pin) {
            let mut outputs = self.outputs.borrow_mut();
            match state {
                PinState::High => outputs[port] |= 1 << bit,
                PinState::Low => outputs[port] &= !(1 << bit),
            }
        }
    }

    fn set_pin_direction(&self, pin: u8, direction: PinDirection) {
        if let Some(slot) = self.directions.borrow_mut().get_mut(usize::from(pin)) {
            *slot = Some(direction);
        }
    }
}

impl FastPorts for MockBoard {
    fn locate(&self, pin: u8) -> Option<(PortId, u8)> {
        split(pin).map(|(port, bit)| (PortId(port as u8), bit))
    }

    fn read_port(&self, port: PortId, register: RegisterKind) -> PortWord {
        let index = usize::from(port.0);
        let registers = match register {
            RegisterKind::Output => self.outputs.borrow(),
            RegisterKind::Input => self.inputs.borrow(),
        };
        registers.get(index).copied().unwrap_or(0)
    }

    fn write_port(&self, port: PortId, value: PortWord) {
        self.port_writes.set(self.port_writes.get() + 1);
        self.poke_port(port, value);
    }

    fn shadow_ports(&self) -> &ShadowPorts {
        &self.shadow
    }
}

impl AnalogSense for MockBoard {
    fn init_channel(&self, pin: u8) -> i32 {
        self.analog.borrow().get(usize::from(pin)).copied().unwrap_or(0)
    }

    fn read_channel(&self, pin: u8, _ctx: ExecContext<'_>) -> i32 {
        self.adc_reads.set(self.adc_reads.get() + 1);
        self.analog.borrow().get(usize::from(pin)).copied().unwrap_or(0)
    }

    fn max_reading(&self) -> i32 {
        self.max_reading
    }
}

impl PwmControl for MockBoard {
    fn is_pwm_pin(&self, pin: u8) -> bool {
        self.pwm_pins.contains(&pin)
    }

    fn write_duty(&self, pin: u8, duty: u8) {
        if let Some(slot) = self.duties.borrow_mut().get_mut(usize::from(pin)) {
            *slot = Some(duty);
        }
    }

    fn set_pwm_signal(&self, pin: u8, high: bool) {
        if let Some(slot) = self.pwm_signals.borrow_mut().get_mut(usize::from(pin)) {
            *slot = Some(high);
        }
    }

    fn configure_dc_frequency(&self, pin: u8, speed: u8) {
        if let Some(slot) = self.dc_speeds.borrow_mut().get_mut(usize::from(pin)) {
            *slot = Some(speed);
        }
    }
}

impl Clock for MockBoard {
    fn now_ms(&self) -> u32 {
        self.time_ms.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Pin Tests
    // =========================================================================

    #[test]
    fn pin_mapping() {
        let board = MockBoard::new();
        assert_eq!(board.locate(0), Some((PortId(0), 0)));
        assert_eq!(board.locate(13), Some((PortId(1), 5)));
        assert_eq!(board.locate(63), Some((PortId(7), 7)));
        assert_eq!(board.locate(64), None);
    }

    #[test]
    fn write_pin_sets_level_and_register() {
        let board = MockBoard::new();
        board.write_pin(13, PinState::High);
        assert_eq!(board.pin_level(13), Some(PinState::High));
        assert_eq!(board.direction(13), Some(PinDirection::Output));
        assert!(board.output_bit(13));

        board.write_pin(13, PinState::Low);
        assert!(!board.output_bit(13));
        // write_pin is not a fast port write
        assert_eq!(board.port_writes(), 0);
    }

    #[test]
    fn inputs_default_high() {
        let board = MockBoard::new();
        assert_eq!(board.read_port(PortId(2), RegisterKind::Input), 0xFF);
        board.set_input(17, PinState::Low);
        assert_eq!(board.read_port(PortId(2), RegisterKind::Input), 0xFD);
    }

    #[test]
    fn out_of_range_pins_are_ignored() {
        let board = MockBoard::new();
        board.write_pin(200, PinState::High);
        board.set_analog(200, 5);
        assert_eq!(board.pin_level(200), None);
        assert!(!board.output_bit(200));
    }

    // =========================================================================
    // Port Tests
    // =========================================================================

    #[test]
    fn port_writes_are_counted() {
        let board = MockBoard::new();
        board.write_port(PortId(3), 0xAA);
        board.poke_port(PortId(3), 0x55);
        assert_eq!(board.port_writes(), 1);
        assert_eq!(board.read_port(PortId(3), RegisterKind::Output), 0x55);
    }

    #[test]
    fn default_and_disabled_shadows() {
        let board = MockBoard::new();
        assert_eq!(board.shadow_ports().len(), 3);
        let board = MockBoard::new().without_shadow();
        assert!(board.shadow_ports().is_empty());
    }

    // =========================================================================
    // ADC / PWM / Clock Tests
    // =========================================================================

    #[test]
    fn adc_reads_are_counted() {
        let board = MockBoard::new();
        board.set_analog(4, 321);
        assert_eq!(board.init_channel(4), 321);
        assert_eq!(board.adc_reads(), 0);
        assert_eq!(board.read_channel(4, ExecContext::Thread), 321);
        assert_eq!(board.adc_reads(), 1);
        assert_eq!(board.max_reading(), MOCK_MAX_READING);
    }

    #[test]
    fn pwm_records() {
        let board = MockBoard::new().with_pwm_pins(&[5]);
        assert!(board.is_pwm_pin(5));
        assert!(!board.is_pwm_pin(6));
        board.set_pwm_signal(5, true);
        board.configure_dc_frequency(5, 40);
        assert_eq!(board.pwm_signal(5), Some(true));
        assert_eq!(board.dc_frequency_speed(5), Some(40));
        assert_eq!(board.duty(5), None);
    }

    #[test]
    fn clock_wraps() {
        let board = MockBoard::new();
        assert_eq!(board.now_ms(), 0);
        board.set_time(u32::MAX);
        board.advance(2);
        assert_eq!(board.now_ms(), 1);
    }
}
