//! Track signal generation: DCC bit levels and DC PWM.
//!
//! A track is driven in one of two ways:
//!
//! - **DCC**: the waveform generator calls [`MotorDriver::set_signal`] on
//!   every bit edge, or, when [`MotorDriver::is_pwm_capable`] allows it, hands
//!   bit timing to the PWM peripheral entirely.
//! - **DC**: [`MotorDriver::set_dc_signal`] turns a DCC speed byte into a PWM
//!   duty cycle on the power pin and a level on the direction (signal) pin.
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::{Direction, SpeedCode};
//!
//! let code = SpeedCode::from_byte(0x80 | 64);
//! assert_eq!(code.speed(), 64);
//! assert_eq!(code.direction(), Direction::Forward);
//! assert_eq!(code.duty(), 128);
//! assert_eq!(code.to_byte(), 0xC0);
//! ```

use critical_section::CriticalSection;

use crate::driver::MotorDriver;
use crate::shadow;
use crate::traits::{PinDirection, TrackBoard};

/// Direction bit of a DCC speed byte.
pub const DIRECTION_BIT: u8 = 0x80;

/// Speed bits of a DCC speed byte.
pub const SPEED_MASK: u8 = 0x7F;

/// Highest DCC speed step.
pub const MAX_SPEED: u8 = 127;

/// Direction of travel encoded in the speed byte.
///
/// For DC tracks this is the level of the direction pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Direction bit set, signal pin high.
    #[default]
    Forward,
    /// Direction bit clear, signal pin low.
    Reverse,
}

impl Direction {
    /// Returns the direction as a lowercase string.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    /// Signal pin level for this direction.
    #[inline]
    pub const fn is_high(&self) -> bool {
        matches!(self, Direction::Forward)
    }

    /// The opposite direction.
    #[inline]
    pub const fn reversed(&self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// A DCC speed byte: 7-bit speed step plus direction.
///
/// Steps 0 and 1 are both stop (1 is emergency stop on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeedCode {
    speed: u8,
    direction: Direction,
}

impl SpeedCode {
    /// Speed 0, direction bit set (`0x80`).
    pub const STOP: SpeedCode = SpeedCode {
        speed: 0,
        direction: Direction::Forward,
    };

    /// Builds a code, clamping `speed` to [`MAX_SPEED`].
    pub const fn new(speed: u8, direction: Direction) -> Self {
        let speed = if speed > MAX_SPEED { MAX_SPEED } else { speed };
        Self { speed, direction }
    }

    /// Unpacks a speed byte.
    pub const fn from_byte(byte: u8) -> Self {
        let direction = if byte & DIRECTION_BIT != 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        Self {
            speed: byte & SPEED_MASK,
            direction,
        }
    }

    /// Packs into a speed byte.
    pub const fn to_byte(self) -> u8 {
        match self.direction {
            Direction::Forward => self.speed | DIRECTION_BIT,
            Direction::Reverse => self.speed,
        }
    }

    /// Speed step, 0..=127.
    #[inline]
    pub const fn speed(&self) -> u8 {
        self.speed
    }

    /// Direction of travel.
    #[inline]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true for steps 0 and 1.
    #[inline]
    pub const fn is_stop(&self) -> bool {
        self.speed <= 1
    }

    /// Same speed, opposite direction (DCX tracks wired reversed).
    #[inline]
    pub const fn reversed(self) -> Self {
        Self {
            speed: self.speed,
            direction: self.direction.reversed(),
        }
    }

    /// PWM duty cycle for this speed, before polarity inversion.
    #[inline]
    pub const fn duty(&self) -> u8 {
        dc_duty(self.speed)
    }
}

impl Default for SpeedCode {
    fn default() -> Self {
        Self::STOP
    }
}

impl From<u8> for SpeedCode {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<SpeedCode> for u8 {
    fn from(code: SpeedCode) -> Self {
        code.to_byte()
    }
}

/// Duty cycle for a speed step: 0 for steps 0..=1, 255 from 127, otherwise
/// twice the step.
pub const fn dc_duty(speed: u8) -> u8 {
    if speed <= 1 {
        0
    } else if speed >= MAX_SPEED {
        255
    } else {
        speed * 2
    }
}

/// Timer compare value for an 8-bit duty on a PWM timer of `bits`
/// resolution.
///
/// Timers that count `0..2^bits` only hold the output high for the whole
/// period at a compare of `2^bits`, so 255 maps there rather than to
/// `2^bits - 1`.
pub const fn pwm_compare(duty: u8, bits: u32) -> u32 {
    if duty == u8::MAX {
        1 << bits
    } else if bits >= 8 {
        (duty as u32) << (bits - 8)
    } else {
        (duty as u32) >> (8 - bits)
    }
}

/// Default DC PWM frequency in Hz.
pub const DC_BASE_FREQUENCY_HZ: u32 = 131;

const DC_TONES_HZ: [u32; 28] = [
    165, 175, 196, 220, 247, 262, 294, 330, 349, 392, 440, 494, 523, 587, 659, 698, 494, 440, 392,
    249, 330, 284, 262, 247, 220, 196, 175, 165,
];

/// PWM frequency for a DC motor at `speed` on platforms with adjustable PWM
/// timers.
///
/// Low speed steps play a tune through the motor; everything else runs at
/// [`DC_BASE_FREQUENCY_HZ`].
pub fn dc_tone_frequency(speed: u8) -> u32 {
    if !(3..=58).contains(&speed) {
        return DC_BASE_FREQUENCY_HZ;
    }
    DC_TONES_HZ
        .get(usize::from((speed - 2) / 2))
        .copied()
        .unwrap_or(DC_BASE_FREQUENCY_HZ)
}

impl<B: TrackBoard> MotorDriver<B> {
    /// Returns true if the waveform generator may drive this track's bits
    /// through hardware PWM: a single signal pin that is PWM-capable.
    pub fn is_pwm_capable(&self) -> bool {
        self.fast_signal2.is_none() && self.board.is_pwm_pin(self.signal_pin)
    }

    /// Hands bit-level signalling to the PWM peripheral (`true`) or back to
    /// fast pin writes (`false`).
    ///
    /// Returns the resulting mode; PWM is refused on tracks that are not
    /// [PWM capable](Self::is_pwm_capable).
    pub fn set_track_pwm(&mut self, on: bool) -> bool {
        self.track_pwm = on && self.is_pwm_capable();
        self.track_pwm
    }

    /// Returns true if bit levels go through the PWM peripheral.
    #[inline]
    pub fn track_pwm(&self) -> bool {
        self.track_pwm
    }

    /// Writes one DCC bit level.
    ///
    /// Runs in interrupt context; `cs` proves interrupts are masked. With
    /// dual signal pins the second pin gets the complementary level. Writes
    /// to shadow-backed pins land in the shadow registers, which the caller
    /// commits.
    #[inline]
    pub fn set_signal(&self, cs: CriticalSection<'_>, high: bool) {
        if self.track_pwm {
            self.board.set_pwm_signal(self.signal_pin, high);
            return;
        }
        self.fast_signal.write(&self.board, cs, high);
        if let Some(second) = &self.fast_signal2 {
            second.write(&self.board, cs, !high);
        }
    }

    /// Connects (`true`) or releases (`false`) the signal pin, for tracks fed
    /// by an external signal source.
    pub fn enable_signal(&self, on: bool) {
        let direction = if on {
            PinDirection::Output
        } else {
            PinDirection::Input
        };
        self.board.set_pin_direction(self.signal_pin, direction);
    }

    /// Drives the track as a DC output at `code` and remembers the code for
    /// power transitions.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rs_trackdrive::config::DriverConfig;
    /// use rs_trackdrive::hal::MockBoard;
    /// use rs_trackdrive::{MotorDriver, SpeedCode};
    ///
    /// let board = MockBoard::new();
    /// let mut driver = MotorDriver::new(&board, &DriverConfig::new(3, 12)).unwrap();
    ///
    /// driver.set_dc_signal(SpeedCode::from_byte(0x80 | 100));
    /// assert_eq!(board.duty(3), Some(200));
    /// assert!(board.output_bit(12));
    /// ```
    pub fn set_dc_signal(&mut self, code: SpeedCode) {
        self.speed_code = code;
        self.dc_in_use = true;
        self.write_dc_output(code);
    }

    /// Leaves DC operation: stop code, brake released, and power transitions
    /// no longer restore a DC speed.
    pub fn release_dc(&mut self) {
        self.write_dc_output(SpeedCode::STOP);
        self.speed_code = SpeedCode::STOP;
        self.dc_in_use = false;
        self.set_brake(false, crate::traits::ExecContext::Thread);
    }

    /// Last DC code applied.
    #[inline]
    pub fn speed_code(&self) -> SpeedCode {
        self.speed_code
    }

    /// Returns true while the track runs as a DC output.
    #[inline]
    pub fn is_dc(&self) -> bool {
        self.dc_in_use
    }

    /// PWM duty and direction level for `code`, without touching the
    /// remembered speed.
    pub(crate) fn write_dc_output(&self, code: SpeedCode) {
        let power_pin = self.power_pin.pin();
        self.board.configure_dc_frequency(power_pin, code.speed());

        let duty = if self.power_pin.is_inverted() {
            255 - code.duty()
        } else {
            code.duty()
        };
        self.board.write_duty(power_pin, duty);

        let high = code.direction().is_high();
        critical_section::with(|cs| {
            if self.fast_signal.is_shadowed() {
                shadow::transaction(cs, &self.board, |cs| self.write_direction(cs, high));
            } else {
                self.write_direction(cs, high);
            }
        });
    }

    fn write_direction(&self, cs: CriticalSection<'_>, high: bool) {
        self.fast_signal.write(&self.board, cs, high);
        if let Some(second) = &self.fast_signal2 {
            second.write(&self.board, cs, !high);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // SpeedCode Tests
    // =========================================================================

    #[test]
    fn stop_code_is_0x80() {
        assert_eq!(SpeedCode::STOP.to_byte(), 0x80);
        assert_eq!(SpeedCode::default(), SpeedCode::STOP);
        assert!(SpeedCode::STOP.is_stop());
    }

    #[test]
    fn byte_unpacking() {
        let code = SpeedCode::from_byte(0x25);
        assert_eq!(code.speed(), 0x25);
        assert_eq!(code.direction(), Direction::Reverse);

        let code = SpeedCode::from(0xFF);
        assert_eq!(code.speed(), 127);
        assert_eq!(code.direction(), Direction::Forward);
    }

    #[test]
    fn new_clamps_speed() {
        let code = SpeedCode::new(200, Direction::Reverse);
        assert_eq!(code.speed(), MAX_SPEED);
        assert_eq!(u8::from(code), 127);
    }

    #[test]
    fn reversed_flips_only_direction() {
        let code = SpeedCode::new(40, Direction::Forward).reversed();
        assert_eq!(code.speed(), 40);
        assert_eq!(code.direction(), Direction::Reverse);
    }

    // =========================================================================
    // Duty Tests
    // =========================================================================

    #[test]
    fn duty_endpoints() {
        assert_eq!(dc_duty(0), 0);
        assert_eq!(dc_duty(1), 0);
        assert_eq!(dc_duty(2), 4);
        assert_eq!(dc_duty(126), 252);
        assert_eq!(dc_duty(127), 255);
    }

    #[test]
    fn duty_is_monotonic() {
        let mut previous = 0;
        for speed in 0..=MAX_SPEED {
            let duty = dc_duty(speed);
            assert!(duty >= previous, "speed {} duty {}", speed, duty);
            previous = duty;
        }
    }

    #[test]
    fn full_duty_holds_the_whole_period() {
        assert_eq!(pwm_compare(255, 8), 256);
        assert_eq!(pwm_compare(255, 10), 1024);
        assert_eq!(pwm_compare(dc_duty(MAX_SPEED), 8), 256);
    }

    #[test]
    fn partial_duty_scales_with_resolution() {
        assert_eq!(pwm_compare(0, 8), 0);
        assert_eq!(pwm_compare(128, 8), 128);
        assert_eq!(pwm_compare(254, 8), 254);
        assert_eq!(pwm_compare(128, 10), 512);
        assert_eq!(pwm_compare(128, 6), 32);
    }

    // =========================================================================
    // Tone Tests
    // =========================================================================

    #[test]
    fn tone_outside_table_is_base() {
        assert_eq!(dc_tone_frequency(0), DC_BASE_FREQUENCY_HZ);
        assert_eq!(dc_tone_frequency(2), DC_BASE_FREQUENCY_HZ);
        assert_eq!(dc_tone_frequency(59), DC_BASE_FREQUENCY_HZ);
        assert_eq!(dc_tone_frequency(127), DC_BASE_FREQUENCY_HZ);
    }

    #[test]
    fn tone_table_lookup() {
        assert_eq!(dc_tone_frequency(3), 165);
        assert_eq!(dc_tone_frequency(4), 175);
        assert_eq!(dc_tone_frequency(56), 165);
        // Index past the table end falls back
        assert_eq!(dc_tone_frequency(58), DC_BASE_FREQUENCY_HZ);
    }

    #[test]
    fn direction_strings() {
        assert_eq!(Direction::Forward.as_str(), "forward");
        assert_eq!(Direction::Reverse.as_str(), "reverse");
        assert!(Direction::Forward.is_high());
        assert!(!Direction::Reverse.is_high());
    }
}
