//! Track output and board configuration.
//!
//! Uses `heapless` containers so configurations can be built without an
//! allocator, while staying ergonomic on desktop.
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::config::{DriverConfig, OverloadConfig};
//!
//! // Arduino motor shield, channel A
//! let main = DriverConfig::new(3, 12)
//!     .with_brake(9)
//!     .with_current_sense(0, 2.99)
//!     .with_trip_ma(2000);
//!
//! let timing = OverloadConfig::default().with_backoff_ceiling_ms(5000);
//! assert_eq!(timing.backoff_floor_ms, 20);
//! assert_eq!(main.trip_ma, 2000);
//! ```

use heapless::String as HString;

/// Maximum length for short config strings (board names)
pub const MAX_SHORT_STRING: usize = 32;

/// Maximum number of PWM channel bindings on a board
pub const MAX_PWM_BINDINGS: usize = 8;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= MAX_SHORT_STRING)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Driver Config
// ============================================================================

/// Pins and calibration of one track output.
///
/// Signed pin numbers encode polarity: a negative power or brake pin means
/// the motor bridge treats that line as active-low.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverConfig {
    /// Power enable / PWM pin (negative = inverted)
    pub power_pin: i16,
    /// DCC signal or DC direction pin
    pub signal_pin: u8,
    /// Optional complementary signal pin
    pub signal_pin2: Option<u8>,
    /// Optional brake pin (negative = inverted)
    pub brake_pin: Option<i16>,
    /// Optional current sense analog pin
    pub current_pin: Option<u8>,
    /// Optional fault detect input (active low)
    pub fault_pin: Option<u8>,
    /// Milliamps per raw ADC unit
    pub sense_factor: f32,
    /// Trip current for normal running, in milliamps
    pub trip_ma: u32,
}

impl DriverConfig {
    /// Default trip current (mA)
    pub const DEFAULT_TRIP_MA: u32 = 2000;

    /// Creates a config with only power and signal pins.
    pub fn new(power_pin: i16, signal_pin: u8) -> Self {
        Self {
            power_pin,
            signal_pin,
            signal_pin2: None,
            brake_pin: None,
            current_pin: None,
            fault_pin: None,
            sense_factor: 1.0,
            trip_ma: Self::DEFAULT_TRIP_MA,
        }
    }

    /// Drive a second signal pin with the complementary level
    pub fn with_signal2(mut self, pin: u8) -> Self {
        self.signal_pin2 = Some(pin);
        self
    }

    /// Set the brake pin (negative = inverted)
    pub fn with_brake(mut self, pin: i16) -> Self {
        self.brake_pin = Some(pin);
        self
    }

    /// Set the current sense pin and its scale in mA per raw unit
    pub fn with_current_sense(mut self, pin: u8, sense_factor: f32) -> Self {
        self.current_pin = Some(pin);
        self.sense_factor = sense_factor;
        self
    }

    /// Set the trip current
    pub fn with_trip_ma(mut self, trip_ma: u32) -> Self {
        self.trip_ma = trip_ma;
        self
    }

    /// Set the fault detect pin
    pub fn with_fault(mut self, pin: u8) -> Self {
        self.fault_pin = Some(pin);
        self
    }
}

// ============================================================================
// Overload Config
// ============================================================================

/// Timing and limits of the overload state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OverloadConfig {
    /// Poll interval while powered (ms)
    pub on_wait_ms: u32,
    /// Poll interval while off (ms)
    pub off_wait_ms: u32,
    /// Smallest overload backoff (ms)
    pub backoff_floor_ms: u32,
    /// Largest overload backoff (ms)
    pub backoff_ceiling_ms: u32,
    /// Clean samples required before backoff relaxes
    pub good_sample_cap: u16,
    /// Trip current on a programming track (mA)
    pub prog_trip_ma: u32,
}

impl Default for OverloadConfig {
    fn default() -> Self {
        Self {
            on_wait_ms: 100,
            off_wait_ms: 1000,
            backoff_floor_ms: 20,
            backoff_ceiling_ms: 10_000,
            good_sample_cap: 100,
            // NMRA service mode limit
            prog_trip_ma: 250,
        }
    }
}

impl OverloadConfig {
    /// Set the powered poll interval
    pub fn with_on_wait_ms(mut self, ms: u32) -> Self {
        self.on_wait_ms = ms;
        self
    }

    /// Set the unpowered poll interval
    pub fn with_off_wait_ms(mut self, ms: u32) -> Self {
        self.off_wait_ms = ms;
        self
    }

    /// Set the backoff floor; the ceiling is raised to match if needed
    pub fn with_backoff_floor_ms(mut self, ms: u32) -> Self {
        self.backoff_floor_ms = ms.max(1);
        self.backoff_ceiling_ms = self.backoff_ceiling_ms.max(self.backoff_floor_ms);
        self
    }

    /// Set the backoff ceiling; never below the floor
    pub fn with_backoff_ceiling_ms(mut self, ms: u32) -> Self {
        self.backoff_ceiling_ms = ms.max(self.backoff_floor_ms);
        self
    }

    /// Set the clean sample count that relaxes backoff
    pub fn with_good_sample_cap(mut self, count: u16) -> Self {
        self.good_sample_cap = count;
        self
    }

    /// Set the programming track trip current
    pub fn with_prog_trip_ma(mut self, ma: u32) -> Self {
        self.prog_trip_ma = ma;
        self
    }
}

// ============================================================================
// Board Config
// ============================================================================

/// A pin wired to a hardware PWM channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PwmBinding {
    /// Logical pin number
    pub pin: u8,
    /// PWM channel driving the pin
    pub channel: u8,
    /// Timer feeding the channel
    pub timer: u8,
}

/// Board level settings.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardConfig {
    /// Motor shield name, for diagnostics
    pub name: ShortString,
    /// PWM channel bindings
    pub pwm: heapless::Vec<PwmBinding, MAX_PWM_BINDINGS>,
}

impl BoardConfig {
    /// Set the shield name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }

    /// Bind `pin` to a PWM channel. Bindings beyond capacity are dropped.
    pub fn with_pwm(mut self, pin: u8, channel: u8, timer: u8) -> Self {
        let _ = self.pwm.push(PwmBinding {
            pin,
            channel,
            timer,
        });
        self
    }

    /// PWM binding of `pin`, if any
    pub fn pwm_binding(&self, pin: u8) -> Option<&PwmBinding> {
        self.pwm.iter().find(|b| b.pin == pin)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_config_defaults() {
        let config = DriverConfig::new(3, 12);
        assert_eq!(config.power_pin, 3);
        assert_eq!(config.signal_pin, 12);
        assert!(config.signal_pin2.is_none());
        assert!(config.brake_pin.is_none());
        assert!(config.current_pin.is_none());
        assert!(config.fault_pin.is_none());
        assert_eq!(config.trip_ma, DriverConfig::DEFAULT_TRIP_MA);
    }

    #[test]
    fn driver_config_builder() {
        let config = DriverConfig::new(-5, 7)
            .with_signal2(8)
            .with_brake(-9)
            .with_current_sense(1, 2.5)
            .with_trip_ma(1500)
            .with_fault(10);

        assert_eq!(config.power_pin, -5);
        assert_eq!(config.signal_pin2, Some(8));
        assert_eq!(config.brake_pin, Some(-9));
        assert_eq!(config.current_pin, Some(1));
        assert_eq!(config.sense_factor, 2.5);
        assert_eq!(config.trip_ma, 1500);
        assert_eq!(config.fault_pin, Some(10));
    }

    #[test]
    fn overload_config_default() {
        let timing = OverloadConfig::default();
        assert_eq!(timing.on_wait_ms, 100);
        assert_eq!(timing.off_wait_ms, 1000);
        assert_eq!(timing.backoff_floor_ms, 20);
        assert_eq!(timing.backoff_ceiling_ms, 10_000);
        assert_eq!(timing.good_sample_cap, 100);
        assert_eq!(timing.prog_trip_ma, 250);
    }

    #[test]
    fn backoff_ceiling_never_below_floor() {
        let timing = OverloadConfig::default()
            .with_backoff_floor_ms(50)
            .with_backoff_ceiling_ms(10);
        assert_eq!(timing.backoff_ceiling_ms, 50);

        let timing = OverloadConfig::default()
            .with_backoff_ceiling_ms(30)
            .with_backoff_floor_ms(40);
        assert_eq!(timing.backoff_ceiling_ms, 40);
    }

    #[test]
    fn backoff_floor_is_positive() {
        let timing = OverloadConfig::default().with_backoff_floor_ms(0);
        assert_eq!(timing.backoff_floor_ms, 1);
    }

    #[test]
    fn board_config_bindings() {
        let board = BoardConfig::default()
            .with_name("SuperMini")
            .with_pwm(2, 0, 0)
            .with_pwm(3, 1, 0);

        assert_eq!(board.name.as_str(), "SuperMini");
        assert_eq!(board.pwm_binding(3).map(|b| b.channel), Some(1));
        assert!(board.pwm_binding(4).is_none());
    }

    #[test]
    fn board_config_binding_capacity() {
        let mut board = BoardConfig::default();
        for pin in 0..20 {
            board = board.with_pwm(pin, pin, 0);
        }
        assert_eq!(board.pwm.len(), MAX_PWM_BINDINGS);
    }

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn short_string_utf8_boundary() {
        let input = "\u{1F682}".repeat(10); // 4 bytes each
        let s = short_string(&input);
        assert!(s.len() <= MAX_SHORT_STRING);
        assert_eq!(s.len() % 4, 0);
        assert!(core::str::from_utf8(s.as_bytes()).is_ok());
    }
}
