//! The per-track motor driver.
//!
//! A [`MotorDriver`] owns the resolved pin handles, the current sense
//! calibration and the runtime state of one track output. Its operations are
//! split across modules by concern:
//!
//! - [`crate::signal`]: DCC bit writes and DC PWM output
//! - [`crate::power`]: power modes and the overload state machine
//! - [`crate::current`]: current reads and unit conversion
//! - [`crate::brake`]: brake line control
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::config::DriverConfig;
//! use rs_trackdrive::hal::MockBoard;
//! use rs_trackdrive::{MotorDriver, PowerMode};
//!
//! let board = MockBoard::new();
//! board.set_analog(0, 0);
//!
//! let config = DriverConfig::new(3, 12)
//!     .with_brake(9)
//!     .with_current_sense(0, 2.0)
//!     .with_trip_ma(1000);
//! let driver = MotorDriver::new(&board, &config).unwrap();
//!
//! assert_eq!(driver.power_mode(), PowerMode::Off);
//! assert_eq!(driver.raw_trip_value(), 500);
//! assert!(driver.can_measure_current());
//! ```

use core::sync::atomic::AtomicU8;

use crate::config::{DriverConfig, OverloadConfig};
use crate::current::SenseCalibration;
use crate::error::{DriverError, PinRole};
use crate::fastpin::FastPin;
use crate::power::{OverloadState, PowerMode};
use crate::signal::SpeedCode;
use crate::traits::{PinDirection, PinState, TrackBoard};

/// A pin whose active level may be inverted.
///
/// Configured as a signed number: `-n` means pin `n`, active low.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InvertiblePin {
    pin: u8,
    inverted: bool,
}

impl InvertiblePin {
    /// Decodes a signed pin number.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidPin`] for values that do not fit a pin.
    pub fn from_signed(value: i16, role: PinRole) -> Result<Self, DriverError> {
        let pin = u8::try_from(value.unsigned_abs())
            .map_err(|_| DriverError::InvalidPin { role, value })?;
        Ok(Self {
            pin,
            inverted: value < 0,
        })
    }

    /// Logical pin number.
    #[inline]
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// Returns true if the pin is active low.
    #[inline]
    pub const fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Pin level that represents `active`.
    #[inline]
    pub const fn level(&self, active: bool) -> PinState {
        if active != self.inverted {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

/// How an asserted fault pin is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FaultLine {
    /// The fault pin belongs to this track alone.
    #[default]
    Dedicated,
    /// The fault pin is wired to several tracks; an assertion may come from
    /// any of them.
    Shared,
}

/// Driver for one track output.
///
/// Generic over the board so the same code runs against
/// [`MockBoard`](crate::hal::MockBoard) on a desktop and real registers on
/// hardware. Several drivers can share one board by taking `&Board`.
pub struct MotorDriver<B> {
    pub(crate) board: B,

    pub(crate) power_pin: InvertiblePin,
    pub(crate) signal_pin: u8,
    pub(crate) fast_signal: FastPin,
    pub(crate) fast_signal2: Option<FastPin>,
    pub(crate) brake_pin: Option<InvertiblePin>,
    pub(crate) fast_brake: Option<FastPin>,
    pub(crate) current_pin: Option<u8>,
    pub(crate) fault_pin: Option<u8>,
    pub(crate) fast_fault: Option<FastPin>,
    pub(crate) fault_line: FaultLine,

    pub(crate) calibration: SenseCalibration,
    pub(crate) trip_ma: u32,
    pub(crate) raw_trip: i32,
    pub(crate) prog_trip: i32,
    pub(crate) timing: OverloadConfig,

    pub(crate) mode: PowerMode,
    pub(crate) overload: OverloadState,
    pub(crate) speed_code: SpeedCode,
    pub(crate) dc_in_use: bool,
    pub(crate) track_pwm: bool,
    pub(crate) reset_counter: Option<&'static AtomicU8>,
}

impl<B: TrackBoard> MotorDriver<B> {
    /// Configures the pins of a track output with default overload timing.
    ///
    /// The power output is switched off before anything else happens.
    ///
    /// # Errors
    ///
    /// Fails if a pin does not exist on the board, a signed pin number is
    /// invalid, or the sense factor is unusable.
    pub fn new(board: B, config: &DriverConfig) -> Result<Self, DriverError> {
        Self::with_overload_config(board, config, OverloadConfig::default())
    }

    /// Like [`new`](Self::new), with explicit overload timing and limits.
    pub fn with_overload_config(
        board: B,
        config: &DriverConfig,
        timing: OverloadConfig,
    ) -> Result<Self, DriverError> {
        let power_pin = InvertiblePin::from_signed(config.power_pin, PinRole::Power)?;
        board.write_pin(power_pin.pin(), power_pin.level(false));

        let signal_pin = config.signal_pin;
        let fast_signal = resolve(&board, PinRole::Signal, signal_pin, |b, pin| {
            FastPin::resolve_output_shadowed(b, pin)
        })?;
        if fast_signal.is_shadowed() {
            diag!("Found shared port {} pin {}", fast_signal.port().0, signal_pin);
        }

        let fast_signal2 = config
            .signal_pin2
            .map(|pin| {
                resolve(&board, PinRole::Signal2, pin, |b, pin| {
                    FastPin::resolve_output_shadowed(b, pin)
                })
            })
            .transpose()?;

        let brake_pin = config
            .brake_pin
            .map(|value| InvertiblePin::from_signed(value, PinRole::Brake))
            .transpose()?;
        let fast_brake = brake_pin
            .map(|brake| {
                resolve(&board, PinRole::Brake, brake.pin(), |b, pin| {
                    FastPin::resolve(b, pin, PinDirection::Output)
                })
            })
            .transpose()?;

        let current_pin = config.current_pin;
        let offset = current_pin.map(|pin| board.init_channel(pin)).unwrap_or(0);

        let fault_pin = config.fault_pin;
        let fast_fault = fault_pin
            .map(|pin| {
                resolve(&board, PinRole::Fault, pin, |b, pin| {
                    FastPin::resolve(b, pin, PinDirection::Input)
                })
            })
            .transpose()?;

        let calibration = SenseCalibration::new(config.sense_factor, offset)?;
        let max_reading = board.max_reading();
        let trip = calibration.trip_value(config.trip_ma, max_reading);
        if trip.clamped {
            diag!(
                "Changing short detection value from {} to {} mA",
                calibration.raw_to_ma(calibration.ma_to_raw(config.trip_ma)),
                calibration.raw_to_ma(trip.raw)
            );
        }
        let prog_trip = calibration.trip_value(timing.prog_trip_ma, max_reading).raw;

        match current_pin {
            None => diag!("** WARNING ** No current or short detection"),
            Some(pin) => diag!(
                "CurrentPin={}, Offset={}, TripValue={}",
                pin,
                offset,
                trip.raw
            ),
        }

        let overload = OverloadState::new(board.now_ms(), timing.backoff_floor_ms);

        Ok(Self {
            board,
            power_pin,
            signal_pin,
            fast_signal,
            fast_signal2,
            brake_pin,
            fast_brake,
            current_pin,
            fault_pin,
            fast_fault,
            fault_line: FaultLine::Dedicated,
            calibration,
            trip_ma: config.trip_ma,
            raw_trip: trip.raw,
            prog_trip,
            timing,
            mode: PowerMode::Off,
            overload,
            speed_code: SpeedCode::STOP,
            dc_in_use: false,
            track_pwm: false,
            reset_counter: None,
        })
    }

    /// The board this driver runs on.
    #[inline]
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Power enable pin and its polarity.
    #[inline]
    pub fn power_pin(&self) -> InvertiblePin {
        self.power_pin
    }

    /// DCC signal / DC direction pin.
    #[inline]
    pub fn signal_pin(&self) -> u8 {
        self.signal_pin
    }

    /// Complementary signal pin, if dual signal pins are used.
    #[inline]
    pub fn signal_pin2(&self) -> Option<u8> {
        self.fast_signal2.map(|fast| fast.pin())
    }

    /// Brake pin and its polarity.
    #[inline]
    pub fn brake_pin(&self) -> Option<InvertiblePin> {
        self.brake_pin
    }

    /// Fault detect pin.
    #[inline]
    pub fn fault_pin(&self) -> Option<u8> {
        self.fault_pin
    }

    /// Configured trip current for normal running, in milliamps.
    #[inline]
    pub fn trip_ma(&self) -> u32 {
        self.trip_ma
    }

    /// Overload timing and limits.
    #[inline]
    pub fn overload_config(&self) -> &OverloadConfig {
        &self.timing
    }

    /// How an asserted fault pin is read. Set once during setup.
    pub fn set_fault_line(&mut self, line: FaultLine) {
        self.fault_line = line;
    }

    /// Fault line interpretation.
    #[inline]
    pub fn fault_line(&self) -> FaultLine {
        self.fault_line
    }

    /// Gives this driver the waveform generator's reset packet counter, which
    /// is cleared on every power on. Programming tracks only.
    pub fn set_reset_counter(&mut self, counter: &'static AtomicU8) {
        self.reset_counter = Some(counter);
    }

    /// Returns true if this driver clears a reset counter on power on.
    #[inline]
    pub fn has_reset_counter(&self) -> bool {
        self.reset_counter.is_some()
    }
}

fn resolve<B: TrackBoard>(
    board: &B,
    role: PinRole,
    pin: u8,
    f: impl FnOnce(&B, u8) -> Option<FastPin>,
) -> Result<FastPin, DriverError> {
    f(board, pin).ok_or(DriverError::UnknownPin { role, pin })
}
