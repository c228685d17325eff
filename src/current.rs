//! Current sensing: fixed-point calibration and fault-encoded reads.
//!
//! The calibration factor is a float only at construction; it is scaled by
//! [`SENSE_SCALE`] into an integer once so the overload loop never touches
//! floating point.
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::current::SenseCalibration;
//!
//! // 1 raw unit = 2 mA, zero point at 0
//! let cal = SenseCalibration::new(2.0, 0).unwrap();
//! assert_eq!(cal.raw_to_ma(600), 1200);
//! assert_eq!(cal.ma_to_raw(1000), 500);
//!
//! // A 1000 mA trip on a 0..=400 sensor can never be reached, so it clamps.
//! let trip = cal.trip_value(1000, 400);
//! assert_eq!(trip.raw, 400);
//! assert!(trip.clamped);
//! ```

use crate::driver::MotorDriver;
use crate::error::DriverError;
use crate::power::PowerMode;
use crate::traits::{ExecContext, TrackBoard};

/// Fixed-point base of the internal sense factor.
pub const SENSE_SCALE: i32 = 256;

/// Integer conversion between raw ADC units and milliamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SenseCalibration {
    offset: i32,
    factor: i32,
}

/// A trip threshold in raw units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TripValue {
    /// Threshold in raw units, offset excluded.
    pub raw: i32,
    /// True if the requested limit was lowered to stay reachable.
    pub clamped: bool,
}

impl SenseCalibration {
    /// Builds a calibration from a float factor (mA per raw unit) and the
    /// ADC zero point.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidSenseFactor`] if the factor is not finite or
    /// rounds to zero in fixed point.
    pub fn new(sense_factor: f32, offset: i32) -> Result<Self, DriverError> {
        let scaled = sense_factor * SENSE_SCALE as f32;
        if !scaled.is_finite() || scaled < 1.0 || scaled > i32::MAX as f32 {
            return Err(DriverError::InvalidSenseFactor(sense_factor));
        }
        Ok(Self::from_scaled(scaled as i32, offset))
    }

    /// Builds a calibration from an already scaled factor.
    pub const fn from_scaled(factor: i32, offset: i32) -> Self {
        let factor = if factor < 1 { 1 } else { factor };
        Self { offset, factor }
    }

    /// ADC zero point.
    #[inline]
    pub const fn offset(&self) -> i32 {
        self.offset
    }

    /// Sense factor multiplied by [`SENSE_SCALE`].
    #[inline]
    pub const fn scaled_factor(&self) -> i32 {
        self.factor
    }

    /// Converts a raw magnitude to milliamps. The sign is ignored.
    pub fn raw_to_ma(&self, raw: i32) -> u32 {
        let ma = i64::from(raw.unsigned_abs()) * i64::from(self.factor) / i64::from(SENSE_SCALE);
        u32::try_from(ma).unwrap_or(u32::MAX)
    }

    /// Converts milliamps to raw units.
    pub fn ma_to_raw(&self, ma: u32) -> i32 {
        let raw = i64::from(ma) * i64::from(SENSE_SCALE) / i64::from(self.factor);
        i32::try_from(raw).unwrap_or(i32::MAX)
    }

    /// Raw trip threshold for `trip_ma` on a sensor reporting at most
    /// `max_reading`.
    ///
    /// If the threshold plus the offset lies above the sensor's ceiling the
    /// overload could never trigger, so it is lowered to `max_reading - offset`.
    pub fn trip_value(&self, trip_ma: u32, max_reading: i32) -> TripValue {
        let raw = self.ma_to_raw(trip_ma);
        if raw.saturating_add(self.offset) > max_reading {
            TripValue {
                raw: max_reading.saturating_sub(self.offset).max(0),
                clamped: true,
            }
        } else {
            TripValue {
                raw,
                clamped: false,
            }
        }
    }
}

/// One current reading, with the fault pin state carried alongside.
///
/// The wire encoding used by [`MotorDriver::current_raw`] folds the two into
/// one signed value: negative means the fault pin was asserted, and `-1`
/// stands in for a zero magnitude since `-0` does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CurrentSample {
    /// Raw magnitude, offset removed.
    pub magnitude: i32,
    /// Fault pin asserted while powered.
    pub fault: bool,
}

impl CurrentSample {
    /// Sign-encoded form.
    pub const fn encode(self) -> i32 {
        if !self.fault {
            self.magnitude
        } else if self.magnitude == 0 {
            -1
        } else {
            -self.magnitude
        }
    }

    /// Decodes the sign-encoded form.
    pub const fn decode(raw: i32) -> Self {
        if raw < 0 {
            Self {
                magnitude: raw.saturating_neg(),
                fault: true,
            }
        } else {
            Self {
                magnitude: raw,
                fault: false,
            }
        }
    }
}

impl<B: TrackBoard> MotorDriver<B> {
    /// Samples the current sense input.
    ///
    /// The fault flag is set only when a fault pin is configured, reads
    /// asserted (low) and the output is powered. Without a sense pin the
    /// magnitude is always zero and no fault is reported.
    pub fn read_current(&self, ctx: ExecContext<'_>) -> CurrentSample {
        let Some(pin) = self.current_pin else {
            return CurrentSample::default();
        };
        let raw = self.board.read_channel(pin, ctx) - self.calibration.offset();
        let fault = self.power_mode() == PowerMode::On
            && self
                .fast_fault
                .map(|fault_pin| !fault_pin.is_high(&self.board))
                .unwrap_or(false);
        CurrentSample {
            magnitude: raw.saturating_abs(),
            fault,
        }
    }

    /// Sign-encoded raw current from thread context.
    pub fn current_raw(&self) -> i32 {
        self.read_current(ExecContext::Thread).encode()
    }

    /// Sign-encoded raw current from a context that already masked
    /// interrupts.
    pub fn current_raw_in_interrupt(&self, cs: critical_section::CriticalSection<'_>) -> i32 {
        self.read_current(ExecContext::Interrupt(cs)).encode()
    }

    /// Converts raw units to milliamps with this output's calibration.
    #[inline]
    pub fn raw_to_ma(&self, raw: i32) -> u32 {
        self.calibration.raw_to_ma(raw)
    }

    /// Converts milliamps to raw units with this output's calibration.
    #[inline]
    pub fn ma_to_raw(&self, ma: u32) -> i32 {
        self.calibration.ma_to_raw(ma)
    }

    /// Returns true if a current sense pin is configured.
    #[inline]
    pub fn can_measure_current(&self) -> bool {
        self.current_pin.is_some()
    }

    /// Raw trip threshold for normal running.
    #[inline]
    pub fn raw_trip_value(&self) -> i32 {
        self.raw_trip
    }

    /// Raw trip threshold for programming track use.
    #[inline]
    pub fn raw_prog_trip_value(&self) -> i32 {
        self.prog_trip
    }

    /// Calibration in use.
    #[inline]
    pub fn calibration(&self) -> &SenseCalibration {
        &self.calibration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Calibration Tests
    // =========================================================================

    #[test]
    fn scale_is_fixed_point() {
        let cal = SenseCalibration::new(2.99, 0).unwrap();
        assert_eq!(cal.scaled_factor(), 765); // 2.99 * 256 truncated
        assert_eq!(cal.raw_to_ma(1000), 2988);
    }

    #[test]
    fn rejects_unusable_factors() {
        assert!(SenseCalibration::new(0.0, 0).is_err());
        assert!(SenseCalibration::new(-1.0, 0).is_err());
        assert!(SenseCalibration::new(f32::NAN, 0).is_err());
        assert!(SenseCalibration::new(f32::INFINITY, 0).is_err());
        assert!(SenseCalibration::new(0.001, 0).is_err());
    }

    #[test]
    fn raw_to_ma_ignores_sign() {
        let cal = SenseCalibration::new(2.0, 0).unwrap();
        assert_eq!(cal.raw_to_ma(-600), 1200);
    }

    #[test]
    fn conversions_are_inverse_within_one_step() {
        for factor in [0.5f32, 1.0, 2.0, 2.99, 4.88, 10.0] {
            let cal = SenseCalibration::new(factor, 0).unwrap();
            // one raw step, rounded up, in milliamps
            let step = (cal.scaled_factor() as u32).div_ceil(SENSE_SCALE as u32);
            for ma in (0..5000u32).step_by(37) {
                let back = cal.raw_to_ma(cal.ma_to_raw(ma));
                assert!(back <= ma, "factor {} ma {} back {}", factor, ma, back);
                assert!(ma - back <= step, "factor {} ma {} back {}", factor, ma, back);
            }
        }
    }

    #[test]
    fn trip_value_within_range() {
        let cal = SenseCalibration::new(2.0, 10).unwrap();
        let trip = cal.trip_value(1000, 1023);
        assert_eq!(trip.raw, 500);
        assert!(!trip.clamped);
    }

    #[test]
    fn trip_value_clamps_to_ceiling() {
        let cal = SenseCalibration::new(1.0, 100).unwrap();
        let trip = cal.trip_value(5000, 1023);
        assert_eq!(trip.raw, 1023 - 100);
        assert!(trip.clamped);
    }

    #[test]
    fn trip_value_exactly_at_ceiling_is_kept() {
        let cal = SenseCalibration::new(1.0, 23).unwrap();
        let trip = cal.trip_value(1000, 1023);
        assert_eq!(trip.raw, 1000);
        assert!(!trip.clamped);
    }

    // =========================================================================
    // Sample Encoding Tests
    // =========================================================================

    #[test]
    fn fault_with_zero_current_encodes_minus_one() {
        let sample = CurrentSample {
            magnitude: 0,
            fault: true,
        };
        assert_eq!(sample.encode(), -1);
    }

    #[test]
    fn fault_negates_magnitude() {
        let sample = CurrentSample {
            magnitude: 250,
            fault: true,
        };
        assert_eq!(sample.encode(), -250);
        assert_eq!(CurrentSample::decode(-250), sample);
    }

    #[test]
    fn clean_sample_is_plain_magnitude() {
        let sample = CurrentSample::decode(42);
        assert!(!sample.fault);
        assert_eq!(sample.encode(), 42);
    }
}
