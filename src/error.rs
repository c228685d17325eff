//! Configuration errors.
//!
//! Only construction can fail. Once a [`MotorDriver`](crate::MotorDriver)
//! exists, faults are expressed as [`PowerMode::Overload`](crate::PowerMode)
//! and diagnostics, never as errors.

/// Which connection of a track output a pin belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PinRole {
    /// Power enable (PWM) pin.
    Power,
    /// DCC signal / direction pin.
    Signal,
    /// Complementary second signal pin.
    Signal2,
    /// Motor bridge brake pin.
    Brake,
    /// Current sense analog pin.
    Current,
    /// Fault detect input.
    Fault,
}

impl PinRole {
    /// Short upper-case tag used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PinRole::Power => "POWER",
            PinRole::Signal => "SIG",
            PinRole::Signal2 => "SIG2",
            PinRole::Brake => "BRAKE",
            PinRole::Current => "CURRENT",
            PinRole::Fault => "FAULT",
        }
    }
}

/// Errors from building a driver or a track group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DriverError {
    /// The board cannot resolve `pin` to a port and bit.
    UnknownPin {
        /// Connection the pin was configured for.
        role: PinRole,
        /// Logical pin number.
        pin: u8,
    },
    /// A signed pin number does not fit a pin.
    InvalidPin {
        /// Connection the pin was configured for.
        role: PinRole,
        /// The signed value as configured.
        value: i16,
    },
    /// The sense factor is not a positive, finite number large enough to
    /// survive fixed-point conversion.
    InvalidSenseFactor(f32),
    /// The track group already holds its maximum number of tracks.
    TrackGroupFull,
}

impl core::fmt::Display for DriverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DriverError::UnknownPin { role, pin } => {
                write!(f, "{} pin {} does not exist on this board", role.as_str(), pin)
            }
            DriverError::InvalidPin { role, value } => {
                write!(f, "invalid {} pin value {}", role.as_str(), value)
            }
            DriverError::InvalidSenseFactor(factor) => {
                write!(f, "invalid current sense factor {}", factor)
            }
            DriverError::TrackGroupFull => write!(f, "track group is full"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DriverError {}
