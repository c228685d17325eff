//! # rs-trackdrive
//!
//! Track output driver for DCC model railway command stations: DCC and DC
//! signal generation, current sensing and overload protection for motor
//! bridge shields.
//!
//! ## Features
//!
//! - **Fast pins**: pins resolved once to register + mask, for interrupt-rate signal toggling
//! - **Shadow ports**: bit writes on shared ports that never lose a sibling's update
//! - **Current sensing**: fixed-point calibration, trip values that are always reachable
//! - **Overload protection**: self-throttled state machine with adaptive backoff
//! - **DC mode**: speed byte to PWM duty and direction, with per-platform PWM frequency
//! - **Track groups**: round-robin supervision of main, programming and DC outputs
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Board primitives (pins, ports, ADC, PWM, clock)
//! - `fastpin` / `shadow` - Register-level pin handles and shared port mirrors
//! - `driver` - The per-track [`MotorDriver`]; its operations live in
//!   `signal`, `power`, `current` and `brake`
//! - `tracks` - [`TrackGroup`] supervising several outputs
//! - `hal` - Concrete boards (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use rs_trackdrive::config::DriverConfig;
//! use rs_trackdrive::hal::MockBoard;
//! use rs_trackdrive::{MotorDriver, PowerEvent, PowerMode, TrackGroup, TrackRole};
//!
//! let board = MockBoard::new();
//! let main = MotorDriver::new(
//!     &board,
//!     &DriverConfig::new(3, 12)
//!         .with_brake(9)
//!         .with_current_sense(0, 2.0)
//!         .with_trip_ma(1000),
//! )
//! .unwrap();
//!
//! let mut group = TrackGroup::new();
//! let a = group.add(main, TrackRole::Main).unwrap();
//! group.set_power(TrackRole::Main, PowerMode::On);
//!
//! // Short on the main track
//! board.set_analog(0, 600);
//! match group.poll() {
//!     Some(PowerEvent::Overload { measured_ma, limit_ma, .. }) => {
//!         assert_eq!(measured_ma, 1200);
//!         assert_eq!(limit_ma, 1000);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert_eq!(group.power_mode(a), Some(PowerMode::Overload));
//! ```
//!
//! ## Targets
//!
//! Desktop builds use the default `std` + `host` features. For the ESP32 build
//! disable the defaults (`--no-default-features --features esp32`) so that
//! `esp-idf-hal` provides the critical section implementation.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod diag;

/// Brake line control.
pub mod brake;
/// Track output and board configuration.
pub mod config;
/// Current sensing and calibration.
pub mod current;
/// The per-track motor driver.
pub mod driver;
/// Configuration errors.
pub mod error;
/// Pins resolved to direct register handles.
pub mod fastpin;
/// Hardware abstraction layer with a mock board for testing.
pub mod hal;
/// Power modes and the overload state machine.
pub mod power;
/// Shadow mirrors of shared I/O ports.
pub mod shadow;
/// DCC bit writes and DC PWM output.
pub mod signal;
/// Groups of track outputs.
pub mod tracks;
/// Hardware abstraction traits.
pub mod traits;

// Re-exports for convenience
pub use config::{BoardConfig, DriverConfig, OverloadConfig};
pub use current::{CurrentSample, SenseCalibration, TripValue, SENSE_SCALE};
pub use driver::{FaultLine, InvertiblePin, MotorDriver};
pub use error::{DriverError, PinRole};
pub use fastpin::{FastPin, PortTarget};
pub use power::{PowerEvent, PowerMode};
pub use shadow::ShadowPorts;
pub use signal::{dc_duty, dc_tone_frequency, pwm_compare, Direction, SpeedCode};
pub use tracks::{TrackGroup, TrackId, TrackRole};
pub use traits::{
    AnalogSense, Clock, ExecContext, FastPorts, PinDirection, PinIo, PinState, PortId,
    PwmControl, RegisterKind, TrackBoard,
};
