//! ESP32-C3 SuperMini hardware abstraction layer for a DCC track output.
//!
//! This module provides hardware implementations for the ESP32-C3 SuperMini board
//! driving a main and a programming track through two motor bridge channels.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32-C3 SuperMini (RISC-V 160MHz, 4MB Flash)
//! - **Motor Driver**: dual H-bridge shield (enable, direction, brake, current sense)
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments matching the SuperMini layout.

mod board;
mod clock;

pub use board::{Esp32Board, MAX_GPIO};
pub use clock::Esp32Clock;

/// Pin assignments for SuperMini ESP32-C3.
///
/// Current sense inputs must sit on ADC1 (GPIO0..=4).
pub mod pins {
    // =========================================================================
    // Main Track (channel A)
    // =========================================================================

    /// Main track enable / PWM
    pub const MAIN_POWER: i16 = 2;

    /// Main track DCC signal
    pub const MAIN_SIGNAL: u8 = 6;

    /// Main track brake
    pub const MAIN_BRAKE: i16 = 7;

    /// Main track current sense (ADC1 channel 3)
    pub const MAIN_CURRENT: u8 = 3;

    // =========================================================================
    // Programming Track (channel B)
    // =========================================================================

    /// Programming track enable / PWM
    pub const PROG_POWER: i16 = 5;

    /// Programming track DCC signal
    pub const PROG_SIGNAL: u8 = 10;

    /// Programming track brake
    pub const PROG_BRAKE: i16 = 8;

    /// Programming track current sense (ADC1 channel 4)
    pub const PROG_CURRENT: u8 = 4;

    // =========================================================================
    // Shared
    // =========================================================================

    /// Common fault line of both bridge channels (active low)
    pub const FAULT: u8 = 20;

    /// LEDC channel for the main track enable
    pub const MAIN_PWM_CHANNEL: u8 = 0;

    /// LEDC channel for the programming track enable
    pub const PROG_PWM_CHANNEL: u8 = 1;
}
