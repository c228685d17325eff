//! Trait definitions for the hardware a track output driver runs on.
//!
//! This module defines the abstractions that let rs-trackdrive:
//! - Run on different boards (ESP32-C3, AVR-style shields, desktop mock)
//! - Toggle signal pins from interrupt context without generic pin I/O
//! - Stay testable on desktop with deterministic fake hardware
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`PinIo`]: setup-time pin writes and direction
//! - [`FastPorts`]: port registers behind fast pins, plus shadow mirrors
//! - [`AnalogSense`]: current sense ADC
//! - [`PwmControl`]: PWM duty and DCC signal delegation
//! - [`Clock`]: wrapping millisecond time
//!
//! [`TrackBoard`] bundles all of them.

pub mod hardware;

pub use hardware::*;
