//! Power modes and the overload state machine.
//!
//! [`MotorDriver::check_power_overload`] is called at whatever cadence the
//! main loop runs; it throttles itself and only samples current when the
//! stored interval has elapsed.
//!
//! ```text
//!            set_power(On)              sample >= trip / fault pin
//!   Off  ─────────────────────▶  On  ─────────────────────────────▶  Overload
//!    ▲                           │ ▲                                    │
//!    └──── set_power(Off) ───────┘ └──── backoff elapsed, retry ────────┘
//! ```
//!
//! Every overload doubles the backoff (capped by the configured ceiling) and
//! resets the clean sample counter. Once the counter reaches its cap, the next
//! clean sample drops the backoff back to its floor.

use core::fmt;
use core::sync::atomic::Ordering;

use crate::current::CurrentSample;
use crate::driver::{FaultLine, MotorDriver};
use crate::tracks::TrackId;
use crate::traits::{ExecContext, TrackBoard};

/// Operating mode of a track output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PowerMode {
    /// Output switched off.
    #[default]
    Off,
    /// Output powered.
    On,
    /// Output switched off after an overload; retried after the backoff.
    Overload,
}

impl PowerMode {
    /// Returns the mode as an upper-case string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PowerMode::Off => "OFF",
            PowerMode::On => "ON",
            PowerMode::Overload => "OVERLOAD",
        }
    }
}

/// A state machine report from [`MotorDriver::check_power_overload`].
///
/// `Display` renders the diagnostic line logged for the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", rename_all = "snake_case"))]
pub enum PowerEvent {
    /// The track was switched off for drawing too much current.
    Overload {
        /// Track that tripped.
        track: TrackId,
        /// Measured current (mA).
        measured_ma: u32,
        /// Limit in force (mA).
        limit_ma: u32,
        /// Time until the restore attempt (ms).
        shutdown_ms: u32,
        /// The fault pin, not the current reading, triggered the trip.
        fault_pin: bool,
    },
    /// A shared fault line fired while this track was below its limit. The
    /// track was toggled off and straight back on.
    CommonFaultToggle {
        /// Track that was toggled.
        track: TrackId,
        /// Measured current (mA).
        measured_ma: u32,
    },
    /// Power restored after an overload backoff.
    Restore {
        /// Track that was restored.
        track: TrackId,
        /// Time until the next check (ms).
        next_check_ms: u32,
    },
}

impl PowerEvent {
    /// Track the event belongs to.
    pub const fn track(&self) -> TrackId {
        match self {
            PowerEvent::Overload { track, .. }
            | PowerEvent::CommonFaultToggle { track, .. }
            | PowerEvent::Restore { track, .. } => *track,
        }
    }

    /// Returns true for a confirmed overload.
    pub const fn is_overload(&self) -> bool {
        matches!(self, PowerEvent::Overload { .. })
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEvent::Overload {
                track,
                measured_ma,
                limit_ma,
                shutdown_ms,
                ..
            } => write!(
                f,
                "TRACK {} POWER OVERLOAD {}mA (limit {}mA) shutdown for {}ms",
                track, measured_ma, limit_ma, shutdown_ms
            ),
            PowerEvent::CommonFaultToggle { track, .. } => {
                write!(f, "COMMON FAULT PIN ACTIVE: POWERTOGGLE TRACK {}", track)
            }
            PowerEvent::Restore {
                track,
                next_check_ms,
            } => write!(f, "TRACK {} POWER RESTORE (check {}ms)", track, next_check_ms),
        }
    }
}

/// Sampling and backoff bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct OverloadState {
    pub(crate) last_sample_ms: u32,
    pub(crate) sample_interval_ms: u32,
    pub(crate) backoff_ms: u32,
    pub(crate) good_samples: u16,
    pub(crate) last_current: i32,
}

impl OverloadState {
    pub(crate) const fn new(now_ms: u32, backoff_floor_ms: u32) -> Self {
        Self {
            last_sample_ms: now_ms,
            sample_interval_ms: 0,
            backoff_ms: backoff_floor_ms,
            good_samples: 0,
            last_current: 0,
        }
    }
}

impl<B: TrackBoard> MotorDriver<B> {
    /// Switches the output on or off.
    ///
    /// Powering on re-applies the remembered DC speed and clears the reset
    /// counter, if any. Powering off a DC track stops the PWM but keeps the
    /// speed for the next power on. [`PowerMode::Overload`] switches the
    /// output off like [`PowerMode::Off`].
    pub fn set_power(&mut self, mode: PowerMode) {
        let on = mode == PowerMode::On;
        let level = self.power_pin.level(on);
        critical_section::with(|_| self.board.write_pin(self.power_pin.pin(), level));

        if on {
            if self.dc_in_use {
                self.write_dc_output(self.speed_code);
            }
            if let Some(counter) = self.reset_counter {
                counter.store(0, Ordering::Relaxed);
            }
        } else if self.dc_in_use {
            self.write_dc_output(crate::signal::SpeedCode::STOP);
        }
        self.mode = mode;
    }

    /// Current operating mode.
    #[inline]
    pub fn power_mode(&self) -> PowerMode {
        self.mode
    }

    /// Runs one step of the overload state machine if the sample interval has
    /// elapsed.
    ///
    /// `use_prog_limit` selects the programming track trip value; `track`
    /// labels the returned event. Returns `None` when throttled or when the
    /// step had nothing to report.
    pub fn check_power_overload(
        &mut self,
        use_prog_limit: bool,
        track: TrackId,
    ) -> Option<PowerEvent> {
        let now = self.board.now_ms();
        if now.wrapping_sub(self.overload.last_sample_ms) < self.overload.sample_interval_ms {
            return None;
        }
        self.overload.last_sample_ms = now;
        let trip = if use_prog_limit {
            self.prog_trip
        } else {
            self.raw_trip
        };

        let event = match self.mode {
            PowerMode::Off => {
                self.overload.sample_interval_ms = self.timing.off_wait_ms;
                None
            }
            PowerMode::On => self.check_powered(trip, track),
            PowerMode::Overload => {
                self.set_power(PowerMode::On);
                self.overload.sample_interval_ms = self.timing.on_wait_ms;
                Some(PowerEvent::Restore {
                    track,
                    next_check_ms: self.overload.sample_interval_ms,
                })
            }
        };
        if let Some(event) = &event {
            diag!("{}", event);
        }
        event
    }

    fn check_powered(&mut self, trip: i32, track: TrackId) -> Option<PowerEvent> {
        let CurrentSample { magnitude, fault } = self.read_current(ExecContext::Thread);
        let mut current = magnitude;
        let mut toggled = None;

        if fault {
            self.set_power(PowerMode::Overload);
            match self.fault_line {
                FaultLine::Shared => {
                    if current < trip {
                        self.set_power(PowerMode::On);
                    }
                    toggled = Some(PowerEvent::CommonFaultToggle {
                        track,
                        measured_ma: self.raw_to_ma(current),
                    });
                }
                FaultLine::Dedicated => {
                    diag!("TRACK {} FAULT PIN ACTIVE - OVERLOAD", track);
                    current = current.max(trip);
                }
            }
        }
        self.overload.last_current = current;

        if current < trip {
            self.overload.sample_interval_ms = self.timing.on_wait_ms;
            if self.overload.good_samples < self.timing.good_sample_cap {
                self.overload.good_samples += 1;
            } else {
                self.overload.backoff_ms = self.overload.backoff_ms.min(self.timing.backoff_floor_ms);
            }
            return toggled;
        }

        self.set_power(PowerMode::Overload);
        self.overload.good_samples = 0;
        self.overload.sample_interval_ms = self.overload.backoff_ms;
        self.overload.backoff_ms = self
            .overload
            .backoff_ms
            .saturating_mul(2)
            .min(self.timing.backoff_ceiling_ms);
        if let Some(event) = toggled {
            diag!("{}", event);
        }
        Some(PowerEvent::Overload {
            track,
            measured_ma: self.raw_to_ma(current),
            limit_ma: self.raw_to_ma(trip),
            shutdown_ms: self.overload.sample_interval_ms,
            fault_pin: fault && self.fault_line == FaultLine::Dedicated,
        })
    }

    /// Raw magnitude of the last sample taken while powered.
    #[inline]
    pub fn last_current(&self) -> i32 {
        self.overload.last_current
    }

    /// Minimum time between two samples, as decided by the last check.
    #[inline]
    pub fn sample_interval_ms(&self) -> u32 {
        self.overload.sample_interval_ms
    }

    /// Off time that the next overload will impose.
    #[inline]
    pub fn backoff_ms(&self) -> u32 {
        self.overload.backoff_ms
    }

    /// Consecutive clean samples since the last overload.
    #[inline]
    pub fn good_samples(&self) -> u16 {
        self.overload.good_samples
    }
}
