//! Groups of track outputs supervised together.
//!
//! A command station drives several outputs from one board: a main track, a
//! programming track and possibly DC tracks. [`TrackGroup`] owns their drivers
//! and provides the group level operations:
//!
//! - round-robin overload polling, one track per call
//! - applying one DCC bit level to every main (or programming) track inside a
//!   single shadow port transaction
//! - power switching with the brake sequence each role needs
//! - detecting fault pins shared between outputs
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::config::DriverConfig;
//! use rs_trackdrive::hal::MockBoard;
//! use rs_trackdrive::{MotorDriver, PowerMode, TrackGroup, TrackRole};
//!
//! let board = MockBoard::new();
//! let mut group = TrackGroup::new();
//!
//! let main = MotorDriver::new(&board, &DriverConfig::new(3, 12)).unwrap();
//! let prog = MotorDriver::new(&board, &DriverConfig::new(11, 13)).unwrap();
//! let a = group.add(main, TrackRole::Main).unwrap();
//! let b = group.add(prog, TrackRole::Prog).unwrap();
//! assert_eq!(a.as_char(), 'A');
//! assert_eq!(b.as_char(), 'B');
//!
//! group.set_power(TrackRole::Main, PowerMode::On);
//! assert_eq!(group.driver(a).unwrap().power_mode(), PowerMode::On);
//! assert_eq!(group.driver(b).unwrap().power_mode(), PowerMode::Off);
//! ```

use core::fmt;
use core::sync::atomic::AtomicU8;

use crate::driver::{FaultLine, MotorDriver};
use crate::error::DriverError;
use crate::power::{PowerEvent, PowerMode};
use crate::shadow;
use crate::traits::{ExecContext, TrackBoard};

/// Maximum number of outputs in a [`TrackGroup`].
pub const MAX_TRACKS: usize = 8;

/// Track label used in diagnostics: 'A' for the first output, 'B' for the
/// second, and so on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackId(u8);

impl TrackId {
    /// Track with zero-based index `index`.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Zero-based index.
    #[inline]
    pub const fn index(&self) -> u8 {
        self.0
    }

    /// Letter for this track.
    pub const fn as_char(&self) -> char {
        (b'A'.wrapping_add(self.0)) as char
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// What an output is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TrackRole {
    /// DCC main line.
    Main,
    /// DCC programming track. At most one per group.
    Prog,
    /// DC output.
    Dc,
    /// Not in use.
    Idle,
}

impl TrackRole {
    /// Returns the role as an upper-case string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackRole::Main => "MAIN",
            TrackRole::Prog => "PROG",
            TrackRole::Dc => "DC",
            TrackRole::Idle => "NONE",
        }
    }
}

struct Track<B> {
    driver: MotorDriver<B>,
    role: TrackRole,
}

/// Drivers of one command station, supervised together.
pub struct TrackGroup<B> {
    tracks: heapless::Vec<Track<B>, MAX_TRACKS>,
    next_poll: usize,
    prog_limit_suspended: bool,
    reset_counter: Option<&'static AtomicU8>,
}

impl<B: TrackBoard> TrackGroup<B> {
    /// Creates an empty group.
    pub const fn new() -> Self {
        Self {
            tracks: heapless::Vec::new(),
            next_poll: 0,
            prog_limit_suspended: false,
            reset_counter: None,
        }
    }

    /// Sets the waveform generator's reset counter, handed to whichever
    /// track has the [`TrackRole::Prog`] role.
    pub fn with_reset_counter(mut self, counter: &'static AtomicU8) -> Self {
        self.reset_counter = Some(counter);
        self.assign_reset_counter();
        self
    }

    /// Adds an output and returns its id.
    ///
    /// Adding a second programming track demotes the previous one to
    /// [`TrackRole::Idle`].
    ///
    /// # Errors
    ///
    /// [`DriverError::TrackGroupFull`] once [`MAX_TRACKS`] outputs exist.
    pub fn add(&mut self, driver: MotorDriver<B>, role: TrackRole) -> Result<TrackId, DriverError> {
        self.tracks
            .push(Track {
                driver,
                role: TrackRole::Idle,
            })
            .map_err(|_| DriverError::TrackGroupFull)?;
        let id = TrackId::new((self.tracks.len() - 1) as u8);
        self.update_fault_lines();
        self.set_role(id, role);
        Ok(id)
    }

    /// Changes the role of `id`. Returns false for an unknown id.
    pub fn set_role(&mut self, id: TrackId, role: TrackRole) -> bool {
        if self.tracks.get(usize::from(id.index())).is_none() {
            return false;
        }
        if role == TrackRole::Prog {
            for track in self.tracks.iter_mut().filter(|t| t.role == TrackRole::Prog) {
                track.role = TrackRole::Idle;
            }
        }
        if let Some(track) = self.tracks.get_mut(usize::from(id.index())) {
            if track.role == TrackRole::Dc && role != TrackRole::Dc {
                track.driver.release_dc();
            }
            track.role = role;
        }
        self.assign_reset_counter();
        diag!("TRACK {} {}", id, role.as_str());
        true
    }

    /// Role of `id`.
    pub fn role(&self, id: TrackId) -> Option<TrackRole> {
        self.tracks.get(usize::from(id.index())).map(|t| t.role)
    }

    /// Driver of `id`.
    pub fn driver(&self, id: TrackId) -> Option<&MotorDriver<B>> {
        self.tracks.get(usize::from(id.index())).map(|t| &t.driver)
    }

    /// Mutable driver of `id`.
    pub fn driver_mut(&mut self, id: TrackId) -> Option<&mut MotorDriver<B>> {
        self.tracks
            .get_mut(usize::from(id.index()))
            .map(|t| &mut t.driver)
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns true if the group has no outputs.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The programming track, if one is assigned.
    pub fn prog_track(&self) -> Option<TrackId> {
        self.ids_with(TrackRole::Prog).next()
    }

    /// Lifts the programming track limit while a decoder acknowledgement or
    /// a boosted programming track needs more current.
    pub fn set_prog_limit_suspended(&mut self, suspended: bool) {
        self.prog_limit_suspended = suspended;
    }

    /// Returns true while the programming limit is lifted.
    pub fn prog_limit_suspended(&self) -> bool {
        self.prog_limit_suspended
    }

    /// Checks the next output for overload, in round-robin order.
    ///
    /// One output per call keeps the time spent per main loop iteration
    /// bounded.
    pub fn poll(&mut self) -> Option<PowerEvent> {
        if self.tracks.is_empty() {
            return None;
        }
        let index = self.next_poll % self.tracks.len();
        self.next_poll = (index + 1) % self.tracks.len();

        let prog_limit = !self.prog_limit_suspended;
        let track = &mut self.tracks[index];
        let use_prog_limit = track.role == TrackRole::Prog && prog_limit;
        track
            .driver
            .check_power_overload(use_prog_limit, TrackId::new(index as u8))
    }

    /// Applies one DCC bit level to every main track.
    ///
    /// Called from the waveform interrupt; all signal pins change within one
    /// critical section, each through a shadow transaction on its own board.
    pub fn set_dcc_signal(&self, high: bool) {
        self.set_signal_for(TrackRole::Main, high);
    }

    /// Applies one DCC bit level to the programming track.
    pub fn set_prog_signal(&self, high: bool) {
        self.set_signal_for(TrackRole::Prog, high);
    }

    /// Switches every output with `role` on or off.
    ///
    /// DCC outputs get a brake pulse first, which clears a latched overcurrent
    /// on some bridges. DC outputs start braked at their remembered speed.
    pub fn set_power(&mut self, role: TrackRole, mode: PowerMode) {
        for track in self.tracks.iter_mut().filter(|t| t.role == role) {
            let driver = &mut track.driver;
            match role {
                TrackRole::Main | TrackRole::Prog => {
                    driver.set_brake(true, ExecContext::Thread);
                    driver.set_brake(false, ExecContext::Thread);
                    driver.set_power(mode);
                }
                TrackRole::Dc => {
                    driver.set_brake(true, ExecContext::Thread);
                    driver.set_dc_signal(driver.speed_code());
                    driver.set_power(mode);
                }
                TrackRole::Idle => {}
            }
        }
    }

    /// Power mode of `id`.
    pub fn power_mode(&self, id: TrackId) -> Option<PowerMode> {
        self.driver(id).map(|d| d.power_mode())
    }

    fn ids_with(&self, role: TrackRole) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.role == role)
            .map(|(i, _)| TrackId::new(i as u8))
    }

    fn set_signal_for(&self, role: TrackRole, high: bool) {
        critical_section::with(|cs| {
            // Drivers may sit on different boards, each with its own shadows
            for track in self.tracks.iter().filter(|t| t.role == role) {
                shadow::transaction(cs, track.driver.board(), |cs| {
                    track.driver.set_signal(cs, high)
                });
            }
        });
    }

    fn update_fault_lines(&mut self) {
        let mut pins: heapless::Vec<(u8, u8), MAX_TRACKS> = heapless::Vec::new();
        for pin in self.tracks.iter().filter_map(|t| t.driver.fault_pin()) {
            match pins.iter_mut().find(|(p, _)| *p == pin) {
                Some((_, count)) => *count += 1,
                None => {
                    let _ = pins.push((pin, 1));
                }
            }
        }
        for track in self.tracks.iter_mut() {
            let shared = track
                .driver
                .fault_pin()
                .map(|pin| pins.iter().any(|&(p, count)| p == pin && count > 1))
                .unwrap_or(false);
            let line = if shared {
                FaultLine::Shared
            } else {
                FaultLine::Dedicated
            };
            if line != track.driver.fault_line() {
                if let Some(pin) = track.driver.fault_pin() {
                    diag!("Common fault pin {} detected", pin);
                }
            }
            track.driver.set_fault_line(line);
        }
    }

    fn assign_reset_counter(&mut self) {
        let counter = self.reset_counter;
        for track in self.tracks.iter_mut() {
            track.driver.reset_counter = match track.role {
                TrackRole::Prog => counter,
                _ => None,
            };
        }
    }
}

impl<B: TrackBoard> Default for TrackGroup<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::hal::MockBoard;
    use crate::signal::SpeedCode;
    use crate::traits::PortId;

    fn driver(board: &MockBoard, power: i16, signal: u8) -> MotorDriver<&MockBoard> {
        MotorDriver::new(board, &DriverConfig::new(power, signal)).unwrap()
    }

    // =========================================================================
    // TrackId Tests
    // =========================================================================

    #[test]
    fn track_letters() {
        assert_eq!(TrackId::new(0).as_char(), 'A');
        assert_eq!(TrackId::new(7).as_char(), 'H');
        assert_eq!(format!("{}", TrackId::new(2)), "C");
    }

    // =========================================================================
    // Membership Tests
    // =========================================================================

    #[test]
    fn group_capacity() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        for i in 0..MAX_TRACKS as u8 {
            group.add(driver(&board, 40 + i as i16, 16 + i), TrackRole::Main).unwrap();
        }
        let extra = driver(&board, 60, 30);
        assert_eq!(group.add(extra, TrackRole::Main), Err(DriverError::TrackGroupFull));
        assert_eq!(group.len(), MAX_TRACKS);
    }

    #[test]
    fn single_prog_track() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        let a = group.add(driver(&board, 3, 12), TrackRole::Prog).unwrap();
        let b = group.add(driver(&board, 11, 13), TrackRole::Prog).unwrap();
        assert_eq!(group.role(a), Some(TrackRole::Idle));
        assert_eq!(group.role(b), Some(TrackRole::Prog));
        assert_eq!(group.prog_track(), Some(b));
    }

    #[test]
    fn reset_counter_follows_prog_role() {
        static RESETS: AtomicU8 = AtomicU8::new(0);
        let board = MockBoard::new();
        let mut group = TrackGroup::new().with_reset_counter(&RESETS);
        let a = group.add(driver(&board, 3, 12), TrackRole::Prog).unwrap();
        let b = group.add(driver(&board, 11, 13), TrackRole::Main).unwrap();
        assert!(group.driver(a).unwrap().has_reset_counter());
        assert!(!group.driver(b).unwrap().has_reset_counter());

        group.set_role(b, TrackRole::Prog);
        assert!(!group.driver(a).unwrap().has_reset_counter());
        assert!(group.driver(b).unwrap().has_reset_counter());
    }

    #[test]
    fn shared_fault_pin_detected() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        let config_a = DriverConfig::new(3, 12).with_fault(20);
        let config_b = DriverConfig::new(11, 13).with_fault(20);
        let config_c = DriverConfig::new(5, 14).with_fault(21);
        let a = group.add(MotorDriver::new(&board, &config_a).unwrap(), TrackRole::Main).unwrap();
        assert_eq!(group.driver(a).unwrap().fault_line(), FaultLine::Dedicated);

        let b = group.add(MotorDriver::new(&board, &config_b).unwrap(), TrackRole::Prog).unwrap();
        let c = group.add(MotorDriver::new(&board, &config_c).unwrap(), TrackRole::Main).unwrap();
        assert_eq!(group.driver(a).unwrap().fault_line(), FaultLine::Shared);
        assert_eq!(group.driver(b).unwrap().fault_line(), FaultLine::Shared);
        assert_eq!(group.driver(c).unwrap().fault_line(), FaultLine::Dedicated);
    }

    // =========================================================================
    // Polling Tests
    // =========================================================================

    #[test]
    fn poll_is_round_robin() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        let a = group.add(driver(&board, 3, 12), TrackRole::Main).unwrap();
        let b = group.add(driver(&board, 11, 13), TrackRole::Main).unwrap();

        group.poll();
        assert_eq!(group.driver(a).unwrap().sample_interval_ms(), 1000);
        assert_eq!(group.driver(b).unwrap().sample_interval_ms(), 0);

        group.poll();
        assert_eq!(group.driver(b).unwrap().sample_interval_ms(), 1000);
    }

    #[test]
    fn poll_empty_group() {
        let mut group: TrackGroup<&MockBoard> = TrackGroup::new();
        assert_eq!(group.poll(), None);
    }

    // =========================================================================
    // Signal Tests
    // =========================================================================

    #[test]
    fn dcc_signal_reaches_only_main_tracks() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        group.add(driver(&board, 3, 12), TrackRole::Main).unwrap();
        group.add(driver(&board, 11, 13), TrackRole::Prog).unwrap();
        group.add(driver(&board, 5, 44), TrackRole::Main).unwrap();

        group.set_dcc_signal(true);
        assert!(board.output_bit(12));
        assert!(!board.output_bit(13));
        assert!(board.output_bit(44));

        group.set_prog_signal(true);
        assert!(board.output_bit(13));

        group.set_dcc_signal(false);
        assert!(!board.output_bit(12));
        assert!(board.output_bit(13));
        assert!(!board.output_bit(44));
    }

    #[test]
    fn dcc_signal_commits_every_board() {
        let first = MockBoard::new();
        let second = MockBoard::new();
        let mut group = TrackGroup::new();
        group.add(driver(&first, 3, 12), TrackRole::Main).unwrap();
        group.add(driver(&second, 3, 12), TrackRole::Main).unwrap();
        // Sibling on the second board's shared port
        second.poke_port(PortId(1), 0b1000_0000);

        group.set_dcc_signal(true);
        assert!(first.output_bit(12));
        assert!(second.output_bit(12));
        assert!(second.output_bit(15));

        group.set_dcc_signal(false);
        assert!(!first.output_bit(12));
        assert!(!second.output_bit(12));
        assert!(second.output_bit(15));
    }

    // =========================================================================
    // Power Tests
    // =========================================================================

    #[test]
    fn main_power_pulses_brake() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        let config = DriverConfig::new(3, 12).with_brake(41);
        let a = group.add(MotorDriver::new(&board, &config).unwrap(), TrackRole::Main).unwrap();

        let writes = board.port_writes();
        group.set_power(TrackRole::Main, PowerMode::On);
        // brake on, brake off
        assert_eq!(board.port_writes(), writes + 2);
        assert!(!board.output_bit(41));
        assert_eq!(group.power_mode(a), Some(PowerMode::On));
    }

    #[test]
    fn dc_power_starts_braked_at_remembered_speed() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        let config = DriverConfig::new(3, 12).with_brake(41);
        let a = group.add(MotorDriver::new(&board, &config).unwrap(), TrackRole::Dc).unwrap();
        group
            .driver_mut(a)
            .unwrap()
            .set_dc_signal(SpeedCode::from_byte(0x80 | 50));

        group.set_power(TrackRole::Dc, PowerMode::On);
        assert!(board.output_bit(41));
        assert_eq!(board.duty(3), Some(100));
        assert_eq!(group.power_mode(a), Some(PowerMode::On));
    }

    #[test]
    fn leaving_dc_role_releases_dc() {
        let board = MockBoard::new();
        let mut group = TrackGroup::new();
        let a = group.add(driver(&board, 3, 12), TrackRole::Dc).unwrap();
        group
            .driver_mut(a)
            .unwrap()
            .set_dc_signal(SpeedCode::from_byte(0x80 | 50));
        group.set_role(a, TrackRole::Main);
        assert!(!group.driver(a).unwrap().is_dc());
        assert_eq!(board.duty(3), Some(0));
    }
}
