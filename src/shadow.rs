//! Shadow mirrors of shared I/O ports.
//!
//! On boards where one port carries the DCC signal pin together with pins
//! owned by other logic, a single-bit read-modify-write on the live register
//! can lose a concurrent update made by an interrupt handler. Fast pins on
//! such ports are resolved against a shadow copy instead, and every writer
//! follows the same protocol inside one critical section:
//!
//! 1. copy the live port into the shadow ([`ShadowPorts::load`]),
//! 2. change only its own bits in the shadow,
//! 3. write the shadow back to the live port ([`ShadowPorts::commit`]).
//!
//! [`transaction`] performs all three steps around a closure.
//!
//! # Example
//!
//! ```rust
//! use rs_trackdrive::hal::MockBoard;
//! use rs_trackdrive::shadow;
//! use rs_trackdrive::traits::{FastPorts, PortId, RegisterKind};
//!
//! let board = MockBoard::new();
//! board.poke_port(PortId(1), 0b1000_0000); // sibling pin owned elsewhere
//!
//! critical_section::with(|cs| {
//!     shadow::transaction(cs, &board, |cs| {
//!         board.shadow_ports().update(cs, PortId(1), |v| v | 0b0000_0001);
//!     });
//! });
//!
//! assert_eq!(board.read_port(PortId(1), RegisterKind::Output), 0b1000_0001);
//! ```

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};

use crate::traits::{FastPorts, PortId, PortWord, RegisterKind};

/// Maximum number of ports a board can mirror.
pub const MAX_SHADOW_PORTS: usize = 4;

struct ShadowSlot {
    port: PortId,
    value: Mutex<Cell<PortWord>>,
}

/// Arena of shadow registers, indexed by [`PortId`].
///
/// Owned by the board (see [`FastPorts::shadow_ports`]); values are only
/// reachable through a [`CriticalSection`] token.
pub struct ShadowPorts {
    slots: heapless::Vec<ShadowSlot, MAX_SHADOW_PORTS>,
}

impl ShadowPorts {
    /// A bank with no shared ports; every fast pin writes live registers.
    pub const fn empty() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }

    /// Creates mirrors for the given shared ports.
    ///
    /// Duplicates are ignored, as are ports beyond [`MAX_SHADOW_PORTS`].
    pub fn new(shared: &[PortId]) -> Self {
        let mut bank = Self::empty();
        for &port in shared {
            if bank.is_shadowed(port) {
                continue;
            }
            let slot = ShadowSlot {
                port,
                value: Mutex::new(Cell::new(0)),
            };
            if bank.slots.push(slot).is_err() {
                break;
            }
        }
        bank
    }

    /// Returns true if `port` has a shadow register.
    pub fn is_shadowed(&self, port: PortId) -> bool {
        self.slot(port).is_some()
    }

    /// Iterates over the mirrored ports.
    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.slots.iter().map(|slot| slot.port)
    }

    /// Number of mirrored ports.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no port is mirrored.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current shadow value of `port`.
    pub fn get(&self, cs: CriticalSection<'_>, port: PortId) -> Option<PortWord> {
        self.slot(port).map(|slot| slot.value.borrow(cs).get())
    }

    /// Replaces the shadow value of `port` with `f(old)`.
    ///
    /// Returns false if `port` is not mirrored.
    pub fn update(
        &self,
        cs: CriticalSection<'_>,
        port: PortId,
        f: impl FnOnce(PortWord) -> PortWord,
    ) -> bool {
        match self.slot(port) {
            Some(slot) => {
                let cell = slot.value.borrow(cs);
                cell.set(f(cell.get()));
                true
            }
            None => false,
        }
    }

    /// Copies every mirrored live output register into its shadow.
    pub fn load<P: FastPorts + ?Sized>(&self, cs: CriticalSection<'_>, ports: &P) {
        for slot in &self.slots {
            let live = ports.read_port(slot.port, RegisterKind::Output);
            slot.value.borrow(cs).set(live);
        }
    }

    /// Writes every shadow back to its live output register.
    pub fn commit<P: FastPorts + ?Sized>(&self, cs: CriticalSection<'_>, ports: &P) {
        for slot in &self.slots {
            ports.write_port(slot.port, slot.value.borrow(cs).get());
        }
    }

    fn slot(&self, port: PortId) -> Option<&ShadowSlot> {
        self.slots.iter().find(|slot| slot.port == port)
    }
}

impl Default for ShadowPorts {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for ShadowPorts {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.ports()).finish()
    }
}

/// Loads the shadows from the live ports, runs `f`, then commits them.
///
/// The whole sequence runs under the caller's critical section, so it is
/// atomic with respect to any interrupt handler touching the same ports.
pub fn transaction<P, R>(
    cs: CriticalSection<'_>,
    ports: &P,
    f: impl FnOnce(CriticalSection<'_>) -> R,
) -> R
where
    P: FastPorts + ?Sized,
{
    let bank = ports.shadow_ports();
    bank.load(cs, ports);
    let result = f(cs);
    bank.commit(cs, ports);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockBoard;

    #[test]
    fn empty_bank_mirrors_nothing() {
        let bank = ShadowPorts::empty();
        assert!(bank.is_empty());
        assert!(!bank.is_shadowed(PortId(0)));
        critical_section::with(|cs| {
            assert!(!bank.update(cs, PortId(0), |v| v | 1));
            assert_eq!(bank.get(cs, PortId(0)), None);
        });
    }

    #[test]
    fn duplicates_are_ignored() {
        let bank = ShadowPorts::new(&[PortId(1), PortId(1), PortId(2)]);
        assert_eq!(bank.len(), 2);
        assert!(bank.is_shadowed(PortId(1)));
        assert!(bank.is_shadowed(PortId(2)));
    }

    #[test]
    fn capacity_is_bounded() {
        let bank = ShadowPorts::new(&[PortId(0), PortId(1), PortId(2), PortId(3), PortId(4)]);
        assert_eq!(bank.len(), MAX_SHADOW_PORTS);
        assert!(!bank.is_shadowed(PortId(4)));
    }

    #[test]
    fn update_only_touches_own_port() {
        let bank = ShadowPorts::new(&[PortId(0), PortId(1)]);
        critical_section::with(|cs| {
            assert!(bank.update(cs, PortId(0), |v| v | 0b10));
            assert_eq!(bank.get(cs, PortId(0)), Some(0b10));
            assert_eq!(bank.get(cs, PortId(1)), Some(0));
        });
    }

    #[test]
    fn transaction_preserves_sibling_bits() {
        let board = MockBoard::new();
        board.poke_port(PortId(0), 0b0100_0000);

        critical_section::with(|cs| {
            transaction(cs, &board, |cs| {
                board.shadow_ports().update(cs, PortId(0), |v| v | 0b0000_0100);
            })
        });

        assert_eq!(
            board.read_port(PortId(0), RegisterKind::Output),
            0b0100_0100
        );
    }

    #[test]
    fn transaction_returns_closure_result() {
        let board = MockBoard::new();
        let value = critical_section::with(|cs| transaction(cs, &board, |_| 99));
        assert_eq!(value, 99);
    }
}
