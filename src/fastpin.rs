//! Fast pin resolution.
//!
//! Signal toggling happens from timer interrupts with sub-100µs budgets, where
//! a generic `digitalWrite`-style call is far too slow. A [`FastPin`] resolves
//! a logical pin to its port, a set mask and a clear mask exactly once, at
//! configuration time; afterwards a write is a single masked register update.

use critical_section::CriticalSection;

use crate::traits::{FastPorts, PinDirection, PinIo, PortId, PortWord, RegisterKind};

/// Mask with the pin's bit set; OR-ed in to drive the pin high.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetMask(PortWord);

/// Complement of a [`SetMask`]; AND-ed in to drive the pin low.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearMask(PortWord);

impl SetMask {
    /// Mask for bit `bit` of a port. Bits beyond the port width yield an
    /// empty mask.
    pub const fn for_bit(bit: u8) -> Self {
        match 1u32.checked_shl(bit as u32) {
            Some(mask) => SetMask(mask),
            None => SetMask(0),
        }
    }

    /// The complementary clear mask.
    #[inline]
    pub const fn complement(self) -> ClearMask {
        ClearMask(!self.0)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> PortWord {
        self.0
    }

    /// `value` with this pin's bit set.
    #[inline]
    pub const fn apply(self, value: PortWord) -> PortWord {
        value | self.0
    }

    /// Returns true if this pin's bit is set in `value`.
    #[inline]
    pub const fn is_set_in(self, value: PortWord) -> bool {
        value & self.0 != 0
    }
}

impl ClearMask {
    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> PortWord {
        self.0
    }

    /// `value` with this pin's bit cleared.
    #[inline]
    pub const fn apply(self, value: PortWord) -> PortWord {
        value & self.0
    }
}

/// Where writes through a [`FastPin`] land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortTarget {
    /// The live hardware register.
    Live,
    /// The port's shadow register; the writer commits it to hardware.
    Shadow,
}

/// A pin resolved to a direct register handle.
///
/// # Example
///
/// ```rust
/// use rs_trackdrive::fastpin::{FastPin, PortTarget};
/// use rs_trackdrive::hal::MockBoard;
/// use rs_trackdrive::traits::PinDirection;
///
/// let board = MockBoard::new();
/// let pin = FastPin::resolve(&board, 12, PinDirection::Output).unwrap();
/// assert_eq!(pin.target(), PortTarget::Live);
///
/// critical_section::with(|cs| pin.write(&board, cs, true));
/// assert!(board.output_bit(12));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastPin {
    pin: u8,
    port: PortId,
    register: RegisterKind,
    set_mask: SetMask,
    clear_mask: ClearMask,
    target: PortTarget,
}

impl FastPin {
    /// Resolves `pin` against the live register of its port and configures
    /// its electrical direction.
    ///
    /// Returns `None` if the board has no such pin.
    pub fn resolve<P>(board: &P, pin: u8, direction: PinDirection) -> Option<Self>
    where
        P: FastPorts + PinIo + ?Sized,
    {
        let (port, bit) = board.locate(pin)?;
        board.set_pin_direction(pin, direction);
        let set_mask = SetMask::for_bit(bit);
        let register = match direction {
            PinDirection::Input => RegisterKind::Input,
            PinDirection::Output => RegisterKind::Output,
        };
        Some(Self {
            pin,
            port,
            register,
            set_mask,
            clear_mask: set_mask.complement(),
            target: PortTarget::Live,
        })
    }

    /// Resolves an output pin, substituting the shadow register when its port
    /// is shared.
    pub fn resolve_output_shadowed<P>(board: &P, pin: u8) -> Option<Self>
    where
        P: FastPorts + PinIo + ?Sized,
    {
        let mut fast = Self::resolve(board, pin, PinDirection::Output)?;
        if board.shadow_ports().is_shadowed(fast.port) {
            fast.target = PortTarget::Shadow;
        }
        Some(fast)
    }

    /// Logical pin number.
    #[inline]
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// Port the pin lives on.
    #[inline]
    pub const fn port(&self) -> PortId {
        self.port
    }

    /// Register the handle reads.
    #[inline]
    pub const fn register(&self) -> RegisterKind {
        self.register
    }

    /// Mask selecting this pin's bit.
    #[inline]
    pub const fn set_mask(&self) -> SetMask {
        self.set_mask
    }

    /// Mask clearing this pin's bit.
    #[inline]
    pub const fn clear_mask(&self) -> ClearMask {
        self.clear_mask
    }

    /// Live or shadow.
    #[inline]
    pub const fn target(&self) -> PortTarget {
        self.target
    }

    /// Returns true if writes go to a shadow register.
    #[inline]
    pub const fn is_shadowed(&self) -> bool {
        matches!(self.target, PortTarget::Shadow)
    }

    /// Drives the pin `high` or low.
    ///
    /// Shadow-backed pins only change the shadow; the caller commits it
    /// (see [`crate::shadow::transaction`]).
    #[inline]
    pub fn write<P>(&self, board: &P, cs: CriticalSection<'_>, high: bool)
    where
        P: FastPorts + ?Sized,
    {
        let apply = |value: PortWord| {
            if high {
                self.set_mask.apply(value)
            } else {
                self.clear_mask.apply(value)
            }
        };
        if self.is_shadowed() && board.shadow_ports().update(cs, self.port, apply) {
            return;
        }
        let live = board.read_port(self.port, RegisterKind::Output);
        board.write_port(self.port, apply(live));
    }

    /// Samples the pin's bit in its register.
    #[inline]
    pub fn is_high<P>(&self, board: &P) -> bool
    where
        P: FastPorts + ?Sized,
    {
        self.set_mask
            .is_set_in(board.read_port(self.port, self.register))
    }
}
