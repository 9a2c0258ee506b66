//! The [`CallFlags`] bitset describing call semantics.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Semantic classification of a call.
///
/// Static flags come from the function's signature (derived by a
/// [`CallClassifier`](crate::CallClassifier) when the signature is
/// defined). The decoder may add dynamic flags when a call completes,
/// e.g. [`INCOMPLETE`](Self::INCOMPLETE) for calls still pending at end
/// of stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallFlags(u32);

impl CallFlags {
    /// Call was synthesized by the tracer rather than intercepted.
    pub const FAKE: Self = Self(1 << 0);
    /// Replaying the call will not reproduce the recorded result.
    pub const NON_REPRODUCIBLE: Self = Self(1 << 1);
    /// Call only queries state.
    pub const NO_SIDE_EFFECTS: Self = Self(1 << 2);
    /// Call renders into the current render target.
    pub const RENDER: Self = Self(1 << 3);
    /// Call swaps or presents the render target.
    pub const SWAP_RENDERTARGET: Self = Self(1 << 4);
    /// Call ends a frame.
    pub const END_FRAME: Self = Self(1 << 5);
    /// Call never received its leave record.
    pub const INCOMPLETE: Self = Self(1 << 6);
    /// Call is noise; excluded from frame and replay accounting.
    pub const VERBOSE: Self = Self(1 << 7);
    /// Debug marker.
    pub const MARKER: Self = Self(1 << 8);
    /// Opens a debug marker group.
    pub const MARKER_PUSH: Self = Self(1 << 9);
    /// Closes a debug marker group.
    pub const MARKER_POP: Self = Self(1 << 10);

    const NAMES: [(Self, &'static str); 11] = [
        (Self::FAKE, "FAKE"),
        (Self::NON_REPRODUCIBLE, "NON_REPRODUCIBLE"),
        (Self::NO_SIDE_EFFECTS, "NO_SIDE_EFFECTS"),
        (Self::RENDER, "RENDER"),
        (Self::SWAP_RENDERTARGET, "SWAP_RENDERTARGET"),
        (Self::END_FRAME, "END_FRAME"),
        (Self::INCOMPLETE, "INCOMPLETE"),
        (Self::VERBOSE, "VERBOSE"),
        (Self::MARKER, "MARKER"),
        (Self::MARKER_PUSH, "MARKER_PUSH"),
        (Self::MARKER_POP, "MARKER_POP"),
    ];

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a set from raw bits as recorded in a stream.
    ///
    /// Unknown bits are kept so they survive a decode/encode cycle.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set every flag in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear every flag in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// True if this call ends a frame and is not verbose noise.
    pub const fn ends_frame(self) -> bool {
        self.contains(Self::END_FRAME) && !self.contains(Self::VERBOSE)
    }
}

impl BitOr for CallFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CallFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for CallFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "CallFlags(empty)");
        }
        write!(f, "CallFlags(")?;
        let mut rest = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            if !first {
                write!(f, " | ")?;
            }
            write!(f, "{rest:#x}")?;
        }
        write!(f, ")")
    }
}
