//! Strongly-typed identifiers for signatures, calls, and threads.

use std::fmt;

/// Identifies an interned signature within its kind's table.
///
/// Ids are dense and assigned in definition order starting at zero, so
/// `SigId(n)` is the n-th signature of its kind seen in the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SigId(pub u32);

impl SigId {
    /// The id as a table index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SigId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Sequential call number.
///
/// Assigned by the decoder when a call-enter record is read. Restored
/// from a bookmark when the decoder seeks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CallNo(pub u32);

impl CallNo {
    /// The call number following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for CallNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CallNo {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Thread on which a call was intercepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ThreadId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
