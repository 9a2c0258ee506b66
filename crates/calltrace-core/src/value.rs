//! The [`Value`] tree produced by full-mode decoding.

use std::fmt;
use std::sync::Arc;

use crate::signature::{BitmaskSig, EnumSig, StructSig};

/// A decoded argument, return value, or nested member.
///
/// Arrays, structs, blobs, and reprs own their nested data. Enum,
/// bitmask, and struct values share their signature with the registry
/// that decoded them.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Null pointer or absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    SInt(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// Narrow string.
    String(String),
    /// Wide string as raw code units.
    WString(Vec<u32>),
    /// Opaque byte buffer.
    Blob(Vec<u8>),
    /// Enum constant.
    Enum {
        /// Constant set the value belongs to.
        sig: Arc<EnumSig>,
        /// Raw numeric value.
        value: i64,
    },
    /// Bitmask of OR-ed flags.
    Bitmask {
        /// Flag set used for display.
        sig: Arc<BitmaskSig>,
        /// Raw bits.
        value: u64,
    },
    /// Homogeneous or heterogeneous array.
    Array(Vec<Value>),
    /// Struct with one value per member of its signature.
    Struct {
        /// Layout.
        sig: Arc<StructSig>,
        /// Member values in layout order.
        members: Vec<Value>,
    },
    /// Pointer-sized token with no dereferenceable payload.
    Pointer(u64),
    /// A machine value paired with a human-readable rendering.
    Repr {
        /// Value shown to humans.
        human: Box<Value>,
        /// Value used for replay.
        machine: Box<Value>,
    },
}

impl Value {
    /// Interpret the value as a signed integer, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::SInt(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Enum { value, .. } => Some(*value),
            Self::Repr { machine, .. } => machine.as_i64(),
            _ => None,
        }
    }

    /// Interpret the value as an unsigned integer, if it is integral.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Bool(b) => Some(u64::from(*b)),
            Self::SInt(v) => u64::try_from(*v).ok(),
            Self::UInt(v) | Self::Pointer(v) => Some(*v),
            Self::Bitmask { value, .. } => Some(*value),
            Self::Enum { value, .. } => u64::try_from(*value).ok(),
            Self::Repr { machine, .. } => machine.as_u64(),
            _ => None,
        }
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Repr { machine, .. } => machine.as_str(),
            _ => None,
        }
    }

    /// True for integral zero, `false`, and null.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(v) => *v == 0.0,
            Self::Double(v) => *v == 0.0,
            other => other.as_u64() == Some(0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::SInt(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::WString(units) => {
                let s: String = units
                    .iter()
                    .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect();
                write!(f, "L{s:?}")
            }
            Self::Blob(bytes) => write!(f, "blob({})", bytes.len()),
            Self::Enum { sig, value } => match sig.name_of(*value) {
                Some(name) => f.write_str(name),
                None => write!(f, "{value}"),
            },
            Self::Bitmask { sig, value } => fmt_bitmask(f, sig, *value),
            Self::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            Self::Struct { sig, members } => {
                f.write_str("{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match sig.member_names.get(i) {
                        Some(name) => write!(f, "{name} = {member}")?,
                        None => write!(f, "{member}")?,
                    }
                }
                f.write_str("}")
            }
            Self::Pointer(v) => write!(f, "{v:#x}"),
            Self::Repr { human, .. } => write!(f, "{human}"),
        }
    }
}

/// Render a bitmask as `A | B`, with any unnamed remainder in hex.
fn fmt_bitmask(f: &mut fmt::Formatter<'_>, sig: &BitmaskSig, value: u64) -> fmt::Result {
    let mut rest = value;
    let mut first = true;
    for flag in &sig.flags {
        let matches = if flag.value == 0 {
            value == 0
        } else {
            rest & flag.value == flag.value
        };
        if matches {
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(&flag.name)?;
            rest &= !flag.value;
            first = false;
        }
    }
    if rest != 0 || first {
        if !first {
            f.write_str(" | ")?;
        }
        write!(f, "{rest:#x}")?;
    }
    Ok(())
}
