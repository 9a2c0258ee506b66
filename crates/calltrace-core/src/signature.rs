//! Interned signatures: the metadata a stream defines once and then
//! references by [`SigId`].
//!
//! Signatures are immutable once decoded. Values and calls hold them
//! behind `Arc` so a produced [`Call`](crate::Call) stays self-describing
//! after the decoder that produced it is dropped.

use std::fmt;

use crate::flags::CallFlags;
use crate::id::SigId;
use crate::traits::Signature;

/// The five signature tables a stream maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    /// Function signatures, referenced by call-enter records.
    Function,
    /// Struct layouts, referenced by struct values.
    Struct,
    /// Enum constant sets, referenced by enum values.
    Enum,
    /// Bitmask flag sets, referenced by bitmask values.
    Bitmask,
    /// Backtrace stack frames.
    StackFrame,
}

impl SignatureKind {
    /// All kinds, in table order.
    pub const ALL: [Self; 5] = [
        Self::Function,
        Self::Struct,
        Self::Enum,
        Self::Bitmask,
        Self::StackFrame,
    ];
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Function => "function",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Bitmask => "bitmask",
            Self::StackFrame => "stack frame",
        };
        f.write_str(name)
    }
}

/// A traced function: its name, argument names, and static call flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSig {
    /// Id within the function table.
    pub id: SigId,
    /// Function name, e.g. `"glDrawArrays"`.
    pub name: String,
    /// Argument names in declaration order.
    pub arg_names: Vec<String>,
    /// Flags derived from the name when the signature was defined.
    pub flags: CallFlags,
}

impl Signature for FunctionSig {
    const KIND: SignatureKind = SignatureKind::Function;

    fn id(&self) -> SigId {
        self.id
    }
}

/// A struct layout: type name plus member names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructSig {
    /// Id within the struct table.
    pub id: SigId,
    /// Struct type name.
    pub name: String,
    /// Member names; a struct value carries one nested value per member.
    pub member_names: Vec<String>,
}

impl Signature for StructSig {
    const KIND: SignatureKind = SignatureKind::Struct;

    fn id(&self) -> SigId {
        self.id
    }
}

/// One named enum constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    /// Constant name, e.g. `"GL_TRIANGLES"`.
    pub name: String,
    /// Numeric value.
    pub value: i64,
}

/// A set of named enum constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumSig {
    /// Id within the enum table.
    pub id: SigId,
    /// Known constants.
    pub values: Vec<EnumValue>,
}

impl EnumSig {
    /// Name of the first constant with this value, if any.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.name.as_str())
    }
}

impl Signature for EnumSig {
    const KIND: SignatureKind = SignatureKind::Enum;

    fn id(&self) -> SigId {
        self.id
    }
}

/// One named bitmask flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitmaskFlag {
    /// Flag name, e.g. `"GL_COLOR_BUFFER_BIT"`.
    pub name: String,
    /// Bits the flag covers. A zero-valued flag names the empty mask.
    pub value: u64,
}

/// A set of named bitmask flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitmaskSig {
    /// Id within the bitmask table.
    pub id: SigId,
    /// Known flags, in display order.
    pub flags: Vec<BitmaskFlag>,
}

impl Signature for BitmaskSig {
    const KIND: SignatureKind = SignatureKind::Bitmask;

    fn id(&self) -> SigId {
        self.id
    }
}

/// One backtrace frame. Every location field is optional in the stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackFrame {
    /// Id within the stack-frame table.
    pub id: SigId,
    /// Module (shared object) name.
    pub module: Option<String>,
    /// Function name.
    pub function: Option<String>,
    /// Source file name.
    pub filename: Option<String>,
    /// Source line number.
    pub linenumber: Option<u32>,
    /// Offset within the module.
    pub offset: Option<u64>,
}

impl Signature for StackFrame {
    const KIND: SignatureKind = SignatureKind::StackFrame;

    fn id(&self) -> SigId {
        self.id
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(module) = &self.module {
            write!(f, "{module}: ")?;
        }
        f.write_str(self.function.as_deref().unwrap_or("??"))?;
        if let Some(offset) = self.offset {
            write!(f, "+{offset:#x}")?;
        }
        if let Some(filename) = &self.filename {
            write!(f, " ({filename}")?;
            if let Some(line) = self.linenumber {
                write!(f, ":{line}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
