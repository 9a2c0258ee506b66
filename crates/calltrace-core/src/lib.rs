//! Core types for the calltrace stream model.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the data a trace decoder produces: signature ids, call flags, the
//! interned signatures themselves, the [`Value`] tree, and the [`Call`]
//! record, plus the [`CallClassifier`] seam used to derive static call
//! flags from function names.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod call;
pub mod flags;
pub mod id;
pub mod signature;
pub mod traits;
pub mod value;

pub use call::{Backtrace, Call};
pub use flags::CallFlags;
pub use id::{CallNo, SigId, ThreadId};
pub use signature::{
    BitmaskFlag, BitmaskSig, EnumSig, EnumValue, FunctionSig, SignatureKind, StackFrame,
    StructSig,
};
pub use traits::{CallClassifier, Signature};
pub use value::Value;
