//! Append-only signature tables with bookmark re-synchronization.
//!
//! Each [`SignatureTable`] maps dense ids `0..len` to a shared signature
//! and the stream offset at which its body was first decoded. Ids are
//! only valid once their definition has been read, and entries are never
//! removed, so after a backward seek the decoder meets definitions it
//! has already recorded. [`SignatureTable::define`] accepts those
//! silently when the offsets agree and rejects anything else.

use std::sync::Arc;

use calltrace_core::{
    BitmaskSig, EnumSig, FunctionSig, SigId, Signature, SignatureKind, StackFrame, StructSig,
};
use tracing::trace;

use crate::error::TraceError;

#[derive(Debug)]
struct Slot<T> {
    sig: Arc<T>,
    offset: u64,
}

/// One id-indexed signature table.
#[derive(Debug)]
pub struct SignatureTable<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for SignatureTable<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T: Signature> SignatureTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of defined ids; valid ids are `0..len`.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing has been defined yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up a defined signature.
    pub fn lookup(&self, id: SigId) -> Option<&Arc<T>> {
        self.slots.get(id.index()).map(|s| &s.sig)
    }

    /// Look up a defined signature, failing with `UnknownSignatureId`.
    pub fn get(&self, id: SigId) -> Result<&Arc<T>, TraceError> {
        self.lookup(id).ok_or(TraceError::UnknownSignatureId { kind: T::KIND, id })
    }

    /// Offset at which `id`'s body was first decoded.
    pub fn offset_of(&self, id: SigId) -> Option<u64> {
        self.slots.get(id.index()).map(|s| s.offset)
    }

    /// Record the definition of `id` whose body starts at `offset`.
    ///
    /// - `id == len`: appended.
    /// - `id < len` at the recorded offset: a re-read after a seek; the
    ///   existing entry is kept and returned.
    /// - `id < len` at another offset: `SignatureMismatch`.
    /// - `id > len`: `OutOfOrderSignatureId`.
    pub fn define(&mut self, id: SigId, sig: T, offset: u64) -> Result<&Arc<T>, TraceError> {
        let kind = T::KIND;
        let len = self.slots.len();
        let index = id.index();
        if index < len {
            let recorded_offset = self.slots[index].offset;
            if recorded_offset != offset {
                return Err(TraceError::SignatureMismatch {
                    kind,
                    id,
                    recorded_offset,
                    offset,
                });
            }
            trace!(%kind, %id, offset, "signature re-synchronized");
            return Ok(&self.slots[index].sig);
        }
        if index > len {
            return Err(TraceError::OutOfOrderSignatureId {
                kind,
                id,
                expected: SigId(len as u32),
            });
        }
        trace!(%kind, %id, offset, "signature defined");
        self.slots.push(Slot {
            sig: Arc::new(sig),
            offset,
        });
        Ok(&self.slots[index].sig)
    }

    /// Iterate signatures in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.slots.iter().map(|s| &s.sig)
    }
}

/// Gives generic code access to the registry table for a signature type.
pub trait RegistryTable: Signature + Sized {
    /// The table holding this signature type.
    fn table(registry: &SignatureRegistry) -> &SignatureTable<Self>;

    /// Mutable access to the table holding this signature type.
    fn table_mut(registry: &mut SignatureRegistry) -> &mut SignatureTable<Self>;
}

macro_rules! registry_table {
    ($ty:ty, $field:ident) => {
        impl RegistryTable for $ty {
            fn table(registry: &SignatureRegistry) -> &SignatureTable<Self> {
                &registry.$field
            }

            fn table_mut(registry: &mut SignatureRegistry) -> &mut SignatureTable<Self> {
                &mut registry.$field
            }
        }
    };
}

registry_table!(FunctionSig, functions);
registry_table!(StructSig, structs);
registry_table!(EnumSig, enums);
registry_table!(BitmaskSig, bitmasks);
registry_table!(StackFrame, frames);

/// The five signature tables a decoder maintains.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    functions: SignatureTable<FunctionSig>,
    structs: SignatureTable<StructSig>,
    enums: SignatureTable<EnumSig>,
    bitmasks: SignatureTable<BitmaskSig>,
    frames: SignatureTable<StackFrame>,
}

impl SignatureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for signature type `T`.
    pub fn table<T: RegistryTable>(&self) -> &SignatureTable<T> {
        T::table(self)
    }

    /// Look up a signature of type `T`, failing with `UnknownSignatureId`.
    pub fn get<T: RegistryTable>(&self, id: SigId) -> Result<&Arc<T>, TraceError> {
        T::table(self).get(id)
    }

    /// Define a signature of type `T`; see [`SignatureTable::define`].
    pub fn define<T: RegistryTable>(
        &mut self,
        id: SigId,
        sig: T,
        offset: u64,
    ) -> Result<Arc<T>, TraceError> {
        T::table_mut(self).define(id, sig, offset).cloned()
    }

    /// Number of defined ids of `kind`.
    pub fn len(&self, kind: SignatureKind) -> usize {
        match kind {
            SignatureKind::Function => self.functions.len(),
            SignatureKind::Struct => self.structs.len(),
            SignatureKind::Enum => self.enums.len(),
            SignatureKind::Bitmask => self.bitmasks.len(),
            SignatureKind::StackFrame => self.frames.len(),
        }
    }

    /// True if `id` is defined in the `kind` table.
    pub fn contains(&self, kind: SignatureKind, id: SigId) -> bool {
        id.index() < self.len(kind)
    }

    /// Drop every table.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
