//! Core abstraction traits.

use crate::flags::CallFlags;
use crate::id::SigId;
use crate::signature::SignatureKind;

/// Common surface of the five interned signature types.
///
/// Lets registries and writers handle every table with one generic
/// implementation while keeping the kind visible in errors.
pub trait Signature {
    /// Which table this signature type lives in.
    const KIND: SignatureKind;

    /// The signature's id within its table.
    fn id(&self) -> SigId;
}

/// Derives static call flags from a function name.
///
/// Consulted once per function signature, when the signature is defined.
/// Implementations are typically a static lookup table for one graphics
/// API family.
pub trait CallClassifier {
    /// Flags every call to `name` carries.
    fn classify(&self, name: &str) -> CallFlags;

    /// True if `name` is an error query (e.g. `glGetError`) whose calls
    /// returning zero are noise and should be marked verbose.
    fn is_error_query(&self, name: &str) -> bool;
}

/// Classifier that assigns no flags. Useful for APIs without a table.
impl CallClassifier for () {
    fn classify(&self, _name: &str) -> CallFlags {
        CallFlags::empty()
    }

    fn is_error_query(&self, _name: &str) -> bool {
        false
    }
}
