//! Tag-dispatched value grammar shared by full and scan decoding.
//!
//! Every rule reads exactly the same bytes in every [`Mode`]; the mode
//! only decides whether the decoded pieces are assembled into a
//! [`Value`]. Rules are written once with the materializing step guarded
//! by the mode so the two paths cannot drift apart.
//!
//! Signature bodies (struct, enum, bitmask, stack frame, function) are
//! metadata and are always decoded and registered, whatever the mode.

use std::sync::Arc;

use calltrace_core::{
    BitmaskFlag, BitmaskSig, CallClassifier, EnumSig, EnumValue, FunctionSig, SigId, StackFrame,
    StructSig, Value,
};

use crate::codec::*;
use crate::error::TraceError;
use crate::registry::{RegistryTable, SignatureRegistry};
use crate::source::ByteSource;

/// Deepest value nesting accepted before the stream is deemed corrupt.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Upper bound on speculative pre-allocation for counted sequences.
const MAX_PREALLOC: u64 = 4096;

/// How much of a record to materialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    /// Build owned values.
    #[default]
    Full,
    /// Advance the cursor only; no values are built.
    Scan,
    /// Reserved; currently identical to [`Scan`](Self::Scan).
    Skip,
}

impl Mode {
    /// True if this mode builds values.
    pub fn materializes(self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Decodes values and signature bodies from a byte source.
///
/// Borrows the decoder's source and registry for the duration of one
/// record; created on demand by [`StreamDecoder`](crate::StreamDecoder)
/// and usable standalone for tests and tools.
pub struct ValueDecoder<'a, S: ByteSource + ?Sized> {
    source: &'a mut S,
    registry: &'a mut SignatureRegistry,
    classifier: &'a dyn CallClassifier,
    version: u64,
    depth: usize,
}

impl<'a, S: ByteSource + ?Sized> ValueDecoder<'a, S> {
    /// Create a decoder for a stream of the given version.
    pub fn new(source: &'a mut S, registry: &'a mut SignatureRegistry, version: u64) -> Self {
        Self {
            source,
            registry,
            classifier: &(),
            version,
            depth: 0,
        }
    }

    /// Use `classifier` to derive flags for function signatures.
    pub fn with_classifier(mut self, classifier: &'a dyn CallClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// The stream version that gates format quirks.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The underlying source.
    pub fn source(&mut self) -> &mut S {
        self.source
    }

    // ── Values ──────────────────────────────────────────────────

    /// Read a tag byte and decode the value it introduces.
    ///
    /// Returns `Some` in [`Mode::Full`] and `None` otherwise.
    pub fn decode_value(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let at = self.source.tell();
        if self.depth >= MAX_VALUE_DEPTH {
            return Err(TraceError::corrupt(at, "values nested too deeply"));
        }
        let tag = self.source.read_byte()?;
        self.depth += 1;
        let value = self.decode_tagged(tag, at, mode);
        self.depth -= 1;
        value
    }

    /// Decode the value introduced by an already-read `tag`.
    fn decode_tagged(&mut self, tag: u8, at: u64, mode: Mode) -> Result<Option<Value>, TraceError> {
        let full = mode.materializes();
        match tag {
            TYPE_NULL => Ok(full.then_some(Value::Null)),
            TYPE_FALSE => Ok(full.then_some(Value::Bool(false))),
            TYPE_TRUE => Ok(full.then_some(Value::Bool(true))),
            TYPE_SINT => self.sint(mode),
            TYPE_UINT => self.uint(mode),
            TYPE_FLOAT => self.float(mode),
            TYPE_DOUBLE => self.double(mode),
            TYPE_STRING => self.string_value(mode),
            TYPE_WSTRING => self.wstring(mode),
            TYPE_BLOB => self.blob(mode),
            TYPE_ENUM => self.enum_value(mode),
            TYPE_BITMASK => self.bitmask(mode),
            TYPE_ARRAY => self.array(mode),
            TYPE_STRUCT => self.struct_value(mode),
            TYPE_OPAQUE => self.opaque(mode),
            TYPE_REPR => self.repr(mode),
            other => Err(TraceError::corrupt(at, format!("unknown value tag {other}"))),
        }
    }

    /// Signed integer payload.
    pub fn sint(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        if mode.materializes() {
            Ok(Some(Value::SInt(self.source.read_sint()?)))
        } else {
            self.source.skip_varint()?;
            Ok(None)
        }
    }

    /// Unsigned integer payload.
    pub fn uint(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        if mode.materializes() {
            Ok(Some(Value::UInt(self.source.read_uint()?)))
        } else {
            self.source.skip_varint()?;
            Ok(None)
        }
    }

    /// f32 payload.
    pub fn float(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        if mode.materializes() {
            let mut buf = [0u8; 4];
            self.source.read_exact(&mut buf)?;
            Ok(Some(Value::Float(f32::from_le_bytes(buf))))
        } else {
            self.source.skip(4)?;
            Ok(None)
        }
    }

    /// f64 payload.
    pub fn double(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        if mode.materializes() {
            let mut buf = [0u8; 8];
            self.source.read_exact(&mut buf)?;
            Ok(Some(Value::Double(f64::from_le_bytes(buf))))
        } else {
            self.source.skip(8)?;
            Ok(None)
        }
    }

    /// Length-prefixed string payload.
    pub fn string_value(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        if mode.materializes() {
            Ok(Some(Value::String(self.read_string()?)))
        } else {
            self.skip_string()?;
            Ok(None)
        }
    }

    /// Wide string payload: a count of code-unit varints.
    pub fn wstring(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let n = self.read_count()?;
        let mut units = mode.materializes().then(|| prealloc(n));
        for _ in 0..n {
            if let Some(units) = units.as_mut() {
                let at = self.source.tell();
                let unit = u32::try_from(self.source.read_uint()?)
                    .map_err(|_| TraceError::corrupt(at, "wide character overflows 32 bits"))?;
                units.push(unit);
            } else {
                self.source.skip_varint()?;
            }
        }
        Ok(units.map(Value::WString))
    }

    /// Length-prefixed blob payload.
    pub fn blob(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let len = self.source.read_uint()?;
        if mode.materializes() {
            Ok(Some(Value::Blob(self.source.read_bytes(len)?)))
        } else {
            self.source.skip(len)?;
            Ok(None)
        }
    }

    /// Enum payload: signature reference then signed value.
    pub fn enum_value(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let sig = self.sig_ref(Self::enum_body)?;
        if mode.materializes() {
            let value = self.source.read_sint()?;
            Ok(Some(Value::Enum { sig, value }))
        } else {
            self.source.skip_varint()?;
            Ok(None)
        }
    }

    /// Bitmask payload: signature reference then raw bits.
    pub fn bitmask(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let sig = self.sig_ref(Self::bitmask_body)?;
        if mode.materializes() {
            let value = self.source.read_uint()?;
            Ok(Some(Value::Bitmask { sig, value }))
        } else {
            self.source.skip_varint()?;
            Ok(None)
        }
    }

    /// Array payload: element count then nested values.
    pub fn array(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let n = self.read_count()?;
        let mut items = mode.materializes().then(|| prealloc(n));
        for _ in 0..n {
            let item = self.decode_value(mode)?;
            if let (Some(items), Some(item)) = (items.as_mut(), item) {
                items.push(item);
            }
        }
        Ok(items.map(Value::Array))
    }

    /// Struct payload: signature reference then one value per member.
    pub fn struct_value(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let sig = self.sig_ref(Self::struct_body)?;
        let n = sig.member_names.len();
        let mut members = mode.materializes().then(|| Vec::with_capacity(n));
        for _ in 0..n {
            let member = self.decode_value(mode)?;
            if let (Some(members), Some(member)) = (members.as_mut(), member) {
                members.push(member);
            }
        }
        Ok(members.map(|members| Value::Struct { sig, members }))
    }

    /// Opaque pointer payload.
    pub fn opaque(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        if mode.materializes() {
            Ok(Some(Value::Pointer(self.source.read_uint()?)))
        } else {
            self.source.skip_varint()?;
            Ok(None)
        }
    }

    /// Repr payload: human value then machine value.
    pub fn repr(&mut self, mode: Mode) -> Result<Option<Value>, TraceError> {
        let human = self.decode_value(mode)?;
        let machine = self.decode_value(mode)?;
        Ok(match (human, machine) {
            (Some(human), Some(machine)) => Some(Value::Repr {
                human: Box::new(human),
                machine: Box::new(machine),
            }),
            _ => None,
        })
    }

    // ── Signatures ──────────────────────────────────────────────

    /// Read a signature reference, defining it first if it is inline.
    fn sig_ref<T: RegistryTable>(
        &mut self,
        body: fn(&mut Self, SigId) -> Result<T, TraceError>,
    ) -> Result<Arc<T>, TraceError> {
        let at = self.source.tell();
        let raw = self.source.read_uint()?;
        let (id, inline) = decode_sig_ref(raw)
            .ok_or_else(|| TraceError::corrupt(at, "signature id overflows 32 bits"))?;
        if inline {
            self.define_with(id, body)
        } else {
            self.registry.get::<T>(id).cloned()
        }
    }

    /// Decode a signature body at the current offset and register it.
    fn define_with<T: RegistryTable>(
        &mut self,
        id: SigId,
        body: fn(&mut Self, SigId) -> Result<T, TraceError>,
    ) -> Result<Arc<T>, TraceError> {
        let offset = self.source.tell();
        let sig = body(self, id)?;
        self.registry.define(id, sig, offset)
    }

    /// Read a signature id varint as used by top-level records.
    pub fn read_sig_id(&mut self) -> Result<SigId, TraceError> {
        let at = self.source.tell();
        let raw = self.source.read_uint()?;
        u32::try_from(raw)
            .map(SigId)
            .map_err(|_| TraceError::corrupt(at, "signature id overflows 32 bits"))
    }

    /// Define the function signature whose body follows.
    pub fn define_function(&mut self, id: SigId) -> Result<Arc<FunctionSig>, TraceError> {
        self.define_with(id, Self::function_body)
    }

    /// Define the struct signature whose body follows.
    pub fn define_struct(&mut self, id: SigId) -> Result<Arc<StructSig>, TraceError> {
        self.define_with(id, Self::struct_body)
    }

    /// Define the enum signature whose body follows.
    pub fn define_enum(&mut self, id: SigId) -> Result<Arc<EnumSig>, TraceError> {
        self.define_with(id, Self::enum_body)
    }

    /// Define the bitmask signature whose body follows.
    pub fn define_bitmask(&mut self, id: SigId) -> Result<Arc<BitmaskSig>, TraceError> {
        self.define_with(id, Self::bitmask_body)
    }

    /// Define the stack frame whose body follows.
    pub fn define_frame(&mut self, id: SigId) -> Result<Arc<StackFrame>, TraceError> {
        self.define_with(id, Self::frame_body)
    }

    /// Read a stack frame reference, defining it first if it is inline.
    pub fn frame_ref(&mut self) -> Result<Arc<StackFrame>, TraceError> {
        self.sig_ref(Self::frame_body)
    }

    fn function_body(&mut self, id: SigId) -> Result<FunctionSig, TraceError> {
        let name = self.read_string()?;
        let n = self.read_count()?;
        let mut arg_names = prealloc(n);
        for _ in 0..n {
            arg_names.push(self.read_string()?);
        }
        let flags = self.classifier.classify(&name);
        Ok(FunctionSig {
            id,
            name,
            arg_names,
            flags,
        })
    }

    fn struct_body(&mut self, id: SigId) -> Result<StructSig, TraceError> {
        let name = self.read_string()?;
        let n = self.read_count()?;
        let mut member_names = prealloc(n);
        for _ in 0..n {
            member_names.push(self.read_string()?);
        }
        Ok(StructSig {
            id,
            name,
            member_names,
        })
    }

    fn enum_body(&mut self, id: SigId) -> Result<EnumSig, TraceError> {
        if self.version < ENUM_LIST_VERSION {
            // Legacy form: one constant whose value is a full tagged value.
            let name = self.read_string()?;
            let at = self.source.tell();
            let value = self
                .decode_value(Mode::Full)?
                .and_then(|v| v.as_i64())
                .ok_or_else(|| TraceError::corrupt(at, "enum constant is not an integer"))?;
            return Ok(EnumSig {
                id,
                values: vec![EnumValue { name, value }],
            });
        }
        let n = self.read_count()?;
        let mut values = prealloc(n);
        for _ in 0..n {
            let name = self.read_string()?;
            let value = self.source.read_sint()?;
            values.push(EnumValue { name, value });
        }
        Ok(EnumSig { id, values })
    }

    fn bitmask_body(&mut self, id: SigId) -> Result<BitmaskSig, TraceError> {
        let n = self.read_count()?;
        let mut flags = prealloc(n);
        for _ in 0..n {
            let name = self.read_string()?;
            let value = self.source.read_uint()?;
            flags.push(BitmaskFlag { name, value });
        }
        Ok(BitmaskSig { id, flags })
    }

    fn frame_body(&mut self, id: SigId) -> Result<StackFrame, TraceError> {
        let mut frame = StackFrame {
            id,
            ..StackFrame::default()
        };
        loop {
            let at = self.source.tell();
            match self.source.read_byte()? {
                FRAME_END => return Ok(frame),
                FRAME_MODULE => frame.module = Some(self.read_string()?),
                FRAME_FUNCTION => frame.function = Some(self.read_string()?),
                FRAME_FILENAME => frame.filename = Some(self.read_string()?),
                FRAME_LINENUMBER => {
                    let line = self.source.read_uint()?;
                    frame.linenumber = Some(u32::try_from(line).map_err(|_| {
                        TraceError::corrupt(at, "line number overflows 32 bits")
                    })?);
                }
                FRAME_OFFSET => frame.offset = Some(self.source.read_uint()?),
                other => {
                    return Err(TraceError::corrupt(
                        at,
                        format!("unknown stack frame detail {other}"),
                    ))
                }
            }
        }
    }

    // ── Primitives ──────────────────────────────────────────────

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, TraceError> {
        let len = self.source.read_uint()?;
        let at = self.source.tell();
        let bytes = self.source.read_bytes(len)?;
        String::from_utf8(bytes)
            .map_err(|e| TraceError::corrupt(at, format!("invalid UTF-8 string: {e}")))
    }

    /// Advance past a length-prefixed string.
    pub fn skip_string(&mut self) -> Result<(), TraceError> {
        let len = self.source.read_uint()?;
        self.source.skip(len)
    }

    /// Read an element count, rejecting counts larger than the data left.
    fn read_count(&mut self) -> Result<u64, TraceError> {
        let n = self.source.read_uint()?;
        let at = self.source.tell();
        if let Some(len) = self.source.len() {
            // Every counted element occupies at least one byte.
            if n > len.saturating_sub(at) {
                return Err(TraceError::corrupt(at, format!("count {n} exceeds remaining data")));
            }
        }
        Ok(n)
    }
}

fn prealloc<T>(n: u64) -> Vec<T> {
    Vec::with_capacity(n.min(MAX_PREALLOC) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    fn decode_full(bytes: &[u8], version: u64) -> Result<(Option<Value>, u64), TraceError> {
        let mut src = SliceSource::new(bytes);
        let mut reg = SignatureRegistry::new();
        let value = ValueDecoder::new(&mut src, &mut reg, version).decode_value(Mode::Full)?;
        Ok((value, src.tell()))
    }

    #[test]
    fn scalars_decode() {
        let mut buf = vec![TYPE_SINT];
        write_sint(&mut buf, -5);
        assert_eq!(decode_full(&buf, FORMAT_VERSION).unwrap().0, Some(Value::SInt(-5)));

        let mut buf = vec![TYPE_FLOAT];
        buf.extend_from_slice(&1.5f32.to_le_bytes());
        assert_eq!(decode_full(&buf, FORMAT_VERSION).unwrap().0, Some(Value::Float(1.5)));

        let buf = [TYPE_TRUE];
        assert_eq!(decode_full(&buf, FORMAT_VERSION).unwrap().0, Some(Value::Bool(true)));
    }

    #[test]
    fn inline_enum_is_registered_and_shared() {
        let mut buf = vec![TYPE_ARRAY, 2];
        // First element defines enum 0 inline.
        buf.push(TYPE_ENUM);
        write_uint(&mut buf, encode_sig_ref(SigId(0), true));
        write_uint(&mut buf, 1);
        write_string(&mut buf, "GL_TRIANGLES");
        write_sint(&mut buf, 4);
        write_sint(&mut buf, 4);
        // Second element references it.
        buf.push(TYPE_ENUM);
        write_uint(&mut buf, encode_sig_ref(SigId(0), false));
        write_sint(&mut buf, 4);

        let mut src = SliceSource::new(&buf);
        let mut reg = SignatureRegistry::new();
        let value = ValueDecoder::new(&mut src, &mut reg, FORMAT_VERSION)
            .decode_value(Mode::Full)
            .unwrap()
            .unwrap();
        assert_eq!(value.to_string(), "{GL_TRIANGLES, GL_TRIANGLES}");
        assert_eq!(reg.table::<EnumSig>().len(), 1);
    }

    #[test]
    fn legacy_enum_signature_reads_single_constant() {
        let mut buf = vec![TYPE_ENUM];
        write_uint(&mut buf, encode_sig_ref(SigId(0), true));
        write_string(&mut buf, "GL_LINES");
        buf.push(TYPE_UINT);
        write_uint(&mut buf, 1);
        write_sint(&mut buf, 1);
        let (value, _) = decode_full(&buf, 2).unwrap();
        assert_eq!(value.unwrap().to_string(), "GL_LINES");
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let buf = [TYPE_ARRAY, 1, 0x42];
        let err = decode_full(&buf, FORMAT_VERSION).unwrap_err();
        assert!(matches!(err, TraceError::CorruptStream { offset: 2, .. }));
    }

    #[test]
    fn reference_to_undefined_struct_fails() {
        let mut buf = vec![TYPE_STRUCT];
        write_uint(&mut buf, encode_sig_ref(SigId(0), false));
        assert!(matches!(
            decode_full(&buf, FORMAT_VERSION),
            Err(TraceError::UnknownSignatureId { .. })
        ));
    }

    #[test]
    fn scan_returns_nothing_and_matches_offset() {
        let mut buf = vec![TYPE_REPR, TYPE_STRING];
        write_string(&mut buf, "GL_ONE");
        buf.push(TYPE_DOUBLE);
        buf.extend_from_slice(&2.0f64.to_le_bytes());

        let (full, full_end) = decode_full(&buf, FORMAT_VERSION).unwrap();
        assert!(full.is_some());

        let mut src = SliceSource::new(&buf);
        let mut reg = SignatureRegistry::new();
        let scanned = ValueDecoder::new(&mut src, &mut reg, FORMAT_VERSION)
            .decode_value(Mode::Scan)
            .unwrap();
        assert!(scanned.is_none());
        assert_eq!(src.tell(), full_end);
    }

    #[test]
    fn runaway_nesting_is_corrupt() {
        let mut buf = Vec::new();
        for _ in 0..=MAX_VALUE_DEPTH {
            buf.extend_from_slice(&[TYPE_ARRAY, 1]);
        }
        buf.push(TYPE_NULL);
        assert!(matches!(
            decode_full(&buf, FORMAT_VERSION),
            Err(TraceError::CorruptStream { .. })
        ));
    }

    #[test]
    fn huge_counts_are_rejected_before_allocating() {
        let mut buf = vec![TYPE_ARRAY];
        write_uint(&mut buf, u64::MAX >> 1);
        assert!(matches!(
            decode_full(&buf, FORMAT_VERSION),
            Err(TraceError::CorruptStream { .. })
        ));
    }
}
