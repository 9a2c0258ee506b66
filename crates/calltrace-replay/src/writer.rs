//! Trace stream writer.
//!
//! [`TraceWriter`] encodes calls into the binary trace format, writing
//! the version header immediately on construction. Function signatures
//! are emitted as top-level records before the first call that uses
//! them; struct, enum, bitmask, and stack-frame signatures are defined
//! inline the first time a value or backtrace references them.
//!
//! Ids must be introduced densely per kind (`0, 1, 2, ...`), in the order
//! the decoder will meet them. A signature that would skip an id is
//! rejected with [`TraceError::OutOfOrderSignatureId`] and nothing of the
//! failed record reaches the output.

use std::io::Write;

use indexmap::IndexSet;

use calltrace_core::{
    BitmaskSig, Call, CallFlags, CallNo, EnumSig, FunctionSig, SigId, Signature, SignatureKind,
    StackFrame, StructSig, Value,
};

use crate::codec::*;
use crate::error::TraceError;

/// Writes trace data to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use calltrace_core::{Call, CallFlags, CallNo, FunctionSig, SigId, ThreadId, Value};
/// use calltrace_replay::{SliceSource, StreamDecoder, TraceWriter};
///
/// let sig = Arc::new(FunctionSig {
///     id: SigId(0),
///     name: "glClear".into(),
///     arg_names: vec!["mask".into()],
///     flags: CallFlags::empty(),
/// });
/// let mut call = Call::new(CallNo(0), ThreadId(0), sig);
/// call.set_arg(0, Value::UInt(0x4000));
///
/// let mut writer = TraceWriter::new(Vec::new()).unwrap();
/// writer.write_call(&call).unwrap();
/// let bytes = writer.into_inner();
///
/// let mut decoder = StreamDecoder::open(SliceSource::owned(bytes)).unwrap();
/// let decoded = decoder.next_call().unwrap().unwrap();
/// assert_eq!(decoded.to_string(), "0 glClear(mask = 16384)");
/// assert!(decoder.next_call().unwrap().is_none());
/// ```
pub struct TraceWriter<W: Write> {
    writer: W,
    enc: Encoder,
    next_call_no: CallNo,
}

impl<W: Write> TraceWriter<W> {
    /// Create a writer for the newest format version.
    pub fn new(writer: W) -> Result<Self, TraceError> {
        Self::with_version(writer, FORMAT_VERSION)
    }

    /// Create a writer that emits an older format version.
    pub fn with_version(mut writer: W, version: u64) -> Result<Self, TraceError> {
        if version > FORMAT_VERSION {
            return Err(TraceError::UnsupportedVersion { found: version });
        }
        let mut header = Vec::new();
        write_uint(&mut header, version);
        writer.write_all(&header)?;
        Ok(Self {
            writer,
            enc: Encoder {
                buf: Vec::new(),
                defined: IndexSet::new(),
                version,
            },
            next_call_no: CallNo(0),
        })
    }

    /// The format version being written.
    pub fn version(&self) -> u64 {
        self.enc.version
    }

    /// Number of call-enter records written so far.
    pub fn calls_written(&self) -> u32 {
        self.next_call_no.0
    }

    /// Emit a top-level function signature record unless already defined.
    pub fn define_function(&mut self, sig: &FunctionSig) -> Result<(), TraceError> {
        self.emit(|enc| enc.record(EVENT_FUNCTION_SIG, sig, Encoder::function_body))
    }

    /// Emit a top-level struct signature record unless already defined.
    pub fn define_struct(&mut self, sig: &StructSig) -> Result<(), TraceError> {
        self.emit(|enc| enc.record(EVENT_STRUCT_SIG, sig, Encoder::struct_body))
    }

    /// Emit a top-level enum signature record unless already defined.
    pub fn define_enum(&mut self, sig: &EnumSig) -> Result<(), TraceError> {
        self.emit(|enc| enc.record(EVENT_ENUM_SIG, sig, Encoder::enum_body))
    }

    /// Emit a top-level bitmask signature record unless already defined.
    pub fn define_bitmask(&mut self, sig: &BitmaskSig) -> Result<(), TraceError> {
        self.emit(|enc| enc.record(EVENT_BITMASK_SIG, sig, Encoder::bitmask_body))
    }

    /// Emit a top-level stack frame record unless already defined.
    pub fn define_frame(&mut self, frame: &StackFrame) -> Result<(), TraceError> {
        self.emit(|enc| enc.record(EVENT_FRAME_SIG, frame, Encoder::frame_body))
    }

    /// Write a call-enter record and return the number a decoder will
    /// assign to it.
    ///
    /// Arguments, thread id, and backtrace come from `call`; its `no`
    /// field is ignored.
    pub fn write_enter(&mut self, call: &Call) -> Result<CallNo, TraceError> {
        self.define_function(&call.sig)?;
        self.emit(|enc| enc.enter(call))?;

        let no = self.next_call_no;
        self.next_call_no = no.next();
        Ok(no)
    }

    /// Write the call-leave record completing call `no`.
    ///
    /// Flags on `call` beyond its signature's static flags are recorded
    /// when the format version carries call flags.
    pub fn write_leave(&mut self, no: CallNo, call: &Call) -> Result<(), TraceError> {
        self.emit(|enc| enc.leave(no, call))
    }

    /// Write a complete call: enter immediately followed by leave.
    pub fn write_call(&mut self, call: &Call) -> Result<CallNo, TraceError> {
        let no = self.write_enter(call)?;
        self.write_leave(no, call)?;
        Ok(no)
    }

    /// Append bytes verbatim (useful for testing malformed streams).
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TraceError> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), TraceError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Consume the writer and return the underlying `Write` sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Encode one record and write it out, or drop it entirely if
    /// encoding fails.
    fn emit(
        &mut self,
        encode: impl FnOnce(&mut Encoder) -> Result<(), TraceError>,
    ) -> Result<(), TraceError> {
        let defined = self.enc.defined.len();
        if let Err(e) = encode(&mut self.enc) {
            self.enc.buf.clear();
            self.enc.defined.truncate(defined);
            return Err(e);
        }
        self.flush_record()
    }

    fn flush_record(&mut self) -> Result<(), TraceError> {
        let result = self.writer.write_all(&self.enc.buf);
        self.enc.buf.clear();
        result.map_err(TraceError::from)
    }
}

/// Record encoder: the pending record bytes plus the set of signatures
/// the stream has already defined.
struct Encoder {
    buf: Vec<u8>,
    defined: IndexSet<(SignatureKind, SigId)>,
    version: u64,
}

impl Encoder {
    /// Mark `sig` as defined, returning false if it already was.
    ///
    /// A new signature must take the next free id of its kind.
    fn claim<T: Signature>(&mut self, sig: &T) -> Result<bool, TraceError> {
        let key = (T::KIND, sig.id());
        if self.defined.contains(&key) {
            return Ok(false);
        }
        let expected = self.next_id(T::KIND);
        if sig.id() != expected {
            return Err(TraceError::OutOfOrderSignatureId {
                kind: T::KIND,
                id: sig.id(),
                expected,
            });
        }
        self.defined.insert(key);
        Ok(true)
    }

    fn next_id(&self, kind: SignatureKind) -> SigId {
        let n = self.defined.iter().filter(|(k, _)| *k == kind).count();
        SigId(n as u32)
    }

    /// Emit a top-level signature record if `sig` is new to the stream.
    fn record<T: Signature>(
        &mut self,
        event: u8,
        sig: &T,
        body: fn(&mut Self, &T),
    ) -> Result<(), TraceError> {
        if self.claim(sig)? {
            self.buf.push(event);
            write_uint(&mut self.buf, u64::from(sig.id().0));
            body(self, sig);
        }
        Ok(())
    }

    /// Emit a signature reference, inlining the body on first use.
    fn sig_ref<T: Signature>(&mut self, sig: &T, body: fn(&mut Self, &T)) -> Result<(), TraceError> {
        let inline = self.claim(sig)?;
        write_uint(&mut self.buf, encode_sig_ref(sig.id(), inline));
        if inline {
            body(self, sig);
        }
        Ok(())
    }

    fn enter(&mut self, call: &Call) -> Result<(), TraceError> {
        self.buf.push(EVENT_ENTER);
        if self.version >= THREAD_ID_VERSION {
            write_uint(&mut self.buf, u64::from(call.thread_id.0));
        }
        write_uint(&mut self.buf, u64::from(call.sig.id.0));
        if self.version < THREAD_ID_VERSION && call.thread_id.0 != 0 {
            self.buf.push(CALL_THREAD);
            write_uint(&mut self.buf, u64::from(call.thread_id.0));
        }
        for (index, arg) in call.args.iter().enumerate() {
            self.buf.push(CALL_ARG);
            write_uint(&mut self.buf, index as u64);
            self.value(arg)?;
        }
        if let Some(frames) = &call.backtrace {
            if self.version >= BACKTRACE_VERSION {
                self.buf.push(CALL_BACKTRACE);
                write_uint(&mut self.buf, frames.len() as u64);
                for frame in frames {
                    self.sig_ref(frame.as_ref(), Self::frame_body)?;
                }
            }
        }
        self.buf.push(CALL_END);
        Ok(())
    }

    fn leave(&mut self, no: CallNo, call: &Call) -> Result<(), TraceError> {
        self.buf.push(EVENT_LEAVE);
        write_uint(&mut self.buf, u64::from(no.0));
        if let Some(ret) = &call.ret {
            self.buf.push(CALL_RET);
            self.value(ret)?;
        }
        let mut recorded = call.flags;
        recorded.remove(call.sig.flags);
        recorded.remove(CallFlags::INCOMPLETE);
        if self.version >= CALL_FLAGS_VERSION && !recorded.is_empty() {
            self.buf.push(CALL_FLAGS);
            write_uint(&mut self.buf, u64::from(recorded.bits()));
        }
        self.buf.push(CALL_END);
        Ok(())
    }

    fn value(&mut self, value: &Value) -> Result<(), TraceError> {
        match value {
            Value::Null => self.buf.push(TYPE_NULL),
            Value::Bool(false) => self.buf.push(TYPE_FALSE),
            Value::Bool(true) => self.buf.push(TYPE_TRUE),
            Value::SInt(v) => {
                self.buf.push(TYPE_SINT);
                write_sint(&mut self.buf, *v);
            }
            Value::UInt(v) => {
                self.buf.push(TYPE_UINT);
                write_uint(&mut self.buf, *v);
            }
            Value::Float(v) => {
                self.buf.push(TYPE_FLOAT);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::Double(v) => {
                self.buf.push(TYPE_DOUBLE);
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::String(s) => {
                self.buf.push(TYPE_STRING);
                write_string(&mut self.buf, s);
            }
            Value::WString(units) => {
                self.buf.push(TYPE_WSTRING);
                write_uint(&mut self.buf, units.len() as u64);
                for &unit in units {
                    write_uint(&mut self.buf, u64::from(unit));
                }
            }
            Value::Blob(bytes) => {
                self.buf.push(TYPE_BLOB);
                write_bytes(&mut self.buf, bytes);
            }
            Value::Enum { sig, value } => {
                self.buf.push(TYPE_ENUM);
                self.sig_ref(sig.as_ref(), Self::enum_body)?;
                write_sint(&mut self.buf, *value);
            }
            Value::Bitmask { sig, value } => {
                self.buf.push(TYPE_BITMASK);
                self.sig_ref(sig.as_ref(), Self::bitmask_body)?;
                write_uint(&mut self.buf, *value);
            }
            Value::Array(items) => {
                self.buf.push(TYPE_ARRAY);
                write_uint(&mut self.buf, items.len() as u64);
                for item in items {
                    self.value(item)?;
                }
            }
            Value::Struct { sig, members } => {
                self.buf.push(TYPE_STRUCT);
                self.sig_ref(sig.as_ref(), Self::struct_body)?;
                // The decoder reads exactly one value per declared member.
                for i in 0..sig.member_names.len() {
                    self.value(members.get(i).unwrap_or(&Value::Null))?;
                }
            }
            Value::Pointer(v) => {
                self.buf.push(TYPE_OPAQUE);
                write_uint(&mut self.buf, *v);
            }
            Value::Repr { human, machine } => {
                self.buf.push(TYPE_REPR);
                self.value(human)?;
                self.value(machine)?;
            }
        }
        Ok(())
    }

    fn function_body(&mut self, sig: &FunctionSig) {
        write_string(&mut self.buf, &sig.name);
        write_uint(&mut self.buf, sig.arg_names.len() as u64);
        for name in &sig.arg_names {
            write_string(&mut self.buf, name);
        }
    }

    fn struct_body(&mut self, sig: &StructSig) {
        write_string(&mut self.buf, &sig.name);
        write_uint(&mut self.buf, sig.member_names.len() as u64);
        for name in &sig.member_names {
            write_string(&mut self.buf, name);
        }
    }

    fn enum_body(&mut self, sig: &EnumSig) {
        if self.version < ENUM_LIST_VERSION {
            // Legacy streams carry one constant per signature.
            let (name, value) = sig
                .values
                .first()
                .map_or(("", 0), |v| (v.name.as_str(), v.value));
            write_string(&mut self.buf, name);
            self.buf.push(TYPE_SINT);
            write_sint(&mut self.buf, value);
            return;
        }
        write_uint(&mut self.buf, sig.values.len() as u64);
        for v in &sig.values {
            write_string(&mut self.buf, &v.name);
            write_sint(&mut self.buf, v.value);
        }
    }

    fn bitmask_body(&mut self, sig: &BitmaskSig) {
        write_uint(&mut self.buf, sig.flags.len() as u64);
        for flag in &sig.flags {
            write_string(&mut self.buf, &flag.name);
            write_uint(&mut self.buf, flag.value);
        }
    }

    fn frame_body(&mut self, frame: &StackFrame) {
        let strings = [
            (FRAME_MODULE, &frame.module),
            (FRAME_FUNCTION, &frame.function),
            (FRAME_FILENAME, &frame.filename),
        ];
        for (tag, s) in strings {
            if let Some(s) = s {
                self.buf.push(tag);
                write_string(&mut self.buf, s);
            }
        }
        if let Some(line) = frame.linenumber {
            self.buf.push(FRAME_LINENUMBER);
            write_uint(&mut self.buf, u64::from(line));
        }
        if let Some(offset) = frame.offset {
            self.buf.push(FRAME_OFFSET);
            write_uint(&mut self.buf, offset);
        }
        self.buf.push(FRAME_END);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use calltrace_core::{EnumValue, ThreadId};

    fn sig(id: u32, name: &str) -> Arc<FunctionSig> {
        Arc::new(FunctionSig {
            id: SigId(id),
            name: name.into(),
            arg_names: vec![],
            flags: CallFlags::empty(),
        })
    }

    #[test]
    fn header_is_written_on_construction() {
        let writer = TraceWriter::new(Vec::new()).unwrap();
        assert_eq!(writer.into_inner(), [FORMAT_VERSION as u8]);
    }

    #[test]
    fn newer_versions_are_rejected() {
        assert!(matches!(
            TraceWriter::with_version(Vec::new(), FORMAT_VERSION + 1),
            Err(TraceError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn function_is_defined_once() {
        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        let call = Call::new(CallNo(0), ThreadId(0), sig(0, "glFlush"));
        writer.write_call(&call).unwrap();
        writer.write_call(&call).unwrap();
        assert_eq!(writer.calls_written(), 2);

        let bytes = writer.into_inner();
        let defs = bytes
            .windows(2)
            .filter(|w| w == &[EVENT_FUNCTION_SIG, 0])
            .count();
        assert_eq!(defs, 1);
    }

    #[test]
    fn enum_signature_is_inlined_once() {
        let mode = Arc::new(EnumSig {
            id: SigId(0),
            values: vec![EnumValue {
                name: "GL_POINTS".into(),
                value: 0,
            }],
        });
        let mut enc = Encoder {
            buf: Vec::new(),
            defined: IndexSet::new(),
            version: FORMAT_VERSION,
        };
        let v = Value::Enum {
            sig: Arc::clone(&mode),
            value: 0,
        };
        enc.value(&v).unwrap();
        let first = enc.buf.len();
        enc.buf.clear();
        enc.value(&v).unwrap();
        // tag, non-inline ref, value
        assert_eq!(enc.buf, [TYPE_ENUM, 0, 0]);
        assert!(first > enc.buf.len());
    }

    #[test]
    fn function_skipping_an_id_is_rejected() {
        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        let call = Call::new(CallNo(0), ThreadId(0), sig(2, "glFinish"));
        assert!(matches!(
            writer.write_call(&call),
            Err(TraceError::OutOfOrderSignatureId {
                kind: SignatureKind::Function,
                id: SigId(2),
                expected: SigId(0),
            })
        ));
        assert_eq!(writer.calls_written(), 0);
        assert_eq!(writer.into_inner(), [FORMAT_VERSION as u8]);
    }

    #[test]
    fn failed_record_leaves_no_trace_in_the_stream() {
        let viewport = Arc::new(StructSig {
            id: SigId(0),
            name: "Viewport".into(),
            member_names: vec!["x".into()],
        });
        let gap = Arc::new(EnumSig {
            id: SigId(1),
            values: vec![],
        });
        let mut call = Call::new(CallNo(0), ThreadId(0), sig(0, "glViewport"));
        call.set_arg(
            0,
            Value::Struct {
                sig: Arc::clone(&viewport),
                members: vec![Value::SInt(0)],
            },
        );
        call.set_arg(1, Value::Enum { sig: gap, value: 0 });

        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        assert!(matches!(
            writer.write_enter(&call),
            Err(TraceError::OutOfOrderSignatureId {
                kind: SignatureKind::Enum,
                ..
            })
        ));
        assert_eq!(writer.calls_written(), 0);

        // The struct from the rejected record is still undefined, so the
        // next use inlines it again.
        call.args.truncate(1);
        writer.write_call(&call).unwrap();
        let bytes = writer.into_inner();
        let mut dec = crate::parser::StreamDecoder::open(crate::source::SliceSource::owned(bytes))
            .unwrap();
        let decoded = dec.next_call().unwrap().unwrap();
        assert_eq!(decoded.no, CallNo(0));
        assert_eq!(decoded.args, call.args);
        assert!(dec.next_call().unwrap().is_none());
    }
}
