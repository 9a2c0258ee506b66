//! Call-level stream decoding and bookmarks.
//!
//! [`StreamDecoder`] reads the version header on open, then decodes one
//! top-level record at a time: signature definitions go straight into
//! the [`SignatureRegistry`], call-enter records start a pending call,
//! and call-leave records complete one and hand it to the caller.
//!
//! Decoding is strictly forward. The only way to revisit consumed bytes
//! is [`StreamDecoder::set_bookmark`], and re-decoding signature records
//! after such a seek is checked against the offsets they were first
//! defined at.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use calltrace_core::{
    Call, CallClassifier, CallFlags, CallNo, FunctionSig, SigId, ThreadId,
};

use crate::classify::ApiCallTable;
use crate::codec::*;
use crate::error::TraceError;
use crate::registry::SignatureRegistry;
use crate::source::{ByteSource, IoSource};
use crate::value::{Mode, ValueDecoder};

/// Highest argument index a call record may carry.
pub const MAX_CALL_ARGS: u64 = 1024;

/// A resumable decoding position.
///
/// Restoring a bookmark with [`StreamDecoder::set_bookmark`] and decoding
/// forward reproduces exactly the calls that followed it the first time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParseBookmark {
    /// Byte offset of the next record.
    pub offset: u64,
    /// Number the next call-enter record will be assigned.
    pub next_call_no: CallNo,
}

/// What [`StreamDecoder::scan_call`] reports for a completed call.
#[derive(Clone, Debug, PartialEq)]
pub struct ScannedCall {
    /// The call's number.
    pub no: CallNo,
    /// The called function.
    pub sig: Arc<FunctionSig>,
    /// Adjusted flags, as a full decode would report them.
    pub flags: CallFlags,
}

impl ScannedCall {
    /// True if this call ends a frame.
    pub fn ends_frame(&self) -> bool {
        self.flags.ends_frame()
    }
}

/// A call whose enter record has been decoded but not its leave.
struct Pending {
    call: Call,
    recorded: CallFlags,
}

/// Decodes calls from a trace stream.
///
/// Generic over the [`ByteSource`] so tests can decode from memory and
/// tools from files or pipes.
pub struct StreamDecoder<S: ByteSource> {
    source: Option<S>,
    registry: SignatureRegistry,
    classifier: Box<dyn CallClassifier>,
    version: u64,
    next_call_no: CallNo,
    pending: Vec<Pending>,
    failed: Option<TraceError>,
}

impl<S: ByteSource> StreamDecoder<S> {
    /// Open a stream, reading and validating the version header.
    pub fn open(mut source: S) -> Result<Self, TraceError> {
        let version = source.read_uint()?;
        if version > FORMAT_VERSION {
            return Err(TraceError::UnsupportedVersion { found: version });
        }
        debug!(version, len = ?source.len(), "opened trace stream");
        Ok(Self {
            source: Some(source),
            registry: SignatureRegistry::new(),
            classifier: Box::new(ApiCallTable),
            version,
            next_call_no: CallNo(0),
            pending: Vec::new(),
            failed: None,
        })
    }

    /// Replace the classifier used to derive static call flags.
    ///
    /// Only affects function signatures defined after the call.
    pub fn with_classifier(mut self, classifier: impl CallClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Stream version read from the header.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number the next call-enter record will be assigned.
    pub fn next_call_no(&self) -> CallNo {
        self.next_call_no
    }

    /// The signatures decoded so far.
    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// The stream failure that stopped decoding, if any.
    ///
    /// Cleared by a successful [`set_bookmark`](Self::set_bookmark).
    pub fn failure(&self) -> Option<&TraceError> {
        self.failed.as_ref()
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Progress through the source as a percentage in `0..=100`.
    pub fn percent_read(&self) -> u8 {
        self.source.as_ref().map_or(100, |s| s.percent_consumed())
    }

    // ── Decoding ────────────────────────────────────────────────

    /// Decode the next completed call with all values materialized.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    pub fn next_call(&mut self) -> Result<Option<Call>, TraceError> {
        self.parse_call(Mode::Full)
    }

    /// Advance past the next completed call without building values.
    ///
    /// Signature records are still decoded and registered.
    pub fn scan_call(&mut self) -> Result<Option<ScannedCall>, TraceError> {
        Ok(self.parse_call(Mode::Scan)?.map(|call| ScannedCall {
            no: call.no,
            sig: call.sig,
            flags: call.flags,
        }))
    }

    /// Scan forward until the next call-enter record would be numbered
    /// `no` or later, or the stream ends.
    pub fn skip_to_call(&mut self, no: CallNo) -> Result<(), TraceError> {
        while self.next_call_no < no {
            if self.scan_call()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Decode records until a call completes.
    ///
    /// When the data runs out, calls whose leave record never arrived
    /// are returned oldest first, flagged [`CallFlags::INCOMPLETE`],
    /// before end of stream is reported.
    ///
    /// After a corrupt record or an inconsistent signature reference,
    /// every later call returns the same error until the decoder is
    /// moved with [`set_bookmark`](Self::set_bookmark).
    pub fn parse_call(&mut self, mode: Mode) -> Result<Option<Call>, TraceError> {
        if self.source.is_none() {
            return Err(TraceError::Closed);
        }
        if let Some(failure) = self.failed.as_ref().and_then(TraceError::stream_failure) {
            return Err(failure);
        }
        let result = self.read_records(mode);
        if let Err(e) = &result {
            if let Some(failure) = e.stream_failure() {
                warn!(error = %failure, "trace stream failed; decoding stopped");
                self.pending.clear();
                self.failed = Some(failure);
            }
        }
        result
    }

    fn read_records(&mut self, mode: Mode) -> Result<Option<Call>, TraceError> {
        loop {
            let source = self.source.as_mut().ok_or(TraceError::Closed)?;
            let at = source.tell();
            let Some(event) = source.next_byte()? else {
                return Ok(self.drain_incomplete());
            };
            match event {
                EVENT_ENTER => self.parse_enter(mode)?,
                EVENT_LEAVE => {
                    if let Some(call) = self.parse_leave(mode)? {
                        return Ok(Some(call));
                    }
                }
                EVENT_FUNCTION_SIG => {
                    let mut values = self.values()?;
                    let id = values.read_sig_id()?;
                    values.define_function(id)?;
                }
                EVENT_STRUCT_SIG => {
                    let mut values = self.values()?;
                    let id = values.read_sig_id()?;
                    values.define_struct(id)?;
                }
                EVENT_ENUM_SIG => {
                    let mut values = self.values()?;
                    let id = values.read_sig_id()?;
                    values.define_enum(id)?;
                }
                EVENT_BITMASK_SIG => {
                    let mut values = self.values()?;
                    let id = values.read_sig_id()?;
                    values.define_bitmask(id)?;
                }
                EVENT_FRAME_SIG => {
                    let mut values = self.values()?;
                    let id = values.read_sig_id()?;
                    values.define_frame(id)?;
                }
                other => {
                    return Err(TraceError::corrupt(at, format!("unknown event {other}")));
                }
            }
        }
    }

    fn parse_enter(&mut self, mode: Mode) -> Result<(), TraceError> {
        let version = self.version;
        let mut values = self.values()?;
        let thread_id = if version >= THREAD_ID_VERSION {
            read_thread_id(&mut values)?
        } else {
            ThreadId(0)
        };
        let id = values.read_sig_id()?;
        let sig = lookup_function(&self.registry, id)?;
        let mut call = Call::new(self.next_call_no, thread_id, sig);
        let recorded = parse_details(&mut self.values()?, Some(&mut call), mode)?;

        self.next_call_no = self.next_call_no.next();
        self.pending.push(Pending { call, recorded });
        Ok(())
    }

    fn parse_leave(&mut self, mode: Mode) -> Result<Option<Call>, TraceError> {
        let mut values = self.values()?;
        let at = values.source().tell();
        let no = u32::try_from(values.source().read_uint()?)
            .map(CallNo)
            .map_err(|_| TraceError::corrupt(at, "call number overflows 32 bits"))?;

        let Some(index) = self.pending.iter().position(|p| p.call.no == no) else {
            warn!(%no, offset = at, "leave record for unknown call; skipping");
            parse_details(&mut self.values()?, None, Mode::Scan)?;
            return Ok(None);
        };
        let Pending {
            mut call,
            mut recorded,
        } = self.pending.remove(index);
        recorded |= parse_details(&mut self.values()?, Some(&mut call), mode)?;
        self.adjust_call_flags(&mut call, recorded);
        Ok(Some(call))
    }

    /// Recompute `call.flags` from its signature, the flags recorded in
    /// the stream, and its return value.
    fn adjust_call_flags(&self, call: &mut Call, recorded: CallFlags) {
        call.flags = call.sig.flags;
        if self.version >= CALL_FLAGS_VERSION {
            call.flags |= recorded;
        }
        // A successful error query is noise for replay accounting.
        let no_error = call.ret.as_ref().is_some_and(|ret| ret.is_zero());
        if no_error && self.classifier.is_error_query(call.name()) {
            call.flags.insert(CallFlags::VERBOSE);
        }
    }

    fn drain_incomplete(&mut self) -> Option<Call> {
        if self.pending.is_empty() {
            return None;
        }
        let Pending { mut call, recorded } = self.pending.remove(0);
        warn!(no = %call.no, name = call.name(), remaining = self.pending.len(), "call never completed");
        self.adjust_call_flags(&mut call, recorded);
        call.flags.insert(CallFlags::INCOMPLETE);
        Some(call)
    }

    fn values(&mut self) -> Result<ValueDecoder<'_, S>, TraceError> {
        let source = self.source.as_mut().ok_or(TraceError::Closed)?;
        Ok(ValueDecoder::new(source, &mut self.registry, self.version)
            .with_classifier(&*self.classifier))
    }

    /// Iterate over completed calls until end of stream or the first error.
    pub fn calls(&mut self) -> Calls<'_, S> {
        Calls {
            decoder: self,
            done: false,
        }
    }

    // ── Bookmarks ───────────────────────────────────────────────

    /// Snapshot the current decoding position.
    pub fn bookmark(&self) -> Result<ParseBookmark, TraceError> {
        let source = self.source.as_ref().ok_or(TraceError::Closed)?;
        Ok(ParseBookmark {
            offset: source.tell(),
            next_call_no: self.next_call_no,
        })
    }

    /// Resume decoding at `bookmark`.
    ///
    /// Calls pending at the current position are discarded. Fails with
    /// [`TraceError::UnsupportedSeek`] and changes nothing if the source
    /// cannot seek.
    pub fn set_bookmark(&mut self, bookmark: &ParseBookmark) -> Result<(), TraceError> {
        let source = self.source.as_mut().ok_or(TraceError::Closed)?;
        if !source.supports_seek() {
            return Err(TraceError::UnsupportedSeek);
        }
        let from = source.tell();
        source.seek(bookmark.offset)?;
        debug!(from, to = bookmark.offset, next_call_no = %bookmark.next_call_no, "seeked to bookmark");
        self.next_call_no = bookmark.next_call_no;
        self.pending.clear();
        self.failed = None;
        Ok(())
    }

    /// Release the source and discard all decoding state.
    ///
    /// Every later decoding or bookmark operation fails with
    /// [`TraceError::Closed`].
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!(calls = self.next_call_no.0, "closed trace stream");
        }
        self.registry.clear();
        self.pending.clear();
        self.failed = None;
    }
}

impl StreamDecoder<IoSource<File>> {
    /// Open a trace file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Self::open(IoSource::open(path)?)
    }
}

fn lookup_function(registry: &SignatureRegistry, id: SigId) -> Result<Arc<FunctionSig>, TraceError> {
    registry
        .table::<FunctionSig>()
        .lookup(id)
        .cloned()
        .ok_or(TraceError::UnknownFunction { id })
}

fn read_thread_id<S: ByteSource + ?Sized>(
    values: &mut ValueDecoder<'_, S>,
) -> Result<ThreadId, TraceError> {
    let at = values.source().tell();
    u32::try_from(values.source().read_uint()?)
        .map(ThreadId)
        .map_err(|_| TraceError::corrupt(at, "thread id overflows 32 bits"))
}

/// Decode call details up to the end marker into `call`.
///
/// With no call to fill, the details are scanned. Returns the flags
/// recorded in the stream.
fn parse_details<S: ByteSource + ?Sized>(
    values: &mut ValueDecoder<'_, S>,
    mut call: Option<&mut Call>,
    mode: Mode,
) -> Result<CallFlags, TraceError> {
    let mode = if call.is_some() { mode } else { Mode::Scan };
    let version = values.version();
    let mut recorded = CallFlags::empty();
    loop {
        let at = values.source().tell();
        match values.source().read_byte()? {
            CALL_END => return Ok(recorded),
            CALL_ARG => {
                let index = values.source().read_uint()?;
                if index >= MAX_CALL_ARGS {
                    return Err(TraceError::corrupt(at, format!("argument index {index} out of range")));
                }
                let value = values.decode_value(mode)?;
                if let (Some(call), Some(value)) = (call.as_deref_mut(), value) {
                    call.set_arg(index as usize, value);
                }
            }
            CALL_RET => {
                let value = values.decode_value(mode)?;
                if let (Some(call), Some(value)) = (call.as_deref_mut(), value) {
                    call.ret = Some(value);
                }
            }
            CALL_THREAD => {
                let thread_id = read_thread_id(values)?;
                if let Some(call) = call.as_deref_mut() {
                    call.thread_id = thread_id;
                }
            }
            CALL_BACKTRACE if version >= BACKTRACE_VERSION => {
                let n = values.source().read_uint()?;
                let mut frames = mode.materializes().then(Vec::new);
                for _ in 0..n {
                    // Frame refs may define frames inline, so they are
                    // resolved in every mode.
                    let frame = values.frame_ref()?;
                    if let Some(frames) = frames.as_mut() {
                        frames.push(frame);
                    }
                }
                if let (Some(call), Some(frames)) = (call.as_deref_mut(), frames) {
                    call.backtrace = Some(frames);
                }
            }
            CALL_FLAGS if version >= CALL_FLAGS_VERSION => {
                let bits = values.source().read_uint()?;
                recorded |= CallFlags::from_bits(bits as u32);
            }
            other => {
                return Err(TraceError::corrupt(at, format!("unknown call detail {other}")));
            }
        }
    }
}

/// Iterator adapter over completed calls.
///
/// Created by [`StreamDecoder::calls`]. Stops after end of stream or
/// the first error.
pub struct Calls<'a, S: ByteSource> {
    decoder: &'a mut StreamDecoder<S>,
    done: bool,
}

impl<S: ByteSource> Iterator for Calls<'_, S> {
    type Item = Result<Call, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.next_call() {
            Ok(Some(call)) => Some(Ok(call)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SliceSource, StreamSource};
    use crate::writer::TraceWriter;
    use calltrace_core::{StackFrame, Value};

    fn function(id: u32, name: &str, args: &[&str]) -> Arc<FunctionSig> {
        Arc::new(FunctionSig {
            id: SigId(id),
            name: name.into(),
            arg_names: args.iter().map(|s| s.to_string()).collect(),
            flags: CallFlags::empty(),
        })
    }

    fn open(bytes: Vec<u8>) -> StreamDecoder<SliceSource<'static>> {
        StreamDecoder::open(SliceSource::owned(bytes)).unwrap()
    }

    #[test]
    fn decodes_calls_in_order() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let draw = function(0, "glDrawArrays", &["mode", "first", "count"]);
        for i in 0..3 {
            let mut call = Call::new(CallNo(0), ThreadId(0), Arc::clone(&draw));
            call.set_arg(0, Value::UInt(4));
            call.set_arg(1, Value::SInt(0));
            call.set_arg(2, Value::SInt(i));
            w.write_call(&call).unwrap();
        }
        let mut dec = open(w.into_inner());
        assert_eq!(dec.version(), FORMAT_VERSION);

        let calls: Vec<_> = dec.calls().collect::<Result<_, _>>().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].no, CallNo(2));
        assert_eq!(calls[2].arg(2), Some(&Value::SInt(2)));
        assert!(calls[0].flags.contains(CallFlags::RENDER));
        assert!(dec.next_call().unwrap().is_none());
        assert_eq!(dec.percent_read(), 100);
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut bytes = Vec::new();
        write_uint(&mut bytes, FORMAT_VERSION + 1);
        assert!(matches!(
            StreamDecoder::open(SliceSource::owned(bytes)),
            Err(TraceError::UnsupportedVersion { found }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn empty_stream_is_corrupt() {
        assert!(matches!(
            StreamDecoder::open(SliceSource::new(&[])),
            Err(TraceError::CorruptStream { .. })
        ));
    }

    #[test]
    fn unknown_function_is_reported() {
        let mut bytes = vec![FORMAT_VERSION as u8, EVENT_ENTER, 0];
        write_uint(&mut bytes, 7);
        bytes.push(CALL_END);
        let mut dec = open(bytes);
        assert!(matches!(
            dec.next_call(),
            Err(TraceError::UnknownFunction { id: SigId(7) })
        ));
    }

    #[test]
    fn interleaved_threads_pair_by_call_number() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let a = Call::new(CallNo(0), ThreadId(1), function(0, "glFinish", &[]));
        let mut b = Call::new(CallNo(0), ThreadId(2), function(1, "glGetError", &[]));
        b.ret = Some(Value::UInt(0));
        let na = w.write_enter(&a).unwrap();
        let nb = w.write_enter(&b).unwrap();
        w.write_leave(nb, &b).unwrap();
        w.write_leave(na, &a).unwrap();

        let mut dec = open(w.into_inner());
        let first = dec.next_call().unwrap().unwrap();
        assert_eq!(first.no, CallNo(1));
        assert_eq!(first.thread_id, ThreadId(2));
        assert!(first.flags.contains(CallFlags::VERBOSE));
        let second = dec.next_call().unwrap().unwrap();
        assert_eq!(second.no, CallNo(0));
        assert_eq!(second.thread_id, ThreadId(1));
    }

    #[test]
    fn pending_calls_drain_as_incomplete() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let flush = function(0, "glFlush", &[]);
        let call = Call::new(CallNo(0), ThreadId(0), flush);
        w.write_enter(&call).unwrap();
        w.write_enter(&call).unwrap();

        let mut dec = open(w.into_inner());
        let first = dec.next_call().unwrap().unwrap();
        assert_eq!(first.no, CallNo(0));
        assert!(first.flags.contains(CallFlags::INCOMPLETE));
        assert_eq!(dec.next_call().unwrap().unwrap().no, CallNo(1));
        assert!(dec.next_call().unwrap().is_none());
    }

    #[test]
    fn leave_for_unknown_call_is_skipped() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let mut call = Call::new(CallNo(0), ThreadId(0), function(0, "glGetError", &[]));
        call.ret = Some(Value::UInt(0x500));
        w.write_leave(CallNo(9), &call).unwrap();
        w.write_call(&call).unwrap();

        let mut dec = open(w.into_inner());
        let decoded = dec.next_call().unwrap().unwrap();
        assert_eq!(decoded.no, CallNo(0));
        assert!(!decoded.flags.contains(CallFlags::VERBOSE));
    }

    #[test]
    fn recorded_flags_merge_from_version_six() {
        let mut call = Call::new(CallNo(0), ThreadId(0), function(0, "glFlush", &[]));
        call.flags.insert(CallFlags::NON_REPRODUCIBLE);

        let mut w = TraceWriter::new(Vec::new()).unwrap();
        w.write_call(&call).unwrap();
        let decoded = open(w.into_inner()).next_call().unwrap().unwrap();
        assert!(decoded.flags.contains(CallFlags::NON_REPRODUCIBLE));

        let mut w = TraceWriter::with_version(Vec::new(), CALL_FLAGS_VERSION - 1).unwrap();
        w.write_call(&call).unwrap();
        let decoded = open(w.into_inner()).next_call().unwrap().unwrap();
        assert!(!decoded.flags.contains(CallFlags::NON_REPRODUCIBLE));
    }

    #[test]
    fn backtraces_decode_with_inline_frames() {
        let frame = Arc::new(StackFrame {
            id: SigId(0),
            function: Some("draw_scene".into()),
            filename: Some("scene.c".into()),
            linenumber: Some(42),
            ..StackFrame::default()
        });
        let mut call = Call::new(CallNo(0), ThreadId(0), function(0, "glFlush", &[]));
        call.backtrace = Some(vec![Arc::clone(&frame), Arc::clone(&frame)]);

        let mut w = TraceWriter::new(Vec::new()).unwrap();
        w.write_call(&call).unwrap();
        let mut dec = open(w.into_inner());
        let decoded = dec.next_call().unwrap().unwrap();
        let bt = decoded.backtrace.unwrap();
        assert_eq!(bt.len(), 2);
        assert_eq!(bt[0].to_string(), "draw_scene (scene.c:42)");
        assert_eq!(dec.registry().table::<StackFrame>().len(), 1);
    }

    #[test]
    fn scan_reports_number_and_flags_only() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let mut call = Call::new(CallNo(0), ThreadId(0), function(0, "glXSwapBuffers", &["dpy"]));
        call.set_arg(0, Value::Pointer(0x1234));
        w.write_call(&call).unwrap();

        let mut dec = open(w.into_inner());
        let scanned = dec.scan_call().unwrap().unwrap();
        assert_eq!(scanned.no, CallNo(0));
        assert!(scanned.ends_frame());
        assert!(dec.scan_call().unwrap().is_none());
    }

    #[test]
    fn skip_to_call_stops_at_target() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let call = Call::new(CallNo(0), ThreadId(0), function(0, "glFlush", &[]));
        for _ in 0..10 {
            w.write_call(&call).unwrap();
        }
        let mut dec = open(w.into_inner());
        dec.skip_to_call(CallNo(6)).unwrap();
        assert_eq!(dec.next_call().unwrap().unwrap().no, CallNo(6));

        dec.skip_to_call(CallNo(100)).unwrap();
        assert!(dec.next_call().unwrap().is_none());
    }

    #[test]
    fn unseekable_bookmark_leaves_state_alone() {
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        let call = Call::new(CallNo(0), ThreadId(0), function(0, "glFlush", &[]));
        w.write_call(&call).unwrap();
        w.write_call(&call).unwrap();
        let bytes = w.into_inner();

        let mut dec = StreamDecoder::open(StreamSource::new(bytes.as_slice())).unwrap();
        let start = dec.bookmark().unwrap();
        dec.next_call().unwrap();
        let before = dec.bookmark().unwrap();
        assert!(matches!(dec.set_bookmark(&start), Err(TraceError::UnsupportedSeek)));
        assert_eq!(dec.bookmark().unwrap(), before);
        assert_eq!(dec.next_call().unwrap().unwrap().no, CallNo(1));
    }

    #[test]
    fn closed_decoder_rejects_everything() {
        let mut dec = open(vec![FORMAT_VERSION as u8]);
        dec.close();
        assert!(dec.is_closed());
        assert!(matches!(dec.next_call(), Err(TraceError::Closed)));
        assert!(matches!(dec.bookmark(), Err(TraceError::Closed)));
        assert!(matches!(
            dec.set_bookmark(&ParseBookmark {
                offset: 0,
                next_call_no: CallNo(0)
            }),
            Err(TraceError::Closed)
        ));
    }

    #[test]
    fn unknown_event_is_corrupt() {
        let mut dec = open(vec![FORMAT_VERSION as u8, 0x7f]);
        assert!(matches!(
            dec.next_call(),
            Err(TraceError::CorruptStream { offset: 1, .. })
        ));
    }

    #[test]
    fn corrupt_record_stops_decoding_for_good() {
        let mut bytes = vec![FORMAT_VERSION as u8, EVENT_FUNCTION_SIG, 0];
        write_string(&mut bytes, "glFlush");
        bytes.push(0);
        // Enter with an argument carrying an unknown value tag, then a
        // well-formed leave for the same call.
        bytes.extend_from_slice(&[EVENT_ENTER, 0, 0, CALL_ARG, 0, 0x63, CALL_END]);
        bytes.extend_from_slice(&[EVENT_LEAVE, 0, CALL_END]);
        let mut dec = open(bytes);

        let first = dec.next_call();
        assert!(matches!(first, Err(TraceError::CorruptStream { .. })), "{first:?}");
        for _ in 0..3 {
            let again = dec.next_call();
            assert!(matches!(again, Err(TraceError::CorruptStream { .. })), "{again:?}");
        }
        assert!(matches!(dec.scan_call(), Err(TraceError::CorruptStream { .. })));
        assert!(dec.skip_to_call(CallNo(5)).is_err());
        assert!(matches!(dec.failure(), Some(TraceError::CorruptStream { .. })));
    }

    #[test]
    fn unknown_function_stops_decoding_until_seek() {
        let mut bytes = vec![FORMAT_VERSION as u8];
        let start = bytes.len() as u64;
        bytes.extend_from_slice(&[EVENT_FUNCTION_SIG, 0]);
        write_string(&mut bytes, "glFlush");
        bytes.push(0);
        bytes.extend_from_slice(&[EVENT_ENTER, 0, 0, CALL_END, EVENT_LEAVE, 0, CALL_END]);
        bytes.extend_from_slice(&[EVENT_ENTER, 0, 9, CALL_END, EVENT_LEAVE, 1, CALL_END]);
        let mut dec = open(bytes);

        assert_eq!(dec.next_call().unwrap().unwrap().name(), "glFlush");
        for _ in 0..2 {
            assert!(matches!(
                dec.next_call(),
                Err(TraceError::UnknownFunction { id: SigId(9) })
            ));
        }

        dec.set_bookmark(&ParseBookmark {
            offset: start,
            next_call_no: CallNo(0),
        })
        .unwrap();
        assert!(dec.failure().is_none());
        let replayed = dec.next_call().unwrap().unwrap();
        assert_eq!((replayed.no, replayed.name()), (CallNo(0), "glFlush"));
    }

    #[test]
    fn unseekable_source_stays_failed() {
        let bytes = vec![FORMAT_VERSION as u8, EVENT_ENTER, 0, 3, CALL_END];
        let mut dec = StreamDecoder::open(StreamSource::new(&bytes[..])).unwrap();
        assert!(matches!(dec.next_call(), Err(TraceError::UnknownFunction { .. })));
        let mark = dec.bookmark().unwrap();
        assert!(matches!(dec.set_bookmark(&mark), Err(TraceError::UnsupportedSeek)));
        assert!(matches!(dec.next_call(), Err(TraceError::UnknownFunction { .. })));
    }

    #[test]
    fn backtrace_detail_before_version_five_is_corrupt() {
        let mut bytes = vec![4, EVENT_FUNCTION_SIG, 0];
        write_string(&mut bytes, "glFlush");
        bytes.push(0);
        bytes.extend_from_slice(&[EVENT_ENTER, 0, 0, CALL_BACKTRACE, 0, CALL_END]);
        let mut dec = open(bytes);
        assert!(matches!(dec.next_call(), Err(TraceError::CorruptStream { .. })));
    }
}
