//! Playback sources: the decoder, buffered replay, and last-frame looping.
//!
//! Consumers pull calls through the [`CallSource`] trait. Three sources
//! implement it:
//!
//! - [`StreamDecoder`] decodes calls from the byte stream
//! - [`BufferedReplay`] cycles over calls captured earlier, with no I/O
//! - [`LastFrameLooper`] forwards to a decoder, keeps the most recent
//!   complete frame, and loops it after the stream ends
//!
//! # Frame boundaries
//!
//! Sources do not detect frames themselves. The consumer watches for
//! calls that [end a frame](Call::ends_frame) and calls
//! [`CallSource::mark_frame_start`] before asking for the next call.

use std::mem;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info, trace};

use calltrace_core::Call;

use crate::config::{ConfigError, LoopConfig};
use crate::error::TraceError;
use crate::parser::{ParseBookmark, StreamDecoder};
use crate::source::ByteSource;

// ── DecodedCall ───────────────────────────────────────────────────

/// A call handed out by a [`CallSource`].
///
/// `Owned` calls were created for this request and belong to the caller.
/// `Shared` calls are also retained by the source, which may hand the
/// same call out again.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedCall {
    /// Freshly decoded; the caller is the only owner.
    Owned(Call),
    /// Retained by the source for later reuse.
    Shared(Arc<Call>),
}

impl DecodedCall {
    /// True if the caller is the call's only owner.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Take the call, cloning it if the source still shares it.
    pub fn into_owned(self) -> Call {
        match self {
            Self::Owned(call) => call,
            Self::Shared(call) => Arc::unwrap_or_clone(call),
        }
    }
}

impl Deref for DecodedCall {
    type Target = Call;

    fn deref(&self) -> &Call {
        match self {
            Self::Owned(call) => call,
            Self::Shared(call) => call,
        }
    }
}

// ── CallSource ────────────────────────────────────────────────────

/// A pull-based source of calls.
pub trait CallSource {
    /// Produce the next call, or `None` at end of stream.
    fn next_call(&mut self) -> Result<Option<DecodedCall>, TraceError>;

    /// Note that the next call starts a new frame.
    ///
    /// `call` is the call that ended the previous frame, if any.
    fn mark_frame_start(&mut self, _call: Option<&Call>) -> Result<(), TraceError> {
        Ok(())
    }

    /// Snapshot the current decoding position.
    fn bookmark(&self) -> Result<ParseBookmark, TraceError>;

    /// Resume decoding at `bookmark`.
    fn set_bookmark(&mut self, bookmark: &ParseBookmark) -> Result<(), TraceError>;

    /// Release resources. Later calls fail with [`TraceError::Closed`].
    fn close(&mut self);

    /// Version of the stream the calls come from.
    fn version(&self) -> u64;
}

impl<S: ByteSource> CallSource for StreamDecoder<S> {
    fn next_call(&mut self) -> Result<Option<DecodedCall>, TraceError> {
        Ok(StreamDecoder::next_call(self)?.map(DecodedCall::Owned))
    }

    fn bookmark(&self) -> Result<ParseBookmark, TraceError> {
        StreamDecoder::bookmark(self)
    }

    fn set_bookmark(&mut self, bookmark: &ParseBookmark) -> Result<(), TraceError> {
        StreamDecoder::set_bookmark(self, bookmark)
    }

    fn close(&mut self) {
        StreamDecoder::close(self);
    }

    fn version(&self) -> u64 {
        StreamDecoder::version(self)
    }
}

// ── BufferedReplay ────────────────────────────────────────────────

/// Replays a fixed list of calls in order, cycling forever.
///
/// Every call is returned [`Shared`](DecodedCall::Shared). Positions are
/// not byte offsets, so bookmarks are unsupported.
#[derive(Clone, Debug)]
pub struct BufferedReplay {
    calls: Vec<Arc<Call>>,
    pos: usize,
    cycles: u64,
    version: u64,
    closed: bool,
}

impl BufferedReplay {
    /// Replay `calls`, reporting `version` as the stream version.
    pub fn new(calls: Vec<Arc<Call>>, version: u64) -> Self {
        Self {
            calls,
            pos: 0,
            cycles: 0,
            version,
            closed: false,
        }
    }

    /// Number of calls in one cycle.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// True if there is nothing to replay.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Index of the call the next request returns.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of full passes over the calls so far.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles
    }
}

impl CallSource for BufferedReplay {
    fn next_call(&mut self) -> Result<Option<DecodedCall>, TraceError> {
        if self.closed {
            return Err(TraceError::Closed);
        }
        let Some(call) = self.calls.get(self.pos) else {
            return Ok(None);
        };
        let call = Arc::clone(call);
        self.pos += 1;
        if self.pos == self.calls.len() {
            self.pos = 0;
            self.cycles += 1;
        }
        Ok(Some(DecodedCall::Shared(call)))
    }

    fn bookmark(&self) -> Result<ParseBookmark, TraceError> {
        Err(TraceError::UnsupportedSeek)
    }

    fn set_bookmark(&mut self, _bookmark: &ParseBookmark) -> Result<(), TraceError> {
        Err(TraceError::UnsupportedSeek)
    }

    fn close(&mut self) {
        self.closed = true;
        self.calls.clear();
        self.pos = 0;
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ── LastFrameLooper ───────────────────────────────────────────────

/// Forwards calls from a [`StreamDecoder`] and, once it is exhausted,
/// replays the last complete frame as configured by [`LoopConfig`].
///
/// With `loop_on_finish` set, the position of the first call is taken as
/// a frame start, so buffering begins with the first call and a trace
/// holding a single frame loops too. Each
/// [`mark_frame_start`](CallSource::mark_frame_start) promotes the frame
/// just finished to "last frame". Calls are returned
/// [`Shared`](DecodedCall::Shared) while buffered.
///
/// Switching to the replay is terminal: the decoder is never read again.
pub struct LastFrameLooper<S: ByteSource> {
    decoder: StreamDecoder<S>,
    config: LoopConfig,
    buffering: bool,
    frame: Vec<Arc<Call>>,
    last_frame: Vec<Arc<Call>>,
    frame_start: Option<ParseBookmark>,
    last_frame_start: Option<ParseBookmark>,
    replay: Option<BufferedReplay>,
    first_call: bool,
    iteration_ended: bool,
    finished: bool,
}

impl<S: ByteSource> LastFrameLooper<S> {
    /// Wrap `decoder`, validating `config`.
    pub fn new(decoder: StreamDecoder<S>, config: LoopConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            decoder,
            config,
            buffering: false,
            frame: Vec::new(),
            last_frame: Vec::new(),
            frame_start: None,
            last_frame_start: None,
            replay: None,
            first_call: true,
            iteration_ended: false,
            finished: false,
        })
    }

    /// The loop settings in effect.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// The wrapped decoder.
    pub fn decoder(&self) -> &StreamDecoder<S> {
        &self.decoder
    }

    /// True once the decoder is exhausted and the last frame is replaying.
    pub fn is_looping(&self) -> bool {
        self.replay.is_some()
    }

    /// Number of completed passes over the last frame.
    pub fn iterations_completed(&self) -> u64 {
        self.replay.as_ref().map_or(0, BufferedReplay::cycles_completed)
    }

    /// Calls in the most recent complete frame.
    pub fn last_frame_len(&self) -> usize {
        match &self.replay {
            Some(replay) => replay.len(),
            None => self.last_frame.len(),
        }
    }

    /// Position where the frame in progress started.
    pub fn frame_start(&self) -> Option<ParseBookmark> {
        self.frame_start
    }

    /// Position where the most recent complete frame started.
    pub fn last_frame_start(&self) -> Option<ParseBookmark> {
        self.last_frame_start
    }

    /// True if a loop iteration ended since the last check; clears it.
    ///
    /// Only raised when `loop_continuously` is off.
    pub fn take_iteration_end(&mut self) -> bool {
        mem::take(&mut self.iteration_ended)
    }

    fn start_looping(&mut self) -> Result<Option<DecodedCall>, TraceError> {
        self.buffering = false;
        self.frame.clear();
        if !self.config.loop_on_finish || self.last_frame.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        let calls = mem::take(&mut self.last_frame);
        debug!(
            calls = calls.len(),
            iterations = self.config.loop_iterations,
            "end of stream; looping last frame"
        );
        self.replay = Some(BufferedReplay::new(calls, self.decoder.version()));
        self.next_looped()
    }

    fn next_looped(&mut self) -> Result<Option<DecodedCall>, TraceError> {
        let Some(replay) = self.replay.as_mut() else {
            return Ok(None);
        };
        let limit = u64::from(self.config.loop_iterations);
        if limit != 0 && replay.cycles_completed() >= limit {
            info!(iterations = limit, "finished looping last frame");
            self.finished = true;
            return Ok(None);
        }
        let call = replay.next_call()?;
        if replay.position() == 0 && !self.config.loop_continuously {
            self.iteration_ended = true;
        }
        Ok(call)
    }
}

impl<S: ByteSource> CallSource for LastFrameLooper<S> {
    fn next_call(&mut self) -> Result<Option<DecodedCall>, TraceError> {
        if self.decoder.is_closed() {
            return Err(TraceError::Closed);
        }
        if self.finished {
            return Ok(None);
        }
        if self.replay.is_some() {
            return self.next_looped();
        }
        if mem::take(&mut self.first_call) && self.frame_start.is_none() {
            self.mark_frame_start(None)?;
        }
        match self.decoder.next_call()? {
            Some(call) if self.buffering => {
                let call = Arc::new(call);
                self.frame.push(Arc::clone(&call));
                Ok(Some(DecodedCall::Shared(call)))
            }
            Some(call) => Ok(Some(DecodedCall::Owned(call))),
            None => self.start_looping(),
        }
    }

    fn mark_frame_start(&mut self, call: Option<&Call>) -> Result<(), TraceError> {
        if self.replay.is_some() || self.finished {
            return Ok(());
        }
        let bookmark = self.decoder.bookmark()?;
        if self.buffering && !self.frame.is_empty() {
            self.last_frame = mem::take(&mut self.frame);
            self.last_frame_start = self.frame_start;
        }
        trace!(
            ended_by = ?call.map(|c| c.no),
            offset = bookmark.offset,
            "frame start"
        );
        self.frame_start = Some(bookmark);
        self.buffering = self.config.loop_on_finish;
        Ok(())
    }

    fn bookmark(&self) -> Result<ParseBookmark, TraceError> {
        self.decoder.bookmark()
    }

    fn set_bookmark(&mut self, bookmark: &ParseBookmark) -> Result<(), TraceError> {
        self.decoder.set_bookmark(bookmark)?;
        // Calls buffered since the frame start no longer precede the cursor.
        self.frame.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.decoder.close();
        self.frame.clear();
        self.last_frame.clear();
        self.replay = None;
        self.finished = true;
    }

    fn version(&self) -> u64 {
        self.decoder.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;
    use crate::writer::TraceWriter;
    use calltrace_core::{CallFlags, CallNo, FunctionSig, SigId, ThreadId, Value};

    fn sig(id: u32, name: &str) -> Arc<FunctionSig> {
        Arc::new(FunctionSig {
            id: SigId(id),
            name: name.into(),
            arg_names: vec!["frame".into()],
            flags: CallFlags::empty(),
        })
    }

    /// `frames` frames of two draws plus a swap, tagged with the frame index.
    fn trace(frames: u64) -> Vec<u8> {
        let draw = sig(0, "glDrawArrays");
        let swap = sig(1, "glXSwapBuffers");
        let mut w = TraceWriter::new(Vec::new()).unwrap();
        for f in 0..frames {
            for s in [&draw, &draw, &swap] {
                let mut call = Call::new(CallNo(0), ThreadId(0), Arc::clone(s));
                call.set_arg(0, Value::UInt(f));
                w.write_call(&call).unwrap();
            }
        }
        w.into_inner()
    }

    fn looper(frames: u64, config: LoopConfig) -> LastFrameLooper<SliceSource<'static>> {
        let dec = StreamDecoder::open(SliceSource::owned(trace(frames))).unwrap();
        LastFrameLooper::new(dec, config).unwrap()
    }

    /// Pull up to `limit` calls, marking frame starts, and return each
    /// call's frame tag.
    fn pull(source: &mut impl CallSource, limit: usize) -> Vec<u64> {
        let mut tags = Vec::new();
        while tags.len() < limit {
            let Some(call) = source.next_call().unwrap() else {
                break;
            };
            tags.push(call.arg(0).and_then(Value::as_u64).unwrap());
            if call.ends_frame() {
                source.mark_frame_start(Some(&*call)).unwrap();
            }
        }
        tags
    }

    #[test]
    fn buffered_replay_cycles() {
        let calls: Vec<_> = (0..2)
            .map(|i| Arc::new(Call::new(CallNo(i), ThreadId(0), sig(0, "glFlush"))))
            .collect();
        let mut replay = BufferedReplay::new(calls, 6);
        let nos: Vec<_> = (0..5)
            .map(|_| replay.next_call().unwrap().unwrap().no.0)
            .collect();
        assert_eq!(nos, [0, 1, 0, 1, 0]);
        assert_eq!(replay.cycles_completed(), 2);
        assert_eq!(replay.version(), 6);
        assert!(matches!(replay.bookmark(), Err(TraceError::UnsupportedSeek)));
        replay.close();
        assert!(matches!(replay.next_call(), Err(TraceError::Closed)));
    }

    #[test]
    fn empty_replay_ends_immediately() {
        let mut replay = BufferedReplay::new(Vec::new(), 6);
        assert!(replay.next_call().unwrap().is_none());
    }

    #[test]
    fn no_loop_ends_with_stream() {
        let mut l = looper(3, LoopConfig::default());
        assert_eq!(pull(&mut l, 100).len(), 9);
        assert!(!l.is_looping());
        assert!(l.next_call().unwrap().is_none());
    }

    #[test]
    fn loops_last_frame_n_times() {
        let mut l = looper(3, LoopConfig::iterations(2));
        let tags = pull(&mut l, 100);
        assert_eq!(tags[..9], [0, 0, 0, 1, 1, 1, 2, 2, 2]);
        assert_eq!(tags[9..], [2, 2, 2, 2, 2, 2]);
        assert_eq!(l.iterations_completed(), 2);
        assert!(l.next_call().unwrap().is_none());
    }

    #[test]
    fn forever_never_ends() {
        let mut l = looper(2, LoopConfig::forever());
        let tags = pull(&mut l, 1000);
        assert_eq!(tags.len(), 1000);
        assert!(tags[6..].iter().all(|&t| t == 1));
        assert!(l.is_looping());
        assert!(!l.take_iteration_end());
    }

    #[test]
    fn iteration_end_is_signalled_when_not_continuous() {
        let mut l = looper(1, LoopConfig::iterations(0));
        pull(&mut l, 3);
        assert!(!l.take_iteration_end());
        pull(&mut l, 3);
        assert!(l.take_iteration_end());
        assert!(!l.take_iteration_end());
    }

    #[test]
    fn buffered_calls_are_shared() {
        let mut l = looper(2, LoopConfig::forever());
        let first = l.next_call().unwrap().unwrap();
        assert!(!first.is_owned());
        assert_eq!(first.into_owned().no, CallNo(0));

        let mut plain = looper(2, LoopConfig::default());
        assert!(plain.next_call().unwrap().unwrap().is_owned());
    }

    #[test]
    fn bookmarks_track_frames() {
        let mut l = looper(3, LoopConfig::forever());
        assert_eq!(l.frame_start(), None);
        pull(&mut l, 9);
        let frame = l.frame_start().unwrap();
        let last = l.last_frame_start().unwrap();
        assert_eq!(frame.next_call_no, CallNo(9));
        assert_eq!(last.next_call_no, CallNo(6));
        assert_eq!(l.last_frame_len(), 3);
    }

    #[test]
    fn single_frame_loops_without_an_explicit_mark() {
        let mut l = looper(1, LoopConfig::iterations(3));
        let tags = pull(&mut l, 100);
        assert_eq!(tags.len(), 3 + 3 * 3);
        assert!(l.is_looping());
        assert_eq!(l.iterations_completed(), 3);
        assert_eq!(l.last_frame_start().map(|b| b.next_call_no), Some(CallNo(0)));

        let mut l = looper(1, LoopConfig::forever());
        assert_eq!(pull(&mut l, 500).len(), 500);
    }

    #[test]
    fn explicit_first_mark_is_kept() {
        let mut l = looper(2, LoopConfig::iterations(1));
        l.mark_frame_start(None).unwrap();
        let start = l.frame_start();
        l.next_call().unwrap();
        assert_eq!(l.frame_start(), start);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dec = StreamDecoder::open(SliceSource::owned(trace(1))).unwrap();
        let cfg = LoopConfig {
            loop_iterations: 4,
            ..LoopConfig::default()
        };
        assert!(LastFrameLooper::new(dec, cfg).is_err());
    }
}
