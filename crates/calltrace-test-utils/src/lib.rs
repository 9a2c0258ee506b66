//! Test fixtures and helper sources for calltrace development.
//!
//! Provides synthetic traces ([`frame_trace`], [`all_values_trace`]), a
//! [`NoSeek`] wrapper that hides a source's seek capability, and
//! [`drive`], which pulls calls from a [`CallSource`] the way a replayer
//! does, marking a frame start after every frame-ending call.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::*;

use calltrace_replay::{ByteSource, CallSource, DecodedCall, TraceError};

/// Wraps a source and reports that it cannot seek.
///
/// Reads pass through unchanged; [`seek`](ByteSource::seek) fails with
/// [`TraceError::UnsupportedSeek`].
pub struct NoSeek<S>(pub S);

impl<S: ByteSource> ByteSource for NoSeek<S> {
    fn next_byte(&mut self) -> Result<Option<u8>, TraceError> {
        self.0.next_byte()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TraceError> {
        self.0.read_exact(buf)
    }

    fn skip(&mut self, n: u64) -> Result<(), TraceError> {
        self.0.skip(n)
    }

    fn tell(&self) -> u64 {
        self.0.tell()
    }

    fn seek(&mut self, _offset: u64) -> Result<(), TraceError> {
        Err(TraceError::UnsupportedSeek)
    }

    fn supports_seek(&self) -> bool {
        false
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }
}

/// Pull up to `limit` calls, calling `mark_frame_start` after each call
/// that ends a frame. Stops early at end of stream.
pub fn drive(source: &mut impl CallSource, limit: usize) -> Result<Vec<DecodedCall>, TraceError> {
    let mut calls = Vec::new();
    while calls.len() < limit {
        let Some(call) = source.next_call()? else {
            break;
        };
        if call.ends_frame() {
            source.mark_frame_start(Some(&*call))?;
        }
        calls.push(call);
    }
    Ok(calls)
}
