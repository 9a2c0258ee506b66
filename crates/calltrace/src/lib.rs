//! Calltrace: a decoder and loop player for binary API call traces.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the calltrace sub-crates. For most users, adding `calltrace` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use calltrace::prelude::*;
//!
//! let swap = Arc::new(FunctionSig {
//!     id: SigId(0),
//!     name: "glXSwapBuffers".into(),
//!     arg_names: vec!["dpy".into(), "drawable".into()],
//!     flags: CallFlags::empty(),
//! });
//!
//! // Record a two-frame trace.
//! let mut writer = TraceWriter::new(Vec::new()).unwrap();
//! for _ in 0..2 {
//!     writer.write_call(&Call::new(CallNo(0), ThreadId(0), Arc::clone(&swap))).unwrap();
//! }
//! let bytes = writer.into_inner();
//!
//! // Play it back, then loop the last frame three times.
//! let decoder = StreamDecoder::open(SliceSource::new(&bytes)).unwrap();
//! let mut looper = LastFrameLooper::new(decoder, LoopConfig::iterations(3)).unwrap();
//!
//! let mut played = 0;
//! while let Some(call) = looper.next_call().unwrap() {
//!     assert!(call.ends_frame());
//!     looper.mark_frame_start(Some(&*call)).unwrap();
//!     played += 1;
//! }
//! assert_eq!(played, 2 + 3);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `calltrace-core` | Ids, flags, signatures, values, calls |
//! | [`replay`] | `calltrace-replay` | Sources, decoder, bookmarks, looping, writer |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`calltrace-core`).
///
/// Contains signature ids, [`types::CallFlags`], the interned signature
/// structs, the [`types::Value`] tree, and the [`types::Call`] record.
pub use calltrace_core as types;

/// Trace decoding and playback (`calltrace-replay`).
///
/// Open streams with [`replay::StreamDecoder`], resume them with
/// [`replay::ParseBookmark`]s, and loop the final frame with
/// [`replay::LastFrameLooper`].
pub use calltrace_replay as replay;

/// Common imports for typical calltrace usage.
///
/// ```rust
/// use calltrace::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use calltrace_core::{
        Call, CallClassifier, CallFlags, CallNo, FunctionSig, SigId, ThreadId, Value,
    };

    // Sources
    pub use calltrace_replay::{ByteSource, IoSource, SliceSource, StreamSource};

    // Decoding
    pub use calltrace_replay::{Mode, ParseBookmark, StreamDecoder, TraceError};

    // Playback
    pub use calltrace_replay::{CallSource, DecodedCall, LastFrameLooper, LoopConfig};

    // Writing
    pub use calltrace_replay::TraceWriter;
}
