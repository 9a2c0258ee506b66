//! Call trace stream decoding, bookmarks, and last-frame loop playback.
//!
//! Decodes binary traces of intercepted API calls into
//! [`Call`](calltrace_core::Call) records, and replays them to consumers
//! with optional looping over the final recorded frame.
//!
//! # Architecture
//!
//! - [`ByteSource`] abstracts the input: [`SliceSource`], [`IoSource`],
//!   [`StreamSource`]
//! - [`SignatureRegistry`] interns signatures by dense id
//! - [`ValueDecoder`] implements the value grammar in full or scan [`Mode`]
//! - [`StreamDecoder`] decodes call records and supports [`ParseBookmark`]s
//! - [`CallSource`] is implemented by the decoder, [`BufferedReplay`], and
//!   [`LastFrameLooper`]
//! - [`TraceWriter`] encodes streams in the same format
//!
//! # Format
//!
//! ```text
//! [VERSION uint] [record] [record] ... [record]
//! ```
//!
//! See [`codec`] for the record grammar.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod codec;
pub mod config;
pub mod error;
pub mod parser;
pub mod playback;
pub mod registry;
pub mod source;
pub mod value;
pub mod writer;

pub use classify::ApiCallTable;
pub use codec::FORMAT_VERSION;
pub use config::{ConfigError, LoopConfig};
pub use error::TraceError;
pub use parser::{Calls, ParseBookmark, ScannedCall, StreamDecoder};
pub use playback::{BufferedReplay, CallSource, DecodedCall, LastFrameLooper};
pub use registry::{RegistryTable, SignatureRegistry, SignatureTable};
pub use source::{ByteSource, IoSource, SliceSource, StreamSource};
pub use value::{Mode, ValueDecoder};
pub use writer::TraceWriter;
