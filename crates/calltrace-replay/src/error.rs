//! Error types for trace decoding and playback.

use std::fmt;
use std::io;

use calltrace_core::{SigId, SignatureKind};

/// Errors that can occur while decoding or replaying a trace stream.
///
/// End of stream is not an error: decoders report it as `Ok(None)`.
#[derive(Debug)]
pub enum TraceError {
    /// An I/O error occurred in the underlying byte source.
    Io(io::Error),
    /// The stream is malformed: an unknown tag, a bad length, or a
    /// record cut short by the end of the data. Fatal for the stream.
    CorruptStream {
        /// Byte offset at which the problem was detected.
        offset: u64,
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The stream version is newer than this build understands.
    UnsupportedVersion {
        /// The version found in the stream header.
        found: u64,
    },
    /// A signature reference names an id that has not been defined.
    UnknownSignatureId {
        /// Table the id was looked up in.
        kind: SignatureKind,
        /// The undefined id.
        id: SigId,
    },
    /// A signature definition skips ahead of the next free id.
    OutOfOrderSignatureId {
        /// Table being defined into.
        kind: SignatureKind,
        /// The id the stream tried to define.
        id: SigId,
        /// The next id the table expected.
        expected: SigId,
    },
    /// A signature id is defined a second time at a different offset.
    SignatureMismatch {
        /// Table being defined into.
        kind: SignatureKind,
        /// The redefined id.
        id: SigId,
        /// Offset of the original definition.
        recorded_offset: u64,
        /// Offset of the conflicting definition.
        offset: u64,
    },
    /// A call-enter record references an undefined function.
    UnknownFunction {
        /// The undefined function id.
        id: SigId,
    },
    /// A bookmark was set on a byte source that cannot seek.
    UnsupportedSeek,
    /// The decoder was used after `close()`.
    Closed,
}

impl TraceError {
    /// Build a [`CorruptStream`](Self::CorruptStream) error.
    pub fn corrupt(offset: u64, detail: impl Into<String>) -> Self {
        Self::CorruptStream {
            offset,
            detail: detail.into(),
        }
    }

    /// Build the error reported when a record is cut short.
    pub fn truncated(offset: u64) -> Self {
        Self::corrupt(offset, "unexpected end of stream")
    }

    /// True for errors after which decoding the stream cannot continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnsupportedSeek)
    }

    /// A copy of this error if it means the stream itself is broken at
    /// the current position.
    ///
    /// A decoder that hits one of these stays failed until it is moved
    /// to a bookmark, since the cursor may sit inside a half-read record.
    pub fn stream_failure(&self) -> Option<Self> {
        match self {
            Self::CorruptStream { offset, detail } => Some(Self::CorruptStream {
                offset: *offset,
                detail: detail.clone(),
            }),
            Self::UnknownSignatureId { kind, id } => Some(Self::UnknownSignatureId {
                kind: *kind,
                id: *id,
            }),
            Self::OutOfOrderSignatureId { kind, id, expected } => {
                Some(Self::OutOfOrderSignatureId {
                    kind: *kind,
                    id: *id,
                    expected: *expected,
                })
            }
            Self::SignatureMismatch {
                kind,
                id,
                recorded_offset,
                offset,
            } => Some(Self::SignatureMismatch {
                kind: *kind,
                id: *id,
                recorded_offset: *recorded_offset,
                offset: *offset,
            }),
            Self::UnknownFunction { id } => Some(Self::UnknownFunction { id: *id }),
            Self::Io(_) | Self::UnsupportedVersion { .. } | Self::UnsupportedSeek | Self::Closed => {
                None
            }
        }
    }
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::CorruptStream { offset, detail } => {
                write!(f, "corrupt stream at offset {offset}: {detail}")
            }
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported trace version {found}")
            }
            Self::UnknownSignatureId { kind, id } => {
                write!(f, "unknown {kind} signature id {id}")
            }
            Self::OutOfOrderSignatureId { kind, id, expected } => {
                write!(
                    f,
                    "out-of-order {kind} signature id {id} (expected {expected})"
                )
            }
            Self::SignatureMismatch {
                kind,
                id,
                recorded_offset,
                offset,
            } => {
                write!(
                    f,
                    "{kind} signature {id} redefined at offset {offset}, \
                     originally defined at offset {recorded_offset}"
                )
            }
            Self::UnknownFunction { id } => write!(f, "call references unknown function {id}"),
            Self::UnsupportedSeek => write!(f, "byte source does not support seeking"),
            Self::Closed => write!(f, "decoder is closed"),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
