//! Wire constants and primitive encoders for the trace format.
//!
//! Integers are LEB128 varints (unsigned unless noted), floats are
//! little-endian, and strings and blobs are length-prefixed. The stream
//! is a version varint followed by a flat sequence of event records:
//!
//! ```text
//! [VERSION uint]
//! [ENTER  thread? fn-id details... END]
//! [LEAVE  call-no details... END]
//! [*_SIG  id body]
//! ...
//! ```
//!
//! Signature references embedded in values and backtraces are a single
//! varint `(id << 1) | inline`; when `inline` is set the signature body
//! follows immediately.

use calltrace_core::SigId;

// ── Versions ────────────────────────────────────────────────────

/// Newest stream version this build decodes and the version it writes.
///
/// History:
/// - v1-v2: enum signatures carry a single named constant
/// - v3: enum signatures carry a list of `(name, value)` pairs
/// - v4: call-enter records carry a thread id
/// - v5: calls may carry backtraces
/// - v6: calls may carry recorded flags
pub const FORMAT_VERSION: u64 = 6;

/// First version with list-form enum signatures.
pub const ENUM_LIST_VERSION: u64 = 3;
/// First version whose call-enter records carry a thread id.
pub const THREAD_ID_VERSION: u64 = 4;
/// First version that may carry backtraces.
pub const BACKTRACE_VERSION: u64 = 5;
/// First version that may carry recorded call flags.
pub const CALL_FLAGS_VERSION: u64 = 6;

// ── Event tags ──────────────────────────────────────────────────

/// A call begins: function id and in-arguments follow.
pub const EVENT_ENTER: u8 = 0;
/// A call completes: call number, out-arguments, and return follow.
pub const EVENT_LEAVE: u8 = 1;
/// Top-level function signature definition.
pub const EVENT_FUNCTION_SIG: u8 = 2;
/// Top-level struct signature definition.
pub const EVENT_STRUCT_SIG: u8 = 3;
/// Top-level enum signature definition.
pub const EVENT_ENUM_SIG: u8 = 4;
/// Top-level bitmask signature definition.
pub const EVENT_BITMASK_SIG: u8 = 5;
/// Top-level stack frame definition.
pub const EVENT_FRAME_SIG: u8 = 6;

// ── Call detail tags ────────────────────────────────────────────

/// Ends a call's detail list.
pub const CALL_END: u8 = 0;
/// Argument: index varint then a value.
pub const CALL_ARG: u8 = 1;
/// Return value.
pub const CALL_RET: u8 = 2;
/// Thread id varint.
pub const CALL_THREAD: u8 = 3;
/// Backtrace: frame count then frame references.
pub const CALL_BACKTRACE: u8 = 4;
/// Recorded call flags varint.
pub const CALL_FLAGS: u8 = 5;

// ── Stack frame detail tags ─────────────────────────────────────

/// Ends a stack frame body.
pub const FRAME_END: u8 = 0;
/// Module name string.
pub const FRAME_MODULE: u8 = 1;
/// Function name string.
pub const FRAME_FUNCTION: u8 = 2;
/// Source file name string.
pub const FRAME_FILENAME: u8 = 3;
/// Source line varint.
pub const FRAME_LINENUMBER: u8 = 4;
/// Module offset varint.
pub const FRAME_OFFSET: u8 = 5;

// ── Value tags ──────────────────────────────────────────────────

/// Null value; no payload.
pub const TYPE_NULL: u8 = 0;
/// Boolean false; no payload.
pub const TYPE_FALSE: u8 = 1;
/// Boolean true; no payload.
pub const TYPE_TRUE: u8 = 2;
/// Signed varint.
pub const TYPE_SINT: u8 = 3;
/// Unsigned varint.
pub const TYPE_UINT: u8 = 4;
/// Little-endian f32.
pub const TYPE_FLOAT: u8 = 5;
/// Little-endian f64.
pub const TYPE_DOUBLE: u8 = 6;
/// Length-prefixed UTF-8 string.
pub const TYPE_STRING: u8 = 7;
/// Length-prefixed bytes.
pub const TYPE_BLOB: u8 = 8;
/// Enum signature reference then signed varint.
pub const TYPE_ENUM: u8 = 9;
/// Bitmask signature reference then unsigned varint.
pub const TYPE_BITMASK: u8 = 10;
/// Element count then that many values.
pub const TYPE_ARRAY: u8 = 11;
/// Struct signature reference then one value per member.
pub const TYPE_STRUCT: u8 = 12;
/// Pointer-sized unsigned varint.
pub const TYPE_OPAQUE: u8 = 13;
/// Human value then machine value.
pub const TYPE_REPR: u8 = 14;
/// Code unit count then that many unsigned varints.
pub const TYPE_WSTRING: u8 = 15;

// ── Signature references ────────────────────────────────────────

/// Pack a signature reference varint.
pub fn encode_sig_ref(id: SigId, inline: bool) -> u64 {
    (u64::from(id.0) << 1) | u64::from(inline)
}

/// Split a signature reference varint into `(id, inline)`.
///
/// Returns `None` if the id does not fit in 32 bits.
pub fn decode_sig_ref(raw: u64) -> Option<(SigId, bool)> {
    let id = u32::try_from(raw >> 1).ok()?;
    Some((SigId(id), raw & 1 == 1))
}

// ── Primitive writers ───────────────────────────────────────────

/// Append an unsigned LEB128 varint.
pub fn write_uint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Append a signed LEB128 varint.
pub fn write_sint(out: &mut Vec<u8>, mut v: i64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Append a length-prefixed UTF-8 string.
pub fn write_string(out: &mut Vec<u8>, s: &str) {
    write_uint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

/// Append length-prefixed bytes.
pub fn write_bytes(out: &mut Vec<u8>, b: &[u8]) {
    write_uint(out, b.len() as u64);
    out.extend_from_slice(b);
}
