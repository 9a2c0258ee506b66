//! Synthetic calls and traces.
//!
//! Signature ids are fixed so fixtures can be mixed in one trace:
//!
//! | Kind | Id | Signature |
//! |------|----|-----------|
//! | function | 0 | `glDrawArrays(mode, first, count)` |
//! | function | 1 | `glXSwapBuffers(dpy, drawable)` |
//! | function | 2 | `glFixtureAllValues(v0..v15)` |
//! | enum | 0 | primitive mode |
//! | bitmask | 0 | clear mask |
//! | struct | 0 | `Viewport { x, y, width, height }` |
//! | stack frame | 0, 1 | two frames of a fake render loop |

use std::sync::Arc;

use calltrace_core::{
    BitmaskFlag, BitmaskSig, Call, CallFlags, CallNo, EnumSig, EnumValue, FunctionSig, SigId,
    StackFrame, StructSig, ThreadId, Value,
};
use calltrace_replay::{TraceWriter, FORMAT_VERSION};

/// A function signature with no static flags.
pub fn function(id: u32, name: &str, args: &[&str]) -> Arc<FunctionSig> {
    Arc::new(FunctionSig {
        id: SigId(id),
        name: name.into(),
        arg_names: args.iter().map(|s| s.to_string()).collect(),
        flags: CallFlags::empty(),
    })
}

pub fn draw_sig() -> Arc<FunctionSig> {
    function(0, "glDrawArrays", &["mode", "first", "count"])
}

pub fn swap_sig() -> Arc<FunctionSig> {
    function(1, "glXSwapBuffers", &["dpy", "drawable"])
}

pub fn all_values_sig() -> Arc<FunctionSig> {
    let names: Vec<String> = (0..16).map(|i| format!("v{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    function(2, "glFixtureAllValues", &names)
}

pub fn primitive_mode() -> Arc<EnumSig> {
    let values = [("GL_POINTS", 0), ("GL_LINES", 1), ("GL_TRIANGLES", 4)]
        .into_iter()
        .map(|(name, value)| EnumValue {
            name: name.into(),
            value,
        })
        .collect();
    Arc::new(EnumSig {
        id: SigId(0),
        values,
    })
}

pub fn clear_mask() -> Arc<BitmaskSig> {
    let flags = [
        ("GL_DEPTH_BUFFER_BIT", 0x100),
        ("GL_STENCIL_BUFFER_BIT", 0x400),
        ("GL_COLOR_BUFFER_BIT", 0x4000),
    ]
    .into_iter()
    .map(|(name, value)| BitmaskFlag {
        name: name.into(),
        value,
    })
    .collect();
    Arc::new(BitmaskSig {
        id: SigId(0),
        flags,
    })
}

pub fn viewport() -> Arc<StructSig> {
    Arc::new(StructSig {
        id: SigId(0),
        name: "Viewport".into(),
        member_names: ["x", "y", "width", "height"].map(String::from).to_vec(),
    })
}

pub fn backtrace() -> Vec<Arc<StackFrame>> {
    vec![
        Arc::new(StackFrame {
            id: SigId(0),
            module: Some("libdemo.so".into()),
            function: Some("render_frame".into()),
            filename: Some("render.c".into()),
            linenumber: Some(120),
            offset: Some(0x4f0),
        }),
        Arc::new(StackFrame {
            id: SigId(1),
            function: Some("main".into()),
            ..StackFrame::default()
        }),
    ]
}

/// `glDrawArrays(GL_TRIANGLES, frame, index)`.
///
/// The frame and index are recoverable with [`draw_tag`].
pub fn draw_call(frame: u64, index: u64) -> Call {
    let mut call = Call::new(CallNo(0), ThreadId(0), draw_sig());
    call.set_arg(
        0,
        Value::Enum {
            sig: primitive_mode(),
            value: 4,
        },
    );
    call.set_arg(1, Value::UInt(frame));
    call.set_arg(2, Value::UInt(index));
    call
}

/// `(frame, index)` of a call made by [`draw_call`].
pub fn draw_tag(call: &Call) -> Option<(u64, u64)> {
    if call.name() != "glDrawArrays" {
        return None;
    }
    Some((call.arg(1)?.as_u64()?, call.arg(2)?.as_u64()?))
}

pub fn swap_call() -> Call {
    let mut call = Call::new(CallNo(0), ThreadId(0), swap_sig());
    call.set_arg(0, Value::Pointer(0x5555_0000));
    call.set_arg(1, Value::UInt(0x0400_0002));
    call
}

/// A call with one argument of every value kind, a return value, and a
/// two-frame backtrace.
pub fn all_values_call() -> Call {
    let mut call = Call::new(CallNo(0), ThreadId(0), all_values_sig());
    let wide: Vec<u32> = "wïde".chars().map(u32::from).collect();
    let args = [
        Value::Null,
        Value::Bool(false),
        Value::Bool(true),
        Value::SInt(-42),
        Value::UInt(42),
        Value::Float(0.5),
        Value::Double(-2.25),
        Value::String("hello".into()),
        Value::WString(wide),
        Value::Blob(vec![0, 1, 2, 0xff]),
        Value::Enum {
            sig: primitive_mode(),
            value: 1,
        },
        Value::Bitmask {
            sig: clear_mask(),
            value: 0x4100,
        },
        Value::Array(vec![
            Value::SInt(1),
            Value::Array(vec![Value::UInt(2)]),
            Value::Null,
        ]),
        Value::Struct {
            sig: viewport(),
            members: vec![
                Value::SInt(0),
                Value::SInt(0),
                Value::SInt(640),
                Value::SInt(480),
            ],
        },
        Value::Pointer(0xdead_beef),
        Value::Repr {
            human: Box::new(Value::String("GL_ONE".into())),
            machine: Box::new(Value::UInt(1)),
        },
    ];
    for (i, arg) in args.into_iter().enumerate() {
        call.set_arg(i, arg);
    }
    call.ret = Some(Value::UInt(0));
    call.backtrace = Some(backtrace());
    call
}

/// A trace of frames where frame `i` holds `frame_lens[i]` draws followed
/// by a swap.
pub fn frame_trace(frame_lens: &[usize]) -> Vec<u8> {
    frame_trace_versioned(FORMAT_VERSION, frame_lens)
}

pub fn frame_trace_versioned(version: u64, frame_lens: &[usize]) -> Vec<u8> {
    let mut w = writer(version);
    for (frame, &len) in frame_lens.iter().enumerate() {
        for index in 0..len {
            w.write_call(&draw_call(frame as u64, index as u64))
                .expect("write to Vec");
        }
        w.write_call(&swap_call()).expect("write to Vec");
    }
    w.into_inner()
}

/// `repeats` copies of [`all_values_call`], the first defining every
/// signature inline and the rest referencing them.
pub fn all_values_trace(repeats: usize) -> Vec<u8> {
    let mut w = writer(FORMAT_VERSION);
    for _ in 0..repeats {
        w.write_call(&all_values_call()).expect("write to Vec");
    }
    w.into_inner()
}

/// A writer with the draw and swap functions already defined, so later
/// function ids stay dense.
fn writer(version: u64) -> TraceWriter<Vec<u8>> {
    let mut w = TraceWriter::with_version(Vec::new(), version).expect("supported version");
    w.define_function(&draw_sig()).expect("write to Vec");
    w.define_function(&swap_sig()).expect("write to Vec");
    w
}
