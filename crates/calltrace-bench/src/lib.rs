//! Benchmark trace profiles for calltrace.
//!
//! Provides deterministic synthetic traces for benchmarking:
//!
//! - [`reference_profile`]: 60 frames of 40 draws, a typical game frame
//! - [`stress_profile`]: 600 frames of 200 draws with large uniform arrays
//!
//! Argument values come from a seeded ChaCha8 RNG, so the same profile
//! always produces the same bytes.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use calltrace_core::{
    Call, CallFlags, CallNo, EnumSig, EnumValue, FunctionSig, SigId, ThreadId, Value,
};
use calltrace_replay::{TraceError, TraceWriter};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Shape of a synthetic trace.
#[derive(Clone, Debug)]
pub struct TraceProfile {
    /// Number of frames, each ended by a swap.
    pub frames: usize,
    /// Draw calls per frame, each preceded by a uniform upload.
    pub draws_per_frame: usize,
    /// Floats per uniform upload.
    pub uniform_len: usize,
    /// RNG seed for argument values.
    pub seed: u64,
}

impl TraceProfile {
    /// Total calls the trace contains.
    pub fn call_count(&self) -> usize {
        self.frames * (2 * self.draws_per_frame + 1)
    }
}

/// 60 frames × 40 draws with 16-float uniforms.
pub fn reference_profile(seed: u64) -> TraceProfile {
    TraceProfile {
        frames: 60,
        draws_per_frame: 40,
        uniform_len: 16,
        seed,
    }
}

/// 600 frames × 200 draws with 256-float uniforms.
pub fn stress_profile(seed: u64) -> TraceProfile {
    TraceProfile {
        frames: 600,
        draws_per_frame: 200,
        uniform_len: 256,
        seed,
    }
}

fn function(id: u32, name: &str, args: &[&str]) -> Arc<FunctionSig> {
    Arc::new(FunctionSig {
        id: SigId(id),
        name: name.into(),
        arg_names: args.iter().map(|s| s.to_string()).collect(),
        flags: CallFlags::empty(),
    })
}

/// Encode the trace described by `profile`.
pub fn build_trace(profile: &TraceProfile) -> Result<Vec<u8>, TraceError> {
    let mut rng = ChaCha8Rng::seed_from_u64(profile.seed);
    let uniform = function(0, "glUniform4fv", &["location", "count", "value"]);
    let draw = function(1, "glDrawElements", &["mode", "count", "type", "indices"]);
    let swap = function(2, "glXSwapBuffers", &["dpy", "drawable"]);
    let mode = Arc::new(EnumSig {
        id: SigId(0),
        values: [("GL_TRIANGLES", 4), ("GL_TRIANGLE_STRIP", 5)]
            .into_iter()
            .map(|(name, value)| EnumValue {
                name: name.into(),
                value,
            })
            .collect(),
    });

    let mut w = TraceWriter::new(Vec::with_capacity(profile.call_count() * 32))?;
    for _ in 0..profile.frames {
        for _ in 0..profile.draws_per_frame {
            let mut call = Call::new(CallNo(0), ThreadId(0), Arc::clone(&uniform));
            call.set_arg(0, Value::SInt(i64::from(rng.next_u32() % 64)));
            call.set_arg(1, Value::SInt((profile.uniform_len / 4) as i64));
            let floats = (0..profile.uniform_len)
                .map(|_| Value::Float(rng.next_u32() as f32 / u32::MAX as f32))
                .collect();
            call.set_arg(2, Value::Array(floats));
            w.write_call(&call)?;

            let mut call = Call::new(CallNo(0), ThreadId(0), Arc::clone(&draw));
            call.set_arg(
                0,
                Value::Enum {
                    sig: Arc::clone(&mode),
                    value: 4 + i64::from(rng.next_u32() & 1),
                },
            );
            call.set_arg(1, Value::SInt(i64::from(rng.next_u32() % 30_000)));
            call.set_arg(2, Value::UInt(0x1405));
            call.set_arg(3, Value::Pointer(rng.next_u64() & 0xffff_fff0));
            w.write_call(&call)?;
        }
        let mut call = Call::new(CallNo(0), ThreadId(0), Arc::clone(&swap));
        call.set_arg(0, Value::Pointer(0x5555_0000));
        call.set_arg(1, Value::UInt(0x0400_0002));
        w.write_call(&call)?;
    }
    Ok(w.into_inner())
}
