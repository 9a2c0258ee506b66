//! Loop playback configuration and validation.
//!
//! [`LoopConfig`] replaces process-wide loop flags: it is handed to
//! [`LastFrameLooper`](crate::playback::LastFrameLooper) at construction
//! and checked with [`validate()`](LoopConfig::validate) there.

use std::error::Error;
use std::fmt;

// ── LoopConfig ────────────────────────────────────────────────────

/// How the last frame of a trace is replayed once the stream ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopConfig {
    /// Replay the last complete frame after end of stream. Default: false.
    pub loop_on_finish: bool,
    /// Wrap around without raising the per-iteration boundary signal.
    /// Default: false.
    pub loop_continuously: bool,
    /// Number of times to replay the last frame. `0` loops forever.
    /// Default: 0.
    pub loop_iterations: u32,
}

impl LoopConfig {
    /// Loop the last frame forever.
    pub fn forever() -> Self {
        Self {
            loop_on_finish: true,
            loop_continuously: true,
            loop_iterations: 0,
        }
    }

    /// Replay the last frame `n` times, then end the stream.
    pub fn iterations(n: u32) -> Self {
        Self {
            loop_on_finish: true,
            loop_continuously: false,
            loop_iterations: n,
        }
    }

    /// True if looping never ends on its own.
    pub fn is_unbounded(&self) -> bool {
        self.loop_on_finish && self.loop_iterations == 0
    }

    /// Check that the settings are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.loop_on_finish {
            if self.loop_iterations != 0 {
                return Err(ConfigError::IterationsWithoutLoop {
                    iterations: self.loop_iterations,
                });
            }
            if self.loop_continuously {
                return Err(ConfigError::ContinuousWithoutLoop);
            }
        }
        Ok(())
    }
}

// ── ConfigError ───────────────────────────────────────────────────

/// Errors detected by [`LoopConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// An iteration count was given but looping is disabled.
    IterationsWithoutLoop {
        /// The configured count.
        iterations: u32,
    },
    /// Continuous looping was requested but looping is disabled.
    ContinuousWithoutLoop,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationsWithoutLoop { iterations } => {
                write!(f, "loop_iterations {iterations} requires loop_on_finish")
            }
            Self::ContinuousWithoutLoop => {
                write!(f, "loop_continuously requires loop_on_finish")
            }
        }
    }
}

impl Error for ConfigError {}
