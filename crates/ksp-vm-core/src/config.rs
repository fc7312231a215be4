//! Runtime configuration

use serde::{Deserialize, Serialize};

use crate::error::VmResult;

/// Default maximum call depth
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default data arena size (1 MiB)
pub const DEFAULT_DATA_STACK_SIZE: usize = 1024 * 1024;

/// Limits and switches for a [`RuntimeState`](crate::RuntimeState).
///
/// Both arenas are sized from this once, at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of live call frames.
    /// Default: 1024
    pub max_call_depth: usize,

    /// Bytes shared by the registers and heaps of all live frames.
    /// Default: 1 MiB
    pub data_stack_size: usize,

    /// Stop after this many dispatched instructions.
    /// Default: unbounded
    pub instruction_budget: Option<u64>,

    /// Emit a `trace` event per dispatched instruction.
    /// Default: false
    pub trace_instructions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            data_stack_size: DEFAULT_DATA_STACK_SIZE,
            instruction_budget: None,
            trace_instructions: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> VmResult<Self> {
        serde_json::from_str(json).map_err(|e| crate::VmError::InvalidConfig(e.to_string()))
    }

    /// Set the maximum call depth.
    pub fn max_call_depth(mut self, frames: usize) -> Self {
        self.max_call_depth = frames;
        self
    }

    /// Set the data arena size in bytes.
    pub fn data_stack_size(mut self, bytes: usize) -> Self {
        self.data_stack_size = bytes;
        self
    }

    /// Bound execution to `budget` instructions.
    pub fn instruction_budget(mut self, budget: u64) -> Self {
        self.instruction_budget = Some(budget);
        self
    }

    /// Enable or disable per-instruction tracing.
    pub fn trace_instructions(mut self, enabled: bool) -> Self {
        self.trace_instructions = enabled;
        self
    }
}
