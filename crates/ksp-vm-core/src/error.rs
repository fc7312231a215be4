//! VM error types

use std::fmt;

use thiserror::Error;

/// Fixed-capacity region that ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Call-frame arena; `capacity` is the configured maximum call depth
    CallFrames {
        /// Maximum number of live frames
        capacity: usize,
    },
    /// Data arena backing registers and frame heaps
    DataArena {
        /// Bytes the new frame needs
        requested: usize,
        /// Bytes left above the current top
        available: usize,
    },
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::CallFrames { capacity } => {
                write!(f, "call depth limit of {capacity} frames reached")
            }
            Resource::DataArena {
                requested,
                available,
            } => write!(
                f,
                "data arena needs {requested} bytes but only {available} are free"
            ),
        }
    }
}

/// VM execution errors
///
/// Everything except [`VmError::Bytecode`] raised during dispatch is fatal to
/// the running state: the engine stops and the state must be reset before it
/// executes again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// A fixed arena is full
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(Resource),

    /// Dispatch hit a byte outside the opcode table
    #[error("Unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode {
        /// Offending byte
        opcode: u8,
        /// Program counter of the byte
        offset: usize,
    },

    /// Operands run past the end of the code
    #[error("Truncated instruction at offset {offset}")]
    TruncatedInstruction {
        /// Program counter of the opcode
        offset: usize,
    },

    /// Register operand beyond the frame's register count
    #[error("Register r{register} out of range, frame has {count}")]
    RegisterOutOfRange {
        /// Register operand
        register: u8,
        /// Registers in the current frame
        count: usize,
    },

    /// Heap access outside the frame's scratch region
    #[error("Heap access of {width} bytes at {offset} outside a {size}-byte frame heap")]
    HeapOutOfRange {
        /// Heap offset operand
        offset: usize,
        /// Access width
        width: usize,
        /// Frame heap size
        size: usize,
    },

    /// `CALL` names a function index the module does not have
    #[error("Unknown function index {0}")]
    UnknownFunction(u16),

    /// `LDK*` names a constant index the module does not have
    #[error("Unknown constant index {0}")]
    UnknownConstant(u16),

    /// Constant is narrower than the load width
    #[error("Constant {index} has {size} bytes, cannot load {width}")]
    ConstantTooSmall {
        /// Constant index
        index: u16,
        /// Load width
        width: usize,
        /// Constant size
        size: usize,
    },

    /// Execution was requested against a module still being built
    #[error("Module is not built")]
    ModuleNotBuilt,

    /// Frame access with an empty call stack
    #[error("No active call frame")]
    NoActiveFrame,

    /// Instruction budget ran out
    #[error("Instruction budget of {0} exhausted")]
    InstructionBudgetExceeded(u64),

    /// Execution was interrupted (timeout/cancellation)
    #[error("Execution interrupted")]
    Interrupted,

    /// Runtime configuration could not be parsed
    #[error("Invalid runtime config: {0}")]
    InvalidConfig(String),

    /// Bytecode error
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] ksp_vm_bytecode::BytecodeError),
}

impl VmError {
    /// Convert a decode failure at `offset` into its run-time form
    pub(crate) fn from_decode(error: ksp_vm_bytecode::BytecodeError, offset: usize) -> Self {
        use ksp_vm_bytecode::BytecodeError;
        match error {
            BytecodeError::UnknownOpcode(opcode) => VmError::UnknownOpcode { opcode, offset },
            BytecodeError::TruncatedInstruction { offset } => {
                VmError::TruncatedInstruction { offset }
            }
            other => VmError::Bytecode(other),
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;
