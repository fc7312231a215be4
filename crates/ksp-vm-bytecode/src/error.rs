//! Bytecode and declaration errors

use thiserror::Error;

/// Errors raised while assembling bytecode or declaring module contents.
///
/// All of these are recoverable: the caller gets the error back and the
/// container it was working on is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Byte does not name an opcode in the table
    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Instruction operands run past the end of the code
    #[error("Truncated instruction at offset {offset}")]
    TruncatedInstruction {
        /// Offset of the opcode byte
        offset: usize,
    },

    /// A name is declared twice in the same table
    #[error("Declaration conflict: '{0}' is already declared")]
    DeclarationConflict(String),

    /// A name lookup missed
    #[error("Declaration not found: '{0}'")]
    DeclarationNotFound(String),

    /// The invalid type was used where a real type is required
    #[error("Invalid type used as {0}")]
    InvalidTypeUse(&'static str),

    /// A built container was asked to change
    #[error("Cannot modify built {0}")]
    FrozenModuleMutation(&'static str),

    /// A declaration has a different kind than the caller asked for
    #[error("'{name}' is declared as {found}, expected {expected}")]
    WrongDeclarationKind {
        /// Declared name
        name: String,
        /// Kind the caller asked for
        expected: &'static str,
        /// Kind actually declared (or "nothing")
        found: &'static str,
    },

    /// Constant initializer length differs from its type size
    #[error("Constant needs {expected} bytes, got {actual}")]
    ConstantSizeMismatch {
        /// `type.size()`
        expected: usize,
        /// Supplied byte count
        actual: usize,
    },

    /// Function declares more variables than a register operand can address
    #[error("Function needs {0} registers, at most 255 are addressable")]
    TooManyRegisters(usize),

    /// Local arrays of a function need more heap than `usize` can hold
    #[error("Function heap size overflows usize")]
    FrameHeapOverflow,

    /// More operand bytes were supplied than the opcode declares
    #[error("{opcode} takes {expected} operand bytes, {supplied} supplied")]
    ExcessOperandBytes {
        /// Opcode name
        opcode: &'static str,
        /// Declared operand width
        expected: usize,
        /// Bytes passed in
        supplied: usize,
    },

    /// Fewer operand bytes were supplied than the opcode declares
    #[error("{opcode} takes {expected} operand bytes, {supplied} supplied")]
    MissingOperandBytes {
        /// Opcode name
        opcode: &'static str,
        /// Declared operand width
        expected: usize,
        /// Bytes passed in
        supplied: usize,
    },

    /// More constants or functions than a 16-bit accessor index can address
    #[error("{0} declarations of one kind, at most 65536 are addressable")]
    TooManyDeclarations(usize),

    /// A module was used before `build` froze it
    #[error("Module '{0}' is not built")]
    ModuleNotBuilt(String),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
