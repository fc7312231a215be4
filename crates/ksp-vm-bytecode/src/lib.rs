//! # KSP VM Bytecode
//!
//! Declarations and encoding for the KSP virtual machine.
//!
//! - **Types**: structural type descriptors with fixed sizes
//! - **Opcodes**: a static table of instruction names and operand layouts
//! - **Builder**: assembles instructions into immutable runnable sequences
//! - **Modules**: named types, constants and functions with a build-then-freeze
//!   lifecycle and O(1) accessors once built

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod constant;
pub mod disasm;
pub mod error;
pub mod function;
pub mod instruction;
pub mod module;
pub mod name_table;
pub mod opcode_table;
pub mod operand;
pub mod support;
pub mod types;

pub use builder::{BytecodeBuilder, RunnableBytecode};
pub use constant::ConstantValue;
pub use disasm::disassemble;
pub use error::{BytecodeError, Result};
pub use function::{FrameLayout, Function, Variable};
pub use instruction::{Instruction, Opcode};
pub use module::Module;
pub use name_table::{
    Accessors, BuildState, Declaration, DeclarationKind, Element, LinkedFunction, NameTable,
};
pub use opcode_table::{OPCODE_TABLE, OpcodeInfo, OperandSlot};
pub use operand::{ConstantIndex, FunctionIndex, HeapOffset, REGISTER_WIDTH, Register, Width};
pub use types::{FunctionSignature, POINTER_SIZE, Parameter, Type, TypeKind};
