//! Bytecode assembly
//!
//! [`BytecodeBuilder`] accumulates encoded instructions; [`BytecodeBuilder::build`]
//! snapshots them into an immutable [`RunnableBytecode`].

use std::sync::Arc;

use crate::error::{BytecodeError, Result};
use crate::instruction::Instruction;
use crate::opcode_table::OpcodeInfo;
use crate::operand::{ConstantIndex, FunctionIndex, HeapOffset, Register, Width};

/// A finished, immutable instruction sequence
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunnableBytecode {
    code: Arc<[u8]>,
}

impl RunnableBytecode {
    /// Wrap already encoded bytes
    pub fn new(code: impl Into<Arc<[u8]>>) -> Self {
        Self { code: code.into() }
    }

    /// Encoded bytes
    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether the sequence is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Builder for instruction sequences
#[derive(Debug, Clone, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
}

impl BytecodeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `op` followed by its operand bytes
    ///
    /// Exactly `op.operand_width()` bytes follow the opcode. Missing trailing
    /// bytes are zero-filled; extra bytes are an error and nothing is
    /// appended. Use [`push_exact`](Self::push_exact) to reject short input too.
    pub fn push(&mut self, op: &OpcodeInfo, operands: &[u8]) -> Result<&mut Self> {
        let expected = op.operand_width();
        if operands.len() > expected {
            return Err(BytecodeError::ExcessOperandBytes {
                opcode: op.name(),
                expected,
                supplied: operands.len(),
            });
        }
        if operands.len() < expected {
            tracing::warn!(
                opcode = op.name(),
                expected,
                supplied = operands.len(),
                "zero-filling missing operand bytes"
            );
        }

        self.code.push(op.code().to_byte());
        self.code.extend_from_slice(operands);
        self.code.resize(self.code.len() + (expected - operands.len()), 0);
        Ok(self)
    }

    /// Like [`push`](Self::push) but every operand byte must be supplied
    pub fn push_exact(&mut self, op: &OpcodeInfo, operands: &[u8]) -> Result<&mut Self> {
        let expected = op.operand_width();
        if operands.len() < expected {
            return Err(BytecodeError::MissingOperandBytes {
                opcode: op.name(),
                expected,
                supplied: operands.len(),
            });
        }
        self.push(op, operands)
    }

    /// Append a typed instruction
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        instruction.encode(&mut self.code);
        self
    }

    /// NOP
    pub fn nop(&mut self) -> &mut Self {
        self.emit(Instruction::Nop)
    }

    /// PUT{B,W,L,Q}
    pub fn put(&mut self, width: Width, dst: Register, value: u64) -> &mut Self {
        self.emit(Instruction::Put { width, dst, value })
    }

    /// MOV{B,W,L,Q}
    pub fn mov(&mut self, width: Width, src: Register, dst: Register) -> &mut Self {
        self.emit(Instruction::Mov { width, src, dst })
    }

    /// LDH{B,W,L,Q}
    pub fn load_heap(&mut self, width: Width, dst: Register, offset: HeapOffset) -> &mut Self {
        self.emit(Instruction::LoadHeap { width, dst, offset })
    }

    /// STH{B,W,L,Q}
    pub fn store_heap(&mut self, width: Width, src: Register, offset: HeapOffset) -> &mut Self {
        self.emit(Instruction::StoreHeap { width, src, offset })
    }

    /// LDK{B,W,L,Q}
    pub fn load_const(
        &mut self,
        width: Width,
        dst: Register,
        constant: ConstantIndex,
    ) -> &mut Self {
        self.emit(Instruction::LoadConst {
            width,
            dst,
            constant,
        })
    }

    /// CALL
    pub fn call(&mut self, function: FunctionIndex, arg_base: Register) -> &mut Self {
        self.emit(Instruction::Call { function, arg_base })
    }

    /// RET
    pub fn ret(&mut self, src: Register) -> &mut Self {
        self.emit(Instruction::Ret { src })
    }

    /// LDRET
    pub fn load_ret(&mut self, dst: Register) -> &mut Self {
        self.emit(Instruction::LoadRet { dst })
    }

    /// HALT
    pub fn halt(&mut self) -> &mut Self {
        self.emit(Instruction::Halt)
    }

    /// Bytes emitted so far
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether nothing has been emitted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Snapshot the accumulated bytes
    ///
    /// The builder is left untouched, so calling this twice yields equal
    /// sequences.
    pub fn build(&self) -> RunnableBytecode {
        RunnableBytecode::new(self.code.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;

    #[test]
    fn test_push_nop() {
        let mut builder = BytecodeBuilder::new();
        builder.push(Opcode::Nop.info(), &[]).unwrap();
        assert_eq!(builder.build().code(), &[Opcode::Nop.to_byte()]);
    }

    #[test]
    fn test_push_putb_operand_order() {
        let mut builder = BytecodeBuilder::new();
        builder.push(Opcode::PutB.info(), &[2, 7]).unwrap();
        let code = builder.build();
        assert_eq!(code.code(), &[Opcode::PutB.to_byte(), 2, 7]);
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn test_push_zero_fills() {
        let mut builder = BytecodeBuilder::new();
        builder.push(Opcode::PutL.info(), &[1, 0xAA]).unwrap();
        assert_eq!(
            builder.build().code(),
            &[Opcode::PutL.to_byte(), 1, 0xAA, 0, 0, 0]
        );
    }

    #[test]
    fn test_push_rejects_excess() {
        let mut builder = BytecodeBuilder::new();
        let err = builder.push(Opcode::MovB.info(), &[0, 1, 2]).unwrap_err();
        assert_eq!(
            err,
            BytecodeError::ExcessOperandBytes {
                opcode: "MOVB",
                expected: 2,
                supplied: 3
            }
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn test_push_exact_rejects_short() {
        let mut builder = BytecodeBuilder::new();
        assert!(matches!(
            builder.push_exact(Opcode::PutW.info(), &[0, 1]),
            Err(BytecodeError::MissingOperandBytes { expected: 3, .. })
        ));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_typed_matches_raw() {
        let mut typed = BytecodeBuilder::new();
        typed
            .put(Width::Long, Register(0), 42)
            .mov(Width::Long, Register(0), Register(1));

        let mut raw = BytecodeBuilder::new();
        raw.push(Opcode::PutL.info(), &[0, 42, 0, 0, 0])
            .unwrap()
            .push(Opcode::MovL.info(), &[0, 1])
            .unwrap();

        assert_eq!(typed.build(), raw.build());
    }

    #[test]
    fn test_build_is_repeatable() {
        let mut builder = BytecodeBuilder::new();
        builder.nop().halt();
        let first = builder.build();
        let second = builder.build();
        assert_eq!(first, second);
        builder.nop();
        assert_eq!(first.len(), 2);
        assert_eq!(builder.build().len(), 3);
    }
}
