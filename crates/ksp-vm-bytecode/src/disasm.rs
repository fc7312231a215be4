//! Human-readable listings of encoded bytecode

use std::fmt::Write;

use crate::error::Result;
use crate::instruction::Instruction;

/// Render one line per instruction: `offset: MNEMONIC operands`
///
/// Decoding stops at the first malformed instruction and returns its error.
pub fn disassemble(code: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut pc = 0;
    while pc < code.len() {
        let (instruction, len) = Instruction::decode(code, pc)?;
        let _ = writeln!(out, "{pc:04x}: {}", format_instruction(&instruction));
        pc += len;
    }
    Ok(out)
}

/// Mnemonic and operands of a single instruction
pub fn format_instruction(instruction: &Instruction) -> String {
    let name = instruction.opcode().name();
    match *instruction {
        Instruction::Nop | Instruction::Halt => name.to_string(),
        Instruction::Put { dst, value, .. } => format!("{name} r{}, {value:#x}", dst.0),
        Instruction::Mov { src, dst, .. } => format!("{name} r{}, r{}", src.0, dst.0),
        Instruction::LoadHeap { dst, offset, .. } => {
            format!("{name} r{}, heap[{}]", dst.0, offset.0)
        }
        Instruction::StoreHeap { src, offset, .. } => {
            format!("{name} r{}, heap[{}]", src.0, offset.0)
        }
        Instruction::LoadConst { dst, constant, .. } => {
            format!("{name} r{}, k{}", dst.0, constant.0)
        }
        Instruction::Call { function, arg_base } => {
            format!("{name} f{}, r{}", function.0, arg_base.0)
        }
        Instruction::Ret { src } => format!("{name} r{}", src.0),
        Instruction::LoadRet { dst } => format!("{name} r{}", dst.0),
    }
}
