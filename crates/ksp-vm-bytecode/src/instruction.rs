//! Bytecode instructions (opcodes)
//!
//! Every instruction is one opcode byte followed by its operands, each a
//! fixed-width little-endian integer. Widths are fixed per opcode and listed
//! in [`crate::opcode_table`].

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::opcode_table::OpcodeInfo;
use crate::operand::{ConstantIndex, FunctionIndex, HeapOffset, Register, Width};

/// Bytecode opcodes
///
/// Per-frame register machine. Register operands are one byte; register slots
/// are eight bytes wide and narrower writes zero the unused high bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// No operation
    Nop = 0x00,

    // ==================== Immediates ====================
    /// dst = imm8
    PutB = 0x01,
    /// dst = imm16
    PutW = 0x02,
    /// dst = imm32
    PutL = 0x03,
    /// dst = imm64
    PutQ = 0x04,

    // ==================== Register moves ====================
    /// dst = src & 0xFF
    MovB = 0x05,
    /// dst = src & 0xFFFF
    MovW = 0x06,
    /// dst = src & 0xFFFF_FFFF
    MovL = 0x07,
    /// dst = src
    MovQ = 0x08,

    // ==================== Frame heap ====================
    /// dst = heap\[off..off+1\]
    LdhB = 0x09,
    /// dst = heap\[off..off+2\]
    LdhW = 0x0A,
    /// dst = heap\[off..off+4\]
    LdhL = 0x0B,
    /// dst = heap\[off..off+8\]
    LdhQ = 0x0C,
    /// heap\[off..off+1\] = src
    SthB = 0x0D,
    /// heap\[off..off+2\] = src
    SthW = 0x0E,
    /// heap\[off..off+4\] = src
    SthL = 0x0F,
    /// heap\[off..off+8\] = src
    SthQ = 0x10,

    // ==================== Module constants ====================
    /// dst = constants\[idx\]\[0..1\]
    LdkB = 0x11,
    /// dst = constants\[idx\]\[0..2\]
    LdkW = 0x12,
    /// dst = constants\[idx\]\[0..4\]
    LdkL = 0x13,
    /// dst = constants\[idx\]\[0..8\]
    LdkQ = 0x14,

    // ==================== Control ====================
    /// Call module function, arguments start at `arg_base`
    Call = 0x15,
    /// Return a register to the caller
    Ret = 0x16,
    /// dst = return register
    LdRet = 0x17,
    /// Stop execution
    Halt = 0x18,
}

impl Opcode {
    /// Number of opcodes in the table
    pub const COUNT: usize = 0x19;

    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),

            0x01 => Some(Self::PutB),
            0x02 => Some(Self::PutW),
            0x03 => Some(Self::PutL),
            0x04 => Some(Self::PutQ),

            0x05 => Some(Self::MovB),
            0x06 => Some(Self::MovW),
            0x07 => Some(Self::MovL),
            0x08 => Some(Self::MovQ),

            0x09 => Some(Self::LdhB),
            0x0A => Some(Self::LdhW),
            0x0B => Some(Self::LdhL),
            0x0C => Some(Self::LdhQ),
            0x0D => Some(Self::SthB),
            0x0E => Some(Self::SthW),
            0x0F => Some(Self::SthL),
            0x10 => Some(Self::SthQ),

            0x11 => Some(Self::LdkB),
            0x12 => Some(Self::LdkW),
            0x13 => Some(Self::LdkL),
            0x14 => Some(Self::LdkQ),

            0x15 => Some(Self::Call),
            0x16 => Some(Self::Ret),
            0x17 => Some(Self::LdRet),
            0x18 => Some(Self::Halt),

            _ => None,
        }
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic of this opcode
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::PutB => "PUTB",
            Self::PutW => "PUTW",
            Self::PutL => "PUTL",
            Self::PutQ => "PUTQ",
            Self::MovB => "MOVB",
            Self::MovW => "MOVW",
            Self::MovL => "MOVL",
            Self::MovQ => "MOVQ",
            Self::LdhB => "LDHB",
            Self::LdhW => "LDHW",
            Self::LdhL => "LDHL",
            Self::LdhQ => "LDHQ",
            Self::SthB => "STHB",
            Self::SthW => "STHW",
            Self::SthL => "STHL",
            Self::SthQ => "STHQ",
            Self::LdkB => "LDKB",
            Self::LdkW => "LDKW",
            Self::LdkL => "LDKL",
            Self::LdkQ => "LDKQ",
            Self::Call => "CALL",
            Self::Ret => "RET",
            Self::LdRet => "LDRET",
            Self::Halt => "HALT",
        }
    }

    /// Static table entry for this opcode
    #[inline]
    pub fn info(self) -> &'static OpcodeInfo {
        &crate::opcode_table::OPCODE_TABLE[self as usize]
    }

    /// Access width for width-tagged opcodes
    pub const fn width(self) -> Option<Width> {
        match self {
            Self::PutB | Self::MovB | Self::LdhB | Self::SthB | Self::LdkB => Some(Width::Byte),
            Self::PutW | Self::MovW | Self::LdhW | Self::SthW | Self::LdkW => Some(Width::Word),
            Self::PutL | Self::MovL | Self::LdhL | Self::SthL | Self::LdkL => Some(Width::Long),
            Self::PutQ | Self::MovQ | Self::LdhQ | Self::SthQ | Self::LdkQ => Some(Width::Quad),
            _ => None,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded instruction with its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// No operation
    Nop,
    /// Write an immediate into a register
    Put {
        /// Immediate width
        width: Width,
        /// Destination register
        dst: Register,
        /// Immediate, only the low `width` bytes are encoded
        value: u64,
    },
    /// Copy the low `width` bytes of one register into another
    Mov {
        /// Copy width
        width: Width,
        /// Source register
        src: Register,
        /// Destination register
        dst: Register,
    },
    /// Load from the frame heap into a register
    LoadHeap {
        /// Load width
        width: Width,
        /// Destination register
        dst: Register,
        /// Byte offset into the heap region
        offset: HeapOffset,
    },
    /// Store the low `width` bytes of a register into the frame heap
    StoreHeap {
        /// Store width
        width: Width,
        /// Source register
        src: Register,
        /// Byte offset into the heap region
        offset: HeapOffset,
    },
    /// Load the leading `width` bytes of a module constant
    LoadConst {
        /// Load width
        width: Width,
        /// Destination register
        dst: Register,
        /// Constant accessor index
        constant: ConstantIndex,
    },
    /// Call a module function
    Call {
        /// Function accessor index
        function: FunctionIndex,
        /// First caller register copied into the callee's parameters
        arg_base: Register,
    },
    /// Return a register to the caller
    Ret {
        /// Register holding the return value
        src: Register,
    },
    /// Copy the return register into a register
    LoadRet {
        /// Destination register
        dst: Register,
    },
    /// Stop execution
    Halt,
}

impl Instruction {
    /// Opcode this instruction encodes to
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::Nop => Opcode::Nop,
            Self::Put { width, .. } => grouped(Opcode::PutB, width),
            Self::Mov { width, .. } => grouped(Opcode::MovB, width),
            Self::LoadHeap { width, .. } => grouped(Opcode::LdhB, width),
            Self::StoreHeap { width, .. } => grouped(Opcode::SthB, width),
            Self::LoadConst { width, .. } => grouped(Opcode::LdkB, width),
            Self::Call { .. } => Opcode::Call,
            Self::Ret { .. } => Opcode::Ret,
            Self::LoadRet { .. } => Opcode::LdRet,
            Self::Halt => Opcode::Halt,
        }
    }

    /// Total encoded length, opcode byte included
    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.opcode().info().encoded_len()
    }

    /// Append the encoded form to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().to_byte());
        match *self {
            Self::Nop | Self::Halt => {}
            Self::Put { width, dst, value } => {
                out.push(dst.0);
                out.extend_from_slice(&value.to_le_bytes()[..width.bytes()]);
            }
            Self::Mov { src, dst, .. } => {
                out.push(src.0);
                out.push(dst.0);
            }
            Self::LoadHeap { dst, offset, .. } => {
                out.push(dst.0);
                out.extend_from_slice(&offset.0.to_le_bytes());
            }
            Self::StoreHeap { src, offset, .. } => {
                out.push(src.0);
                out.extend_from_slice(&offset.0.to_le_bytes());
            }
            Self::LoadConst { dst, constant, .. } => {
                out.push(dst.0);
                out.extend_from_slice(&constant.0.to_le_bytes());
            }
            Self::Call { function, arg_base } => {
                out.extend_from_slice(&function.0.to_le_bytes());
                out.push(arg_base.0);
            }
            Self::Ret { src } => out.push(src.0),
            Self::LoadRet { dst } => out.push(dst.0),
        }
    }

    /// Decode the instruction starting at `code[pc]`
    ///
    /// Returns the instruction and its encoded length.
    pub fn decode(code: &[u8], pc: usize) -> Result<(Self, usize)> {
        let byte = *code
            .get(pc)
            .ok_or(BytecodeError::TruncatedInstruction { offset: pc })?;
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::UnknownOpcode(byte))?;
        let len = opcode.info().encoded_len();
        let operands = code
            .get(pc + 1..pc + len)
            .ok_or(BytecodeError::TruncatedInstruction { offset: pc })?;

        let u16_at = |at: usize| u16::from_le_bytes([operands[at], operands[at + 1]]);

        let instruction = match opcode {
            Opcode::Nop => Self::Nop,
            Opcode::Halt => Self::Halt,
            Opcode::PutB | Opcode::PutW | Opcode::PutL | Opcode::PutQ => {
                let mut raw = [0u8; 8];
                raw[..len - 2].copy_from_slice(&operands[1..]);
                Self::Put {
                    width: width_of(opcode),
                    dst: Register(operands[0]),
                    value: u64::from_le_bytes(raw),
                }
            }
            Opcode::MovB | Opcode::MovW | Opcode::MovL | Opcode::MovQ => Self::Mov {
                width: width_of(opcode),
                src: Register(operands[0]),
                dst: Register(operands[1]),
            },
            Opcode::LdhB | Opcode::LdhW | Opcode::LdhL | Opcode::LdhQ => Self::LoadHeap {
                width: width_of(opcode),
                dst: Register(operands[0]),
                offset: HeapOffset(u16_at(1)),
            },
            Opcode::SthB | Opcode::SthW | Opcode::SthL | Opcode::SthQ => Self::StoreHeap {
                width: width_of(opcode),
                src: Register(operands[0]),
                offset: HeapOffset(u16_at(1)),
            },
            Opcode::LdkB | Opcode::LdkW | Opcode::LdkL | Opcode::LdkQ => Self::LoadConst {
                width: width_of(opcode),
                dst: Register(operands[0]),
                constant: ConstantIndex(u16_at(1)),
            },
            Opcode::Call => Self::Call {
                function: FunctionIndex(u16_at(0)),
                arg_base: Register(operands[2]),
            },
            Opcode::Ret => Self::Ret {
                src: Register(operands[0]),
            },
            Opcode::LdRet => Self::LoadRet {
                dst: Register(operands[0]),
            },
        };

        Ok((instruction, len))
    }
}

/// Member of a width-tagged opcode group, `base` is the byte-wide member
#[inline]
fn grouped(base: Opcode, width: Width) -> Opcode {
    // Groups are laid out contiguously B, W, L, Q.
    Opcode::from_byte(base.to_byte() + width.group_offset()).unwrap_or(base)
}

#[inline]
fn width_of(opcode: Opcode) -> Width {
    opcode.width().unwrap_or(Width::Quad)
}
