//! Static opcode table
//!
//! One [`OpcodeInfo`] per opcode, indexed by opcode byte. Operand slots are
//! listed in encoding order.

use std::fmt;

use serde::Serialize;

use crate::instruction::Opcode;

/// A named operand slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperandSlot {
    /// Slot name
    pub name: &'static str,
    /// Width in bytes
    pub size: u8,
}

/// Identity, mnemonic and operand layout of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpcodeInfo {
    code: Opcode,
    name: &'static str,
    operands: &'static [OperandSlot],
}

impl OpcodeInfo {
    const fn new(code: Opcode, operands: &'static [OperandSlot]) -> Self {
        Self {
            code,
            name: code.name(),
            operands,
        }
    }

    /// Opcode this entry describes
    #[inline]
    pub const fn code(&self) -> Opcode {
        self.code
    }

    /// Mnemonic
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Operand slots in encoding order
    #[inline]
    pub const fn operands(&self) -> &'static [OperandSlot] {
        self.operands
    }

    /// Number of operand slots
    #[inline]
    pub const fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Sum of operand widths in bytes
    pub const fn operand_width(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.operands.len() {
            total += self.operands[i].size as usize;
            i += 1;
        }
        total
    }

    /// Opcode byte plus operand bytes
    #[inline]
    pub const fn encoded_len(&self) -> usize {
        1 + self.operand_width()
    }

    /// Look up by raw opcode byte
    pub fn lookup(byte: u8) -> Option<&'static OpcodeInfo> {
        OPCODE_TABLE.get(byte as usize)
    }
}

impl fmt::Display for OpcodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for slot in self.operands {
            write!(f, " <{}: {}>", slot.name, slot.size)?;
        }
        f.write_str(";")
    }
}

const fn slot(name: &'static str, size: u8) -> OperandSlot {
    OperandSlot { name, size }
}

const NONE: &[OperandSlot] = &[];
const MOV: &[OperandSlot] = &[slot("src_reg", 1), slot("dst_reg", 1)];
const LDH: &[OperandSlot] = &[slot("dst_reg", 1), slot("heap_offset", 2)];
const STH: &[OperandSlot] = &[slot("src_reg", 1), slot("heap_offset", 2)];
const LDK: &[OperandSlot] = &[slot("dst_reg", 1), slot("const_index", 2)];

/// The opcode table, `OPCODE_TABLE[op as usize].code() == op`
pub static OPCODE_TABLE: [OpcodeInfo; Opcode::COUNT] = [
    OpcodeInfo::new(Opcode::Nop, NONE),
    OpcodeInfo::new(Opcode::PutB, &[slot("dst_reg", 1), slot("byte_value", 1)]),
    OpcodeInfo::new(Opcode::PutW, &[slot("dst_reg", 1), slot("word_value", 2)]),
    OpcodeInfo::new(Opcode::PutL, &[slot("dst_reg", 1), slot("long_value", 4)]),
    OpcodeInfo::new(Opcode::PutQ, &[slot("dst_reg", 1), slot("quad_value", 8)]),
    OpcodeInfo::new(Opcode::MovB, MOV),
    OpcodeInfo::new(Opcode::MovW, MOV),
    OpcodeInfo::new(Opcode::MovL, MOV),
    OpcodeInfo::new(Opcode::MovQ, MOV),
    OpcodeInfo::new(Opcode::LdhB, LDH),
    OpcodeInfo::new(Opcode::LdhW, LDH),
    OpcodeInfo::new(Opcode::LdhL, LDH),
    OpcodeInfo::new(Opcode::LdhQ, LDH),
    OpcodeInfo::new(Opcode::SthB, STH),
    OpcodeInfo::new(Opcode::SthW, STH),
    OpcodeInfo::new(Opcode::SthL, STH),
    OpcodeInfo::new(Opcode::SthQ, STH),
    OpcodeInfo::new(Opcode::LdkB, LDK),
    OpcodeInfo::new(Opcode::LdkW, LDK),
    OpcodeInfo::new(Opcode::LdkL, LDK),
    OpcodeInfo::new(Opcode::LdkQ, LDK),
    OpcodeInfo::new(
        Opcode::Call,
        &[slot("function_index", 2), slot("arg_base", 1)],
    ),
    OpcodeInfo::new(Opcode::Ret, &[slot("src_reg", 1)]),
    OpcodeInfo::new(Opcode::LdRet, &[slot("dst_reg", 1)]),
    OpcodeInfo::new(Opcode::Halt, NONE),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_code() {
        for (i, info) in OPCODE_TABLE.iter().enumerate() {
            assert_eq!(info.code().to_byte() as usize, i);
            assert_eq!(Opcode::from_byte(i as u8).unwrap().info(), info);
        }
    }

    #[test]
    fn test_put_widths() {
        assert_eq!(Opcode::PutB.info().encoded_len(), 3);
        assert_eq!(Opcode::PutW.info().encoded_len(), 4);
        assert_eq!(Opcode::PutL.info().encoded_len(), 6);
        assert_eq!(Opcode::PutQ.info().encoded_len(), 10);
        assert_eq!(Opcode::MovQ.info().encoded_len(), 3);
        assert_eq!(Opcode::Nop.info().encoded_len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::Nop.info().to_string(), "NOP;");
        assert_eq!(
            Opcode::PutW.info().to_string(),
            "PUTW <dst_reg: 1> <word_value: 2>;"
        );
    }

    #[test]
    fn test_lookup() {
        assert_eq!(OpcodeInfo::lookup(0x07).map(|i| i.name()), Some("MOVL"));
        assert!(OpcodeInfo::lookup(0xF0).is_none());
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(Opcode::MovB.info()).unwrap();
        assert_eq!(json["name"], "MOVB");
        assert_eq!(json["operands"][1]["name"], "dst_reg");
    }
}
