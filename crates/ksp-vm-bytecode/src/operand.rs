//! Bytecode operands

use serde::{Deserialize, Serialize};

/// Width of a register slot in bytes
pub const REGISTER_WIDTH: usize = 8;

/// Frame register (0-255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Register(pub u8);

impl Register {
    /// Create a new register
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Get register index
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl From<u8> for Register {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

/// Index into a module's constant accessor array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConstantIndex(pub u16);

impl ConstantIndex {
    /// Create a new constant index
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

/// Index into a module's function accessor array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FunctionIndex(pub u16);

impl FunctionIndex {
    /// Create a new function index
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

/// Byte offset into the current frame's heap region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct HeapOffset(pub u16);

impl HeapOffset {
    /// Create a new heap offset
    #[inline]
    pub const fn new(offset: u16) -> Self {
        Self(offset)
    }

    /// Get offset value
    #[inline]
    pub const fn offset(self) -> u16 {
        self.0
    }
}

/// Access width of a width-tagged instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Width {
    /// 1 byte
    Byte = 1,
    /// 2 bytes
    Word = 2,
    /// 4 bytes
    Long = 4,
    /// 8 bytes
    Quad = 8,
}

impl Width {
    /// All widths, narrowest first
    pub const ALL: [Width; 4] = [Width::Byte, Width::Word, Width::Long, Width::Quad];

    /// Number of bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Mask selecting the low `bytes()` bytes of a register
    #[inline]
    pub const fn mask(self) -> u64 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Long => 0xFFFF_FFFF,
            Width::Quad => u64::MAX,
        }
    }

    /// Zero-extend the low `bytes()` bytes of `value`
    #[inline]
    pub const fn truncate(self, value: u64) -> u64 {
        value & self.mask()
    }

    /// Position of this width within a PUT/MOV/LDH/STH/LDK group
    #[inline]
    pub(crate) const fn group_offset(self) -> u8 {
        match self {
            Width::Byte => 0,
            Width::Word => 1,
            Width::Long => 2,
            Width::Quad => 3,
        }
    }
}
