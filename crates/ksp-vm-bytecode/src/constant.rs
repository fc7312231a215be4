//! Typed constant values

use crate::error::{BytecodeError, Result};
use crate::types::Type;

/// A constant: a type plus exactly `type.size()` bytes of storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantValue {
    ty: Type,
    data: Box<[u8]>,
}

impl ConstantValue {
    /// Zero-initialized constant of type `ty`
    pub fn new(ty: Type) -> Result<Self> {
        ty.require_valid("constant type")?;
        let data = vec![0u8; ty.size()].into_boxed_slice();
        Ok(Self { ty, data })
    }

    /// Constant initialized from raw bytes, which must be exactly `ty.size()` long
    pub fn with_bytes(ty: Type, bytes: impl Into<Box<[u8]>>) -> Result<Self> {
        ty.require_valid("constant type")?;
        let data = bytes.into();
        if data.len() != ty.size() {
            return Err(BytecodeError::ConstantSizeMismatch {
                expected: ty.size(),
                actual: data.len(),
            });
        }
        Ok(Self { ty, data })
    }

    /// Constant holding the low `ty.size()` bytes of `value`, little-endian
    ///
    /// Only types of at most eight bytes can be built this way.
    pub fn from_bits(ty: Type, value: u64) -> Result<Self> {
        ty.require_valid("constant type")?;
        let size = ty.size();
        if size > 8 {
            return Err(BytecodeError::ConstantSizeMismatch {
                expected: size,
                actual: 8,
            });
        }
        Self::with_bytes(ty, &value.to_le_bytes()[..size])
    }

    /// Constant type
    #[inline]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Backing bytes
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable backing bytes, for filling in an initializer before declaration
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte length
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the constant has no storage
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
