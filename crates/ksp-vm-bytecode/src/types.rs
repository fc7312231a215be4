//! Type descriptors
//!
//! A [`Type`] describes the shape and byte size of a value. Scalars are unit
//! variants, so every scalar descriptor is a process-wide constant with no
//! allocation behind it. Pointer, array and function descriptors own their
//! component types; cloning a descriptor deep-copies the whole tree.
//!
//! Constructors never fail. Bad input produces [`Type::Invalid`], which has
//! size 0 and must be checked with [`Type::is_invalid`] (or rejected with
//! [`Type::require_valid`]) before the descriptor is used.

use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};

/// Size of pointer and function descriptors
pub const POINTER_SIZE: usize = size_of::<usize>();

/// Discriminant of a [`Type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeKind {
    /// No type
    Invalid = 0x00,
    /// i8
    Byte,
    /// i16
    Short,
    /// i32
    Integer,
    /// i64
    Long,
    /// u8
    UByte,
    /// u16
    UShort,
    /// u32
    UInteger,
    /// u64
    ULong,
    /// f32
    Float,
    /// f64
    Double,
    /// bool
    Boolean,
    /// UTF-16 code unit
    Character,
    /// Pointer to a component type
    Pointer,
    /// Fixed-length array of a component type
    Array,
    /// Function signature
    Function,
}

impl TypeKind {
    /// Whether this kind is one of the built-in scalars
    #[inline]
    pub const fn is_scalar(self) -> bool {
        !matches!(
            self,
            TypeKind::Invalid | TypeKind::Pointer | TypeKind::Array | TypeKind::Function
        )
    }
}

/// A named function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter type
    pub ty: Type,
    /// Parameter name
    pub name: String,
}

impl Parameter {
    /// Create a parameter
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }
}

/// Return type and parameters of a function type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Return type
    pub return_type: Type,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
}

impl PartialEq for FunctionSignature {
    // Parameter names are labels, not part of the type.
    fn eq(&self, other: &Self) -> bool {
        self.return_type == other.return_type
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.ty == b.ty)
    }
}

impl Eq for FunctionSignature {}

/// A value type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Type {
    /// "No type" sentinel, size 0
    #[default]
    Invalid,
    /// i8
    Byte,
    /// i16
    Short,
    /// i32
    Integer,
    /// i64
    Long,
    /// u8
    UByte,
    /// u16
    UShort,
    /// u32
    UInteger,
    /// u64
    ULong,
    /// f32
    Float,
    /// f64
    Double,
    /// bool
    Boolean,
    /// UTF-16 code unit
    Character,
    /// Pointer to `component`
    Pointer(Box<Type>),
    /// `count` consecutive `component` values
    Array {
        /// Element type
        component: Box<Type>,
        /// Element count, never 0
        count: usize,
    },
    /// Function signature
    Function(Box<FunctionSignature>),
}

impl Type {
    /// The built-in scalar descriptors
    pub const SCALARS: [Type; 12] = [
        Type::Byte,
        Type::Short,
        Type::Integer,
        Type::Long,
        Type::UByte,
        Type::UShort,
        Type::UInteger,
        Type::ULong,
        Type::Float,
        Type::Double,
        Type::Boolean,
        Type::Character,
    ];

    /// Pointer to a copy of `component`
    pub fn pointer_of(component: &Type) -> Type {
        if component.is_invalid() {
            return Type::Invalid;
        }
        Type::Pointer(Box::new(component.clone()))
    }

    /// `depth` levels of pointer around `component`
    pub fn pointer_of_depth(component: &Type, depth: usize) -> Type {
        if depth == 0 || component.is_invalid() {
            return Type::Invalid;
        }
        let mut ty = component.clone();
        for _ in 0..depth {
            ty = Type::Pointer(Box::new(ty));
        }
        ty
    }

    /// Array of `count` copies of `component`
    ///
    /// A zero count, an invalid component or a total size past `usize::MAX`
    /// yields [`Type::Invalid`].
    pub fn array_of(component: &Type, count: usize) -> Type {
        if count == 0
            || component.is_invalid()
            || component.size().checked_mul(count).is_none()
        {
            return Type::Invalid;
        }
        Type::Array {
            component: Box::new(component.clone()),
            count,
        }
    }

    /// Multi-dimensional array, outermost dimension first
    ///
    /// `array_of_dims(int, &[2, 3])` is two arrays of three ints.
    pub fn array_of_dims(component: &Type, dims: &[usize]) -> Type {
        if dims.is_empty() {
            return Type::Invalid;
        }
        dims.iter()
            .rev()
            .fold(component.clone(), |ty, &count| Type::array_of(&ty, count))
    }

    /// Function type
    pub fn function(return_type: &Type, parameters: &[Parameter]) -> Type {
        if return_type.is_invalid() || parameters.iter().any(|p| p.ty.is_invalid()) {
            return Type::Invalid;
        }
        Type::Function(Box::new(FunctionSignature {
            return_type: return_type.clone(),
            parameters: parameters.to_vec(),
        }))
    }

    /// Discriminant
    pub const fn kind(&self) -> TypeKind {
        match self {
            Type::Invalid => TypeKind::Invalid,
            Type::Byte => TypeKind::Byte,
            Type::Short => TypeKind::Short,
            Type::Integer => TypeKind::Integer,
            Type::Long => TypeKind::Long,
            Type::UByte => TypeKind::UByte,
            Type::UShort => TypeKind::UShort,
            Type::UInteger => TypeKind::UInteger,
            Type::ULong => TypeKind::ULong,
            Type::Float => TypeKind::Float,
            Type::Double => TypeKind::Double,
            Type::Boolean => TypeKind::Boolean,
            Type::Character => TypeKind::Character,
            Type::Pointer(_) => TypeKind::Pointer,
            Type::Array { .. } => TypeKind::Array,
            Type::Function(_) => TypeKind::Function,
        }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        match self {
            Type::Invalid => 0,
            Type::Byte | Type::UByte | Type::Boolean => 1,
            Type::Short | Type::UShort | Type::Character => 2,
            Type::Integer | Type::UInteger | Type::Float => 4,
            Type::Long | Type::ULong | Type::Double => 8,
            Type::Pointer(_) | Type::Function(_) => POINTER_SIZE,
            // only hand-built variants can exceed usize::MAX
            Type::Array { component, count } => component.size().saturating_mul(*count),
        }
    }

    /// Whether this is the invalid sentinel
    #[inline]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    /// Whether this is a built-in scalar
    #[inline]
    pub const fn is_scalar(&self) -> bool {
        self.kind().is_scalar()
    }

    /// Reject the invalid sentinel, `context` names the use site
    pub fn require_valid(&self, context: &'static str) -> Result<&Type> {
        if self.is_invalid() {
            Err(BytecodeError::InvalidTypeUse(context))
        } else {
            Ok(self)
        }
    }

    /// Pointee or element type
    pub fn component_type(&self) -> Option<&Type> {
        match self {
            Type::Pointer(component) | Type::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Element count of an array
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Type::Array { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Signature of a function type
    pub fn signature(&self) -> Option<&FunctionSignature> {
        match self {
            Type::Function(signature) => Some(signature),
            _ => None,
        }
    }

    /// Number of array layers nested below this one
    pub fn array_dimensions(&self) -> usize {
        let mut dims = 0;
        let mut current = match self {
            Type::Array { component, .. } => component.as_ref(),
            _ => return 0,
        };
        while let Type::Array { component, .. } = current {
            dims += 1;
            current = component;
        }
        dims
    }

    /// Frame scratch bytes a variable of this type needs beyond its register
    ///
    /// Arrays live in the frame heap; everything else fits a register slot.
    pub fn extra_size_required(&self) -> usize {
        match self {
            Type::Array { .. } => self.size(),
            _ => 0,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Invalid => f.write_str("<invalid>"),
            Type::Byte => f.write_str("byte"),
            Type::Short => f.write_str("short"),
            Type::Integer => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::UByte => f.write_str("ubyte"),
            Type::UShort => f.write_str("ushort"),
            Type::UInteger => f.write_str("uint"),
            Type::ULong => f.write_str("ulong"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Boolean => f.write_str("bool"),
            Type::Character => f.write_str("char"),
            Type::Pointer(component) => write!(f, "{component}*"),
            Type::Array { component, count } => write!(f, "{component}[{count}]"),
            Type::Function(signature) => {
                f.write_str("fn(")?;
                for (i, param) in signature.parameters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", param.ty, param.name)?;
                }
                write!(f, ") -> {}", signature.return_type)
            }
        }
    }
}
