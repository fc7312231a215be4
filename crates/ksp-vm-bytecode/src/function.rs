//! Function declarations
//!
//! A [`Function`] is edited while building (return type, parameters, locals,
//! code) and then frozen by [`Function::build`], which fixes its
//! [`FrameLayout`]. Every variable occupies one register; parameters always
//! come first.

use crate::builder::RunnableBytecode;
use crate::error::{BytecodeError, Result};
use crate::types::{Parameter, Type};

/// Frame requirements of a piece of code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameLayout {
    /// Register slots
    pub register_count: u8,
    /// Leading registers filled from the caller's arguments
    pub parameter_count: u8,
    /// Heap bytes after the registers
    pub heap_size: usize,
}

impl FrameLayout {
    /// Layout for entry code that takes no parameters
    pub const fn new(register_count: u8, heap_size: usize) -> Self {
        Self {
            register_count,
            parameter_count: 0,
            heap_size,
        }
    }
}

/// A parameter or local variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Variable type
    pub ty: Type,
    /// Unique name within the function
    pub name: String,
    /// Parameter rather than local
    pub is_parameter: bool,
}

/// A function declaration
#[derive(Debug, Clone, Default)]
pub struct Function {
    return_type: Type,
    variables: Vec<Variable>,
    parameter_count: usize,
    code: Vec<u8>,
    layout: Option<FrameLayout>,
    runnable: RunnableBytecode,
}

impl Function {
    /// New unbuilt function
    pub fn new(return_type: Type) -> Self {
        Self {
            return_type,
            ..Default::default()
        }
    }

    /// Whether [`build`](Self::build) has run
    #[inline]
    pub fn is_built(&self) -> bool {
        self.layout.is_some()
    }

    fn ensure_building(&self) -> Result<()> {
        if self.is_built() {
            Err(BytecodeError::FrozenModuleMutation("function"))
        } else {
            Ok(())
        }
    }

    /// Replace the return type
    pub fn set_return_type(&mut self, ty: Type) -> Result<()> {
        self.ensure_building()?;
        self.return_type = ty;
        Ok(())
    }

    /// Declare a parameter; it is placed after existing parameters and before
    /// every local
    pub fn add_parameter(&mut self, ty: Type, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.check_new_variable(&ty, &name)?;
        self.variables.insert(
            self.parameter_count,
            Variable {
                ty,
                name,
                is_parameter: true,
            },
        );
        self.parameter_count += 1;
        Ok(())
    }

    /// Declare a local variable
    pub fn add_local(&mut self, ty: Type, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.check_new_variable(&ty, &name)?;
        self.variables.push(Variable {
            ty,
            name,
            is_parameter: false,
        });
        Ok(())
    }

    fn check_new_variable(&self, ty: &Type, name: &str) -> Result<()> {
        self.ensure_building()?;
        ty.require_valid("variable type")?;
        if self.variables.iter().any(|v| v.name == name) {
            return Err(BytecodeError::DeclarationConflict(name.to_string()));
        }
        Ok(())
    }

    /// Append raw bytecode
    pub fn push_code(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_building()?;
        self.code.extend_from_slice(bytes);
        Ok(())
    }

    /// Replace the body with an assembled sequence
    pub fn set_code(&mut self, code: &RunnableBytecode) -> Result<()> {
        self.ensure_building()?;
        self.code.clear();
        self.code.extend_from_slice(code.code());
        Ok(())
    }

    /// Freeze the declaration and compute its frame layout
    ///
    /// Building twice returns the existing layout.
    pub fn build(&mut self) -> Result<FrameLayout> {
        if let Some(layout) = self.layout {
            return Ok(layout);
        }
        self.return_type.require_valid("function return type")?;

        let register_count = u8::try_from(self.variables.len())
            .map_err(|_| BytecodeError::TooManyRegisters(self.variables.len()))?;
        let heap_size = self
            .variables
            .iter()
            .try_fold(0usize, |total, v| total.checked_add(v.ty.extra_size_required()))
            .ok_or(BytecodeError::FrameHeapOverflow)?;
        let layout = FrameLayout {
            register_count,
            // parameter_count <= variables.len() <= u8::MAX
            parameter_count: self.parameter_count as u8,
            heap_size,
        };

        self.runnable = RunnableBytecode::new(std::mem::take(&mut self.code));
        self.layout = Some(layout);
        tracing::debug!(
            registers = layout.register_count,
            parameters = layout.parameter_count,
            heap = layout.heap_size,
            code_len = self.runnable.len(),
            "function built"
        );
        Ok(layout)
    }

    /// Layout, once built
    #[inline]
    pub fn layout(&self) -> Option<FrameLayout> {
        self.layout
    }

    /// Body bytes; the assembled sequence once built, the pending bytes before
    pub fn code(&self) -> &[u8] {
        if self.is_built() {
            self.runnable.code()
        } else {
            &self.code
        }
    }

    /// Frozen body, empty until built
    #[inline]
    pub fn runnable(&self) -> &RunnableBytecode {
        &self.runnable
    }

    /// Return type
    #[inline]
    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    /// Parameters followed by locals
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Parameters only
    pub fn parameters(&self) -> &[Variable] {
        &self.variables[..self.parameter_count]
    }

    /// Register assigned to a variable
    pub fn register_of(&self, name: &str) -> Option<u8> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .and_then(|i| u8::try_from(i).ok())
    }

    /// Function type descriptor of this declaration
    pub fn signature(&self) -> Type {
        let params: Vec<Parameter> = self
            .parameters()
            .iter()
            .map(|v| Parameter::new(v.ty.clone(), v.name.clone()))
            .collect();
        Type::function(&self.return_type, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BytecodeBuilder;
    use crate::operand::{Register, Width};

    #[test]
    fn test_parameters_precede_locals() {
        let mut f = Function::new(Type::Integer);
        f.add_local(Type::Integer, "tmp").unwrap();
        f.add_parameter(Type::Long, "a").unwrap();
        f.add_local(Type::Byte, "flag").unwrap();
        f.add_parameter(Type::Short, "b").unwrap();

        let names: Vec<&str> = f.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "tmp", "flag"]);
        assert_eq!(f.parameters().len(), 2);
        assert_eq!(f.register_of("tmp"), Some(2));
    }

    #[test]
    fn test_duplicate_variable() {
        let mut f = Function::new(Type::Integer);
        f.add_parameter(Type::Integer, "x").unwrap();
        assert_eq!(
            f.add_local(Type::Long, "x"),
            Err(BytecodeError::DeclarationConflict("x".to_string()))
        );
    }

    #[test]
    fn test_invalid_variable_type() {
        let mut f = Function::new(Type::Integer);
        assert_eq!(
            f.add_local(Type::Invalid, "x"),
            Err(BytecodeError::InvalidTypeUse("variable type"))
        );
    }

    #[test]
    fn test_build_layout() {
        let mut f = Function::new(Type::Integer);
        f.add_parameter(Type::Integer, "n").unwrap();
        f.add_local(Type::array_of(&Type::Integer, 4), "buf").unwrap();
        f.add_local(Type::array_of(&Type::Byte, 3), "tag").unwrap();

        let mut body = BytecodeBuilder::new();
        body.put(Width::Long, Register(1), 1).ret(Register(1));
        f.set_code(&body.build()).unwrap();

        let layout = f.build().unwrap();
        assert_eq!(layout.register_count, 3);
        assert_eq!(layout.parameter_count, 1);
        assert_eq!(layout.heap_size, 19);
        assert_eq!(f.code(), body.build().code());
    }

    #[test]
    fn test_frozen_after_build() {
        let mut f = Function::new(Type::Integer);
        f.build().unwrap();
        let frozen = Err(BytecodeError::FrozenModuleMutation("function"));
        assert_eq!(f.add_local(Type::Integer, "x"), frozen);
        assert_eq!(f.add_parameter(Type::Integer, "y"), frozen);
        assert_eq!(f.push_code(&[0]), frozen);
        assert_eq!(f.set_return_type(Type::Long), frozen);
    }

    #[test]
    fn test_build_requires_return_type() {
        let mut f = Function::new(Type::Invalid);
        assert_eq!(
            f.build(),
            Err(BytecodeError::InvalidTypeUse("function return type"))
        );
        assert!(!f.is_built());
    }

    #[test]
    fn test_too_many_registers() {
        let mut f = Function::new(Type::Integer);
        for i in 0..256 {
            f.add_local(Type::Byte, format!("v{i}")).unwrap();
        }
        assert_eq!(f.build(), Err(BytecodeError::TooManyRegisters(256)));
    }

    #[test]
    fn test_heap_size_overflow() {
        let half = Type::array_of(&Type::Byte, usize::MAX / 2 + 1);
        assert!(!half.is_invalid());

        let mut f = Function::new(Type::Integer);
        f.add_local(half.clone(), "lo").unwrap();
        f.add_local(half, "hi").unwrap();
        assert_eq!(f.build(), Err(BytecodeError::FrameHeapOverflow));
        assert!(!f.is_built());
    }

    #[test]
    fn test_signature() {
        let mut f = Function::new(Type::Long);
        f.add_parameter(Type::Integer, "a").unwrap();
        f.add_local(Type::Integer, "b").unwrap();
        assert_eq!(f.signature().to_string(), "fn(int a) -> long");
    }
}
