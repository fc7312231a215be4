//! Modules: named declarations of types, constants and functions
//!
//! A module is assembled incrementally and then frozen with
//! [`Module::build`]. Declaration errors are returned to the caller and leave
//! the module as it was, so a host can report them and keep going. Once built,
//! constants and functions are reachable by dense index in O(1), which is what
//! the interpreter uses for `LDK*` and `CALL`.

use std::fmt;
use std::sync::Arc;

use crate::constant::ConstantValue;
use crate::error::{BytecodeError, Result};
use crate::function::Function;
use crate::name_table::{Accessors, Declaration, DeclarationKind, Element, NameTable};
use crate::operand::{ConstantIndex, FunctionIndex};
use crate::support::quote_str;
use crate::types::Type;

/// A named, freezable collection of declarations
#[derive(Debug)]
pub struct Module {
    name: String,
    table: NameTable,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: NameTable::new(),
        }
    }

    /// Create an empty module whose lookups fall back to a built `parent`
    pub fn with_parent(name: impl Into<String>, parent: &Module) -> Result<Self> {
        if !parent.is_built() {
            return Err(BytecodeError::ModuleNotBuilt(parent.name.clone()));
        }
        Ok(Self {
            name: name.into(),
            table: NameTable::with_parent(&parent.table)?,
        })
    }

    /// Module name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the module has been frozen
    #[inline]
    pub fn is_built(&self) -> bool {
        self.table.is_built()
    }

    /// Underlying name table
    #[inline]
    pub fn table(&self) -> &NameTable {
        &self.table
    }

    /// Declare a named type
    pub fn declare_type(&mut self, name: &str, ty: Type) -> Result<()> {
        ty.require_valid("declared type")?;
        self.table.create_element(name)?.set_type(ty)?;
        Ok(())
    }

    /// Declare a constant
    pub fn declare_constant(&mut self, name: &str, value: ConstantValue) -> Result<()> {
        self.table.create_element(name)?.set_constant(value);
        Ok(())
    }

    /// Declare a function, building it if needed
    pub fn declare_function(&mut self, name: &str, mut function: Function) -> Result<()> {
        function.build()?;
        self.table.create_element(name)?.set_function(function)?;
        Ok(())
    }

    /// Declare `name` as an extern alias of `source_name` in a built `source`
    ///
    /// An imported function keeps running against the module that declared
    /// it: its `LDK*` and `CALL` operands index that module's accessors.
    pub fn import(&mut self, name: &str, source: &Module, source_name: &str) -> Result<()> {
        if !source.is_built() {
            return Err(BytecodeError::ModuleNotBuilt(source.name.clone()));
        }
        let target = source.table.get_element(source_name)?;
        if target.kind().is_none() {
            return Err(BytecodeError::DeclarationNotFound(source_name.to_string()));
        }
        self.table.create_element(name)?.attach_extern(target)
    }

    /// Element for `name`, including the parent chain
    pub fn element(&self, name: &str) -> Result<&Element> {
        self.table.get_element(name)
    }

    /// Local element for in-place replacement while building
    pub fn element_mut(&mut self, name: &str) -> Result<&mut Element> {
        self.table.get_element_mut(name)
    }

    /// Remove a local declaration while building
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.table.remove_element(name).map(drop)
    }

    fn expect_kind<'a, T>(
        &'a self,
        name: &str,
        expected: DeclarationKind,
        pick: impl FnOnce(&'a Element) -> Option<T>,
    ) -> Result<T> {
        let element = self.table.get_element(name)?;
        pick(element).ok_or_else(|| BytecodeError::WrongDeclarationKind {
            name: name.to_string(),
            expected: expected.as_str(),
            found: element.kind().map_or("nothing", DeclarationKind::as_str),
        })
    }

    /// Type declared as `name`
    pub fn type_of(&self, name: &str) -> Result<&Type> {
        self.expect_kind(name, DeclarationKind::Type, Element::as_type)
    }

    /// Constant declared as `name`
    pub fn constant(&self, name: &str) -> Result<&Arc<ConstantValue>> {
        self.expect_kind(name, DeclarationKind::Constant, Element::as_constant)
    }

    /// Function declared as `name`
    pub fn function(&self, name: &str) -> Result<&Arc<Function>> {
        self.expect_kind(name, DeclarationKind::Function, Element::as_function)
    }

    /// First local name under which a structurally equal type is declared
    pub fn type_name_of(&self, ty: &Type) -> Option<&str> {
        self.table
            .iter()
            .find(|(_, element)| element.as_type() == Some(ty))
            .map(|(name, _)| name)
    }

    fn accessor_offset(&self, name: &str, expected: DeclarationKind) -> Result<u16> {
        if !self.is_built() {
            return Err(BytecodeError::ModuleNotBuilt(self.name.clone()));
        }
        // Offsets index this module's accessor arrays, so parent elements
        // must be imported before they can be addressed.
        let element = self.table.get_local_element(name)?;
        match (element.kind(), element.offset()) {
            (Some(kind), Some(offset)) if kind == expected => Ok(offset),
            (found, _) => Err(BytecodeError::WrongDeclarationKind {
                name: name.to_string(),
                expected: expected.as_str(),
                found: found.map_or("nothing", DeclarationKind::as_str),
            }),
        }
    }

    /// Accessor index of a constant, once built
    pub fn constant_index(&self, name: &str) -> Result<ConstantIndex> {
        self.accessor_offset(name, DeclarationKind::Constant)
            .map(ConstantIndex)
    }

    /// Accessor index of a function, once built
    pub fn function_index(&self, name: &str) -> Result<FunctionIndex> {
        self.accessor_offset(name, DeclarationKind::Function)
            .map(FunctionIndex)
    }

    /// Constant and function accessor arrays, empty until built
    #[inline]
    pub fn accessors(&self) -> &Arc<Accessors> {
        self.table.accessors()
    }

    /// Constant at an accessor index
    #[inline]
    pub fn constant_at(&self, index: ConstantIndex) -> Option<&Arc<ConstantValue>> {
        self.table.accessors().constant(index)
    }

    /// Function at an accessor index
    #[inline]
    pub fn function_at(&self, index: FunctionIndex) -> Option<&Arc<Function>> {
        self.table.accessors().function(index).map(|linked| linked.function())
    }

    /// Constants in accessor order
    pub fn constants(&self) -> &[Arc<ConstantValue>] {
        self.table.constants()
    }

    /// Functions in accessor order
    pub fn functions(&self) -> impl ExactSizeIterator<Item = &Arc<Function>> {
        self.table.functions().iter().map(|linked| linked.function())
    }

    /// Resolve accessors and freeze the module
    pub fn build(&mut self) -> Result<()> {
        self.table.build_references()?;
        tracing::debug!(
            module = %self.name,
            constants = self.table.constants().len(),
            functions = self.table.functions().len(),
            "module built"
        );
        Ok(())
    }
}

impl fmt::Display for Module {
    /// One line per local declaration, in declaration order
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", quote_str(&self.name))?;
        for (name, element) in self.table.iter() {
            let name = quote_str(name);
            let origin = if element.is_extern() { "extern " } else { "" };
            let slot = element.offset().map(|o| format!(" @{o}")).unwrap_or_default();
            match element.declaration() {
                None => writeln!(f, "  {name}: <empty>")?,
                Some(Declaration::Type(ty)) => writeln!(f, "  {origin}type {name} = {ty}")?,
                Some(Declaration::Constant(value)) => writeln!(
                    f,
                    "  {origin}const {name}: {} ({} bytes){slot}",
                    value.ty(),
                    value.len()
                )?,
                Some(Declaration::Function(function)) => {
                    writeln!(f, "  {origin}fn {name}: {}{slot}", function.signature())?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BytecodeBuilder;
    use crate::operand::{Register, Width};

    fn sample() -> Module {
        let mut module = Module::new("sample");
        module.declare_type("word", Type::UShort).unwrap();
        module
            .declare_constant("answer", ConstantValue::from_bits(Type::Integer, 42).unwrap())
            .unwrap();
        let mut f = Function::new(Type::Integer);
        f.add_parameter(Type::Integer, "x").unwrap();
        let mut body = BytecodeBuilder::new();
        body.ret(Register(0));
        f.set_code(&body.build()).unwrap();
        module.declare_function("id", f).unwrap();
        module
            .declare_constant("zero", ConstantValue::new(Type::Long).unwrap())
            .unwrap();
        module
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut module = sample();
        assert_eq!(
            module.declare_type("answer", Type::Byte),
            Err(BytecodeError::DeclarationConflict("answer".to_string()))
        );
        assert!(module.constant("answer").is_ok());
    }

    #[test]
    fn test_failed_declaration_leaves_module_unchanged() {
        let mut module = Module::new("m");
        assert!(module.declare_type("bad", Type::Invalid).is_err());
        assert!(module.declare_function("f", Function::new(Type::Invalid)).is_err());
        assert!(module.table().is_empty());
    }

    #[test]
    fn test_wrong_kind() {
        let module = sample();
        assert_eq!(
            module.function("word").unwrap_err(),
            BytecodeError::WrongDeclarationKind {
                name: "word".to_string(),
                expected: "function",
                found: "type",
            }
        );
        assert_eq!(
            module.type_of("missing").unwrap_err(),
            BytecodeError::DeclarationNotFound("missing".to_string())
        );
    }

    #[test]
    fn test_accessor_indices() {
        let mut module = sample();
        assert_eq!(
            module.constant_index("answer"),
            Err(BytecodeError::ModuleNotBuilt("sample".to_string()))
        );
        module.build().unwrap();

        assert_eq!(module.constant_index("answer"), Ok(ConstantIndex(0)));
        assert_eq!(module.constant_index("zero"), Ok(ConstantIndex(1)));
        assert_eq!(module.function_index("id"), Ok(FunctionIndex(0)));
        assert!(module.constant_index("id").is_err());

        let answer = module.constant_at(ConstantIndex(0)).unwrap();
        assert_eq!(answer.bytes(), &[42, 0, 0, 0]);
        assert!(module.function_at(FunctionIndex(1)).is_none());
    }

    #[test]
    fn test_declared_function_is_built() {
        let module = sample();
        let f = module.function("id").unwrap();
        assert!(f.is_built());
        assert_eq!(f.layout().map(|l| l.register_count), Some(1));
    }

    #[test]
    fn test_built_module_is_frozen() {
        let mut module = sample();
        module.build().unwrap();
        let frozen = BytecodeError::FrozenModuleMutation("name table");
        assert_eq!(module.declare_type("t", Type::Byte).unwrap_err(), frozen);
        assert_eq!(module.element_mut("word").unwrap_err(), frozen);
        assert_eq!(module.remove("word").unwrap_err(), frozen);
        assert_eq!(module.build().unwrap_err(), frozen);
    }

    #[test]
    fn test_replace_declaration_while_building() {
        let mut module = sample();
        module
            .element_mut("zero")
            .unwrap()
            .set_type(Type::Double)
            .unwrap();
        assert_eq!(module.type_of("zero"), Ok(&Type::Double));
        module.build().unwrap();
        assert_eq!(module.constants().len(), 1);
    }

    #[test]
    fn test_import_shares_payload() {
        let mut library = sample();
        let mut user = Module::new("user");
        assert_eq!(
            user.import("k", &library, "answer"),
            Err(BytecodeError::ModuleNotBuilt("sample".to_string()))
        );
        library.build().unwrap();

        user.import("k", &library, "answer").unwrap();
        user.import("id", &library, "id").unwrap();
        assert!(user.element("k").unwrap().is_extern());
        assert!(Arc::ptr_eq(
            user.constant("k").unwrap(),
            library.constant("answer").unwrap()
        ));

        user.build().unwrap();
        assert_eq!(user.constant_index("k"), Ok(ConstantIndex(0)));
        assert_eq!(user.function_index("id"), Ok(FunctionIndex(0)));

        // the alias still resolves its operands in the library
        let linked = &user.accessors().functions()[0];
        assert!(Arc::ptr_eq(linked.function(), library.function("id").unwrap()));
        assert!(Arc::ptr_eq(linked.home().unwrap(), library.accessors()));
    }

    #[test]
    fn test_parent_scope() {
        let mut base = sample();
        base.build().unwrap();
        let mut child = Module::with_parent("child", &base).unwrap();
        assert_eq!(child.type_of("word"), Ok(&Type::UShort));
        child.build().unwrap();
        // visible, but not addressable without an import
        assert!(child.constant_index("answer").is_err());
    }

    #[test]
    fn test_type_name_of() {
        let module = sample();
        assert_eq!(module.type_name_of(&Type::UShort), Some("word"));
        assert_eq!(module.type_name_of(&Type::Short), None);
    }

    #[test]
    fn test_listing() {
        let mut module = sample();
        module.build().unwrap();
        let listing = module.to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "module \"sample\"");
        assert_eq!(lines[1], "  type \"word\" = ushort");
        assert_eq!(lines[2], "  const \"answer\": int (4 bytes) @0");
        assert_eq!(lines[3], "  fn \"id\": fn(int x) -> int @0");
        assert_eq!(lines[4], "  const \"zero\": long (8 bytes) @1");
    }

    #[test]
    fn test_width_typed_bodies() {
        let mut module = Module::new("m");
        let mut f = Function::new(Type::Long);
        f.add_local(Type::Long, "acc").unwrap();
        let mut body = BytecodeBuilder::new();
        body.put(Width::Quad, Register(0), u64::MAX).ret(Register(0));
        f.set_code(&body.build()).unwrap();
        module.declare_function("max", f).unwrap();
        assert_eq!(module.function("max").unwrap().code(), body.build().code());
    }
}
