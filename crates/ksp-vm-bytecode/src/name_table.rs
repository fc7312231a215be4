//! Per-module declaration registry
//!
//! Each [`Element`] either owns its declaration or aliases ("externs") the
//! declaration of an element in another table. Payloads are reference
//! counted, so replacing an element's declaration drops only this element's
//! handle and an extern alias never frees what it points at.
//!
//! The table has a two-state lifecycle. While building it accepts new names
//! and element edits; [`NameTable::build_references`] assigns dense accessor
//! offsets and freezes it, after which every mutating call fails with
//! [`BytecodeError::FrozenModuleMutation`].
//!
//! A function's `LDK*` and `CALL` operands index the accessor arrays of the
//! table it was declared in. Every function element carries a handle to those
//! arrays (its "home"), and an extern alias inherits the handle of the element
//! it aliases, so imported code keeps resolving against its own module.

use std::fmt;
use std::sync::Arc;

use crate::constant::ConstantValue;
use crate::error::{BytecodeError, Result};
use crate::function::Function;
use crate::operand::{ConstantIndex, FunctionIndex};
use crate::support::ScopedMap;
use crate::types::Type;

/// What an element declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    /// A named type
    Type,
    /// A constant value
    Constant,
    /// A function
    Function,
}

impl DeclarationKind {
    /// Lower-case name for messages
    pub const fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Type => "type",
            DeclarationKind::Constant => "constant",
            DeclarationKind::Function => "function",
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration payload
#[derive(Debug, Clone)]
pub enum Declaration {
    /// Named type
    Type(Arc<Type>),
    /// Constant value
    Constant(Arc<ConstantValue>),
    /// Built function
    Function(Arc<Function>),
}

impl Declaration {
    /// Kind of this payload
    pub const fn kind(&self) -> DeclarationKind {
        match self {
            Declaration::Type(_) => DeclarationKind::Type,
            Declaration::Constant(_) => DeclarationKind::Constant,
            Declaration::Function(_) => DeclarationKind::Function,
        }
    }
}

/// One named entry of a [`NameTable`]
#[derive(Debug, Clone, Default)]
pub struct Element {
    declaration: Option<Declaration>,
    is_extern: bool,
    offset: Option<u16>,
    home: Option<Arc<Accessors>>,
}

impl Element {
    /// Kind of the current declaration, `None` while empty
    pub fn kind(&self) -> Option<DeclarationKind> {
        self.declaration.as_ref().map(Declaration::kind)
    }

    /// Current declaration
    pub fn declaration(&self) -> Option<&Declaration> {
        self.declaration.as_ref()
    }

    /// Whether the declaration is an alias of another element's
    #[inline]
    pub fn is_extern(&self) -> bool {
        self.is_extern
    }

    /// Accessor offset among elements of the same kind, set by
    /// [`NameTable::build_references`]
    #[inline]
    pub fn offset(&self) -> Option<u16> {
        self.offset
    }

    /// Accessor arrays a function's operands index, set once the declaring
    /// table is built
    #[inline]
    pub fn home(&self) -> Option<&Arc<Accessors>> {
        self.home.as_ref()
    }

    fn install(
        &mut self,
        declaration: Declaration,
        is_extern: bool,
        home: Option<Arc<Accessors>>,
    ) {
        // Dropping the previous handle releases an owned payload; an extern
        // handle only decrements the owner's count.
        self.declaration = Some(declaration);
        self.is_extern = is_extern;
        self.offset = None;
        self.home = home;
    }

    /// Declare a type, replacing any previous declaration
    pub fn set_type(&mut self, ty: Type) -> Result<Arc<Type>> {
        ty.require_valid("declared type")?;
        let ty = Arc::new(ty);
        self.install(Declaration::Type(Arc::clone(&ty)), false, None);
        Ok(ty)
    }

    /// Declare a constant, replacing any previous declaration
    pub fn set_constant(&mut self, value: ConstantValue) -> Arc<ConstantValue> {
        let value = Arc::new(value);
        self.install(Declaration::Constant(Arc::clone(&value)), false, None);
        value
    }

    /// Declare a function, replacing any previous declaration
    ///
    /// An unbuilt function is built first; if that fails the element is left
    /// unchanged.
    pub fn set_function(&mut self, mut function: Function) -> Result<Arc<Function>> {
        function.build()?;
        let function = Arc::new(function);
        self.install(Declaration::Function(Arc::clone(&function)), false, None);
        Ok(function)
    }

    /// Alias `other`'s declaration without taking ownership of it
    ///
    /// An aliased function keeps `other`'s home, so its operands still
    /// resolve in the table that declared it.
    pub fn attach_extern(&mut self, other: &Element) -> Result<()> {
        let declaration = other
            .declaration
            .clone()
            .ok_or(BytecodeError::InvalidTypeUse("extern of an empty element"))?;
        self.install(declaration, true, other.home.clone());
        Ok(())
    }

    /// Drop the declaration, leaving the element empty
    pub fn clear(&mut self) {
        self.declaration = None;
        self.is_extern = false;
        self.offset = None;
        self.home = None;
    }

    /// Declared type
    pub fn as_type(&self) -> Option<&Type> {
        match &self.declaration {
            Some(Declaration::Type(ty)) => Some(ty),
            _ => None,
        }
    }

    /// Declared constant
    pub fn as_constant(&self) -> Option<&Arc<ConstantValue>> {
        match &self.declaration {
            Some(Declaration::Constant(value)) => Some(value),
            _ => None,
        }
    }

    /// Declared function
    pub fn as_function(&self) -> Option<&Arc<Function>> {
        match &self.declaration {
            Some(Declaration::Function(function)) => Some(function),
            _ => None,
        }
    }
}

/// A function in an accessor array, with the arrays its operands index
#[derive(Debug, Clone)]
pub struct LinkedFunction {
    function: Arc<Function>,
    home: Option<Arc<Accessors>>,
}

impl LinkedFunction {
    /// The function
    #[inline]
    pub fn function(&self) -> &Arc<Function> {
        &self.function
    }

    /// Arrays the function's `LDK*` and `CALL` operands index; `None` when
    /// they index the arrays this entry lives in
    #[inline]
    pub fn home(&self) -> Option<&Arc<Accessors>> {
        self.home.as_ref()
    }
}

/// Dense constant and function arrays of a built table
#[derive(Debug, Default)]
pub struct Accessors {
    constants: Vec<Arc<ConstantValue>>,
    functions: Vec<LinkedFunction>,
}

impl Accessors {
    /// Constant at an accessor index
    #[inline]
    pub fn constant(&self, index: ConstantIndex) -> Option<&Arc<ConstantValue>> {
        self.constants.get(usize::from(index.index()))
    }

    /// Function at an accessor index
    #[inline]
    pub fn function(&self, index: FunctionIndex) -> Option<&LinkedFunction> {
        self.functions.get(usize::from(index.index()))
    }

    /// Constants in accessor order
    #[inline]
    pub fn constants(&self) -> &[Arc<ConstantValue>] {
        &self.constants
    }

    /// Functions in accessor order
    #[inline]
    pub fn functions(&self) -> &[LinkedFunction] {
        &self.functions
    }
}

/// Build state of a declaration container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    /// Accepting declarations
    #[default]
    Building,
    /// Read-only
    Built,
}

/// String-keyed declaration registry with O(1) accessors once built
#[derive(Debug, Default)]
pub struct NameTable {
    elements: Arc<ScopedMap<Element>>,
    state: BuildState,
    accessors: Arc<Accessors>,
}

impl NameTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table whose lookups fall back to a built `parent`
    pub fn with_parent(parent: &NameTable) -> Result<Self> {
        if !parent.is_built() {
            return Err(BytecodeError::ModuleNotBuilt("parent".to_string()));
        }
        Ok(Self {
            elements: Arc::new(ScopedMap::with_parent(Arc::clone(&parent.elements))),
            ..Self::default()
        })
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Whether [`build_references`](Self::build_references) has run
    #[inline]
    pub fn is_built(&self) -> bool {
        self.state == BuildState::Built
    }

    fn elements_mut(&mut self) -> Result<&mut ScopedMap<Element>> {
        if self.is_built() {
            return Err(BytecodeError::FrozenModuleMutation("name table"));
        }
        // Only built tables are ever shared as parents.
        Arc::get_mut(&mut self.elements).ok_or(BytecodeError::FrozenModuleMutation("name table"))
    }

    /// Create a new empty element
    pub fn create_element(&mut self, name: &str) -> Result<&mut Element> {
        self.elements_mut()?
            .put(name, Element::default())
            .map_err(|_| BytecodeError::DeclarationConflict(name.to_string()))
    }

    /// Look up an element here or in the parent chain
    pub fn get_element(&self, name: &str) -> Result<&Element> {
        self.elements
            .get(name)
            .ok_or_else(|| BytecodeError::DeclarationNotFound(name.to_string()))
    }

    /// Look up an element of this table, ignoring the parent chain
    pub fn get_local_element(&self, name: &str) -> Result<&Element> {
        self.elements
            .get_local(name)
            .ok_or_else(|| BytecodeError::DeclarationNotFound(name.to_string()))
    }

    /// Mutable lookup, local elements only
    pub fn get_element_mut(&mut self, name: &str) -> Result<&mut Element> {
        self.elements_mut()?
            .get_local_mut(name)
            .ok_or_else(|| BytecodeError::DeclarationNotFound(name.to_string()))
    }

    /// Remove a local element
    pub fn remove_element(&mut self, name: &str) -> Result<Element> {
        self.elements_mut()?
            .remove(name)
            .ok_or_else(|| BytecodeError::DeclarationNotFound(name.to_string()))
    }

    /// Whether `name` resolves
    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains(name)
    }

    /// Number of local elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no local elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Local elements in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.elements.iter()
    }

    /// Assign dense accessor offsets and freeze the table
    ///
    /// Constants and functions are numbered separately, each in declaration
    /// order. Empty and type elements get no offset. On error no element is
    /// touched and the table keeps building.
    pub fn build_references(&mut self) -> Result<()> {
        let elements = self.elements_mut()?;
        let mut constants = Vec::new();
        let mut functions = Vec::new();
        let mut offsets = Vec::with_capacity(elements.len());

        for (_, element) in elements.iter() {
            let slot = match &element.declaration {
                Some(Declaration::Constant(value)) => {
                    constants.push(Arc::clone(value));
                    constants.len() - 1
                }
                Some(Declaration::Function(function)) => {
                    functions.push(LinkedFunction {
                        function: Arc::clone(function),
                        home: element.home.clone(),
                    });
                    functions.len() - 1
                }
                _ => {
                    offsets.push(None);
                    continue;
                }
            };
            let offset =
                u16::try_from(slot).map_err(|_| BytecodeError::TooManyDeclarations(slot + 1))?;
            offsets.push(Some(offset));
        }

        let accessors = Arc::new(Accessors {
            constants,
            functions,
        });
        for ((_, element), offset) in elements.iter_mut().zip(offsets) {
            element.offset = offset;
            if element.home.is_none() && element.kind() == Some(DeclarationKind::Function) {
                element.home = Some(Arc::clone(&accessors));
            }
        }

        tracing::debug!(
            elements = elements.len(),
            constants = accessors.constants.len(),
            functions = accessors.functions.len(),
            "name table built"
        );
        self.accessors = accessors;
        self.state = BuildState::Built;
        Ok(())
    }

    /// Accessor arrays, empty until built
    #[inline]
    pub fn accessors(&self) -> &Arc<Accessors> {
        &self.accessors
    }

    /// Constant accessor array, empty until built
    #[inline]
    pub fn constants(&self) -> &[Arc<ConstantValue>] {
        self.accessors.constants()
    }

    /// Function accessor array, empty until built
    #[inline]
    pub fn functions(&self) -> &[LinkedFunction] {
        self.accessors.functions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_twice_conflicts() {
        let mut table = NameTable::new();
        table.create_element("x").unwrap();
        assert_eq!(
            table.create_element("x").unwrap_err(),
            BytecodeError::DeclarationConflict("x".to_string())
        );
    }

    #[test]
    fn test_missing_name() {
        let table = NameTable::new();
        assert_eq!(
            table.get_element("nope").unwrap_err(),
            BytecodeError::DeclarationNotFound("nope".to_string())
        );
    }

    #[test]
    fn test_create_then_get_same_element() {
        let mut table = NameTable::new();
        let created: *const Element = table.create_element("x").unwrap();
        let fetched: *const Element = table.get_element("x").unwrap();
        assert!(std::ptr::eq(created, fetched));
    }

    #[test]
    fn test_replacement_releases_previous() {
        let mut table = NameTable::new();
        let element = table.create_element("k").unwrap();
        let first = element.set_constant(ConstantValue::new(Type::Byte).unwrap());
        assert_eq!(Arc::strong_count(&first), 2);

        element.set_type(Type::Long).unwrap();
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(element.kind(), Some(DeclarationKind::Type));
    }

    #[test]
    fn test_extern_aliases_without_owning() {
        let mut owner = NameTable::new();
        let source = owner.create_element("pi").unwrap();
        source.set_constant(ConstantValue::from_bits(Type::Double, 2.5f64.to_bits()).unwrap());
        let source = owner.get_element("pi").unwrap().clone();

        let mut user = NameTable::new();
        let alias = user.create_element("pi").unwrap();
        alias.attach_extern(&source).unwrap();
        assert!(alias.is_extern());
        assert!(Arc::ptr_eq(
            alias.as_constant().unwrap(),
            source.as_constant().unwrap()
        ));

        alias.clear();
        drop(user);
        assert_eq!(owner.get_element("pi").unwrap().as_constant().map(|c| c.len()), Some(8));
    }

    #[test]
    fn test_extern_of_empty_element() {
        let mut table = NameTable::new();
        let empty = Element::default();
        let element = table.create_element("e").unwrap();
        assert!(element.attach_extern(&empty).is_err());
        assert_eq!(element.kind(), None);
    }

    #[test]
    fn test_build_references_offsets() {
        let mut table = NameTable::new();
        table.create_element("t").unwrap().set_type(Type::Integer).unwrap();
        table
            .create_element("a")
            .unwrap()
            .set_constant(ConstantValue::from_bits(Type::Byte, 1).unwrap());
        table
            .create_element("f")
            .unwrap()
            .set_function(Function::new(Type::Integer))
            .unwrap();
        table
            .create_element("b")
            .unwrap()
            .set_constant(ConstantValue::from_bits(Type::Byte, 2).unwrap());

        table.build_references().unwrap();

        assert_eq!(table.get_element("t").unwrap().offset(), None);
        assert_eq!(table.get_element("a").unwrap().offset(), Some(0));
        assert_eq!(table.get_element("b").unwrap().offset(), Some(1));
        assert_eq!(table.get_element("f").unwrap().offset(), Some(0));
        assert_eq!(table.constants()[1].bytes(), &[2]);
        assert_eq!(table.functions().len(), 1);

        // local functions resolve against their own table
        let home = table.get_element("f").unwrap().home().unwrap();
        assert!(Arc::ptr_eq(home, table.accessors()));
        assert!(table.functions()[0].home().is_none());
    }

    #[test]
    fn test_too_many_constants_leaves_table_building() {
        let mut table = NameTable::new();
        for i in 0..=usize::from(u16::MAX) + 1 {
            table
                .create_element(&format!("c{i}"))
                .unwrap()
                .set_constant(ConstantValue::from_bits(Type::Byte, 0).unwrap());
        }

        assert_eq!(
            table.build_references(),
            Err(BytecodeError::TooManyDeclarations(65537))
        );
        assert!(!table.is_built());
        assert_eq!(table.get_element("c0").unwrap().offset(), None);
        assert!(table.constants().is_empty());

        table.remove_element("c65536").unwrap();
        table.build_references().unwrap();
        assert_eq!(table.get_element("c65535").unwrap().offset(), Some(u16::MAX));
    }

    #[test]
    fn test_frozen_table_rejects_every_mutation() {
        let mut table = NameTable::new();
        table.create_element("x").unwrap();
        table.build_references().unwrap();

        let frozen = BytecodeError::FrozenModuleMutation("name table");
        assert_eq!(table.create_element("y").unwrap_err(), frozen);
        assert_eq!(table.get_element_mut("x").unwrap_err(), frozen);
        assert_eq!(table.remove_element("x").unwrap_err(), frozen);
        assert_eq!(table.build_references().unwrap_err(), frozen);
        assert!(table.get_element("x").is_ok());
    }

    #[test]
    fn test_parent_lookup() {
        let mut parent = NameTable::new();
        parent.create_element("base").unwrap().set_type(Type::Short).unwrap();
        assert!(NameTable::with_parent(&parent).is_err());
        parent.build_references().unwrap();

        let mut child = NameTable::with_parent(&parent).unwrap();
        assert_eq!(child.get_element("base").unwrap().as_type(), Some(&Type::Short));
        assert!(child.get_element_mut("base").is_err());
        child.create_element("base").unwrap();
        assert_eq!(child.get_element("base").unwrap().kind(), None);
    }
}
