//! Built-in sample program

use anyhow::Result;
use ksp_vm_bytecode::{
    BytecodeBuilder, ConstantValue, FrameLayout, Function, HeapOffset, Module, Register,
    RunnableBytecode, Type, Width,
};

/// A frozen module plus the entry code that drives it
pub struct Demo {
    pub module: Module,
    pub entry: RunnableBytecode,
    pub layout: FrameLayout,
}

/// `select(a, b)` keeps both arguments in a scratch array and returns `b`;
/// the entry code feeds it a constant and copies the result around.
pub fn build() -> Result<Demo> {
    let mut module = Module::new("demo");
    module.declare_type("word", Type::UShort)?;
    module.declare_constant("seed", ConstantValue::from_bits(Type::Integer, 0xC0FFEE)?)?;

    let mut select = Function::new(Type::Long);
    select.add_parameter(Type::Long, "a")?;
    select.add_parameter(Type::Long, "b")?;
    select.add_local(Type::array_of(&Type::Long, 2), "scratch")?;
    let mut body = BytecodeBuilder::new();
    body.store_heap(Width::Quad, Register(0), HeapOffset(0))
        .store_heap(Width::Quad, Register(1), HeapOffset(8))
        .load_heap(Width::Quad, Register(2), HeapOffset(8))
        .ret(Register(2));
    select.set_code(&body.build())?;
    module.declare_function("select", select)?;
    module.build()?;

    let seed = module.constant_index("seed")?;
    let select = module.function_index("select")?;
    let mut entry = BytecodeBuilder::new();
    entry
        .put(Width::Long, Register(0), 42)
        .mov(Width::Long, Register(0), Register(1))
        .load_const(Width::Long, Register(1), seed)
        .call(select, Register(0))
        .load_ret(Register(2))
        .put(Width::Byte, Register(3), 0xFF)
        .halt();

    Ok(Demo {
        module,
        entry: entry.build(),
        layout: FrameLayout::new(4, 0),
    })
}
