//! Host-level scenarios: declare, assemble, freeze, execute

use std::sync::Arc;
use std::thread;

use ksp_vm_bytecode::{
    BytecodeBuilder, ConstantIndex, ConstantValue, FrameLayout, Function, FunctionIndex,
    HeapOffset, Module, Opcode, Register, RunnableBytecode, Type, Width,
};
use ksp_vm_core::{
    ErrorQueue, Interpreter, Outcome, Resource, RuntimeConfig, RuntimeState, VmError,
};

/// `pick(a, b)`: stores both arguments in a two-slot array and returns the second
fn pick_module() -> Module {
    let mut module = Module::new("pick");
    module
        .declare_constant("bias", ConstantValue::from_bits(Type::Short, 0x0102).unwrap())
        .unwrap();

    let mut pick = Function::new(Type::Long);
    pick.add_parameter(Type::Long, "a").unwrap();
    pick.add_parameter(Type::Long, "b").unwrap();
    pick.add_local(Type::array_of(&Type::Long, 2), "slots").unwrap();

    let mut body = BytecodeBuilder::new();
    body.store_heap(Width::Quad, Register(0), HeapOffset(0))
        .store_heap(Width::Quad, Register(1), HeapOffset(8))
        .load_heap(Width::Quad, Register(2), HeapOffset(8))
        .ret(Register(2));
    pick.set_code(&body.build()).unwrap();
    module.declare_function("pick", pick).unwrap();
    module.build().unwrap();
    module
}

#[test]
fn put_then_move_copies_value() {
    let mut raw = BytecodeBuilder::new();
    raw.push(Opcode::PutL.info(), &[0, 42, 0, 0, 0])
        .unwrap()
        .push(Opcode::MovL.info(), &[0, 1])
        .unwrap();

    let mut module = Module::new("main");
    module.build().unwrap();
    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let outcome = Interpreter::new()
        .execute(&mut state, &module, &raw.build(), FrameLayout::new(2, 0))
        .unwrap();

    assert_eq!(outcome, Outcome::Halted);
    assert_eq!(state.registers().unwrap(), vec![42, 42]);
}

#[test]
fn call_through_module_function() {
    let module = pick_module();
    let pick = module.function_index("pick").unwrap();
    let bias = module.constant_index("bias").unwrap();

    let mut entry = BytecodeBuilder::new();
    entry
        .put(Width::Quad, Register(0), 5)
        .load_const(Width::Word, Register(1), bias)
        .call(pick, Register(0))
        .load_ret(Register(2))
        .ret(Register(2));

    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let outcome = Interpreter::new()
        .execute(&mut state, &module, &entry.build(), FrameLayout::new(3, 0))
        .unwrap();
    assert_eq!(outcome, Outcome::Returned(0x0102));
    assert_eq!(state.depth(), 0);
}

#[test]
fn frame_layout_matches_declaration() {
    let module = pick_module();
    let layout = module.function("pick").unwrap().layout().unwrap();
    assert_eq!(layout.register_count, 3);
    assert_eq!(layout.parameter_count, 2);
    assert_eq!(layout.heap_size, 16);
}

#[test]
fn small_data_arena_is_reported() {
    let module = pick_module();
    let pick = module.function_index("pick").unwrap();
    let config = RuntimeConfig::new().data_stack_size(32);

    let mut state = RuntimeState::new(&config);
    let errors = Arc::new(ErrorQueue::new());
    state.set_error_queue(Arc::clone(&errors));

    let result = Interpreter::new().call(&mut state, &module, pick, &[1, 2]);
    assert_eq!(
        result,
        Err(VmError::ResourceExhausted(Resource::DataArena {
            requested: 40,
            available: 32,
        }))
    );
    assert!(errors.has());
    assert!(errors.pop().unwrap().starts_with("Resource exhausted"));
}

#[test]
fn built_module_is_shared_across_states() {
    let module = Arc::new(pick_module());
    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let module = Arc::clone(&module);
            thread::spawn(move || {
                let pick = module.function_index("pick").unwrap();
                let mut state = RuntimeState::new(&RuntimeConfig::default());
                Interpreter::new().call(&mut state, &module, pick, &[i, i * 10])
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Ok(Outcome::Returned(i as u64 * 10)));
    }
}

#[test]
fn trace_logging_does_not_change_results() {
    let module = pick_module();
    let pick = module.function_index("pick").unwrap();
    let config = RuntimeConfig::new().trace_instructions(true);
    let mut state = RuntimeState::new(&config);
    assert_eq!(
        Interpreter::new().call(&mut state, &module, pick, &[3, 4]),
        Ok(Outcome::Returned(4))
    );
}

#[test]
fn empty_entry_code_halts() {
    let mut module = Module::new("main");
    module.build().unwrap();
    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let outcome = Interpreter::new()
        .execute(
            &mut state,
            &module,
            &RunnableBytecode::default(),
            FrameLayout::new(0, 0),
        )
        .unwrap();
    assert_eq!(outcome, Outcome::Halted);
    assert_eq!(state.depth(), 1);
}

/// `seven` is k0; `get` loads k0 and `twice` reaches it through `CALL f0`
fn library_module() -> Module {
    let mut lib = Module::new("lib");
    lib.declare_constant("seven", ConstantValue::from_bits(Type::Long, 7).unwrap())
        .unwrap();

    let mut get = Function::new(Type::Long);
    get.add_local(Type::Long, "v").unwrap();
    let mut body = BytecodeBuilder::new();
    body.load_const(Width::Quad, Register(0), ConstantIndex(0))
        .ret(Register(0));
    get.set_code(&body.build()).unwrap();
    lib.declare_function("get", get).unwrap();

    let mut twice = Function::new(Type::Long);
    twice.add_local(Type::Long, "v").unwrap();
    let mut body = BytecodeBuilder::new();
    body.call(FunctionIndex(0), Register(0))
        .load_ret(Register(0))
        .ret(Register(0));
    twice.set_code(&body.build()).unwrap();
    lib.declare_function("twice", twice).unwrap();

    lib.build().unwrap();
    lib
}

/// Own k0 and f0 shadow the library's slots; `get` and `twice` are imported
fn importing_module(lib: &Module) -> Module {
    let mut user = Module::new("user");
    user.declare_constant("ninetynine", ConstantValue::from_bits(Type::Long, 99).unwrap())
        .unwrap();

    let mut local = Function::new(Type::Long);
    local.add_local(Type::Long, "v").unwrap();
    let mut body = BytecodeBuilder::new();
    body.load_const(Width::Quad, Register(0), ConstantIndex(0))
        .ret(Register(0));
    local.set_code(&body.build()).unwrap();
    user.declare_function("local", local).unwrap();

    user.import("get", lib, "get").unwrap();
    user.import("twice", lib, "twice").unwrap();
    user.build().unwrap();
    user
}

#[test]
fn imported_function_reads_its_own_constants() {
    let lib = library_module();
    let user = importing_module(&lib);
    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let mut interpreter = Interpreter::new();

    let get = user.function_index("get").unwrap();
    assert_eq!(
        interpreter.call(&mut state, &user, get, &[]),
        Ok(Outcome::Returned(7))
    );
    let local = user.function_index("local").unwrap();
    assert_eq!(
        interpreter.call(&mut state, &user, local, &[]),
        Ok(Outcome::Returned(99))
    );
}

#[test]
fn imported_function_calls_within_its_library() {
    let lib = library_module();
    let user = importing_module(&lib);
    let twice = user.function_index("twice").unwrap();
    let local = user.function_index("local").unwrap();

    // entry code runs against the user module, the callee against the library
    let mut entry = BytecodeBuilder::new();
    entry
        .call(twice, Register(0))
        .load_ret(Register(0))
        .call(local, Register(0))
        .load_ret(Register(1))
        .halt();

    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let outcome = Interpreter::new()
        .execute(&mut state, &user, &entry.build(), FrameLayout::new(2, 0))
        .unwrap();
    assert_eq!(outcome, Outcome::Halted);
    assert_eq!(state.registers().unwrap(), vec![7, 99]);
}

#[test]
fn reimported_function_keeps_original_home() {
    let lib = library_module();
    let user = importing_module(&lib);

    let mut outer = Module::new("outer");
    outer
        .declare_constant("zero", ConstantValue::new(Type::Long).unwrap())
        .unwrap();
    outer.import("twice", &user, "twice").unwrap();
    outer.build().unwrap();

    let twice = outer.function_index("twice").unwrap();
    let mut state = RuntimeState::new(&RuntimeConfig::default());
    assert_eq!(
        Interpreter::new().call(&mut state, &outer, twice, &[]),
        Ok(Outcome::Returned(7))
    );
}
