//! Dispatch loop benchmarks

use criterion::{Criterion, criterion_group, criterion_main};
use ksp_vm_bytecode::{
    BytecodeBuilder, FrameLayout, Function, FunctionIndex, Module, Register, Type, Width,
};
use ksp_vm_core::{Interpreter, RuntimeConfig, RuntimeState};
use std::hint::black_box;

fn empty_module() -> Module {
    let mut module = Module::new("bench");
    let mut id = Function::new(Type::Long);
    id.add_parameter(Type::Long, "x").unwrap();
    let mut body = BytecodeBuilder::new();
    body.ret(Register(0));
    id.set_code(&body.build()).unwrap();
    module.declare_function("id", id).unwrap();
    module.build().unwrap();
    module
}

/// Benchmark: straight-line register traffic
fn bench_moves(c: &mut Criterion) {
    let module = empty_module();
    let mut code = BytecodeBuilder::new();
    for i in 0..1000u64 {
        code.put(Width::Long, Register(0), i)
            .mov(Width::Long, Register(0), Register(1))
            .mov(Width::Byte, Register(1), Register(2));
    }
    let code = code.build();
    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let mut interpreter = Interpreter::new();

    c.bench_function("dispatch_3000_moves", |b| {
        b.iter(|| {
            let outcome = interpreter
                .execute(&mut state, &module, &code, FrameLayout::new(3, 0))
                .unwrap();
            black_box(outcome)
        });
    });
}

/// Benchmark: call/return round trips
fn bench_calls(c: &mut Criterion) {
    let module = empty_module();
    let mut code = BytecodeBuilder::new();
    for _ in 0..500 {
        code.call(FunctionIndex(0), Register(0)).load_ret(Register(0));
    }
    let code = code.build();
    let mut state = RuntimeState::new(&RuntimeConfig::default());
    let mut interpreter = Interpreter::new();

    c.bench_function("dispatch_500_calls", |b| {
        b.iter(|| {
            let outcome = interpreter
                .execute(&mut state, &module, &code, FrameLayout::new(1, 0))
                .unwrap();
            black_box(outcome)
        });
    });
}

criterion_group!(benches, bench_moves, bench_calls);
criterion_main!(benches);
