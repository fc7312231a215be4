//! Bytecode interpreter
//!
//! Fetch, decode, execute, advance. Instructions touch only the active
//! frame's registers and heap, the return register and the program counter.
//! `LDK*` and `CALL` operands resolve against the accessors of the module
//! that declared the running code, which differs from the host's module when
//! the code was imported.

use std::sync::Arc;

use ksp_vm_bytecode::disasm::format_instruction;
use ksp_vm_bytecode::{
    Accessors, FrameLayout, Function, FunctionIndex, Instruction, Module, Register,
    RunnableBytecode, Width,
};

use crate::error::{VmError, VmResult};
use crate::runtime::{RuntimeState, read_le};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `HALT`, or the entry code ran off its end; frames are left in place
    Halted,
    /// The outermost frame returned this value and was popped
    Returned(u64),
}

/// The bytecode interpreter
#[derive(Debug, Default)]
pub struct Interpreter {
    executed: u64,
}

/// Code running in one frame
struct ActiveCode {
    code: RunnableBytecode,
    is_entry: bool,
    accessors: Arc<Accessors>,
}

impl Interpreter {
    /// Create a new interpreter
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions dispatched by the last run
    #[inline]
    pub fn instructions_executed(&self) -> u64 {
        self.executed
    }

    /// Run entry code in a fresh top-level frame shaped by `layout`
    ///
    /// Any frames left by an earlier run, or a state poisoned by an earlier
    /// failure, are reset first. A pending interrupt is not cleared.
    pub fn execute(
        &mut self,
        state: &mut RuntimeState,
        module: &Module,
        code: &RunnableBytecode,
        layout: FrameLayout,
    ) -> VmResult<Outcome> {
        if !module.is_built() {
            return Err(VmError::ModuleNotBuilt);
        }
        self.prepare(state);

        let result = state
            .push_call_frame(usize::from(layout.register_count), layout.heap_size)
            .map(drop)
            .and_then(|()| {
                let mut stack = vec![ActiveCode {
                    code: code.clone(),
                    is_entry: true,
                    accessors: Arc::clone(module.accessors()),
                }];
                self.run_loop(state, &mut stack)
            });
        result.map_err(|error| state.fail(error))
    }

    /// Call a module function with `args` in its parameter registers
    ///
    /// Missing arguments are zero; extra arguments are ignored.
    pub fn call(
        &mut self,
        state: &mut RuntimeState,
        module: &Module,
        function: FunctionIndex,
        args: &[u64],
    ) -> VmResult<Outcome> {
        if !module.is_built() {
            return Err(VmError::ModuleNotBuilt);
        }
        let (callee, accessors) = resolve_function(module.accessors(), function)?;
        let layout = callee.layout().ok_or(VmError::ModuleNotBuilt)?;
        self.prepare(state);

        let result = enter_function(state, layout, args).and_then(|()| {
            let mut stack = vec![ActiveCode {
                code: callee.runnable().clone(),
                is_entry: false,
                accessors,
            }];
            self.run_loop(state, &mut stack)
        });
        result.map_err(|error| state.fail(error))
    }

    fn prepare(&mut self, state: &mut RuntimeState) {
        if state.is_poisoned() || state.depth() > 0 {
            state.reset();
        }
        self.executed = 0;
    }

    /// Main execution loop
    fn run_loop(
        &mut self,
        state: &mut RuntimeState,
        stack: &mut Vec<ActiveCode>,
    ) -> VmResult<Outcome> {
        let budget = state.config().instruction_budget;
        let trace = state.config().trace_instructions;

        loop {
            if state.is_interrupted() {
                return Err(VmError::Interrupted);
            }

            let active = stack.last().ok_or(VmError::NoActiveFrame)?;
            let pc = state.pc();

            // Running off the end
            if pc >= active.code.len() {
                if active.is_entry {
                    return Ok(Outcome::Halted);
                }
                match self.return_from(state, stack, 0)? {
                    Some(outcome) => return Ok(outcome),
                    None => continue,
                }
            }

            if let Some(budget) = budget
                && self.executed >= budget
            {
                return Err(VmError::InstructionBudgetExceeded(budget));
            }

            let (instruction, len) = Instruction::decode(active.code.code(), pc)
                .map_err(|error| VmError::from_decode(error, pc))?;
            if trace {
                tracing::trace!(
                    pc,
                    depth = state.depth(),
                    instruction = %format_instruction(&instruction),
                    "dispatch"
                );
            }
            self.executed += 1;

            match self.execute_instruction(&instruction, state, &active.accessors)? {
                InstructionResult::Continue => {
                    state.set_pc(pc + len);
                }
                InstructionResult::Call {
                    callee,
                    accessors,
                    arg_base,
                } => {
                    // Advance before pushing so the callee saves the return pc
                    state.set_pc(pc + len);

                    let layout = callee.layout().ok_or(VmError::ModuleNotBuilt)?;
                    let args = (0..layout.parameter_count)
                        .map(|i| {
                            let register = arg_base.index().checked_add(i).ok_or_else(|| {
                                VmError::RegisterOutOfRange {
                                    register: arg_base.index(),
                                    count: state
                                        .current_frame()
                                        .map_or(0, |frame| frame.register_count()),
                                }
                            })?;
                            state.register(register)
                        })
                        .collect::<VmResult<Vec<u64>>>()?;

                    enter_function(state, layout, &args)?;
                    stack.push(ActiveCode {
                        code: callee.runnable().clone(),
                        is_entry: false,
                        accessors,
                    });
                }
                InstructionResult::Return(value) => {
                    if let Some(outcome) = self.return_from(state, stack, value)? {
                        return Ok(outcome);
                    }
                }
                InstructionResult::Halt => return Ok(Outcome::Halted),
            }
        }
    }

    /// Pop the current frame; yields the outcome when it was the outermost
    fn return_from(
        &self,
        state: &mut RuntimeState,
        stack: &mut Vec<ActiveCode>,
        value: u64,
    ) -> VmResult<Option<Outcome>> {
        state.set_return_value(value);
        state.pop_call_frame()?;
        stack.pop();
        Ok(stack.is_empty().then_some(Outcome::Returned(value)))
    }

    /// Execute a single instruction
    fn execute_instruction(
        &self,
        instruction: &Instruction,
        state: &mut RuntimeState,
        accessors: &Arc<Accessors>,
    ) -> VmResult<InstructionResult> {
        match *instruction {
            Instruction::Nop => {}

            Instruction::Put { width, dst, value } => {
                state.set_register(dst.index(), width, value)?;
            }

            Instruction::Mov { width, src, dst } => {
                let value = state.register(src.index())?;
                state.set_register(dst.index(), width, value)?;
            }

            Instruction::LoadHeap { width, dst, offset } => {
                let value = state.read_heap(usize::from(offset.offset()), width)?;
                state.set_register(dst.index(), width, value)?;
            }

            Instruction::StoreHeap { width, src, offset } => {
                let value = state.register(src.index())?;
                state.write_heap(usize::from(offset.offset()), width, value)?;
            }

            Instruction::LoadConst {
                width,
                dst,
                constant,
            } => {
                let index = constant.index();
                let value = accessors
                    .constant(constant)
                    .ok_or(VmError::UnknownConstant(index))?;
                let bytes = value.bytes().get(..width.bytes()).ok_or(
                    VmError::ConstantTooSmall {
                        index,
                        width: width.bytes(),
                        size: value.len(),
                    },
                )?;
                state.set_register(dst.index(), width, read_le(bytes))?;
            }

            Instruction::Call { function, arg_base } => {
                let (callee, accessors) = resolve_function(accessors, function)?;
                return Ok(InstructionResult::Call {
                    callee,
                    accessors,
                    arg_base,
                });
            }

            Instruction::Ret { src } => {
                return Ok(InstructionResult::Return(state.register(src.index())?));
            }

            Instruction::LoadRet { dst } => {
                state.set_register(dst.index(), Width::Quad, state.return_value())?;
            }

            Instruction::Halt => return Ok(InstructionResult::Halt),
        }
        Ok(InstructionResult::Continue)
    }
}

/// Function at `index` plus the accessors its own operands index
fn resolve_function(
    accessors: &Arc<Accessors>,
    index: FunctionIndex,
) -> VmResult<(Arc<Function>, Arc<Accessors>)> {
    let linked = accessors
        .function(index)
        .ok_or(VmError::UnknownFunction(index.index()))?;
    let home = linked.home().unwrap_or(accessors);
    Ok((Arc::clone(linked.function()), Arc::clone(home)))
}

/// Push a frame for `layout` and fill its parameter registers
fn enter_function(state: &mut RuntimeState, layout: FrameLayout, args: &[u64]) -> VmResult<()> {
    state.push_call_frame(usize::from(layout.register_count), layout.heap_size)?;
    for (register, &value) in (0..layout.parameter_count).zip(args) {
        state.set_register(register, Width::Quad, value)?;
    }
    Ok(())
}

/// Result of executing an instruction
enum InstructionResult {
    /// Continue to next instruction
    Continue,
    /// Call a resolved function
    Call {
        callee: Arc<Function>,
        accessors: Arc<Accessors>,
        arg_base: Register,
    },
    /// Return from the current frame
    Return(u64),
    /// Stop execution
    Halt,
}
