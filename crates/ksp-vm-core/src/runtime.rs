//! Runtime state: call frames packed into one fixed data arena
//!
//! ```text
//! data arena
//! +-----------------------------+-----------------------------+----- - -
//! | frame 0                     | frame 1                     |
//! | registers      | heap       | registers      | heap       |  free
//! +-----------------------------+-----------------------------+----- - -
//! ^bottom/regs     ^heap_base   ^top = bottom of frame 1      ^top
//! ```
//!
//! Frames are offsets into the arena, never pointers. Pushing checks both the
//! frame capacity and the free data bytes, so running out is a reported
//! [`VmError::ResourceExhausted`] instead of an overrun.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ksp_vm_bytecode::{REGISTER_WIDTH, Width};

use crate::config::RuntimeConfig;
use crate::error::{Resource, VmError, VmResult};
use crate::errors::ErrorQueue;

/// One activation's window into the data arena
///
/// `bottom <= registers_base <= heap_base <= top`, and a frame's `bottom`
/// equals the previous frame's `top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// First byte of the frame
    pub bottom: usize,
    /// First register slot
    pub registers_base: usize,
    /// First heap byte
    pub heap_base: usize,
    /// One past the last byte of the frame
    pub top: usize,
    /// Program counter to resume at when this frame is popped
    pub saved_pc: usize,
    /// Index of the previous frame
    pub prev: Option<usize>,
}

impl CallFrame {
    /// Number of register slots
    #[inline]
    pub fn register_count(&self) -> usize {
        (self.heap_base - self.registers_base) / REGISTER_WIDTH
    }

    /// Heap bytes
    #[inline]
    pub fn heap_size(&self) -> usize {
        self.top - self.heap_base
    }
}

/// Execution state for one logical instruction stream
///
/// Not shared between threads; run one state per concurrent execution.
pub struct RuntimeState {
    config: RuntimeConfig,
    frames: Vec<CallFrame>,
    data: Box<[u8]>,
    pc: usize,
    return_value: u64,
    interrupt_flag: Arc<AtomicBool>,
    errors: Arc<ErrorQueue>,
    poisoned: bool,
}

impl RuntimeState {
    /// Allocate both arenas from `config`
    pub fn new(config: &RuntimeConfig) -> Self {
        tracing::debug!(
            max_call_depth = config.max_call_depth,
            data_stack_size = config.data_stack_size,
            "runtime state allocated"
        );
        Self {
            config: config.clone(),
            frames: Vec::with_capacity(config.max_call_depth),
            data: vec![0u8; config.data_stack_size].into_boxed_slice(),
            pc: 0,
            return_value: 0,
            interrupt_flag: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(ErrorQueue::new()),
            poisoned: false,
        }
    }

    /// Configuration the state was built with
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ---- frames ----

    /// Lay a new frame directly above the current one
    ///
    /// The caller's program counter is saved into the frame and execution
    /// continues at offset 0. The new region is zeroed.
    pub fn push_call_frame(
        &mut self,
        register_count: usize,
        heap_size: usize,
    ) -> VmResult<&CallFrame> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::ResourceExhausted(Resource::CallFrames {
                capacity: self.config.max_call_depth,
            }));
        }

        let bottom = self.high_water_mark();
        let available = self.data.len() - bottom;
        let requested = register_count
            .checked_mul(REGISTER_WIDTH)
            .and_then(|regs| regs.checked_add(heap_size))
            .unwrap_or(usize::MAX);
        if requested > available {
            return Err(VmError::ResourceExhausted(Resource::DataArena {
                requested,
                available,
            }));
        }

        let heap_base = bottom + register_count * REGISTER_WIDTH;
        let frame = CallFrame {
            bottom,
            registers_base: bottom,
            heap_base,
            top: heap_base + heap_size,
            saved_pc: self.pc,
            prev: self.frames.len().checked_sub(1),
        };
        self.data[frame.bottom..frame.top].fill(0);
        self.frames.push(frame);
        self.pc = 0;

        tracing::debug!(
            depth = self.frames.len(),
            registers = register_count,
            heap = heap_size,
            bottom = frame.bottom,
            "call frame pushed"
        );
        self.frames.last().ok_or(VmError::NoActiveFrame)
    }

    /// Drop the current frame and restore the caller's program counter
    pub fn pop_call_frame(&mut self) -> VmResult<CallFrame> {
        let frame = self.frames.pop().ok_or(VmError::NoActiveFrame)?;
        self.pc = frame.saved_pc;
        tracing::debug!(depth = self.frames.len(), "call frame popped");
        Ok(frame)
    }

    /// Innermost frame
    #[inline]
    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Live frames, outermost first
    #[inline]
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Number of live frames
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// First free byte of the data arena
    #[inline]
    pub fn high_water_mark(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.top)
    }

    /// Data arena capacity in bytes
    #[inline]
    pub fn data_capacity(&self) -> usize {
        self.data.len()
    }

    fn frame(&self) -> VmResult<&CallFrame> {
        self.frames.last().ok_or(VmError::NoActiveFrame)
    }

    // ---- program counter and return register ----

    /// Current program counter
    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Set the program counter
    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Return-value register
    #[inline]
    pub fn return_value(&self) -> u64 {
        self.return_value
    }

    /// Set the return-value register
    #[inline]
    pub fn set_return_value(&mut self, value: u64) {
        self.return_value = value;
    }

    // ---- registers ----

    fn register_offset(&self, register: u8) -> VmResult<usize> {
        let frame = self.frame()?;
        let count = frame.register_count();
        if usize::from(register) >= count {
            return Err(VmError::RegisterOutOfRange { register, count });
        }
        Ok(frame.registers_base + usize::from(register) * REGISTER_WIDTH)
    }

    /// Read a full register of the current frame
    pub fn register(&self, register: u8) -> VmResult<u64> {
        let at = self.register_offset(register)?;
        Ok(read_le(&self.data[at..at + REGISTER_WIDTH]))
    }

    /// Write the low `width` bytes of `value`, clearing the rest of the slot
    pub fn set_register(&mut self, register: u8, width: Width, value: u64) -> VmResult<()> {
        let at = self.register_offset(register)?;
        let value = width.truncate(value);
        self.data[at..at + REGISTER_WIDTH].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Every register of the current frame
    pub fn registers(&self) -> VmResult<Vec<u64>> {
        let frame = self.frame()?;
        Ok(self.data[frame.registers_base..frame.heap_base]
            .chunks_exact(REGISTER_WIDTH)
            .map(read_le)
            .collect())
    }

    /// Human-readable listing of the current frame's registers
    pub fn dump_registers(&self) -> String {
        let Ok(registers) = self.registers() else {
            return String::from("<no active frame>\n");
        };
        let mut out = String::new();
        for (index, value) in registers.iter().enumerate() {
            let _ = writeln!(out, "r{index:<3} = {value:#018x} ({value})");
        }
        out
    }

    // ---- frame heap ----

    fn heap_range(&self, offset: usize, width: usize) -> VmResult<std::ops::Range<usize>> {
        let frame = self.frame()?;
        let size = frame.heap_size();
        match offset.checked_add(width) {
            Some(end) if end <= size => Ok(frame.heap_base + offset..frame.heap_base + end),
            _ => Err(VmError::HeapOutOfRange {
                offset,
                width,
                size,
            }),
        }
    }

    /// Read `width` bytes of the current frame's heap, zero-extended
    pub fn read_heap(&self, offset: usize, width: Width) -> VmResult<u64> {
        let range = self.heap_range(offset, width.bytes())?;
        Ok(read_le(&self.data[range]))
    }

    /// Write the low `width` bytes of `value` into the current frame's heap
    pub fn write_heap(&mut self, offset: usize, width: Width, value: u64) -> VmResult<()> {
        let range = self.heap_range(offset, width.bytes())?;
        self.data[range].copy_from_slice(&value.to_le_bytes()[..width.bytes()]);
        Ok(())
    }

    /// The current frame's heap bytes
    pub fn heap(&self) -> VmResult<&[u8]> {
        let frame = self.frame()?;
        Ok(&self.data[frame.heap_base..frame.top])
    }

    // ---- interruption ----

    /// Get the interrupt flag for external timeout/cancellation
    ///
    /// Storing `true` stops the dispatch loop before its next instruction.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt_flag)
    }

    /// Set a custom interrupt flag (for sharing across states)
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt_flag = flag;
    }

    /// Request interruption
    pub fn interrupt(&self) {
        self.interrupt_flag.store(true, Ordering::Relaxed);
    }

    /// Clear a pending interruption
    pub fn clear_interrupt(&self) {
        self.interrupt_flag.store(false, Ordering::Relaxed);
    }

    /// Check if execution was interrupted
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::Relaxed)
    }

    // ---- error reporting ----

    /// Queue receiving fatal errors
    pub fn errors(&self) -> &Arc<ErrorQueue> {
        &self.errors
    }

    /// Report into a host-supplied queue instead
    pub fn set_error_queue(&mut self, errors: Arc<ErrorQueue>) {
        self.errors = errors;
    }

    /// Record a fatal error and poison the state
    pub(crate) fn fail(&mut self, error: VmError) -> VmError {
        tracing::error!(pc = self.pc, depth = self.frames.len(), %error, "execution aborted");
        self.errors.push(error.to_string());
        self.poisoned = true;
        error
    }

    /// Whether a fatal error left the frames unusable
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Pop every frame and clear the registers of execution
    pub fn reset(&mut self) {
        self.frames.clear();
        self.pc = 0;
        self.return_value = 0;
        self.poisoned = false;
        tracing::debug!("runtime state reset");
    }
}

impl std::fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeState")
            .field("depth", &self.frames.len())
            .field("high_water_mark", &self.high_water_mark())
            .field("data_capacity", &self.data.len())
            .field("pc", &self.pc)
            .field("return_value", &self.return_value)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

pub(crate) fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
