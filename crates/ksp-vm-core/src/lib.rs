//! # KSP VM Core
//!
//! Execution engine for the KSP virtual machine.
//!
//! - **Arena-backed frames**: every call frame is a window into one fixed
//!   data arena, and both the frame count and the arena size are bounded
//! - **Register machine**: 8-byte registers per frame, width-tagged
//!   instructions, zero-extending narrow writes
//! - **Fatal errors are values**: dispatch failures come back as [`VmError`]
//!   and are also queued on the state's [`ErrorQueue`]

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod errors;
pub mod interpreter;
pub mod runtime;

pub use config::RuntimeConfig;
pub use error::{Resource, VmError, VmResult};
pub use errors::ErrorQueue;
pub use interpreter::{Interpreter, Outcome};
pub use runtime::{CallFrame, RuntimeState};
