//! The crate's error taxonomy.
//!
//! Each submodule holds one kind from spec section 7: memory errors, math
//! errors, VM (step-level) errors, trace/relocation errors, runner errors,
//! resource errors and hint errors. [`vm_errors::VirtualMachineError`] is the
//! single error type threaded through [`crate::vm::VirtualMachine::step`]; the
//! others compose into it via `#[from]`.

pub mod builtin_errors;
pub mod hint_errors;
pub mod math_errors;
pub mod memory_errors;
pub mod resource_errors;
pub mod runner_errors;
pub mod trace_errors;
pub mod vm_errors;
