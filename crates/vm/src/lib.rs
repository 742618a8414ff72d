//! # cairo-vm-core
//!
//! A Cairo virtual machine implementation: prime-field arithmetic, write-once
//! segmented memory, the fetch-decode-execute cycle, builtin runners and
//! relocation.
//!
//! # Documentation
//!
//! - [The Cairo Whitepaper](https://www.cairo-lang.org/cairo-whitepaper/).

#![warn(missing_docs, missing_debug_implementations)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod builtins;
pub mod errors;
pub mod felt;
pub mod hint_processor;
pub mod instruction;
pub mod memory;
pub mod opcode;
pub mod operands;
pub mod program;
pub mod relocatable;
pub mod relocation;
pub mod resource_tracker;
pub mod run_context;
pub mod runner;
pub mod scopes;
pub mod segments;
pub mod trace;
pub mod vm;

pub use felt::Felt;
pub use program::Program;
pub use relocatable::{MaybeRelocatable, Relocatable};
pub use runner::{CairoLayout, CairoRunner};
pub use vm::VirtualMachine;
