//! Errors raised by [`crate::runner::CairoRunner`].

use thiserror::Error;

use crate::relocatable::Relocatable;

/// An error raised while loading, initializing or finishing a Cairo run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The program has no `start` offset and none was given.
    #[error("the program has no start label")]
    NoProgramStart,
    /// The program has no `end` offset and none was given.
    #[error("the program has no end label")]
    NoProgramEnd,
    /// The execution segment's base was requested before it was initialized.
    #[error("execution base was not initialized")]
    NoExecBase,
    /// The program segment's base was requested before it was initialized.
    #[error("program base was not initialized")]
    NoProgBase,
    /// The program declares no `main` entrypoint.
    #[error("the program has no main entrypoint")]
    MissingMain,
    /// A builtin instance segment was referenced but the builtin isn't included in this run.
    #[error("no builtin runner is registered for segment {0}")]
    NoBuiltinForInstance(usize),
    /// The program's builtin list is not in canonical order.
    #[error("program builtins are not listed in the canonical order")]
    DisorderedBuiltins,
    /// Memory could not be initialized from the program and arguments.
    #[error("failed to initialize memory: {0}")]
    MemoryInitializationError(String),
    /// A validation rule rejected a memory cell during initialization.
    #[error("memory validation failed: {0}")]
    MemoryValidationError(String),
    /// `final_stack` was called on a builtin whose stop pointer was never written.
    #[error("builtin at segment {0} has no stop pointer")]
    NoStopPointer(isize),
    /// `end_run` was invoked a second time on the same runner.
    #[error("end_run was already called on this runner")]
    EndRunAlreadyCalled,
    /// A temporary address escaped relocation and was never resolved to a real address.
    #[error("memory holds an unrelocated temporary address: {0:?}")]
    InvalidMemoryValueTemporaryAddress(Relocatable),
    /// A builtin referenced a segment it does not own.
    #[error("builtin runner's base {0:?} is in a temporary segment")]
    RunnerInTemporarySegment(Relocatable),
}
