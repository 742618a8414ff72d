//! Errors raised by resource accounting (step budgets, cell budgets).

use thiserror::Error;

/// A kind of memory cell budget that a builtin ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsufficientAllocatedCellsKind {
    /// Not enough range-check units were available.
    RangeCheck,
    /// Not enough cells were available to cover the memory holes.
    MemoryHoles,
    /// Not enough diluted-check units were available.
    DilutedCheck,
}

/// An error raised when the VM runs out of a bounded resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The bound [`crate::vm::ResourceTracker`] reported that its budget was consumed.
    #[error("run resources were exhausted")]
    RunResourcesExhausted,
    /// A builtin's layout does not provide enough cells for the values it must encode.
    #[error("insufficient allocated cells for {0:?}")]
    InsufficientAllocatedCells(InsufficientAllocatedCellsKind),
}
