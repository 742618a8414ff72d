//! Errors raised by [`crate::memory::Memory`] and [`crate::segments::MemorySegmentManager`].

use thiserror::Error;

use crate::relocatable::{MaybeRelocatable, Relocatable};

/// An error raised while reading from or writing to [`crate::memory::Memory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// A write to `addr` attempted to change an already-set cell to a different value.
    #[error("inconsistent memory assignment at address {addr:?}: {existing:?} != {attempted:?}")]
    InconsistentMemory {
        /// The address of the offending cell.
        addr: Relocatable,
        /// The value already stored at `addr`.
        existing: MaybeRelocatable,
        /// The value the write attempted to store.
        attempted: MaybeRelocatable,
    },
    /// A read expected a field element but found a relocatable value.
    #[error("expected integer at address {0:?}")]
    ExpectedInteger(Relocatable),
    /// A read expected a relocatable value but found a field element.
    #[error("expected relocatable at address {0:?}")]
    ExpectedRelocatable(Relocatable),
    /// A read found no value at all at the given address.
    #[error("unknown memory cell at address {0:?}")]
    UnknownMemoryCell(Relocatable),
    /// A relocation rule's source was not the base of a temporary segment.
    #[error("relocation rule source {0:?} is not the base of a temporary segment")]
    AddressNotInTemporarySegment(Relocatable),
    /// A relocation rule's source had a non-zero offset.
    #[error("relocation rule source {0:?} must have offset zero")]
    NonZeroOffset(Relocatable),
    /// A relocation rule was registered twice for the same temporary segment.
    #[error("relocation rule for segment {0} was already registered")]
    DuplicatedRelocation(isize),
    /// More cells were marked accessed in a segment than the segment's finalized size.
    #[error("segment {segment} has {accessed} accessed addresses but only {size} cells")]
    SegmentHasMoreAccessedAddressesThanSize {
        /// The offending segment.
        segment: usize,
        /// The number of accessed cells.
        accessed: usize,
        /// The finalized (or used) size of the segment.
        size: usize,
    },
    /// `compute_effective_sizes` was never called before an operation that needs it.
    #[error("segment used sizes have not been computed yet")]
    MissingSegmentUsedSizes,
    /// The relocation base table was shorter than the number of segments with public entries.
    #[error("malformed public memory: relocation table is shorter than the segment count")]
    MalformedPublicMemory,
    /// `write_arg` received a value it did not know how to flatten into memory.
    #[error("failed to write argument to memory")]
    WriteArg,
    /// `gen_arg` received a value of an unsupported type.
    #[error("gen_arg received an argument of an unsupported type")]
    GenArgInvalidType,
    /// An operation required relocated memory but the memory has not been relocated yet.
    #[error("memory has not been relocated yet")]
    UnrelocatedMemory,
    /// Memory was relocated more than once.
    #[error("memory was already relocated")]
    MemoryAlreadyRelocated,
    /// A segment referenced by an address does not exist.
    #[error("segment {0} does not exist")]
    UnallocatedSegment(isize),
}
