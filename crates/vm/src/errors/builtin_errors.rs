//! Errors raised by individual [`crate::builtins::BuiltinRunner`] deductions.

use thiserror::Error;

use crate::relocatable::Relocatable;

/// An error raised while a builtin attempts to auto-deduce a memory cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// A bitwise input did not fit in `TOTAL_N_BITS`.
    #[error("bitwise input at {0:?} is outside of the allowed bit range")]
    BitwiseOutsideBounds(Relocatable),
    /// A range-check cell held a value outside of `[0, 2^128)`.
    #[error("range-check value at {0:?} is outside of the allowed range")]
    RangeCheckOutsideBounds(Relocatable),
    /// No ECDSA signature was registered for the public key at this address.
    #[error("no signature was provided for the public key at {0:?}")]
    SignatureNotFound(Relocatable),
    /// An ECDSA signature failed to verify against the given message.
    #[error("signature at {0:?} does not verify")]
    InvalidSignature(Relocatable),
    /// An EC-op input point was the point at infinity (both coordinates zero).
    #[error("ec_op input point at {0:?} is the point at infinity")]
    EcOpPointAtInfinity(Relocatable),
    /// An EC-op scalar multiplier was outside of the allowed range.
    #[error("ec_op scalar at {0:?} is out of range")]
    EcOpScalarOutOfRange(Relocatable),
    /// A segment-arena cell violated the builtin's structural invariants.
    #[error("segment arena cell at {0:?} is structurally inconsistent")]
    SegmentArenaInvalid(Relocatable),
    /// A builtin's deduction disagreed with a value already present in memory.
    #[error("auto-deduction at {0:?} is inconsistent with the stored value")]
    InconsistentAutoDeduction(Relocatable),
}
