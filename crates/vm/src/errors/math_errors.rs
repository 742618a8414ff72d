//! Errors raised while performing arithmetic on [`crate::relocatable`] values.

use thiserror::Error;

use crate::relocatable::Relocatable;

/// An error raised by address or field arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// Attempted to add two relocatable values together.
    #[error("cannot add relocatable {0:?} to relocatable {1:?}")]
    RelocatableAdd(Relocatable, Relocatable),
    /// Attempted to multiply a relocatable value.
    #[error("cannot multiply relocatable value {0:?}")]
    RelocatableMul(Relocatable),
    /// A computed offset did not fit in the representable range.
    #[error("value {0} is too large to be used as a memory offset")]
    ValueTooLarge(String),
    /// An arithmetic operation overflowed.
    #[error("arithmetic overflow while computing an address")]
    Overflow,
    /// Attempted to divide by zero.
    #[error("attempted to divide by zero")]
    DivByZero,
    /// Attempted to subtract two relocatables from different segments.
    #[error("cannot subtract relocatable {1:?} from {0:?}: different segments")]
    RelocatableSubDifferentSegments(Relocatable, Relocatable),
    /// Attempted to subtract a relocatable from a felt.
    #[error("cannot subtract relocatable {0:?} from a felt")]
    SubRelocatableFromInt(Relocatable),
}
