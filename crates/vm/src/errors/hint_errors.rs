//! Errors surfaced by an external [`crate::hint_processor::HintProcessor`].

use thiserror::Error;

/// An error raised while compiling or executing a hint.
///
/// The core VM treats hint execution as an opaque external call; this error
/// exists only so that a [`crate::hint_processor::HintProcessor`] has a single
/// error type to propagate through [`crate::errors::vm_errors::VirtualMachineError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HintError {
    /// The hint processor does not recognize the hint code it was asked to compile.
    #[error("unknown hint: {0}")]
    UnknownHint(String),
    /// A hint-defined custom error, carrying an arbitrary message.
    #[error("{0}")]
    CustomHint(String),
    /// A hint attempted to resolve a reference that does not exist.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    /// A hint attempted to read a scope variable that was never set.
    #[error("variable {0} not present in current execution scope")]
    VariableNotInScope(String),
}
