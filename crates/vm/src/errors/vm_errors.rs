//! The top-level error type returned by a single VM step.

use thiserror::Error;

use crate::relocatable::Relocatable;

use super::builtin_errors::RunnerError as BuiltinError;
use super::hint_errors::HintError;
use super::math_errors::MathError;
use super::memory_errors::MemoryError;
use super::resource_errors::ResourceError;
use super::runner_errors::RunnerError;
use super::trace_errors::TraceError;

/// Any error that can terminate a running [`crate::vm::VirtualMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VirtualMachineError {
    /// A memory operation failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// An address or field computation failed.
    #[error(transparent)]
    Math(#[from] MathError),
    /// The trace or relocator reported an error.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// The runner reported an error.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// A builtin's auto-deduction failed.
    #[error(transparent)]
    Builtin(#[from] BuiltinError),
    /// A hint failed to compile or execute.
    #[error(transparent)]
    Hint(#[from] HintError),
    /// A resource budget was exhausted.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The instruction word at `pc` could not be fetched.
    #[error("could not fetch an instruction at {0:?}")]
    InstructionFetchingFailed(Relocatable),
    /// The instruction word did not fit the encoding the decoder expects.
    #[error("instruction encoding error at {0:?}")]
    InstructionEncodingError(Relocatable),
    /// `op0` could not be read from memory nor deduced.
    #[error("an ASSERT_EQ instruction failed to compute or deduce op0")]
    FailedToComputeOp0,
    /// `op1` could not be read from memory nor deduced.
    #[error("an ASSERT_EQ instruction failed to compute or deduce op1")]
    FailedToComputeOp1,
    /// `dst` could not be read from memory nor deduced.
    #[error("no destination value could be determined for this instruction")]
    NoDst,
    /// `AssertEq` requires `res` but `res_logic` is `Unconstrained`.
    #[error("res is unconstrained but is required to deduce dst in an ASSERT_EQ instruction")]
    UnconstrainedResAssertEq,
    /// Adding two relocatable values together in a `res_logic = Add` computation.
    #[error("cannot compute res: adding relocatable to relocatable")]
    AddRelocToReloc,
    /// Multiplying any relocatable value in a `res_logic = Mul` computation.
    #[error("cannot compute res: multiplying a relocatable value")]
    MulReloc,
    /// A memory read produced a value of the wrong variant (felt vs relocatable).
    #[error("type mismatch while computing operands")]
    TypeMismatch,
    /// `res != dst` in an `AssertEq` instruction.
    #[error("an ASSERT_EQ instruction failed: {res:?} != {dst:?}")]
    DiffAssertValues {
        /// The computed result.
        res: crate::relocatable::MaybeRelocatable,
        /// The asserted destination.
        dst: crate::relocatable::MaybeRelocatable,
    },
    /// A `Call` instruction's `op0` did not equal `PC + instruction size`.
    #[error("a CALL instruction could not write its return PC")]
    CantWriteReturnPc,
    /// A `Call` instruction's `dst` did not equal the current `FP`.
    #[error("a CALL instruction could not write its return FP")]
    CantWriteReturnFp,
    /// `pc_update = Jump` requires a relocatable `res`.
    #[error("pc_update JUMP requires a relocatable res")]
    PcUpdateJumpResNotRelocatable,
    /// `pc_update = Jump` was applied to an unconstrained `res`.
    #[error("pc_update JUMP cannot be used with an unconstrained res")]
    ResUnconstrainedUsedWithPcUpdateJump,
    /// `pc_update = JumpRel` requires a field-element `res`.
    #[error("pc_update JUMP_REL requires a felt res")]
    PcUpdateJumpRelResNotFelt,
    /// `ap_update = Add` requires a non-`None` `res`.
    #[error("ap_update ADD requires a res value")]
    ApUpdateAddResUnconstrained,
    /// A `Call` instruction specified a non-regular `ap_update`.
    #[error("a CALL instruction requires ap_update REGULAR")]
    UndefinedApUpdateInCall,

    /// A builtin-segment memory access fell outside of the range the builtin reported.
    #[error("out of bounds access to a builtin segment")]
    OutOfBoundsBuiltinSegmentAccess,
    /// An access to the program segment fell outside of the loaded program's data.
    #[error("out of bounds access to the program segment")]
    OutOfBoundsProgramSegmentAccess,
}
