//! Builtin runners: specialized segments whose cells are auto-deduced from
//! peer cells under arithmetic or cryptographic constraints (spec §4.8).
//!
//! Every builtin shares one contract ([`BuiltinRunnerImpl`]); [`BuiltinRunner`]
//! is the closed sum type dispatching to one implementation per builtin, the
//! way the teacher's `BuiltinManager` dispatches to a `Box<dyn Builtin>` per
//! segment, generalized from a single `deduce` method to the full lifecycle
//! the spec requires (segment init, initial stack, validation, final stack,
//! resource accounting).

pub mod bitwise;
pub mod ec_op;
pub mod ecdsa;
pub mod keccak;
pub mod output;
pub mod pedersen;
pub mod poseidon;
pub mod range_check;
pub mod segment_arena;

use std::fmt;

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::runner_errors::RunnerError;
use crate::memory::Memory;
use crate::operands::MemoryCellDeducer;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

pub use bitwise::BitwiseBuiltinRunner;
pub use ec_op::EcOpBuiltinRunner;
pub use ecdsa::EcdsaBuiltinRunner;
pub use keccak::KeccakBuiltinRunner;
pub use output::OutputBuiltinRunner;
pub use pedersen::PedersenBuiltinRunner;
pub use poseidon::PoseidonBuiltinRunner;
pub use range_check::RangeCheckBuiltinRunner;
pub use segment_arena::SegmentArenaBuiltinRunner;

/// The closed set of builtins a program may declare (spec §6), in the
/// canonical order a program's `builtins` list must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinName {
    /// The output builtin.
    Output,
    /// The Pedersen hash builtin.
    Pedersen,
    /// The range-check builtin.
    RangeCheck,
    /// The ECDSA signature builtin.
    Ecdsa,
    /// The bitwise builtin.
    Bitwise,
    /// The EC-op builtin.
    EcOp,
    /// The Keccak builtin.
    Keccak,
    /// The Poseidon builtin.
    Poseidon,
    /// The segment-arena builtin.
    SegmentArena,
}

impl BuiltinName {
    /// The canonical ordering a program's builtin list must follow (spec §6).
    pub const CANONICAL_ORDER: [BuiltinName; 9] = [
        BuiltinName::Output,
        BuiltinName::Pedersen,
        BuiltinName::RangeCheck,
        BuiltinName::Ecdsa,
        BuiltinName::Bitwise,
        BuiltinName::EcOp,
        BuiltinName::Keccak,
        BuiltinName::Poseidon,
        BuiltinName::SegmentArena,
    ];

    /// The name Cairo programs use for this builtin in their JSON `builtins` list.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinName::Output => "output",
            BuiltinName::Pedersen => "pedersen",
            BuiltinName::RangeCheck => "range_check",
            BuiltinName::Ecdsa => "ecdsa",
            BuiltinName::Bitwise => "bitwise",
            BuiltinName::EcOp => "ec_op",
            BuiltinName::Keccak => "keccak",
            BuiltinName::Poseidon => "poseidon",
            BuiltinName::SegmentArena => "segment_arena",
        }
    }
}

impl fmt::Display for BuiltinName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The capability set every builtin runner implements (spec §4.8).
pub trait BuiltinRunnerImpl {
    /// This builtin's identity.
    fn name(&self) -> BuiltinName;

    /// The base address of this builtin's segment, once allocated.
    fn base(&self) -> Option<Relocatable>;

    /// Allocates this builtin's segment and records its base.
    fn init_segments(&mut self, segments: &mut MemorySegmentManager);

    /// The values pushed onto the caller's stack on function entry.
    fn initial_stack(&self) -> Vec<MaybeRelocatable>;

    /// Registers this builtin's per-write validation rule, if any.
    fn add_validation_rule(&self, _memory: &mut Memory) {}

    /// Attempts to auto-deduce the value at `address`.
    fn deduce_memory_cell(
        &self,
        memory: &Memory,
        address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, BuiltinError>;

    /// This builtin's contribution to the permanent range-check budget.
    fn get_used_perm_range_check_units(&self, _segments: &MemorySegmentManager) -> usize {
        0
    }

    /// Consumes this builtin's stop pointer from the caller's stack.
    fn final_stack(
        &mut self,
        segments: &MemorySegmentManager,
        pointer: Relocatable,
    ) -> Result<Relocatable, RunnerError>;

    /// The base and (if finalized) stop addresses of this builtin's segment.
    fn get_memory_segment_addresses(&self) -> (Relocatable, Option<Relocatable>);
}

/// Dispatches to one builtin implementation per variant (spec §9's
/// "tagged sum type" design note).
#[derive(Debug)]
pub enum BuiltinRunner {
    /// The output builtin.
    Output(OutputBuiltinRunner),
    /// The Pedersen hash builtin.
    Pedersen(PedersenBuiltinRunner),
    /// The range-check builtin.
    RangeCheck(RangeCheckBuiltinRunner),
    /// The ECDSA signature builtin.
    Ecdsa(EcdsaBuiltinRunner),
    /// The bitwise builtin.
    Bitwise(BitwiseBuiltinRunner),
    /// The EC-op builtin.
    EcOp(EcOpBuiltinRunner),
    /// The Keccak builtin.
    Keccak(KeccakBuiltinRunner),
    /// The Poseidon builtin.
    Poseidon(PoseidonBuiltinRunner),
    /// The segment-arena builtin.
    SegmentArena(SegmentArenaBuiltinRunner),
}

macro_rules! dispatch {
    ($self:ident, $name:ident => $body:expr) => {
        match $self {
            BuiltinRunner::Output($name) => $body,
            BuiltinRunner::Pedersen($name) => $body,
            BuiltinRunner::RangeCheck($name) => $body,
            BuiltinRunner::Ecdsa($name) => $body,
            BuiltinRunner::Bitwise($name) => $body,
            BuiltinRunner::EcOp($name) => $body,
            BuiltinRunner::Keccak($name) => $body,
            BuiltinRunner::Poseidon($name) => $body,
            BuiltinRunner::SegmentArena($name) => $body,
        }
    };
}

impl BuiltinRunnerImpl for BuiltinRunner {
    fn name(&self) -> BuiltinName {
        dispatch!(self, r => r.name())
    }

    fn base(&self) -> Option<Relocatable> {
        dispatch!(self, r => r.base())
    }

    fn init_segments(&mut self, segments: &mut MemorySegmentManager) {
        dispatch!(self, r => r.init_segments(segments))
    }

    fn initial_stack(&self) -> Vec<MaybeRelocatable> {
        dispatch!(self, r => r.initial_stack())
    }

    fn add_validation_rule(&self, memory: &mut Memory) {
        dispatch!(self, r => r.add_validation_rule(memory))
    }

    fn deduce_memory_cell(
        &self,
        memory: &Memory,
        address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, BuiltinError> {
        dispatch!(self, r => r.deduce_memory_cell(memory, address))
    }

    fn get_used_perm_range_check_units(&self, segments: &MemorySegmentManager) -> usize {
        dispatch!(self, r => r.get_used_perm_range_check_units(segments))
    }

    fn final_stack(
        &mut self,
        segments: &MemorySegmentManager,
        pointer: Relocatable,
    ) -> Result<Relocatable, RunnerError> {
        dispatch!(self, r => r.final_stack(segments, pointer))
    }

    fn get_memory_segment_addresses(&self) -> (Relocatable, Option<Relocatable>) {
        dispatch!(self, r => r.get_memory_segment_addresses())
    }
}

/// Lets a slice of builtin runners act as a [`MemoryCellDeducer`]: the
/// operand engine consults whichever runner owns the address's segment.
impl MemoryCellDeducer for [BuiltinRunner] {
    fn deduce_memory_cell(
        &self,
        memory: &Memory,
        address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, crate::errors::vm_errors::VirtualMachineError> {
        for runner in self {
            if runner.base().map(|b| b.segment_index) == Some(address.segment_index) {
                return Ok(BuiltinRunnerImpl::deduce_memory_cell(runner, memory, address)?);
            }
        }
        Ok(None)
    }
}

/// The default final-stack implementation shared by every builtin: the
/// pointer one past the builtin's stop pointer must be exactly `cells`
/// below `pointer`, and the stop pointer's segment must match the builtin's
/// base.
pub(crate) fn default_final_stack(
    base: Option<Relocatable>,
    segments: &MemorySegmentManager,
    pointer: Relocatable,
) -> Result<(Relocatable, Relocatable), RunnerError> {
    let base = base.ok_or(RunnerError::NoExecBase)?;
    let prev = pointer.sub_usize(1).map_err(|_| RunnerError::NoStopPointer(base.segment_index))?;
    let stop_ptr = segments
        .memory
        .get_relocatable(prev)
        .map_err(|_| RunnerError::NoStopPointer(base.segment_index))?;
    if stop_ptr.segment_index != base.segment_index {
        return Err(RunnerError::NoStopPointer(base.segment_index));
    }
    Ok((prev, stop_ptr))
}
