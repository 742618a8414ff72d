//! The range-check builtin: a validation-rule-only segment asserting every
//! written value is a felt in `[0, 2^128)` (spec §4.8).

use std::rc::Rc;

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::memory_errors::MemoryError;
use crate::errors::runner_errors::RunnerError;
use crate::felt::{Felt, FeltExt};
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// `2^128`, the exclusive upper bound range-check cells must fall under.
pub const RANGE_CHECK_BOUND_BITS: u32 = 128;

/// The range-check builtin: every cell must hold a felt below `2^128`.
#[derive(Debug, Default)]
pub struct RangeCheckBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
}

impl RangeCheckBuiltinRunner {
    /// Creates a new, not-yet-initialized range-check builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for RangeCheckBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::RangeCheck
    }

    fn base(&self) -> Option<Relocatable> {
        self.base
    }

    fn init_segments(&mut self, segments: &mut MemorySegmentManager) {
        self.base = Some(segments.add_segment());
    }

    fn initial_stack(&self) -> Vec<MaybeRelocatable> {
        self.base.map(|b| vec![b.into()]).unwrap_or_default()
    }

    fn add_validation_rule(&self, memory: &mut Memory) {
        let Some(base) = self.base else { return };
        let segment_index = base.segment_index as usize;
        memory.add_validation_rule(
            segment_index,
            Rc::new(|memory: &Memory, addr: Relocatable| {
                let felt = memory.get_felt(addr)?;
                if felt.bit_length() > RANGE_CHECK_BOUND_BITS {
                    return Err(MemoryError::InconsistentMemory {
                        addr,
                        existing: MaybeRelocatable::Int(felt),
                        attempted: MaybeRelocatable::Int(Felt::ZERO),
                    });
                }
                Ok(vec![addr])
            }),
        );
    }

    fn deduce_memory_cell(
        &self,
        _memory: &Memory,
        _address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, BuiltinError> {
        Ok(None)
    }

    fn get_used_perm_range_check_units(&self, segments: &MemorySegmentManager) -> usize {
        self.base
            .and_then(|b| segments.get_segment_used_size(b.segment_index as usize))
            .unwrap_or(0)
    }

    fn final_stack(
        &mut self,
        segments: &MemorySegmentManager,
        pointer: Relocatable,
    ) -> Result<Relocatable, RunnerError> {
        let (prev, stop_ptr) = default_final_stack(self.base, segments, pointer)?;
        self.stop_ptr = Some(stop_ptr);
        Ok(prev)
    }

    fn get_memory_segment_addresses(&self) -> (Relocatable, Option<Relocatable>) {
        (self.base.unwrap_or(Relocatable::new(0, 0)), self.stop_ptr)
    }
}
