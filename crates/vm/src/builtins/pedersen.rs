//! The Pedersen hash builtin: 3-cell instances `(x, y, h)` (spec §4.8).

use std::cell::RefCell;
use std::collections::HashMap;

use starknet_types_core::hash::{Pedersen, StarkHash};

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::runner_errors::RunnerError;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// Cells per Pedersen instance: `x, y, h`.
pub const CELLS_PER_INSTANCE: u64 = 3;
/// Input cells per instance.
pub const INPUT_CELLS: u64 = 2;

/// The Pedersen hash builtin. Results are cached per output address so that
/// `verify_auto_deductions` doesn't recompute the hash for every check.
#[derive(Debug, Default)]
pub struct PedersenBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
    cache: RefCell<HashMap<Relocatable, MaybeRelocatable>>,
}

impl PedersenBuiltinRunner {
    /// Creates a new, not-yet-initialized Pedersen builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for PedersenBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::Pedersen
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

    fn deduce_memory_cell(
        &self,
        memory: &Memory,
        address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, BuiltinError> {
        let index = address.offset % CELLS_PER_INSTANCE;
        if index != INPUT_CELLS {
            return Ok(None);
        }
        if let Some(cached) = self.cache.borrow().get(&address) {
            return Ok(Some(*cached));
        }
        let instance_base = Relocatable::new(address.segment_index, address.offset - index);
        let x_addr = instance_base;
        let y_addr = instance_base.add_usize(1).expect("offset fits in u64");

        let (Some(MaybeRelocatable::Int(x)), Some(MaybeRelocatable::Int(y))) =
            (memory.get(x_addr), memory.get(y_addr))
        else {
            return Ok(None);
        };

        let hash = Pedersen::hash(&x, &y);
        let value = MaybeRelocatable::Int(hash);
        self.cache.borrow_mut().insert(address, value);
        Ok(Some(value))
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
