//! The Poseidon builtin: 6-cell instances `(x0, x1, x2, y0, y1, y2)` applying
//! the Poseidon permutation to the input state (spec §4.8).

use starknet_types_core::felt::Felt;
use starknet_types_core::hash::Poseidon;

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::runner_errors::RunnerError;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// Cells per Poseidon instance: 3 input, 3 output.
pub const CELLS_PER_INSTANCE: u64 = 6;
/// Input cells per instance.
pub const INPUT_CELLS: u64 = 3;

/// The Poseidon builtin.
#[derive(Debug, Default)]
pub struct PoseidonBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
}

impl PoseidonBuiltinRunner {
    /// Creates a new, not-yet-initialized Poseidon builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for PoseidonBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::Poseidon
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
        if index < INPUT_CELLS {
            return Ok(None);
        }
        let instance_base = Relocatable::new(address.segment_index, address.offset - index);
        let mut inputs = [Felt::ZERO; 3];
        for (i, input) in inputs.iter_mut().enumerate() {
            let addr = instance_base.add_usize(i).expect("offset fits in u64");
            match memory.get(addr) {
                Some(MaybeRelocatable::Int(value)) => *input = value,
                _ => return Ok(None),
            }
        }

        let mut state = inputs;
        Poseidon::hades_permutation(&mut state);
        let output_index = (index - INPUT_CELLS) as usize;
        Ok(Some(MaybeRelocatable::Int(state[output_index])))
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
