//! The bitwise builtin: 5-cell instances `(x, y, x&y, x^y, x|y)` (spec §4.8).

use num_bigint::BigInt;

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::runner_errors::RunnerError;
use crate::felt::Felt;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// Cells per bitwise instance: `x, y, x&y, x^y, x|y`.
pub const CELLS_PER_INSTANCE: u64 = 5;
/// Input cells per instance.
pub const INPUT_CELLS: u64 = 2;
/// The bit width bitwise inputs are limited to.
pub const TOTAL_N_BITS: u32 = 251;

/// The bitwise builtin.
#[derive(Debug, Default)]
pub struct BitwiseBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
}

impl BitwiseBuiltinRunner {
    /// Creates a new, not-yet-initialized bitwise builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for BitwiseBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::Bitwise
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
        let x_addr = instance_base;
        let y_addr = instance_base.add_usize(1).expect("offset fits in u64");

        let (Some(MaybeRelocatable::Int(x)), Some(MaybeRelocatable::Int(y))) =
            (memory.get(x_addr), memory.get(y_addr))
        else {
            return Ok(None);
        };

        let x_int = felt_to_bigint(&x);
        let y_int = felt_to_bigint(&y);
        if x_int.bits() as u32 > TOTAL_N_BITS || y_int.bits() as u32 > TOTAL_N_BITS {
            return Err(BuiltinError::BitwiseOutsideBounds(address));
        }

        let result = match index {
            2 => &x_int & &y_int,
            3 => &x_int ^ &y_int,
            4 => &x_int | &y_int,
            _ => unreachable!("index is bounded to [2, 4] above"),
        };
        Ok(Some(MaybeRelocatable::Int(bigint_to_felt(&result))))
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

fn felt_to_bigint(felt: &Felt) -> BigInt {
    BigInt::from_bytes_be(num_bigint::Sign::Plus, &felt.to_bytes_be())
}

fn bigint_to_felt(value: &BigInt) -> Felt {
    let (_, bytes) = value.to_bytes_be();
    Felt::from_bytes_be_slice(&bytes)
}
