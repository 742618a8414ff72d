//! The Keccak builtin: input cells assembled into a Keccak-f[1600] state,
//! with output cells produced on demand (spec §4.8).
//!
//! Memory stores each input/output limb as a single felt representing a
//! 200-bit little-endian chunk of the 1600-bit permutation state; 8 limbs of
//! 200 bits exactly cover the state's 25 64-bit words.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::runner_errors::RunnerError;
use crate::felt::Felt;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// Input cells per instance: eight 200-bit limbs assembled into the 1600-bit state.
pub const INPUT_CELLS: u64 = 8;
/// Output cells per instance.
pub const OUTPUT_CELLS: u64 = 8;
/// Cells per Keccak instance.
pub const CELLS_PER_INSTANCE: u64 = INPUT_CELLS + OUTPUT_CELLS;
/// Bits held by each 200-bit input/output limb.
pub const BITS_PER_LIMB: u32 = 200;

/// The Keccak builtin: runs the raw Keccak-f[1600] permutation (not a
/// digest API) since individual output words must be independently
/// addressable memory cells.
#[derive(Debug, Default)]
pub struct KeccakBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
}

impl KeccakBuiltinRunner {
    /// Creates a new, not-yet-initialized Keccak builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for KeccakBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::Keccak
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

        let mut limbs = Vec::with_capacity(INPUT_CELLS as usize);
        for i in 0..INPUT_CELLS {
            let addr = instance_base.add_usize(i as usize).expect("offset fits in u64");
            match memory.get(addr) {
                Some(MaybeRelocatable::Int(value)) => limbs.push(value),
                _ => return Ok(None),
            }
        }

        let state = pack_state(&limbs);
        let mut words = state;
        keccak::f1600(&mut words);
        let out_limbs = unpack_state(&words);

        let output_index = (index - INPUT_CELLS) as usize;
        Ok(Some(MaybeRelocatable::Int(out_limbs[output_index])))
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

/// Concatenates 8 little-endian 200-bit limbs into the 25-word (1600-bit)
/// Keccak state.
fn pack_state(limbs: &[Felt]) -> [u64; 25] {
    let mut bits = BigInt::from(0);
    for (i, limb) in limbs.iter().enumerate() {
        let value = BigInt::from_bytes_be(num_bigint::Sign::Plus, &limb.to_bytes_be());
        bits += value << (i as u32 * BITS_PER_LIMB);
    }
    let mut state = [0u64; 25];
    for (word_index, word) in state.iter_mut().enumerate() {
        let shifted = &bits >> (word_index as u32 * 64);
        *word = (&shifted & BigInt::from(u64::MAX)).to_u64().unwrap_or(0);
    }
    state
}

/// Splits the 1600-bit Keccak state back into 8 little-endian 200-bit limbs.
fn unpack_state(state: &[u64; 25]) -> [Felt; 8] {
    let mut bits = BigInt::from(0);
    for (word_index, word) in state.iter().enumerate() {
        bits += BigInt::from(*word) << (word_index as u32 * 64);
    }
    let limb_mask = (BigInt::from(1) << BITS_PER_LIMB) - 1;
    let mut limbs = [Felt::ZERO; 8];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let shifted = &bits >> (i as u32 * BITS_PER_LIMB);
        let value = &shifted & &limb_mask;
        let (_, bytes) = value.to_bytes_be();
        *limb = Felt::from_bytes_be_slice(&bytes);
    }
    limbs
}
