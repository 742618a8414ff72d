//! The ECDSA signature builtin: 2-cell instances `(pub_key, msg)`, validated
//! against out-of-band signatures rather than deduced (spec §4.8).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::memory_errors::MemoryError;
use crate::errors::runner_errors::RunnerError;
use crate::felt::Felt;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// Cells per ECDSA instance: `pub_key, msg`.
pub const CELLS_PER_INSTANCE: u64 = 2;

/// The ECDSA builtin: deduces nothing, but validates that every `(pub_key,
/// msg)` pair written to its segment has a matching signature registered via
/// [`EcdsaBuiltinRunner::add_signature`] (usually by a hint, before the pair
/// is written).
#[derive(Debug, Default)]
pub struct EcdsaBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
    signatures: Rc<RefCell<HashMap<Relocatable, (Felt, Felt)>>>,
}

impl EcdsaBuiltinRunner {
    /// Creates a new, not-yet-initialized ECDSA builtin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a signature `(r, s)` for the `pub_key` cell at `address`
    /// (the base of a two-cell instance). Called by the hint processor
    /// before the corresponding memory cells are written.
    pub fn add_signature(&self, address: Relocatable, r: Felt, s: Felt) {
        self.signatures.borrow_mut().insert(address, (r, s));
    }
}

impl BuiltinRunnerImpl for EcdsaBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::Ecdsa
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
        let signatures = self.signatures.clone();
        memory.add_validation_rule(
            segment_index,
            Rc::new(move |memory: &Memory, addr: Relocatable| {
                let index = addr.offset % CELLS_PER_INSTANCE;
                if index != 1 {
                    return Ok(vec![addr]);
                }
                let instance_base = Relocatable::new(addr.segment_index, addr.offset - 1);
                let pub_key = memory.get_felt(instance_base)?;
                let msg = memory.get_felt(addr)?;
                let signatures = signatures.borrow();
                let (r, s) = signatures.get(&instance_base).ok_or_else(|| {
                    MemoryError::InconsistentMemory {
                        addr: instance_base,
                        existing: MaybeRelocatable::Int(pub_key),
                        attempted: MaybeRelocatable::Int(msg),
                    }
                })?;
                let valid = starknet_crypto::verify(&pub_key, &msg, r, s).unwrap_or(false);
                if !valid {
                    return Err(MemoryError::InconsistentMemory {
                        addr: instance_base,
                        existing: MaybeRelocatable::Int(pub_key),
                        attempted: MaybeRelocatable::Int(msg),
                    });
                }
                Ok(vec![instance_base, addr])
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

