//! Defines [`Memory`], the write-once, segmented memory of the virtual
//! machine (spec §3, §4.1).
//!
//! # Write-once semantics
//!
//! Regular computer memory can be overwritten freely; Cairo memory cannot.
//! Every write instead *asserts* a cell to a value: the first assertion wins,
//! and any later assertion must agree with it or the run is unsound.
//!
//! # Segments
//!
//! The field the VM computes over is far larger than addressable host memory,
//! so a Cairo program's memory is split into *segments*, each a densely
//! indexed, growable array of optional cells. Real segments have a
//! nonnegative index; *temporary* segments (negative index) exist only until
//! a [relocation rule](Memory::add_relocation_rule) maps them onto a real one.

pub mod cell;

use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::memory_errors::MemoryError;
use crate::relocatable::{MaybeRelocatable, Relocatable};

pub use self::cell::MemoryCell;

/// A predicate invoked on the first write to a cell in a given segment.
///
/// On success it returns the list of addresses that should be marked
/// validated (usually just the address that was written, but some builtins
/// validate a pair of cells at once — see spec §4.8, ECDSA).
pub type ValidationRule =
    Rc<dyn Fn(&Memory, Relocatable) -> Result<Vec<Relocatable>, MemoryError>>;

/// The write-once, segmented memory of a Cairo run.
#[derive(Clone, Default)]
pub struct Memory {
    /// Real segments, indexed by `segment_index`.
    data: Vec<Vec<Option<MemoryCell>>>,
    /// Temporary segments, indexed by `-segment_index - 1`.
    temp_data: Vec<Vec<Option<MemoryCell>>>,
    /// Addresses that a validation rule has approved.
    validated_addresses: std::collections::HashSet<Relocatable>,
    /// One validation rule per real segment index, if any is registered.
    validation_rules: HashMap<usize, ValidationRule>,
    /// Temporary segment index -> real destination, built by
    /// [`Memory::add_relocation_rule`].
    relocation_rules: HashMap<isize, Relocatable>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("num_segments", &self.data.len())
            .field("num_temp_segments", &self.temp_data.len())
            .finish_non_exhaustive()
    }
}

impl Memory {
    /// Creates an empty memory with no segments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new real segment and returns its index.
    pub fn add_segment(&mut self) -> usize {
        self.data.push(Vec::new());
        self.data.len() - 1
    }

    /// Allocates a new temporary segment and returns its (negative) index.
    pub fn add_temp_segment(&mut self) -> isize {
        self.temp_data.push(Vec::new());
        -(self.temp_data.len() as isize)
    }

    /// Returns the number of allocated real segments.
    pub fn num_segments(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of allocated temporary segments.
    pub fn num_temp_segments(&self) -> usize {
        self.temp_data.len()
    }

    fn segment_store(&self, segment_index: isize) -> Result<&Vec<Option<MemoryCell>>, MemoryError> {
        if segment_index >= 0 {
            self.data
                .get(segment_index as usize)
                .ok_or(MemoryError::UnallocatedSegment(segment_index))
        } else {
            let idx = (-segment_index - 1) as usize;
            self.temp_data
                .get(idx)
                .ok_or(MemoryError::UnallocatedSegment(segment_index))
        }
    }

    fn segment_store_mut(
        &mut self,
        segment_index: isize,
    ) -> Result<&mut Vec<Option<MemoryCell>>, MemoryError> {
        if segment_index >= 0 {
            self.data
                .get_mut(segment_index as usize)
                .ok_or(MemoryError::UnallocatedSegment(segment_index))
        } else {
            let idx = (-segment_index - 1) as usize;
            self.temp_data
                .get_mut(idx)
                .ok_or(MemoryError::UnallocatedSegment(segment_index))
        }
    }

    /// Direct access to the real segments, for relocation and diagnostics.
    pub fn data(&self) -> &[Vec<Option<MemoryCell>>] {
        &self.data
    }

    /// Direct access to the temporary segments.
    pub fn temp_data(&self) -> &[Vec<Option<MemoryCell>>] {
        &self.temp_data
    }

    /// Attempts to assert `addr` to `value`.
    ///
    /// Succeeds if the cell was empty (storing `value`) or already held
    /// `value`; fails with [`MemoryError::InconsistentMemory`] otherwise.
    pub fn set(&mut self, addr: Relocatable, value: MaybeRelocatable) -> Result<(), MemoryError> {
        let offset = addr.offset as usize;
        let store = self.segment_store_mut(addr.segment_index)?;
        if store.len() <= offset {
            store.resize(offset + 1, None);
        }

        if let Some(cell) = &store[offset] {
            return if *cell.value() == value {
                Ok(())
            } else {
                Err(MemoryError::InconsistentMemory {
                    addr,
                    existing: *cell.value(),
                    attempted: value,
                })
            };
        }

        store[offset] = Some(MemoryCell::new(value));
        self.run_validation_rule(addr)?;
        Ok(())
    }

    fn run_validation_rule(&mut self, addr: Relocatable) -> Result<(), MemoryError> {
        if addr.segment_index < 0 {
            return Ok(());
        }
        let Some(rule) = self.validation_rules.get(&(addr.segment_index as usize)).cloned() else {
            return Ok(());
        };
        let validated = rule(self, addr)?;
        self.validated_addresses.extend(validated);
        Ok(())
    }

    /// Reads the value stored at `addr`, if any.
    pub fn get(&self, addr: Relocatable) -> Option<MaybeRelocatable> {
        let store = self.segment_store(addr.segment_index).ok()?;
        store.get(addr.offset as usize)?.as_ref().map(|c| *c.value())
    }

    /// Reads a field element at `addr`, failing if the cell is empty or
    /// holds a relocatable value.
    pub fn get_felt(&self, addr: Relocatable) -> Result<crate::felt::Felt, MemoryError> {
        match self.get(addr) {
            Some(MaybeRelocatable::Int(f)) => Ok(f),
            Some(MaybeRelocatable::RelocatableValue(_)) => Err(MemoryError::ExpectedInteger(addr)),
            None => Err(MemoryError::UnknownMemoryCell(addr)),
        }
    }

    /// Reads a relocatable value at `addr`, failing if the cell is empty or
    /// holds a field element.
    pub fn get_relocatable(&self, addr: Relocatable) -> Result<Relocatable, MemoryError> {
        match self.get(addr) {
            Some(MaybeRelocatable::RelocatableValue(r)) => Ok(r),
            Some(MaybeRelocatable::Int(_)) => Err(MemoryError::ExpectedRelocatable(addr)),
            None => Err(MemoryError::UnknownMemoryCell(addr)),
        }
    }

    /// Reads `len` consecutive values starting at `addr`. Fails if any cell
    /// in the range is empty.
    pub fn get_range(&self, addr: Relocatable, len: usize) -> Result<Vec<MaybeRelocatable>, MemoryError> {
        (0..len)
            .map(|i| {
                let cell_addr = addr.add_usize(i).map_err(|_| MemoryError::UnknownMemoryCell(addr))?;
                self.get(cell_addr)
                    .ok_or(MemoryError::UnknownMemoryCell(cell_addr))
            })
            .collect()
    }

    /// Like [`Memory::get_range`], but additionally requires every value to
    /// be a field element.
    pub fn get_felt_range(&self, addr: Relocatable, len: usize) -> Result<Vec<crate::felt::Felt>, MemoryError> {
        (0..len)
            .map(|i| {
                let cell_addr = addr.add_usize(i).map_err(|_| MemoryError::UnknownMemoryCell(addr))?;
                self.get_felt(cell_addr)
            })
            .collect()
    }

    /// Marks the cell at `addr` as accessed. No-op if the cell is unset.
    pub fn mark_accessed(&mut self, addr: Relocatable) {
        if let Ok(store) = self.segment_store_mut(addr.segment_index) {
            if let Some(Some(cell)) = store.get_mut(addr.offset as usize) {
                cell.mark_accessed();
            }
        }
    }

    /// Returns `true` if `addr` has been accepted by a validation rule.
    pub fn is_validated(&self, addr: &Relocatable) -> bool {
        self.validated_addresses.contains(addr)
    }

    /// Registers a validation rule for all cells written to `segment_index`.
    pub fn add_validation_rule(&mut self, segment_index: usize, rule: ValidationRule) {
        self.validation_rules.insert(segment_index, rule);
    }

    /// Runs every registered validation rule against every cell already set
    /// in its segment (used once at the start of a run, before any new
    /// writes, to validate values loaded directly into memory).
    pub fn validate_existing_memory(&mut self) -> Result<(), MemoryError> {
        let segments: Vec<usize> = self.validation_rules.keys().copied().collect();
        for segment_index in segments {
            let rule = self.validation_rules.get(&segment_index).cloned().unwrap();
            let len = self
                .data
                .get(segment_index)
                .map(|s| s.len())
                .unwrap_or(0);
            for offset in 0..len {
                let addr = Relocatable::new(segment_index as isize, offset as u64);
                if self.get(addr).is_some() {
                    let validated = rule(self, addr)?;
                    self.validated_addresses.extend(validated);
                }
            }
        }
        Ok(())
    }

    /// Registers a relocation rule mapping the temporary segment `src`
    /// belongs to onto the real address `dst`.
    ///
    /// `src` must be the base of a temporary segment (offset zero, negative
    /// segment index); registering a rule twice for the same segment fails.
    pub fn add_relocation_rule(&mut self, src: Relocatable, dst: Relocatable) -> Result<(), MemoryError> {
        if src.segment_index >= 0 {
            return Err(MemoryError::AddressNotInTemporarySegment(src));
        }
        if src.offset != 0 {
            return Err(MemoryError::NonZeroOffset(src));
        }
        if self.relocation_rules.contains_key(&src.segment_index) {
            return Err(MemoryError::DuplicatedRelocation(src.segment_index));
        }
        self.relocation_rules.insert(src.segment_index, dst);
        Ok(())
    }

    /// The relocation rule table built so far.
    pub fn relocation_rules(&self) -> &HashMap<isize, Relocatable> {
        &self.relocation_rules
    }

    /// Relocates a value (following [`Memory::add_relocation_rule`]s).
    pub fn relocate_value(&self, value: &MaybeRelocatable) -> MaybeRelocatable {
        value.relocate_with_rules(&self.relocation_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::felt::Felt;

    fn seg(m: &mut Memory) -> isize {
        m.add_segment() as isize
    }

    #[test]
    fn write_once_same_value_is_idempotent() {
        let mut memory = Memory::new();
        let s = seg(&mut memory);
        let addr = Relocatable::new(s, 0);
        memory.set(addr, Felt::from(1u8).into()).unwrap();
        memory.set(addr, Felt::from(1u8).into()).unwrap();
        assert_eq!(memory.get(addr), Some(Felt::from(1u8).into()));
    }

    #[test]
    fn write_once_conflicting_value_fails() {
        let mut memory = Memory::new();
        let s = seg(&mut memory);
        let addr = Relocatable::new(s, 0);
        memory.set(addr, Felt::from(1u8).into()).unwrap();
        let err = memory.set(addr, Felt::from(2u8).into()).unwrap_err();
        assert_eq!(
            err,
            MemoryError::InconsistentMemory {
                addr,
                existing: Felt::from(1u8).into(),
                attempted: Felt::from(2u8).into(),
            }
        );
    }

    #[test]
    fn get_felt_on_relocatable_cell_fails() {
        let mut memory = Memory::new();
        let s = seg(&mut memory);
        let addr = Relocatable::new(s, 0);
        memory
            .set(addr, Relocatable::new(s, 1).into())
            .unwrap();
        assert_eq!(memory.get_felt(addr), Err(MemoryError::ExpectedInteger(addr)));
    }

    #[test]
    fn relocation_rule_requires_temp_segment_base() {
        let mut memory = Memory::new();
        let real = Relocatable::new(0, 0);
        let err = memory
            .add_relocation_rule(real, Relocatable::new(1, 0))
            .unwrap_err();
        assert_eq!(err, MemoryError::AddressNotInTemporarySegment(real));
    }

    #[test]
    fn duplicated_relocation_rule_fails() {
        let mut memory = Memory::new();
        let temp = Relocatable::new(-1, 0);
        memory.add_relocation_rule(temp, Relocatable::new(1, 0)).unwrap();
        let err = memory
            .add_relocation_rule(temp, Relocatable::new(2, 0))
            .unwrap_err();
        assert_eq!(err, MemoryError::DuplicatedRelocation(-1));
    }
}
