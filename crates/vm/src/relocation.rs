//! Ties segment base-table construction, memory flattening and trace
//! flattening into the single relocation pass a finished run performs (spec
//! §4.9).
//!
//! Relocation happens exactly once: temporary-segment references are
//! resolved via [`crate::memory::Memory::add_relocation_rule`]s first, then
//! every real-segment value and every trace entry is mapped onto a flat
//! address space via the base table in [`crate::segments::MemorySegmentManager::relocate_segments`].

use crate::errors::memory_errors::MemoryError;
use crate::errors::runner_errors::RunnerError;
use crate::errors::trace_errors::TraceError;
use crate::felt::Felt;
use crate::relocatable::MaybeRelocatable;
use crate::segments::MemorySegmentManager;
use crate::trace::{relocate_trace, RelocatedTraceEntry, TraceEntry};

/// A completed run's memory flattened to one array indexed by relocated
/// address: index 0 is always `None` (spec §4.9 step 3's "starting at 1").
#[derive(Debug, Clone, Default)]
pub struct RelocatedMemory {
    /// `cells[0]` is always `None`; `cells[addr]` is `None` for an address
    /// that was never written.
    pub cells: Vec<Option<Felt>>,
}

/// The outcome of relocating one finished run: flattened memory, flattened
/// trace (if tracing was enabled) and the finalized public memory addresses.
#[derive(Debug, Clone)]
pub struct RelocationOutput {
    /// The flattened memory.
    pub memory: RelocatedMemory,
    /// The flattened trace, or `None` if tracing was never enabled.
    pub trace: Option<Vec<RelocatedTraceEntry>>,
    /// `(flat_address, page_id)` pairs for every finalized public-memory entry.
    pub public_memory_addresses: Vec<(u64, usize)>,
}

/// Runs the full relocation pass described in spec §4.9.
///
/// `allow_tmp_segments` is forwarded to
/// [`MemorySegmentManager::compute_effective_sizes`]; trace is relocated only
/// if `trace` is non-empty (an empty trace means tracing was never enabled).
pub fn relocate(
    segments: &mut MemorySegmentManager,
    trace: &[TraceEntry],
    trace_enabled: bool,
    allow_tmp_segments: bool,
) -> Result<RelocationOutput, RelocationError> {
    segments.compute_effective_sizes(allow_tmp_segments);
    let bases = segments.relocate_segments()?;

    let memory = relocate_memory(segments, &bases)?;
    let trace = if trace_enabled {
        Some(relocate_trace(trace, &bases)?)
    } else {
        None
    };
    let public_memory_addresses = segments.get_public_memory_addresses(&bases)?;

    Ok(RelocationOutput {
        memory,
        trace,
        public_memory_addresses,
    })
}

fn relocate_memory(
    segments: &MemorySegmentManager,
    bases: &[u64],
) -> Result<RelocatedMemory, RelocationError> {
    let total_size: u64 = segments
        .memory
        .data()
        .iter()
        .enumerate()
        .map(|(index, cells)| {
            let size = segments.get_segment_size(index).unwrap_or(cells.len());
            size as u64
        })
        .sum::<u64>()
        + 1;

    let mut cells: Vec<Option<Felt>> = vec![None; total_size as usize];
    for (segment_index, segment) in segments.memory.data().iter().enumerate() {
        let base = *bases
            .get(segment_index)
            .ok_or(RelocationError::Memory(MemoryError::MalformedPublicMemory))?;
        for (offset, cell) in segment.iter().enumerate() {
            let Some(cell) = cell else { continue };
            let relocated = relocate_value(cell.value(), &segments.memory, bases)?;
            let flat_addr = base + offset as u64;
            if flat_addr as usize >= cells.len() {
                cells.resize(flat_addr as usize + 1, None);
            }
            cells[flat_addr as usize] = Some(relocated);
        }
    }
    Ok(RelocatedMemory { cells })
}

fn relocate_value(
    value: &MaybeRelocatable,
    memory: &crate::memory::Memory,
    bases: &[u64],
) -> Result<Felt, RelocationError> {
    let resolved = memory.relocate_value(value);
    match resolved {
        MaybeRelocatable::Int(f) => Ok(f),
        MaybeRelocatable::RelocatableValue(r) => {
            if r.segment_index < 0 {
                return Err(RelocationError::Runner(
                    RunnerError::InvalidMemoryValueTemporaryAddress(r),
                ));
            }
            r.to_flat(bases)
                .ok_or(RelocationError::Memory(MemoryError::MalformedPublicMemory))
        }
    }
}

/// Any error a relocation pass can surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelocationError {
    /// A memory-level error (missing sizes, malformed public memory, ...).
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// A trace-level error (already relocated, no relocation table, ...).
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// A runner-level error (an unresolved temporary address escaped relocation).
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::felt::Felt;

    #[test]
    fn relocates_a_single_segment() {
        let mut segments = MemorySegmentManager::new();
        let base = segments.add_segment();
        segments
            .memory
            .set(base, Felt::from(7u8).into())
            .unwrap();
        segments
            .memory
            .set(base.add_usize(1).unwrap(), Felt::from(9u8).into())
            .unwrap();

        let output = relocate(&mut segments, &[], false, false).unwrap();
        // index 0 is reserved; segment 0 starts at flat address 1.
        assert_eq!(output.memory.cells[0], None);
        assert_eq!(output.memory.cells[1], Some(Felt::from(7u8)));
        assert_eq!(output.memory.cells[2], Some(Felt::from(9u8)));
    }

    #[test]
    fn relocates_a_pointer_between_segments() {
        let mut segments = MemorySegmentManager::new();
        let seg0 = segments.add_segment();
        let seg1 = segments.add_segment();
        segments.memory.set(seg0, seg1.into()).unwrap();
        segments.memory.set(seg1, Felt::from(1u8).into()).unwrap();

        let output = relocate(&mut segments, &[], false, false).unwrap();
        // seg0 occupies flat address 1 (size 1), seg1 starts at flat address 2.
        assert_eq!(output.memory.cells[1], Some(Felt::from(2u8)));
    }
}
