//! Execution trace entries, before and after relocation (spec §4.7 step 5,
//! §4.9 step 4).

use crate::felt::Felt;
use crate::relocatable::Relocatable;

/// One step's register snapshot, recorded in segment/offset form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// The Program Counter at the start of the step.
    pub pc: Relocatable,
    /// The Allocation Pointer at the start of the step.
    pub ap: Relocatable,
    /// The Frame Pointer at the start of the step.
    pub fp: Relocatable,
}

/// A [`TraceEntry`] after flat relocation, ready to be written to a trace
/// file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocatedTraceEntry {
    /// The relocated Program Counter.
    pub pc: Felt,
    /// The relocated Allocation Pointer.
    pub ap: Felt,
    /// The relocated Frame Pointer.
    pub fp: Felt,
}

/// Relocates every entry in `trace` using a segment base table (spec §4.9).
pub fn relocate_trace(
    trace: &[TraceEntry],
    bases: &[u64],
) -> Result<Vec<RelocatedTraceEntry>, crate::errors::trace_errors::TraceError> {
    trace
        .iter()
        .map(|entry| {
            let pc = entry
                .pc
                .to_flat(bases)
                .ok_or(crate::errors::trace_errors::TraceError::NoRelocationFound)?;
            let ap = entry
                .ap
                .to_flat(bases)
                .ok_or(crate::errors::trace_errors::TraceError::NoRelocationFound)?;
            let fp = entry
                .fp
                .to_flat(bases)
                .ok_or(crate::errors::trace_errors::TraceError::NoRelocationFound)?;
            Ok(RelocatedTraceEntry { pc, ap, fp })
        })
        .collect()
}
