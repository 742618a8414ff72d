//! The output builtin: a plain write-through segment whose cells contribute
//! to public memory (spec §4.8).

use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::runner_errors::RunnerError;
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::segments::MemorySegmentManager;

use super::{default_final_stack, BuiltinName, BuiltinRunnerImpl};

/// The output builtin: every cell written to its segment is later surfaced
/// as public memory. It never deduces anything.
#[derive(Debug, Default)]
pub struct OutputBuiltinRunner {
    base: Option<Relocatable>,
    stop_ptr: Option<Relocatable>,
}

impl OutputBuiltinRunner {
    /// Creates a new, not-yet-initialized output builtin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuiltinRunnerImpl for OutputBuiltinRunner {
    fn name(&self) -> BuiltinName {
        BuiltinName::Output
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
