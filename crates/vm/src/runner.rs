//! [`CairoRunner`]: loads a [`Program`] into a fresh [`VirtualMachine`],
//! builds the initial stack for whichever run mode was requested, drives the
//! run to completion and relocates the result (spec §6 "Run modes", §4.9).
//!
//! Grounded on the reference `CairoRunner` (`xJonathanLEI/oriac`'s
//! `cairo_runner.rs`), generalized from its single non-proof-mode path to
//! all three run modes spec §6 names, and with builtin-segment
//! initialization and validation-rule registration actually implemented
//! rather than left as `TODO`s.

use std::collections::HashSet;

use crate::builtins::{BuiltinName, BuiltinRunner, BuiltinRunnerImpl};
use crate::errors::runner_errors::RunnerError;
use crate::errors::vm_errors::VirtualMachineError;
use crate::hint_processor::{CompiledHints, HintDispatchMode, HintProcessor};
use crate::program::Program;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::relocation::{relocate, RelocationError, RelocationOutput};
use crate::resource_tracker::ResourceTracker;
use crate::run_context::RunContext;
use crate::scopes::ExecutionScopes;
use crate::segments::Arg;
use crate::vm::VirtualMachine;

/// The set of builtins a run environment permits, named after the layout
/// names a CLI exposes (spec §6, "CLI surface").
///
/// `dynamic` is unrestricted: it accepts whatever builtins the program
/// declares (in canonical order) rather than checking them against a fixed
/// list, the way `cairo-lang`'s own dynamic layout lets the prover size the
/// AIR to the program instead of the other way around.
#[derive(Debug, Clone)]
pub struct CairoLayout {
    /// The layout's name, as it appears on the CLI.
    pub name: &'static str,
    /// The builtins this layout makes available, in canonical order.
    pub builtins: Vec<BuiltinName>,
    /// `true` if this layout accepts any builtin the program declares
    /// instead of checking `builtins` membership.
    pub unrestricted: bool,
}

impl CairoLayout {
    /// No builtins at all.
    pub fn plain() -> Self {
        Self { name: "plain", builtins: Vec::new(), unrestricted: false }
    }

    /// `output`, `pedersen`, `range_check`, `ecdsa`.
    pub fn small() -> Self {
        Self {
            name: "small",
            builtins: vec![
                BuiltinName::Output,
                BuiltinName::Pedersen,
                BuiltinName::RangeCheck,
                BuiltinName::Ecdsa,
            ],
            unrestricted: false,
        }
    }

    /// Accepts any builtin the program declares.
    pub fn dynamic() -> Self {
        Self { name: "dynamic", builtins: BuiltinName::CANONICAL_ORDER.to_vec(), unrestricted: true }
    }

    /// Every builtin in the closed set (spec §6).
    pub fn all_cairo() -> Self {
        Self { name: "all_cairo", builtins: BuiltinName::CANONICAL_ORDER.to_vec(), unrestricted: false }
    }

    /// Resolves a layout by its CLI name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "plain" => Some(Self::plain()),
            "small" => Some(Self::small()),
            "dynamic" => Some(Self::dynamic()),
            "all_cairo" => Some(Self::all_cairo()),
            _ => None,
        }
    }
}

/// Orchestrates one Cairo run end to end.
#[derive(Debug)]
pub struct CairoRunner {
    /// The program being run.
    pub program: Program,
    layout: CairoLayout,
    proof_mode: bool,
    /// The machine this runner drives.
    pub vm: VirtualMachine,
    program_base: Option<Relocatable>,
    execution_base: Option<Relocatable>,
    final_pc: Option<Relocatable>,
    run_ended: bool,
    relocated: bool,
}

impl CairoRunner {
    /// Builds a runner for `program` against `layout`. Fails if the
    /// program's builtins are out of canonical order, or (unless
    /// `allow_missing_builtins`) declare a builtin the layout doesn't
    /// provide.
    pub fn new(
        program: Program,
        layout: CairoLayout,
        proof_mode: bool,
        allow_missing_builtins: bool,
        trace_enabled: bool,
        hint_dispatch_mode: HintDispatchMode,
    ) -> Result<Self, RunnerError> {
        validate_builtins(&program, &layout, allow_missing_builtins)?;

        let builtin_runners = program.builtins.iter().map(|name| new_builtin_runner(*name)).collect();

        let placeholder = Relocatable::new(0, 0);
        let run_context = RunContext::new(placeholder, placeholder, placeholder);
        let mut vm = VirtualMachine::new(run_context, trace_enabled, hint_dispatch_mode);
        vm.builtin_runners = builtin_runners;

        Ok(Self {
            program,
            layout,
            proof_mode,
            vm,
            program_base: None,
            execution_base: None,
            final_pc: None,
            run_ended: false,
            relocated: false,
        })
    }

    /// This run's layout name.
    pub fn layout_name(&self) -> &'static str {
        self.layout.name
    }

    /// Allocates the program segment, the execution segment and every
    /// builtin's segment, in that order.
    pub fn initialize_segments(&mut self) {
        self.program_base = Some(self.vm.segments.add_segment());
        self.execution_base = Some(self.vm.segments.add_segment());
        let VirtualMachine { builtin_runners, segments, .. } = &mut self.vm;
        for runner in builtin_runners.iter_mut() {
            runner.init_segments(segments);
            runner.add_validation_rule(&mut segments.memory);
        }
    }

    /// *Execution mode* (spec §6): loads the program, pushes `args` followed
    /// by a return-FP and an end sentinel, and starts execution at `main`.
    pub fn initialize_main_entrypoint(&mut self, args: &[Arg]) -> Result<(), RunnerError> {
        let entrypoint = self.program.main_offset()?;
        self.load_program_data()?;

        let return_fp = self.vm.segments.add_segment();
        let end = self.vm.segments.add_segment();

        let mut stack: Vec<MaybeRelocatable> = Vec::with_capacity(args.len() + 2);
        for arg in args {
            stack.push(self.vm.segments.gen_arg(arg).map_err(|e| {
                RunnerError::MemoryInitializationError(e.to_string())
            })?);
        }
        stack.push(return_fp.into());
        stack.push(end.into());

        let execution_base = self.execution_base()?;
        let program_base = self.program_base()?;
        self.vm.segments.load_data(execution_base, &stack).map_err(|e| {
            RunnerError::MemoryInitializationError(e.to_string())
        })?;

        let entry_ap = execution_base.add_usize(stack.len()).map_err(|_| {
            RunnerError::MemoryInitializationError("stack too large for execution segment".into())
        })?;
        self.vm.run_context.pc = program_base.add_usize(entrypoint).map_err(|_| {
            RunnerError::MemoryInitializationError("entrypoint offset out of range".into())
        })?;
        self.vm.run_context.ap = entry_ap;
        self.vm.run_context.fp = entry_ap;
        self.final_pc = Some(end);
        Ok(())
    }

    /// *Proof mode, canonical* (spec §6): the stack prefix is
    /// `[execution_base + 2, 0, ...builtin_initial_stacks]`; the first
    /// `len(stack_prefix)` execution cells are public memory; `FP = AP =
    /// execution_base + 2`; the run stops at `program_base + end`.
    pub fn initialize_proof_mode(&mut self) -> Result<(), RunnerError> {
        self.load_program_data()?;
        let program_base = self.program_base()?;
        let execution_base = self.execution_base()?;

        let stack_prefix = self.canonical_stack_prefix(execution_base);
        self.vm.segments.load_data(execution_base, &stack_prefix).map_err(|e| {
            RunnerError::MemoryInitializationError(e.to_string())
        })?;
        self.vm
            .segments
            .finalize(
                execution_base.segment_index as usize,
                None,
                Some((0..stack_prefix.len()).map(|offset| (offset, 0)).collect()),
            )
            .map_err(|e| RunnerError::MemoryInitializationError(e.to_string()))?;

        let entry_ap = execution_base.add_usize(2).map_err(|_| {
            RunnerError::MemoryInitializationError("execution segment too small".into())
        })?;
        self.vm.run_context.ap = entry_ap;
        self.vm.run_context.fp = entry_ap;
        self.vm.run_context.pc = program_base
            .add_usize(self.program.start_offset()?)
            .map_err(|_| RunnerError::MemoryInitializationError("start offset out of range".into()))?;
        self.final_pc = Some(
            program_base
                .add_usize(self.program.end_offset()?)
                .map_err(|_| RunnerError::MemoryInitializationError("end offset out of range".into()))?,
        );
        Ok(())
    }

    /// *Proof mode, cairo1* (spec §6): as the canonical proof-mode stack,
    /// but with a `return_fp`/`end` pair appended so the run can also be
    /// entered as a callable function rather than only as a whole-program
    /// run; the run stops at the freshly pushed `end` sentinel rather than
    /// `program_base + end`.
    pub fn initialize_proof_mode_cairo1(&mut self) -> Result<(), RunnerError> {
        self.load_program_data()?;
        let program_base = self.program_base()?;
        let execution_base = self.execution_base()?;

        let mut stack = self.canonical_stack_prefix(execution_base);
        let target_offset = stack.len() + 2;
        let return_fp = self.vm.segments.add_segment();
        let end = self.vm.segments.add_segment();
        stack.push(return_fp.into());
        stack.push(end.into());

        self.vm.segments.load_data(execution_base, &stack).map_err(|e| {
            RunnerError::MemoryInitializationError(e.to_string())
        })?;
        self.vm
            .segments
            .finalize(
                execution_base.segment_index as usize,
                None,
                Some((0..target_offset.min(stack.len())).map(|offset| (offset, 0)).collect()),
            )
            .map_err(|e| RunnerError::MemoryInitializationError(e.to_string()))?;

        let entry_ap = execution_base.add_usize(2).map_err(|_| {
            RunnerError::MemoryInitializationError("execution segment too small".into())
        })?;
        self.vm.run_context.ap = entry_ap;
        self.vm.run_context.fp = entry_ap;
        self.vm.run_context.pc = program_base
            .add_usize(self.program.start_offset()?)
            .map_err(|_| RunnerError::MemoryInitializationError("start offset out of range".into()))?;
        self.final_pc = Some(end);
        Ok(())
    }

    fn canonical_stack_prefix(&self, execution_base: Relocatable) -> Vec<MaybeRelocatable> {
        let mut stack = Vec::new();
        stack.push(
            execution_base
                .add_usize(2)
                .unwrap_or(execution_base)
                .into(),
        );
        stack.push(crate::felt::Felt::ZERO.into());
        for runner in &self.vm.builtin_runners {
            stack.extend(runner.initial_stack());
        }
        stack
    }

    fn load_program_data(&mut self) -> Result<(), RunnerError> {
        let base = self.program_base()?;
        let data = self.program.data.clone();
        self.vm
            .segments
            .load_data(base, &data)
            .map(|_| ())
            .map_err(|e| RunnerError::MemoryInitializationError(e.to_string()))
    }

    /// Runs until `PC == address`, invoking `hint_processor` for every
    /// attached hint and consuming one unit of `resources` per step (spec
    /// §5).
    pub fn run_until_pc(
        &mut self,
        address: Relocatable,
        hint_processor: &mut dyn HintProcessor,
        exec_scopes: &mut ExecutionScopes,
        hints: &CompiledHints,
        resources: &mut dyn ResourceTracker,
    ) -> Result<(), VirtualMachineError> {
        while self.vm.run_context.pc != address {
            if resources.is_consumed() {
                return Err(crate::errors::resource_errors::ResourceError::RunResourcesExhausted.into());
            }
            self.vm.step(hint_processor, exec_scopes, hints, &self.program.constants)?;
            resources.consume_step();
        }
        Ok(())
    }

    /// Runs to completion, verifies every builtin's auto-deductions, and
    /// consumes each builtin's final stack pointer. Fails if called twice.
    pub fn end_run(
        &mut self,
        hint_processor: &mut dyn HintProcessor,
        exec_scopes: &mut ExecutionScopes,
        hints: &CompiledHints,
        resources: &mut dyn ResourceTracker,
    ) -> Result<(), VirtualMachineError> {
        if self.run_ended {
            return Err(RunnerError::EndRunAlreadyCalled.into());
        }
        let end = self.final_pc.ok_or(RunnerError::NoProgramEnd)?;
        self.run_until_pc(end, hint_processor, exec_scopes, hints, resources)?;
        self.vm.segments.compute_effective_sizes(false);
        self.vm.verify_auto_deductions()?;
        self.finalize_builtins()?;
        self.run_ended = true;
        Ok(())
    }

    fn finalize_builtins(&mut self) -> Result<(), VirtualMachineError> {
        let mut pointer = self.vm.run_context.ap;
        let VirtualMachine { builtin_runners, segments, .. } = &mut self.vm;
        for runner in builtin_runners.iter_mut().rev() {
            pointer = runner.final_stack(segments, pointer)?;
        }
        Ok(())
    }

    /// Flattens memory (and, if tracing was enabled, the trace) onto one
    /// address space (spec §4.9). May only be called once per run: a second
    /// call fails with `TraceError::AlreadyRelocated` rather than silently
    /// recomputing (the underlying pass is itself idempotent, but repeat
    /// calls almost always indicate a caller bug).
    pub fn relocate(&mut self, allow_tmp_segments: bool) -> Result<RelocationOutput, RelocationError> {
        if self.relocated {
            return Err(crate::errors::trace_errors::TraceError::AlreadyRelocated.into());
        }
        let trace_enabled = !self.vm.trace.is_empty();
        let output = relocate(&mut self.vm.segments, &self.vm.trace, trace_enabled, allow_tmp_segments)?;
        self.relocated = true;
        Ok(output)
    }

    /// Checks that the completed run is safe to relocate and hand to other
    /// Cairo programs: builtin-segment and program-segment accesses stayed
    /// in bounds, and no temporary address escaped unrelocated. Grounded on
    /// `justinFrevert/cairo-rs`'s `verify_secure_runner`.
    pub fn verify_secure_runner(&self, verify_builtins: bool) -> Result<(), VirtualMachineError> {
        let builtin_segment_info: Vec<(usize, usize)> = if verify_builtins {
            self.vm
                .builtin_runners
                .iter()
                .filter_map(|runner| {
                    let (base, stop) = runner.get_memory_segment_addresses();
                    stop.map(|stop| (base.segment_index as usize, stop.offset as usize))
                })
                .collect()
        } else {
            Vec::new()
        };

        for (index, stop_offset) in builtin_segment_info {
            let current_size = self.vm.segments.memory.data().get(index).map(Vec::len);
            if current_size >= Some(stop_offset + 1) {
                return Err(VirtualMachineError::OutOfBoundsBuiltinSegmentAccess);
            }
        }

        let program_segment_index = self.program_base()?.segment_index as usize;
        let program_segment_size = self.vm.segments.memory.data().get(program_segment_index).map(Vec::len);
        if program_segment_size >= Some(self.program.data.len() + 1) {
            return Err(VirtualMachineError::OutOfBoundsProgramSegmentAccess);
        }

        if !self.vm.segments.memory.temp_data().is_empty() {
            for segment in self.vm.segments.memory.data() {
                for cell in segment.iter().flatten() {
                    if let MaybeRelocatable::RelocatableValue(addr) = cell.value() {
                        if addr.segment_index < 0 {
                            return Err(RunnerError::InvalidMemoryValueTemporaryAddress(*addr).into());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// The segment indices every builtin runner owns, for callers (e.g.
    /// [`crate::segments::MemorySegmentManager::get_memory_holes`]) that
    /// need to exclude them.
    pub fn builtin_segments(&self) -> HashSet<usize> {
        self.vm
            .builtin_runners
            .iter()
            .filter_map(|runner| runner.base())
            .map(|base| base.segment_index as usize)
            .collect()
    }

    /// The program segment's base address.
    pub fn program_base(&self) -> Result<Relocatable, RunnerError> {
        self.program_base.ok_or(RunnerError::NoProgBase)
    }

    /// The execution segment's base address.
    pub fn execution_base(&self) -> Result<Relocatable, RunnerError> {
        self.execution_base.ok_or(RunnerError::NoExecBase)
    }

    /// Whether this runner is driving a proof-mode run.
    pub fn is_proof_mode(&self) -> bool {
        self.proof_mode
    }
}

fn validate_builtins(program: &Program, layout: &CairoLayout, allow_missing_builtins: bool) -> Result<(), RunnerError> {
    let mut last_index = None;
    for builtin in &program.builtins {
        let index = BuiltinName::CANONICAL_ORDER
            .iter()
            .position(|c| c == builtin)
            .expect("BuiltinName is always one of CANONICAL_ORDER");
        if let Some(last) = last_index {
            if index <= last {
                return Err(RunnerError::DisorderedBuiltins);
            }
        }
        last_index = Some(index);
    }
    if !layout.unrestricted && !allow_missing_builtins {
        for builtin in &program.builtins {
            if !layout.builtins.contains(builtin) {
                return Err(RunnerError::MemoryInitializationError(format!(
                    "builtin {builtin} is not available in layout {}",
                    layout.name
                )));
            }
        }
    }
    Ok(())
}

fn new_builtin_runner(name: BuiltinName) -> BuiltinRunner {
    match name {
        BuiltinName::Output => BuiltinRunner::Output(crate::builtins::output::OutputBuiltinRunner::new()),
        BuiltinName::Pedersen => BuiltinRunner::Pedersen(crate::builtins::pedersen::PedersenBuiltinRunner::new()),
        BuiltinName::RangeCheck => {
            BuiltinRunner::RangeCheck(crate::builtins::range_check::RangeCheckBuiltinRunner::new())
        }
        BuiltinName::Ecdsa => BuiltinRunner::Ecdsa(crate::builtins::ecdsa::EcdsaBuiltinRunner::new()),
        BuiltinName::Bitwise => BuiltinRunner::Bitwise(crate::builtins::bitwise::BitwiseBuiltinRunner::new()),
        BuiltinName::EcOp => BuiltinRunner::EcOp(crate::builtins::ec_op::EcOpBuiltinRunner::new()),
        BuiltinName::Keccak => BuiltinRunner::Keccak(crate::builtins::keccak::KeccakBuiltinRunner::new()),
        BuiltinName::Poseidon => BuiltinRunner::Poseidon(crate::builtins::poseidon::PoseidonBuiltinRunner::new()),
        BuiltinName::SegmentArena => {
            BuiltinRunner::SegmentArena(crate::builtins::segment_arena::SegmentArenaBuiltinRunner::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint_processor::NoHints;
    use crate::resource_tracker::RunResources;

    fn program_with_data(data: Vec<u64>, main: usize) -> Program {
        let json = serde_json::json!({
            "data": data.iter().map(|w| format!("0x{w:x}")).collect::<Vec<_>>(),
            "main": main,
            "reference_manager": { "references": [] },
        });
        Program::from_json(json.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn disordered_builtins_are_rejected() {
        let mut program = program_with_data(vec![], 0);
        program.builtins = vec![BuiltinName::RangeCheck, BuiltinName::Output];
        let err = CairoRunner::new(
            program,
            CairoLayout::small(),
            false,
            false,
            false,
            HintDispatchMode::Extensive,
        )
        .unwrap_err();
        assert_eq!(err, RunnerError::DisorderedBuiltins);
    }

    #[test]
    fn missing_builtin_rejected_unless_allowed() {
        let mut program = program_with_data(vec![], 0);
        program.builtins = vec![BuiltinName::Keccak];
        let err = CairoRunner::new(
            program.clone(),
            CairoLayout::plain(),
            false,
            false,
            false,
            HintDispatchMode::Extensive,
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::MemoryInitializationError(_)));

        assert!(CairoRunner::new(
            program,
            CairoLayout::plain(),
            false,
            true,
            false,
            HintDispatchMode::Extensive,
        )
        .is_ok());
    }

    /// Scenario S1 (spec §8): `[ap] = 5; [ap+1] = [ap] + [ap]; ret`, run from
    /// `main = 0` with an empty argument list.
    #[test]
    fn runs_simple_arithmetic_program_to_completion() {
        let program = program_with_data(
            vec![5201798304953696256, 5, 5191102230505357312, 2345108766317314046],
            0,
        );
        let mut runner = CairoRunner::new(
            program,
            CairoLayout::plain(),
            false,
            false,
            true,
            HintDispatchMode::Extensive,
        )
        .unwrap();
        runner.initialize_segments();
        runner.initialize_main_entrypoint(&[]).unwrap();

        let mut hints = NoHints;
        let mut scopes = ExecutionScopes::new();
        let compiled = CompiledHints::new();
        let mut resources = RunResources::unbounded();
        runner
            .end_run(&mut hints, &mut scopes, &compiled, &mut resources)
            .unwrap();

        assert_eq!(runner.vm.trace.len(), 3);
        // args is empty, so the stack is just [return_fp, end]; ap/fp start
        // at execution_base + 2, where the program's first instruction
        // writes its destination.
        let execution_base = runner.execution_base().unwrap();
        assert_eq!(
            runner.vm.segments.memory.get_felt(execution_base.add_usize(2).unwrap()).unwrap(),
            crate::felt::Felt::from(5u8)
        );
        assert_eq!(
            runner.vm.segments.memory.get_felt(execution_base.add_usize(3).unwrap()).unwrap(),
            crate::felt::Felt::from(10u8)
        );

        // Relocation succeeds and produces a single flat address space.
        let output = runner.relocate(false).unwrap();
        assert!(!output.memory.cells.is_empty());
    }
}
