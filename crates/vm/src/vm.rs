//! The virtual machine driver: [`VirtualMachine::step`] runs exactly one
//! fetch-decode-execute cycle (spec §4.7).

use tracing::trace;

use crate::builtins::BuiltinRunner;
use crate::errors::builtin_errors::RunnerError as BuiltinError;
use crate::errors::vm_errors::VirtualMachineError;
use crate::hint_processor::{CompiledHints, HintDispatchMode, HintProcessor};
use crate::instruction::{decode_instruction, ApUpdate, FpUpdate, Instruction, Opcode, PcUpdate};
use crate::opcode::opcode_assertions;
use crate::operands::{compute_operands, OperandAddresses, OperandFlags, Operands};
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::run_context::RunContext;
use crate::scopes::ExecutionScopes;
use crate::segments::MemorySegmentManager;
use crate::trace::TraceEntry;

/// The virtual machine: registers, segmented memory, builtin runners and the
/// execution trace, tied together by [`VirtualMachine::step`].
///
/// Builtins are kept directly on the VM (rather than on the runner that
/// configures them) because `step` needs them on every instruction, the same
/// way the teacher's evaluator keeps its `BuiltinManager` alongside its
/// registers rather than passing it down from the caller each cycle.
#[derive(Debug)]
pub struct VirtualMachine {
    /// `PC`, `AP`, `FP`.
    pub run_context: RunContext,
    /// Segmented, write-once memory, plus segment-level bookkeeping.
    pub segments: MemorySegmentManager,
    /// The builtin runners included in this run, in declaration order.
    pub builtin_runners: Vec<BuiltinRunner>,
    /// Register snapshots, one per step, recorded when tracing is enabled.
    pub trace: Vec<TraceEntry>,
    trace_enabled: bool,
    /// The number of steps executed so far.
    pub current_step: usize,
    hint_dispatch_mode: HintDispatchMode,
}

impl VirtualMachine {
    /// Creates a machine at `run_context`'s initial registers, with empty
    /// memory and no builtins.
    pub fn new(
        run_context: RunContext,
        trace_enabled: bool,
        hint_dispatch_mode: HintDispatchMode,
    ) -> Self {
        Self {
            run_context,
            segments: MemorySegmentManager::new(),
            builtin_runners: Vec::new(),
            trace: Vec::new(),
            trace_enabled,
            current_step: 0,
            hint_dispatch_mode,
        }
    }

    /// Runs the hint(s) attached to the current `PC`, then fetches, decodes
    /// and executes exactly one instruction (spec §4.7).
    pub fn step(
        &mut self,
        hint_processor: &mut dyn HintProcessor,
        exec_scopes: &mut ExecutionScopes,
        hints: &CompiledHints,
        constants: &std::collections::HashMap<String, crate::felt::Felt>,
    ) -> Result<(), VirtualMachineError> {
        let hint_key = match self.hint_dispatch_mode {
            HintDispatchMode::Extensive => self.run_context.pc,
            HintDispatchMode::NonExtensive => Relocatable::new(0, self.run_context.pc.offset),
        };
        // `CompiledHints::get` borrows `hints`, not `self`; cloning the count
        // up front avoids holding that borrow across the mutable `self` call.
        let hint_count = hints.get(hint_key).len();
        for i in 0..hint_count {
            let hint_data = &hints.get(hint_key)[i];
            hint_processor.execute_hint(self, exec_scopes, hint_data.as_ref(), constants)?;
        }

        let instruction = self.decode_current_instruction()?;

        let (operands, addresses, flags) = compute_operands(
            &instruction,
            &self.run_context,
            &self.segments.memory,
            &self.builtin_runners[..],
        )?;

        opcode_assertions(&instruction, &operands, &self.run_context)?;

        if self.trace_enabled {
            self.trace.push(TraceEntry {
                pc: self.run_context.pc,
                ap: self.run_context.ap,
                fp: self.run_context.fp,
            });
        }

        self.write_back_and_mark(&addresses, &operands, flags)?;
        self.update_registers(&instruction, &operands)?;

        self.current_step += 1;
        trace!(pc = %self.run_context.pc, step = self.current_step, "step complete");
        Ok(())
    }

    fn decode_current_instruction(&self) -> Result<Instruction, VirtualMachineError> {
        let pc = self.run_context.pc;
        let value = self
            .segments
            .memory
            .get(pc)
            .ok_or(VirtualMachineError::InstructionFetchingFailed(pc))?;
        let felt = value
            .get_int()
            .ok_or(VirtualMachineError::InstructionFetchingFailed(pc))?;
        let word = felt_to_instruction_word(&felt, pc)?;
        decode_instruction(word)
    }

    fn write_back_and_mark(
        &mut self,
        addresses: &OperandAddresses,
        operands: &Operands,
        flags: OperandFlags,
    ) -> Result<(), VirtualMachineError> {
        if flags.contains(OperandFlags::OP0_DEDUCED) {
            self.segments.memory.set(addresses.op0_addr, operands.op0)?;
        }
        if flags.contains(OperandFlags::OP1_DEDUCED) {
            self.segments.memory.set(addresses.op1_addr, operands.op1)?;
        }
        if flags.contains(OperandFlags::DST_DEDUCED) {
            self.segments.memory.set(addresses.dst_addr, operands.dst)?;
        }
        self.segments.memory.mark_accessed(addresses.dst_addr);
        self.segments.memory.mark_accessed(addresses.op0_addr);
        self.segments.memory.mark_accessed(addresses.op1_addr);
        Ok(())
    }

    fn update_registers(
        &mut self,
        instruction: &Instruction,
        operands: &Operands,
    ) -> Result<(), VirtualMachineError> {
        // AP before FP: a `Call`'s implicit `FP = AP + 2` reads the *updated*
        // AP (spec §4.6).
        self.update_ap(instruction, operands)?;
        self.update_fp(instruction, operands)?;
        self.update_pc(instruction, operands)?;
        Ok(())
    }

    fn update_ap(&mut self, instruction: &Instruction, operands: &Operands) -> Result<(), VirtualMachineError> {
        let new_ap = if instruction.opcode == Opcode::Call {
            if instruction.ap_update != ApUpdate::Regular {
                return Err(VirtualMachineError::UndefinedApUpdateInCall);
            }
            self.run_context.ap.add_usize(2)?
        } else {
            match instruction.ap_update {
                ApUpdate::Regular => self.run_context.ap,
                ApUpdate::Add => {
                    let res = operands
                        .res
                        .ok_or(VirtualMachineError::ApUpdateAddResUnconstrained)?;
                    let updated = MaybeRelocatable::RelocatableValue(self.run_context.ap).add(&res)?;
                    updated.get_relocatable().ok_or(VirtualMachineError::TypeMismatch)?
                }
                ApUpdate::Add1 => self.run_context.ap.add_usize(1)?,
                ApUpdate::Add2 => self.run_context.ap.add_usize(2)?,
            }
        };
        self.run_context.ap = new_ap;
        Ok(())
    }

    fn update_fp(&mut self, instruction: &Instruction, operands: &Operands) -> Result<(), VirtualMachineError> {
        match instruction.fp_update {
            FpUpdate::Regular => Ok(()),
            FpUpdate::ApPlus2 => {
                self.run_context.fp = self.run_context.ap;
                Ok(())
            }
            FpUpdate::Dst => {
                self.run_context.fp = match operands.dst {
                    MaybeRelocatable::RelocatableValue(r) => r,
                    MaybeRelocatable::Int(f) => self.run_context.fp.add_felt(&f)?,
                };
                Ok(())
            }
        }
    }

    fn update_pc(&mut self, instruction: &Instruction, operands: &Operands) -> Result<(), VirtualMachineError> {
        let new_pc = match instruction.pc_update {
            PcUpdate::Regular => self.run_context.pc.add_usize(instruction.size() as usize)?,
            PcUpdate::Jump => {
                let res = operands
                    .res
                    .ok_or(VirtualMachineError::ResUnconstrainedUsedWithPcUpdateJump)?;
                match res {
                    MaybeRelocatable::RelocatableValue(r) => r,
                    MaybeRelocatable::Int(_) => {
                        return Err(VirtualMachineError::PcUpdateJumpResNotRelocatable)
                    }
                }
            }
            PcUpdate::JumpRel => {
                let res = operands
                    .res
                    .ok_or(VirtualMachineError::ResUnconstrainedUsedWithPcUpdateJump)?;
                match res {
                    MaybeRelocatable::Int(f) => self.run_context.pc.add_felt(&f)?,
                    MaybeRelocatable::RelocatableValue(_) => {
                        return Err(VirtualMachineError::PcUpdateJumpRelResNotFelt)
                    }
                }
            }
            PcUpdate::Jnz => {
                if operands.dst.is_zero() {
                    self.run_context.pc.add_usize(instruction.size() as usize)?
                } else {
                    match operands.op1 {
                        MaybeRelocatable::Int(f) => self.run_context.pc.add_felt(&f)?,
                        MaybeRelocatable::RelocatableValue(_) => {
                            return Err(VirtualMachineError::PcUpdateJumpRelResNotFelt)
                        }
                    }
                }
            }
        };
        self.run_context.pc = new_pc;
        Ok(())
    }

    /// Re-runs every builtin's deduction against every cell already set in
    /// its segment, failing if any disagrees with the stored value (spec
    /// §4.8, "verify_auto_deductions").
    pub fn verify_auto_deductions(&self) -> Result<(), VirtualMachineError> {
        for runner in &self.builtin_runners {
            use crate::builtins::BuiltinRunnerImpl;
            let Some(base) = runner.base() else { continue };
            let segment = base.segment_index as usize;
            let Some(data) = self.segments.memory.data().get(segment) else {
                continue;
            };
            for (offset, cell) in data.iter().enumerate() {
                let Some(cell) = cell else { continue };
                let addr = Relocatable::new(segment as isize, offset as u64);
                if let Some(deduced) = runner.deduce_memory_cell(&self.segments.memory, addr)? {
                    if deduced != *cell.value() {
                        return Err(BuiltinError::InconsistentAutoDeduction(addr).into());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Converts a fetched [`crate::felt::Felt`] into the 63-bit instruction word
/// the decoder expects, rejecting anything that doesn't fit.
fn felt_to_instruction_word(
    felt: &crate::felt::Felt,
    pc: Relocatable,
) -> Result<u64, VirtualMachineError> {
    let bytes = felt.to_bytes_be();
    let split = bytes.len() - 8;
    if bytes[..split].iter().any(|&b| b != 0) {
        return Err(VirtualMachineError::InstructionEncodingError(pc));
    }
    let mut word_bytes = [0u8; 8];
    word_bytes.copy_from_slice(&bytes[split..]);
    let word = u64::from_be_bytes(word_bytes);
    if word & (1 << 63) != 0 {
        return Err(VirtualMachineError::InstructionEncodingError(pc));
    }
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::felt::Felt;
    use crate::hint_processor::NoHints;

    fn new_vm() -> VirtualMachine {
        let run_context = RunContext::new(
            Relocatable::new(0, 0),
            Relocatable::new(1, 0),
            Relocatable::new(1, 0),
        );
        let mut vm = VirtualMachine::new(run_context, true, HintDispatchMode::Extensive);
        vm.segments.add_segment(); // program segment
        vm.segments.add_segment(); // execution segment
        vm
    }

    fn run_step(vm: &mut VirtualMachine) -> Result<(), VirtualMachineError> {
        let mut hints = NoHints;
        let mut scopes = ExecutionScopes::new();
        let compiled = CompiledHints::new();
        let constants = std::collections::HashMap::new();
        vm.step(&mut hints, &mut scopes, &compiled, &constants)
    }

    /// Builds a flags word (bits 48..63 of an instruction) from explicit bit
    /// positions, to keep test instructions legible and unambiguous.
    fn flags_from_bits(set_bits: &[u32]) -> u64 {
        set_bits.iter().fold(0u64, |acc, &bit| acc | (1 << bit))
    }

    fn biased(v: i64) -> u64 {
        (v + (1 << 15)) as u64
    }

    #[test]
    fn assert_eq_advances_pc_by_one() {
        let mut vm = new_vm();
        // [ap+0] = [ap+0] + [ap+0]: op1_addr=AP (bit4), res_logic=Add (bit5),
        // opcode=AssertEq (bit14). Everything else (registers, pc/ap update) regular.
        let flags = flags_from_bits(&[4, 5, 14]);
        let word = biased(0) | (biased(0) << 16) | (biased(0) << 32) | (flags << 48);
        vm.segments
            .memory
            .set(Relocatable::new(0, 0), Felt::from(word).into())
            .unwrap();
        vm.segments
            .memory
            .set(Relocatable::new(1, 0), Felt::ZERO.into())
            .unwrap();

        run_step(&mut vm).unwrap();
        assert_eq!(vm.run_context.pc, Relocatable::new(0, 1));
        assert_eq!(vm.current_step, 1);
        assert_eq!(vm.trace.len(), 1);
    }

    #[test]
    fn jnz_takes_relative_jump_when_dst_nonzero() {
        let mut vm = new_vm();
        // jmp rel [ap+0] if [ap+0] != 0: op1_addr=AP (bit4), pc_update=Jnz (bit9),
        // res_logic left at (false,false) which decodes to Unconstrained under Jnz.
        let flags = flags_from_bits(&[4, 9]);
        let word = biased(0) | (biased(0) << 16) | (biased(0) << 32) | (flags << 48);
        vm.segments
            .memory
            .set(Relocatable::new(0, 0), Felt::from(word).into())
            .unwrap();
        vm.segments
            .memory
            .set(Relocatable::new(1, 0), Felt::from(3u8).into())
            .unwrap();

        run_step(&mut vm).unwrap();
        assert_eq!(vm.run_context.pc, Relocatable::new(0, 3));
    }

    #[test]
    fn instruction_with_reserved_bit_set_fails_fetch() {
        let mut vm = new_vm();
        vm.segments
            .memory
            .set(Relocatable::new(0, 0), Felt::from(u128::MAX).into())
            .unwrap();
        let err = run_step(&mut vm).unwrap_err();
        assert!(matches!(err, VirtualMachineError::InstructionEncodingError(_)));
    }
}
