//! `compute_operands`, the heart of a single VM step (spec §3 "Step",
//! §4.3 "Operand deduction").
//!
//! Given a decoded instruction and the current registers, up to three values
//! (`dst`, `op0`, `op1`) must be known before the instruction's assertions can
//! be checked. Any of the three may already be present in memory; whichever
//! are missing are deduced from the other two and the instruction's
//! `res_logic`, or — failing that — from a builtin runner's auto-deduction
//! rule (spec §5, `deduce_memory_cell`).
//!
//! The deduction order mirrors the teacher's `StepContext` bit-tracking
//! scheme (fetch what memory already has, run builtins on what's still
//! missing, then solve the remaining unknown algebraically).

use bitflags::bitflags;

use crate::errors::vm_errors::VirtualMachineError;
use crate::instruction::{Instruction, Opcode, ResLogic};
use crate::memory::Memory;
use crate::relocatable::{MaybeRelocatable, Relocatable};
use crate::run_context::RunContext;

/// Implemented by whatever can auto-deduce the value of a builtin-segment
/// memory cell (spec §5, every [`crate::builtins`] runner).
pub trait MemoryCellDeducer {
    /// Attempts to deduce the value at `address`, if it falls within a
    /// segment this deducer is responsible for.
    fn deduce_memory_cell(
        &self,
        memory: &Memory,
        address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, VirtualMachineError>;
}

/// A no-op deducer, for contexts with no builtins registered (e.g. unit
/// tests exercising the operand engine in isolation).
pub struct NoBuiltins;

impl MemoryCellDeducer for NoBuiltins {
    fn deduce_memory_cell(
        &self,
        _memory: &Memory,
        _address: Relocatable,
    ) -> Result<Option<MaybeRelocatable>, VirtualMachineError> {
        Ok(None)
    }
}

bitflags! {
    /// Tracks which of `dst`/`op0`/`op1` were read straight from memory
    /// versus deduced, so the caller can mark the right cells as accessed
    /// and builtins can validate only the cells they actually deduced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OperandFlags: u8 {
        /// `dst` came from an existing memory cell.
        const DST_ASSERTED = 1 << 0;
        /// `op0` came from an existing memory cell.
        const OP0_ASSERTED = 1 << 1;
        /// `op1` came from an existing memory cell.
        const OP1_ASSERTED = 1 << 2;
        /// `op0` was deduced rather than read.
        const OP0_DEDUCED = 1 << 3;
        /// `op1` was deduced rather than read.
        const OP1_DEDUCED = 1 << 4;
        /// `dst` was deduced rather than read.
        const DST_DEDUCED = 1 << 5;
    }
}

/// The three operands of an instruction, plus the computed `res` (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct Operands {
    /// The destination value.
    pub dst: MaybeRelocatable,
    /// The first operand.
    pub op0: MaybeRelocatable,
    /// The second operand.
    pub op1: MaybeRelocatable,
    /// The computed result, or `None` when `res_logic` is `Unconstrained`.
    pub res: Option<MaybeRelocatable>,
}

/// The memory addresses `dst`, `op0` and `op1` were read from or written to.
#[derive(Debug, Clone, Copy)]
pub struct OperandAddresses {
    /// The destination address.
    pub dst_addr: Relocatable,
    /// The first operand's address.
    pub op0_addr: Relocatable,
    /// The second operand's address.
    pub op1_addr: Relocatable,
}

/// Runs the full operand-computation algorithm for a single step.
///
/// Returns the resolved operands, their addresses, and which were deduced
/// (as opposed to read) — the caller is responsible for writing any deduced
/// value back into `memory` (spec §4.3: a deduced operand is itself an
/// assertion against write-once memory) and for marking all three addresses
/// as accessed.
pub fn compute_operands(
    instruction: &Instruction,
    run_context: &RunContext,
    memory: &Memory,
    builtins: &dyn MemoryCellDeducer,
) -> Result<(Operands, OperandAddresses, OperandFlags), VirtualMachineError> {
    let mut flags = OperandFlags::empty();

    let dst_addr = run_context.compute_dst_addr(instruction)?;
    let mut dst = memory.get(dst_addr);
    if dst.is_some() {
        flags.insert(OperandFlags::DST_ASSERTED);
    }

    let op0_addr = run_context.compute_op0_addr(instruction)?;
    let mut op0 = memory.get(op0_addr);
    if op0.is_some() {
        flags.insert(OperandFlags::OP0_ASSERTED);
    }

    let op1_addr = run_context.compute_op1_addr(
        instruction,
        op0.as_ref().and_then(MaybeRelocatable::get_relocatable),
    )?;
    let mut op1 = memory.get(op1_addr);
    if op1.is_some() {
        flags.insert(OperandFlags::OP1_ASSERTED);
    }

    // Builtins get first refusal on whatever memory didn't already supply.
    if op0.is_none() {
        if let Some(value) = builtins.deduce_memory_cell(memory, op0_addr)? {
            op0 = Some(value);
            flags.insert(OperandFlags::OP0_DEDUCED);
        }
    }
    if op1.is_none() {
        if let Some(value) = builtins.deduce_memory_cell(memory, op1_addr)? {
            op1 = Some(value);
            flags.insert(OperandFlags::OP1_DEDUCED);
        }
    }

    // `Call` fully determines op0/dst on its own, independent of res_logic.
    if instruction.opcode == Opcode::Call {
        let return_pc = run_context.pc.add_usize(instruction.size() as usize)?;
        match op0 {
            Some(value) if value != return_pc.into() => {
                return Err(VirtualMachineError::CantWriteReturnPc)
            }
            Some(_) => {}
            None => {
                op0 = Some(return_pc.into());
                flags.insert(OperandFlags::OP0_DEDUCED);
            }
        }
        match dst {
            Some(value) if value != run_context.fp.into() => {
                return Err(VirtualMachineError::CantWriteReturnFp)
            }
            Some(_) => {}
            None => {
                dst = Some(run_context.fp.into());
                flags.insert(OperandFlags::DST_DEDUCED);
            }
        }
    }

    // `AssertEq` lets the two known values among {dst, op0, op1} solve for
    // the third through `res_logic` (spec §4.4, opcode assertions).
    if instruction.opcode == Opcode::AssertEq {
        if let Some(dst_val) = dst {
            if op1.is_none() {
                if let Some(value) =
                    deduce_op1_from_op0(instruction.res_logic, op0.as_ref(), &dst_val)?
                {
                    op1 = Some(value);
                    flags.insert(OperandFlags::OP1_DEDUCED);
                }
            }
            if op0.is_none() {
                if let Some(op1_val) = op1 {
                    if let Some(value) =
                        deduce_op0_from_op1(instruction.res_logic, &op1_val, &dst_val)?
                    {
                        op0 = Some(value);
                        flags.insert(OperandFlags::OP0_DEDUCED);
                    }
                }
            }
        }
    }

    let op0 = op0.ok_or(VirtualMachineError::FailedToComputeOp0)?;
    let op1 = op1.ok_or(VirtualMachineError::FailedToComputeOp1)?;
    let res = compute_res(instruction.res_logic, &op0, &op1)?;

    let dst = match dst {
        Some(value) => value,
        None => {
            let value = res.ok_or(VirtualMachineError::NoDst)?;
            flags.insert(OperandFlags::DST_DEDUCED);
            value
        }
    };

    Ok((
        Operands { dst, op0, op1, res },
        OperandAddresses {
            dst_addr,
            op0_addr,
            op1_addr,
        },
        flags,
    ))
}

fn compute_res(
    res_logic: ResLogic,
    op0: &MaybeRelocatable,
    op1: &MaybeRelocatable,
) -> Result<Option<MaybeRelocatable>, VirtualMachineError> {
    match res_logic {
        ResLogic::Op1 => Ok(Some(*op1)),
        ResLogic::Add => Ok(Some(op0.add(op1)?)),
        ResLogic::Mul => Ok(Some(op0.mul(op1)?)),
        ResLogic::Unconstrained => Ok(None),
    }
}

fn deduce_op1_from_op0(
    res_logic: ResLogic,
    op0: Option<&MaybeRelocatable>,
    dst: &MaybeRelocatable,
) -> Result<Option<MaybeRelocatable>, VirtualMachineError> {
    match res_logic {
        ResLogic::Op1 => Ok(Some(*dst)),
        ResLogic::Add => match op0 {
            Some(op0) => Ok(Some(dst.sub(op0)?)),
            None => Ok(None),
        },
        ResLogic::Mul => match op0 {
            Some(op0) => Ok(Some(dst.field_div(op0)?)),
            None => Ok(None),
        },
        ResLogic::Unconstrained => Ok(None),
    }
}

fn deduce_op0_from_op1(
    res_logic: ResLogic,
    op1: &MaybeRelocatable,
    dst: &MaybeRelocatable,
) -> Result<Option<MaybeRelocatable>, VirtualMachineError> {
    match res_logic {
        ResLogic::Op1 => Ok(None),
        ResLogic::Add => Ok(Some(dst.sub(op1)?)),
        ResLogic::Mul => Ok(Some(dst.field_div(op1)?)),
        ResLogic::Unconstrained => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::felt::Felt;
    use crate::instruction::{ApUpdate, FpUpdate, Op1Addr, PcUpdate, Register};

    fn base_instr() -> Instruction {
        Instruction {
            off0: 0,
            off1: 0,
            off2: 1,
            dst_register: Register::AP,
            op0_register: Register::AP,
            op1_addr: Op1Addr::Op0,
            res_logic: ResLogic::Add,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Regular,
            fp_update: FpUpdate::Regular,
            opcode: Opcode::AssertEq,
        }
    }

    #[test]
    fn deduces_dst_from_op0_and_op1() {
        let mut memory = Memory::new();
        memory.add_segment();
        let ctx = RunContext::new(Relocatable::new(0, 0), Relocatable::new(0, 10), Relocatable::new(0, 10));
        let mut instr = base_instr();
        instr.off0 = 2; // dst: ap+2, left unset
        instr.off1 = 0; // op0: ap+0 = 3
        instr.op1_addr = Op1Addr::AP;
        instr.off2 = 1; // op1: ap+1 = 4
        memory.set(Relocatable::new(0, 10), Felt::from(3u8).into()).unwrap();
        memory.set(Relocatable::new(0, 11), Felt::from(4u8).into()).unwrap();

        let (operands, _, flags) = compute_operands(&instr, &ctx, &memory, &NoBuiltins).unwrap();
        assert_eq!(operands.dst, Felt::from(7u8).into());
        assert!(flags.contains(OperandFlags::DST_DEDUCED));
    }

    #[test]
    fn missing_op0_and_op1_fails() {
        let mut memory = Memory::new();
        memory.add_segment();
        let ctx = RunContext::new(Relocatable::new(0, 0), Relocatable::new(0, 10), Relocatable::new(0, 10));
        let instr = base_instr();
        let err = compute_operands(&instr, &ctx, &memory, &NoBuiltins).unwrap_err();
        assert_eq!(err, VirtualMachineError::FailedToComputeOp0);
    }
}
