//! Opcode assertions: the checks an instruction's opcode imposes on already
//! -computed operands (spec §4.5), run after [`crate::operands::compute_operands`]
//! and before registers are updated.

use crate::errors::vm_errors::VirtualMachineError;
use crate::instruction::{Instruction, Opcode};
use crate::operands::Operands;
use crate::relocatable::MaybeRelocatable;
use crate::run_context::RunContext;

/// Enforces the assertion, if any, that `instruction`'s opcode requires of
/// `operands`.
///
/// `Call`'s assertions (`op0 == PC + size`, `dst == FP`) are already enforced
/// by [`crate::operands::compute_operands`] while deducing those operands, so
/// this only re-validates `AssertEq`; `Ret` and `NOp` impose nothing further.
pub fn opcode_assertions(
    instruction: &Instruction,
    operands: &Operands,
    run_context: &RunContext,
) -> Result<(), VirtualMachineError> {
    match instruction.opcode {
        Opcode::AssertEq => {
            let res = operands.res.ok_or(VirtualMachineError::UnconstrainedResAssertEq)?;
            if !values_equal(&res, &operands.dst) {
                return Err(VirtualMachineError::DiffAssertValues {
                    res,
                    dst: operands.dst,
                });
            }
            Ok(())
        }
        Opcode::Call => {
            let expected_pc = run_context.pc.add_usize(instruction.size() as usize)?;
            if operands.op0 != expected_pc.into() {
                return Err(VirtualMachineError::CantWriteReturnPc);
            }
            if operands.dst != run_context.fp.into() {
                return Err(VirtualMachineError::CantWriteReturnFp);
            }
            Ok(())
        }
        Opcode::Ret | Opcode::NOp => Ok(()),
    }
}

fn values_equal(a: &MaybeRelocatable, b: &MaybeRelocatable) -> bool {
    match (a, b) {
        (MaybeRelocatable::Int(x), MaybeRelocatable::Int(y)) => x == y,
        (MaybeRelocatable::RelocatableValue(x), MaybeRelocatable::RelocatableValue(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::felt::Felt;
    use crate::instruction::{ApUpdate, FpUpdate, Op1Addr, PcUpdate, Register, ResLogic};
    use crate::relocatable::Relocatable;

    fn instr(opcode: Opcode) -> Instruction {
        Instruction {
            off0: 0,
            off1: 0,
            off2: 1,
            dst_register: Register::AP,
            op0_register: Register::AP,
            op1_addr: Op1Addr::AP,
            res_logic: ResLogic::Add,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Regular,
            fp_update: FpUpdate::Regular,
            opcode,
        }
    }

    #[test]
    fn assert_eq_requires_res_equal_dst() {
        let ctx = RunContext::new(Relocatable::new(0, 0), Relocatable::new(1, 0), Relocatable::new(1, 0));
        let operands = Operands {
            dst: Felt::from(5u8).into(),
            op0: Felt::from(2u8).into(),
            op1: Felt::from(3u8).into(),
            res: Some(Felt::from(5u8).into()),
        };
        assert!(opcode_assertions(&instr(Opcode::AssertEq), &operands, &ctx).is_ok());
    }

    #[test]
    fn assert_eq_mismatch_fails() {
        let ctx = RunContext::new(Relocatable::new(0, 0), Relocatable::new(1, 0), Relocatable::new(1, 0));
        let operands = Operands {
            dst: Felt::from(4u8).into(),
            op0: Felt::from(2u8).into(),
            op1: Felt::from(3u8).into(),
            res: Some(Felt::from(5u8).into()),
        };
        let err = opcode_assertions(&instr(Opcode::AssertEq), &operands, &ctx).unwrap_err();
        assert!(matches!(err, VirtualMachineError::DiffAssertValues { .. }));
    }
}
