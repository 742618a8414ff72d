//! The three machine registers (`PC`, `AP`, `FP`) and the address-computation
//! rules derived from them (spec §3 "Run context", §4.3).

use crate::errors::vm_errors::VirtualMachineError;
use crate::instruction::{Instruction, Op1Addr, Register};
use crate::relocatable::Relocatable;

/// The Program Counter, Allocation Pointer and Frame Pointer.
///
/// All three are [`Relocatable`] addresses rather than flat integers: `PC`
/// lives in the program segment, `AP`/`FP` live in the execution segment,
/// and keeping them two-dimensional lets the VM run entirely before
/// relocation assigns flat addresses (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    /// The Program Counter.
    pub pc: Relocatable,
    /// The Allocation Pointer.
    pub ap: Relocatable,
    /// The Frame Pointer.
    pub fp: Relocatable,
}

impl RunContext {
    /// Builds a run context from its three registers.
    pub fn new(pc: Relocatable, ap: Relocatable, fp: Relocatable) -> Self {
        Self { pc, ap, fp }
    }

    /// Returns the address a register points to, offset by `delta`.
    fn reg_addr(&self, register: Register, delta: i64) -> Result<Relocatable, VirtualMachineError> {
        let base = match register {
            Register::AP => self.ap,
            Register::FP => self.fp,
        };
        base.add_signed(delta).map_err(VirtualMachineError::Math)
    }

    /// Computes the address `dst` is read from or written to.
    pub fn compute_dst_addr(&self, instruction: &Instruction) -> Result<Relocatable, VirtualMachineError> {
        self.reg_addr(instruction.dst_register, instruction.off0)
    }

    /// Computes the address `op0` is read from.
    pub fn compute_op0_addr(&self, instruction: &Instruction) -> Result<Relocatable, VirtualMachineError> {
        self.reg_addr(instruction.op0_register, instruction.off1)
    }

    /// Computes the address `op1` is read from, given `op0`'s value when
    /// `op1_addr` is [`Op1Addr::Op0`] (spec §4.3, operand deduction order).
    pub fn compute_op1_addr(
        &self,
        instruction: &Instruction,
        op0: Option<Relocatable>,
    ) -> Result<Relocatable, VirtualMachineError> {
        let base = match instruction.op1_addr {
            Op1Addr::FP => self.fp,
            Op1Addr::AP => self.ap,
            Op1Addr::Imm => self.pc,
            Op1Addr::Op0 => op0.ok_or(VirtualMachineError::FailedToComputeOp1)?,
        };
        base.add_signed(instruction.off2)
            .map_err(VirtualMachineError::Math)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{ApUpdate, FpUpdate, Op1Addr, Opcode, PcUpdate, ResLogic};

    fn instr(off0: i64, off1: i64, off2: i64, op1_addr: Op1Addr) -> Instruction {
        Instruction {
            off0,
            off1,
            off2,
            dst_register: Register::AP,
            op0_register: Register::FP,
            op1_addr,
            res_logic: ResLogic::Add,
            pc_update: PcUpdate::Regular,
            ap_update: ApUpdate::Regular,
            fp_update: FpUpdate::Regular,
            opcode: Opcode::NOp,
        }
    }

    #[test]
    fn computes_dst_from_ap() {
        let ctx = RunContext::new(Relocatable::new(0, 4), Relocatable::new(1, 0), Relocatable::new(1, 0));
        let i = instr(2, 0, 0, Op1Addr::FP);
        assert_eq!(ctx.compute_dst_addr(&i).unwrap(), Relocatable::new(1, 2));
    }

    #[test]
    fn computes_op1_from_imm_uses_pc() {
        let ctx = RunContext::new(Relocatable::new(0, 10), Relocatable::new(1, 0), Relocatable::new(1, 0));
        let i = instr(0, 0, 1, Op1Addr::Imm);
        assert_eq!(ctx.compute_op1_addr(&i, None).unwrap(), Relocatable::new(0, 11));
    }

    #[test]
    fn computes_op1_from_op0_requires_op0() {
        let ctx = RunContext::new(Relocatable::new(0, 0), Relocatable::new(1, 0), Relocatable::new(1, 0));
        let i = instr(0, 0, 0, Op1Addr::Op0);
        assert!(ctx.compute_op1_addr(&i, None).is_err());
        assert_eq!(
            ctx.compute_op1_addr(&i, Some(Relocatable::new(1, 5))).unwrap(),
            Relocatable::new(1, 5)
        );
    }
}
