//! Thin wrapper around capstone. The profiler only cares about where an
//! instruction can transfer control to, so decoding boils an instruction
//! down to its address, length and (optional) explicit flow target.

use crate::arch::Arch;
use capstone::arch::arm64::Arm64OperandType;
use capstone::arch::x86::X86OperandType;
use capstone::arch::ArchOperand;
use thiserror::Error;

// capstone group ids, identical for x86 and aarch64
const GRP_JUMP: u8 = 1;
const GRP_CALL: u8 = 2;
const GRP_RET: u8 = 3;

pub struct Dis {
    pub arch: Arch,
    pub cs: capstone::Capstone,
}

/// Control transfer out of an instruction. The target is `None` for
/// indirect branches (register/memory operands).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Flow {
    Jump(Option<u64>),
    Call(Option<u64>),
    Return,
}

#[derive(Clone, Debug)]
pub struct DecodedInsn {
    pub address: u64,
    pub len: usize,
    pub flow: Option<Flow>,
}

impl DecodedInsn {
    /// The address this instruction branches or calls to, if it is an
    /// explicit one.
    pub fn flow_target(&self) -> Option<u64> {
        match self.flow {
            Some(Flow::Jump(t)) | Some(Flow::Call(t)) => t,
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum DisError {
    // no #[from]: capstone's Error only implements Display
    #[error("capstone: {0}")]
    Capstone(capstone::Error),
}

impl From<capstone::Error> for DisError {
    fn from(e: capstone::Error) -> Self {
        Self::Capstone(e)
    }
}

impl Dis {
    pub fn new(arch: Arch) -> Result<Self, DisError> {
        let cs = arch.make_capstone()?;
        Ok(Self { arch, cs })
    }

    /// Decodes a contiguous chunk of code at `base`, in program order.
    pub fn decode_all(&self, code: &[u8], base: u64) -> Result<Vec<DecodedInsn>, DisError> {
        let instructions = self.cs.disasm_all(code, base)?;

        let mut decoded = Vec::with_capacity(instructions.len());

        for insn in instructions.iter() {
            let detail = self.cs.insn_detail(insn)?;

            let is_jump = detail.groups().iter().any(|g| g.0 == GRP_JUMP);
            let is_call = detail.groups().iter().any(|g| g.0 == GRP_CALL);
            let is_ret = detail.groups().iter().any(|g| g.0 == GRP_RET);

            let flow = if is_ret {
                Some(Flow::Return)
            } else if is_jump || is_call {
                let target = immediate_operand(&detail.arch_detail().operands());
                if is_call {
                    Some(Flow::Call(target))
                } else {
                    Some(Flow::Jump(target))
                }
            } else {
                None
            };

            decoded.push(DecodedInsn {
                address: insn.address(),
                len: insn.bytes().len(),
                flow,
            });
        }

        Ok(decoded)
    }
}

fn immediate_operand(operands: &[ArchOperand]) -> Option<u64> {
    operands.iter().find_map(|op| match op {
        ArchOperand::X86Operand(op) => match op.op_type {
            X86OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        ArchOperand::Arm64Operand(op) => match op.op_type {
            Arm64OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    #[test]
    fn x64_direct_call() {
        let dis = Dis::new(Arch::X86_64).unwrap();

        // 0x1000: call 0x2000 ; nop ; ret
        let code = [
            0xe8, 0xfb, 0x0f, 0x00, 0x00, // call rel32
            0x90, // nop
            0xc3, // ret
        ];

        let insns = dis.decode_all(&code, 0x1000).unwrap();
        assert_eq!(insns.len(), 3);

        assert_eq!(insns[0].address, 0x1000);
        assert_eq!(insns[0].flow, Some(Flow::Call(Some(0x2000))));
        assert_eq!(insns[1].flow, None);
        assert_eq!(insns[2].flow, Some(Flow::Return));
    }

    #[test]
    fn x64_conditional_jump() {
        let dis = Dis::new(Arch::X86_64).unwrap();

        // 0x1000: je 0x1010
        let code = [0x74, 0x0e];

        let insns = dis.decode_all(&code, 0x1000).unwrap();
        assert_eq!(insns[0].flow, Some(Flow::Jump(Some(0x1010))));
        assert_eq!(insns[0].flow_target(), Some(0x1010));
    }

    #[test]
    fn capstone_errors_convert_and_format() {
        let err: DisError = capstone::Error::UnknownCapstoneError.into();
        assert!(err.to_string().starts_with("capstone:"));
    }

    #[test]
    fn x64_indirect_jump_has_no_target() {
        let dis = Dis::new(Arch::X86_64).unwrap();

        // jmp rax
        let code = [0xff, 0xe0];

        let insns = dis.decode_all(&code, 0).unwrap();
        assert_eq!(insns[0].flow, Some(Flow::Jump(None)));
        assert_eq!(insns[0].flow_target(), None);
    }
}
