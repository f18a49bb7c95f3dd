//! Static stack-balance simulation
//!
//! Walks every reachable instruction, propagating the operand-stack depth
//! along all control-flow edges (fallthrough, jumps, and the catch/finally/end
//! targets of `TRY`). Paths that meet must agree on the depth.

use crate::constant::Constant;
use crate::error::{BytecodeError, Result};
use crate::mapping::OpcodeMap;
use crate::opcode::{NO_TARGET, Opcode};
use crate::operator::{BinaryOperator, GlobalMode, UnaryOperator};
use crate::unit::{CompiledUnit, DecodedInstruction};

/// Outcome of a successful simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackReport {
    /// Deepest operand stack reached
    pub max_depth: usize,
    /// Depth right before each reachable `RETURN`
    pub return_depths: Vec<usize>,
    /// Number of reachable instructions
    pub reachable: usize,
}

/// Check that every path through `unit` keeps a consistent, non-negative
/// stack depth and that all operands are in range.
pub fn verify_stack(unit: &CompiledUnit, map: &OpcodeMap) -> Result<StackReport> {
    let len = unit.code.len();
    let mut depth_at: Vec<Option<usize>> = vec![None; len];
    let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];
    let mut report = StackReport::default();

    if len == 0 {
        return Err(BytecodeError::UnexpectedEnd(0));
    }

    while let Some((offset, depth)) = worklist.pop() {
        if offset >= len {
            return Err(BytecodeError::UnexpectedEnd(offset));
        }
        match depth_at[offset] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(BytecodeError::DepthMismatch {
                    offset,
                    first: seen,
                    second: depth,
                });
            }
            None => depth_at[offset] = Some(depth),
        }
        report.reachable += 1;

        let insn = unit.decode_at(map, offset)?;
        check_operands(unit, &insn, len)?;

        let (pops, pushes) = insn.opcode.stack_effect(insn.operand());
        if pops > depth {
            return Err(BytecodeError::StackUnderflow(offset));
        }
        let after = depth - pops + pushes;
        report.max_depth = report.max_depth.max(after).max(depth);

        match insn.opcode {
            Opcode::Return => report.return_depths.push(depth),
            Opcode::Jmp => worklist.push((insn.operand() as usize, after)),
            Opcode::JmpIfFalse | Opcode::JmpIfTrue => {
                worklist.push((insn.operand() as usize, after));
            }
            Opcode::Try => {
                for &target in insn.operands.iter() {
                    if target != NO_TARGET {
                        worklist.push((target as usize, depth));
                    }
                }
            }
            _ => {}
        }
        if !insn.opcode.ends_block() {
            worklist.push((insn.next_offset(), after));
        }
    }

    Ok(report)
}

fn check_operands(unit: &CompiledUnit, insn: &DecodedInstruction, len: usize) -> Result<()> {
    let offset = insn.offset;
    let const_in_range = |k: u32| (k as usize) < unit.consts.len();
    match insn.opcode {
        Opcode::PushConst => {
            if !const_in_range(insn.operand()) {
                return Err(BytecodeError::invalid_operand(offset, "constant index"));
            }
        }
        Opcode::LoadLocal | Opcode::StoreLocal | Opcode::StoreGlobal | Opcode::LoadGlobal => {
            match unit.consts.get(insn.operand() as usize) {
                Some(Constant::String(_)) => {}
                _ => return Err(BytecodeError::invalid_operand(offset, "name constant")),
            }
            if insn.opcode == Opcode::LoadGlobal && GlobalMode::from_code(insn.operands[1]).is_none() {
                return Err(BytecodeError::invalid_operand(offset, "global mode"));
            }
        }
        Opcode::Closure => match unit.consts.get(insn.operand() as usize) {
            Some(Constant::Closure(_)) => {}
            _ => return Err(BytecodeError::invalid_operand(offset, "closure constant")),
        },
        Opcode::Binary => {
            if BinaryOperator::from_code(insn.operand()).is_none() {
                return Err(BytecodeError::invalid_operand(offset, "binary operator"));
            }
        }
        Opcode::Unary => {
            if UnaryOperator::from_code(insn.operand()).is_none() {
                return Err(BytecodeError::invalid_operand(offset, "unary operator"));
            }
        }
        Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue => {
            if insn.operand() as usize >= len {
                return Err(BytecodeError::invalid_operand(offset, "jump target"));
            }
        }
        Opcode::Try => {
            for &target in insn.operands.iter() {
                if target != NO_TARGET && target as usize >= len {
                    return Err(BytecodeError::invalid_operand(offset, "try target"));
                }
            }
            if insn.operands[2] == NO_TARGET {
                return Err(BytecodeError::invalid_operand(offset, "try end"));
            }
        }
        _ => {}
    }
    Ok(())
}
