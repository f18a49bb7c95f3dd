//! Compiled units and disassembly

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constant::Constant;
use crate::error::{BytecodeError, Result};
use crate::mapping::OpcodeMap;
use crate::opcode::{NO_TARGET, Opcode};
use crate::operator::{BinaryOperator, UnaryOperator};

/// Output of compiling one function: an encoded tape plus its constants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// `[encoded opcode, operands...]*`
    pub code: Vec<u32>,
    /// Constant pool, indexed by `PUSH_CONST`, `LOAD_LOCAL`, `CLOSURE`, ...
    pub consts: Vec<Constant>,
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstruction {
    /// Tape offset of the opcode word
    pub offset: usize,
    /// Logical opcode
    pub opcode: Opcode,
    /// Operand words
    pub operands: SmallVec<[u32; 3]>,
}

impl DecodedInstruction {
    /// First operand, or 0 when the opcode has none
    #[inline]
    pub fn operand(&self) -> u32 {
        self.operands.first().copied().unwrap_or(0)
    }

    /// Offset of the following instruction
    #[inline]
    pub fn next_offset(&self) -> usize {
        self.offset + 1 + self.operands.len()
    }
}

impl CompiledUnit {
    /// Create a unit
    pub fn new(code: Vec<u32>, consts: Vec<Constant>) -> Self {
        Self { code, consts }
    }

    /// Decode the instruction at `offset`
    pub fn decode_at(&self, map: &OpcodeMap, offset: usize) -> Result<DecodedInstruction> {
        let word = *self
            .code
            .get(offset)
            .ok_or(BytecodeError::UnexpectedEnd(offset))?;
        let opcode = map
            .decode_word(word)
            .ok_or(BytecodeError::InvalidOpcode { word, offset })?;
        let count = opcode.operand_count();
        let operands = self
            .code
            .get(offset + 1..offset + 1 + count)
            .ok_or(BytecodeError::UnexpectedEnd(offset))?;
        Ok(DecodedInstruction {
            offset,
            opcode,
            operands: SmallVec::from_slice(operands),
        })
    }

    /// Decode the whole tape linearly
    pub fn disassemble(&self, map: &OpcodeMap) -> Result<Vec<DecodedInstruction>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            let insn = self.decode_at(map, offset)?;
            offset = insn.next_offset();
            out.push(insn);
        }
        Ok(out)
    }

    /// Human-readable listing
    pub fn listing(&self, map: &OpcodeMap) -> Result<String> {
        let mut out = String::new();
        for insn in self.disassemble(map)? {
            let _ = write!(out, "{:5}  {:<14}", insn.offset, insn.opcode.mnemonic());
            let detail = self.describe(&insn);
            if !detail.is_empty() {
                let _ = write!(out, " {}", detail);
            }
            out.push('\n');
        }
        Ok(out)
    }

    fn describe(&self, insn: &DecodedInstruction) -> String {
        let constant = |k: u32| match self.consts.get(k as usize) {
            Some(Constant::String(s)) => format!("{:?}", s),
            Some(Constant::Number(n)) => Constant::number_text(*n),
            Some(Constant::Bool(b)) => b.to_string(),
            Some(Constant::Null) => "null".to_string(),
            Some(Constant::Undefined) => "undefined".to_string(),
            Some(Constant::Closure(c)) => format!("<closure {} bytes>", c.source.len()),
            None => format!("#{}?", k),
        };
        let target = |t: u32| {
            if t == NO_TARGET {
                "-".to_string()
            } else {
                format!("@{}", t)
            }
        };
        match insn.opcode {
            Opcode::PushConst
            | Opcode::LoadLocal
            | Opcode::StoreLocal
            | Opcode::StoreGlobal
            | Opcode::Closure => constant(insn.operand()),
            Opcode::LoadGlobal => format!("{} mode={}", constant(insn.operands[0]), insn.operands[1]),
            Opcode::Binary => BinaryOperator::from_code(insn.operand())
                .map(|op| op.symbol().to_string())
                .unwrap_or_else(|| "?".into()),
            Opcode::Unary => UnaryOperator::from_code(insn.operand())
                .map(|op| format!("{:?}", op))
                .unwrap_or_else(|| "?".into()),
            Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue => target(insn.operand()),
            Opcode::Try => format!(
                "catch={} finally={} end={}",
                target(insn.operands[0]),
                target(insn.operands[1]),
                target(insn.operands[2])
            ),
            Opcode::Call
            | Opcode::CallMethod
            | Opcode::CallThis
            | Opcode::New
            | Opcode::MakeArray
            | Opcode::MakeObject => insn.operand().to_string(),
            _ => String::new(),
        }
    }
}
