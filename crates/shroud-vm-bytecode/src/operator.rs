//! Operator codes carried as `BINARY`/`UNARY` operands

use serde::{Deserialize, Serialize};
use shroud_ast::{BinaryOp, UnaryOp};

/// Binary operator code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BinaryOperator {
    /// `+`
    Add = 0,
    /// `-`
    Sub = 1,
    /// `*`
    Mul = 2,
    /// `/`
    Div = 3,
    /// `%`
    Mod = 4,
    /// `**`
    Exp = 5,
    /// `==`
    LooseEq = 6,
    /// `!=`
    LooseNe = 7,
    /// `===`
    StrictEq = 8,
    /// `!==`
    StrictNe = 9,
    /// `<`
    Lt = 10,
    /// `<=`
    Le = 11,
    /// `>`
    Gt = 12,
    /// `>=`
    Ge = 13,
    /// `&`
    BitAnd = 14,
    /// `|`
    BitOr = 15,
    /// `^`
    BitXor = 16,
    /// `<<`
    Shl = 17,
    /// `>>`
    Shr = 18,
    /// `>>>`
    UShr = 19,
    /// `in`
    In = 20,
    /// `instanceof`
    InstanceOf = 21,
    /// Template literal step: `a + String(b)`
    TemplateConcat = 22,
}

const BINARY: [BinaryOperator; 23] = [
    BinaryOperator::Add,
    BinaryOperator::Sub,
    BinaryOperator::Mul,
    BinaryOperator::Div,
    BinaryOperator::Mod,
    BinaryOperator::Exp,
    BinaryOperator::LooseEq,
    BinaryOperator::LooseNe,
    BinaryOperator::StrictEq,
    BinaryOperator::StrictNe,
    BinaryOperator::Lt,
    BinaryOperator::Le,
    BinaryOperator::Gt,
    BinaryOperator::Ge,
    BinaryOperator::BitAnd,
    BinaryOperator::BitOr,
    BinaryOperator::BitXor,
    BinaryOperator::Shl,
    BinaryOperator::Shr,
    BinaryOperator::UShr,
    BinaryOperator::In,
    BinaryOperator::InstanceOf,
    BinaryOperator::TemplateConcat,
];

impl BinaryOperator {
    /// Decode an operand word
    pub fn from_code(code: u32) -> Option<Self> {
        BINARY.get(code as usize).copied()
    }

    /// Operand word
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Mnemonic used by the disassembler
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Exp => "**",
            BinaryOperator::LooseEq => "==",
            BinaryOperator::LooseNe => "!=",
            BinaryOperator::StrictEq => "===",
            BinaryOperator::StrictNe => "!==",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::UShr => ">>>",
            BinaryOperator::In => "in",
            BinaryOperator::InstanceOf => "instanceof",
            BinaryOperator::TemplateConcat => "concat",
        }
    }
}

impl From<BinaryOp> for BinaryOperator {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => BinaryOperator::Add,
            BinaryOp::Sub => BinaryOperator::Sub,
            BinaryOp::Mul => BinaryOperator::Mul,
            BinaryOp::Div => BinaryOperator::Div,
            BinaryOp::Mod => BinaryOperator::Mod,
            BinaryOp::Exp => BinaryOperator::Exp,
            BinaryOp::Eq => BinaryOperator::LooseEq,
            BinaryOp::NotEq => BinaryOperator::LooseNe,
            BinaryOp::StrictEq => BinaryOperator::StrictEq,
            BinaryOp::StrictNotEq => BinaryOperator::StrictNe,
            BinaryOp::Lt => BinaryOperator::Lt,
            BinaryOp::LtEq => BinaryOperator::Le,
            BinaryOp::Gt => BinaryOperator::Gt,
            BinaryOp::GtEq => BinaryOperator::Ge,
            BinaryOp::BitAnd => BinaryOperator::BitAnd,
            BinaryOp::BitOr => BinaryOperator::BitOr,
            BinaryOp::BitXor => BinaryOperator::BitXor,
            BinaryOp::Shl => BinaryOperator::Shl,
            BinaryOp::Shr => BinaryOperator::Shr,
            BinaryOp::UShr => BinaryOperator::UShr,
            BinaryOp::In => BinaryOperator::In,
            BinaryOp::InstanceOf => BinaryOperator::InstanceOf,
        }
    }
}

/// Unary operator code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnaryOperator {
    /// `-x`
    Neg = 0,
    /// `+x`
    Plus = 1,
    /// `!x`
    Not = 2,
    /// `~x`
    BitNot = 3,
    /// `typeof x`
    TypeOf = 4,
    /// `void x`
    Void = 5,
}

impl UnaryOperator {
    /// Decode an operand word
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Neg),
            1 => Some(Self::Plus),
            2 => Some(Self::Not),
            3 => Some(Self::BitNot),
            4 => Some(Self::TypeOf),
            5 => Some(Self::Void),
            _ => None,
        }
    }

    /// Operand word
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a source operator; `delete` has no bytecode form
    pub fn from_ast(op: UnaryOp) -> Option<Self> {
        match op {
            UnaryOp::Minus => Some(Self::Neg),
            UnaryOp::Plus => Some(Self::Plus),
            UnaryOp::Not => Some(Self::Not),
            UnaryOp::BitNot => Some(Self::BitNot),
            UnaryOp::TypeOf => Some(Self::TypeOf),
            UnaryOp::Void => Some(Self::Void),
            UnaryOp::Delete => None,
        }
    }
}

/// Resolution mode of `LOAD_GLOBAL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GlobalMode {
    /// Unresolvable names throw a ReferenceError
    Strict = 0,
    /// Unresolvable names read as `undefined` (operand of `typeof`)
    TypeofSafe = 1,
}

impl GlobalMode {
    /// Decode an operand word
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Strict),
            1 => Some(Self::TypeofSafe),
            _ => None,
        }
    }

    /// Operand word
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_codes_round_trip() {
        for op in BINARY {
            assert_eq!(BinaryOperator::from_code(op.code()), Some(op));
        }
        assert_eq!(BinaryOperator::from_code(99), None);
    }

    #[test]
    fn test_delete_has_no_code() {
        assert_eq!(UnaryOperator::from_ast(UnaryOp::Delete), None);
        assert_eq!(UnaryOperator::from_ast(UnaryOp::TypeOf), Some(UnaryOperator::TypeOf));
    }
}
