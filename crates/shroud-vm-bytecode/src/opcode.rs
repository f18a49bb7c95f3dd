//! Logical opcode set

use serde::{Deserialize, Serialize};

/// Number of logical opcodes
pub const OP_COUNT: usize = 32;

/// Operand value meaning "no target" in `TRY` (catch or finally absent)
pub const NO_TARGET: u32 = u32::MAX;

/// Logical opcodes.
///
/// The discriminants are the stable logical numbering; tapes store them
/// permuted and masked through an [`crate::OpcodeMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Push `consts[k]`
    PushConst = 0,
    /// Push `env[consts[k]]`
    LoadLocal = 1,
    /// Pop into `env[consts[k]]`
    StoreLocal = 2,
    /// Push global `consts[k]`; operand 2 is a [`crate::GlobalMode`]
    LoadGlobal = 3,
    /// Pop into global `consts[k]`
    StoreGlobal = 4,
    /// `obj, key -> obj[key]`
    GetProp = 5,
    /// `obj, key, value -> value` after `obj[key] = value`
    SetProp = 6,
    /// `a, b -> a op b`
    Binary = 7,
    /// `a -> op a`
    Unary = 8,
    /// Jump to target
    Jmp = 9,
    /// Pop, jump when falsy
    JmpIfFalse = 10,
    /// Pop, jump when truthy
    JmpIfTrue = 11,
    /// Duplicate top of stack
    Dup = 12,
    /// Discard top of stack
    Pop = 13,
    /// `fn, args... -> fn(args...)` with `this` undefined
    Call = 14,
    /// `obj, key, args... -> obj[key](args...)`
    CallMethod = 15,
    /// `this, fn, args... -> fn.call(this, args...)`
    CallThis = 16,
    /// `ctor, args... -> new ctor(args...)`
    New = 17,
    /// Pop the return value and finish (running pending finally blocks first)
    Return = 18,
    /// Pop and throw
    Throw = 19,
    /// Push a try frame `(catch, finally, end)`
    Try = 20,
    /// Pop the innermost try frame
    EndTry = 21,
    /// Enter the catch region, pushing the caught value
    EnterCatch = 22,
    /// Enter the finally region
    EnterFinally = 23,
    /// Complete a catch/finally region: re-raise, resume a return, or leave
    Rethrow = 24,
    /// Await the top of stack (asynchronous interpreter only)
    Await = 25,
    /// Collect `n` values into an array
    MakeArray = 26,
    /// Collect `n` key/value pairs into an object
    MakeObject = 27,
    /// Materialize the closure whose source is `consts[k]`
    Closure = 28,
    /// Inert filler with a junk operand
    FakeAdd = 29,
    /// Inert filler without operands
    FakePopPush = 30,
    /// Inert filler with a junk jump target
    FakeJmp = 31,
}

const ALL: [Opcode; OP_COUNT] = [
    Opcode::PushConst,
    Opcode::LoadLocal,
    Opcode::StoreLocal,
    Opcode::LoadGlobal,
    Opcode::StoreGlobal,
    Opcode::GetProp,
    Opcode::SetProp,
    Opcode::Binary,
    Opcode::Unary,
    Opcode::Jmp,
    Opcode::JmpIfFalse,
    Opcode::JmpIfTrue,
    Opcode::Dup,
    Opcode::Pop,
    Opcode::Call,
    Opcode::CallMethod,
    Opcode::CallThis,
    Opcode::New,
    Opcode::Return,
    Opcode::Throw,
    Opcode::Try,
    Opcode::EndTry,
    Opcode::EnterCatch,
    Opcode::EnterFinally,
    Opcode::Rethrow,
    Opcode::Await,
    Opcode::MakeArray,
    Opcode::MakeObject,
    Opcode::Closure,
    Opcode::FakeAdd,
    Opcode::FakePopPush,
    Opcode::FakeJmp,
];

impl Opcode {
    /// Every opcode in logical order
    pub fn all() -> &'static [Opcode; OP_COUNT] {
        &ALL
    }

    /// Convert from the logical number
    pub fn from_index(index: u8) -> Option<Self> {
        ALL.get(index as usize).copied()
    }

    /// Logical number
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Number of operand words following the opcode word
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::LoadGlobal => 2,
            Opcode::Try => 3,
            Opcode::PushConst
            | Opcode::LoadLocal
            | Opcode::StoreLocal
            | Opcode::StoreGlobal
            | Opcode::Binary
            | Opcode::Unary
            | Opcode::Jmp
            | Opcode::JmpIfFalse
            | Opcode::JmpIfTrue
            | Opcode::Call
            | Opcode::CallMethod
            | Opcode::CallThis
            | Opcode::New
            | Opcode::MakeArray
            | Opcode::MakeObject
            | Opcode::Closure
            | Opcode::FakeAdd
            | Opcode::FakeJmp => 1,
            Opcode::GetProp
            | Opcode::SetProp
            | Opcode::Dup
            | Opcode::Pop
            | Opcode::Return
            | Opcode::Throw
            | Opcode::EndTry
            | Opcode::EnterCatch
            | Opcode::EnterFinally
            | Opcode::Rethrow
            | Opcode::Await
            | Opcode::FakePopPush => 0,
        }
    }

    /// `(pops, pushes)` for an instruction with the given first operand
    pub fn stack_effect(self, operand: u32) -> (usize, usize) {
        let n = operand as usize;
        match self {
            Opcode::PushConst | Opcode::LoadLocal | Opcode::LoadGlobal | Opcode::Closure => (0, 1),
            Opcode::Dup => (1, 2),
            Opcode::StoreLocal | Opcode::StoreGlobal | Opcode::Pop => (1, 0),
            Opcode::JmpIfFalse | Opcode::JmpIfTrue | Opcode::Return | Opcode::Throw => (1, 0),
            Opcode::GetProp | Opcode::Binary => (2, 1),
            Opcode::SetProp => (3, 1),
            Opcode::Unary | Opcode::Await => (1, 1),
            Opcode::Call | Opcode::New => (n + 1, 1),
            Opcode::CallMethod | Opcode::CallThis => (n + 2, 1),
            Opcode::MakeArray => (n, 1),
            Opcode::MakeObject => (2 * n, 1),
            Opcode::EnterCatch => (0, 1),
            Opcode::Jmp
            | Opcode::Try
            | Opcode::EndTry
            | Opcode::EnterFinally
            | Opcode::Rethrow
            | Opcode::FakeAdd
            | Opcode::FakePopPush
            | Opcode::FakeJmp => (0, 0),
        }
    }

    /// Whether the first operand is a jump target patched from a label
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue)
    }

    /// Whether the opcode is an inert filler
    pub fn is_fake(self) -> bool {
        matches!(self, Opcode::FakeAdd | Opcode::FakePopPush | Opcode::FakeJmp)
    }

    /// Whether execution never falls through to the next instruction
    pub fn ends_block(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Return | Opcode::Throw | Opcode::Rethrow
        )
    }

    /// Mnemonic used by the disassembler
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::PushConst => "PUSH_CONST",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::GetProp => "GET_PROP",
            Opcode::SetProp => "SET_PROP",
            Opcode::Binary => "BINARY",
            Opcode::Unary => "UNARY",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfFalse => "JMP_IF_FALSE",
            Opcode::JmpIfTrue => "JMP_IF_TRUE",
            Opcode::Dup => "DUP",
            Opcode::Pop => "POP",
            Opcode::Call => "CALL",
            Opcode::CallMethod => "CALL_METHOD",
            Opcode::CallThis => "CALL_THIS",
            Opcode::New => "NEW",
            Opcode::Return => "RETURN",
            Opcode::Throw => "THROW",
            Opcode::Try => "TRY",
            Opcode::EndTry => "END_TRY",
            Opcode::EnterCatch => "ENTER_CATCH",
            Opcode::EnterFinally => "ENTER_FINALLY",
            Opcode::Rethrow => "RETHROW",
            Opcode::Await => "AWAIT",
            Opcode::MakeArray => "MAKE_ARRAY",
            Opcode::MakeObject => "MAKE_OBJECT",
            Opcode::Closure => "CLOSURE",
            Opcode::FakeAdd => "FAKE_ADD",
            Opcode::FakePopPush => "FAKE_POP_PUSH",
            Opcode::FakeJmp => "FAKE_JMP",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
