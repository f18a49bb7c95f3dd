//! Tape emission and label resolution

use shroud_common::ObfuscationRng;
use shroud_vm_bytecode::{CompiledUnit, Constant, ConstantPool, NO_TARGET, Opcode, OpcodeMap};

use crate::error::{CompileError, CompileResult};

/// Forward-referencable jump target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
struct LabelSlot {
    position: Option<u32>,
    patches: Vec<usize>,
}

/// Emits encoded instructions for one function
pub struct CodeGen {
    map: OpcodeMap,
    code: Vec<u32>,
    constants: ConstantPool,
    labels: Vec<LabelSlot>,
}

impl CodeGen {
    /// Create a code generator for the given opcode encoding
    pub fn new(map: &OpcodeMap) -> Self {
        Self {
            map: map.clone(),
            code: Vec::new(),
            constants: ConstantPool::new(),
            labels: Vec::new(),
        }
    }

    /// Get current tape offset
    pub fn current_index(&self) -> usize {
        self.code.len()
    }

    /// Emit an instruction with literal operands
    pub fn emit(&mut self, op: Opcode, operands: &[u32]) {
        debug_assert_eq!(op.operand_count(), operands.len(), "{}", op);
        self.code.push(self.map.encode_op(op));
        self.code.extend_from_slice(operands);
    }

    /// Add a constant and return its index
    pub fn constant(&mut self, constant: Constant) -> u32 {
        self.constants.add(constant)
    }

    /// Add a name constant and return its index
    pub fn name(&mut self, name: &str) -> u32 {
        self.constants.add_string(name)
    }

    /// Allocate an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelSlot::default());
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current offset and patch pending references
    pub fn mark(&mut self, label: Label) {
        let here = self.code.len() as u32;
        let slot = &mut self.labels[label.0];
        slot.position = Some(here);
        for index in slot.patches.drain(..) {
            self.code[index] = here;
        }
    }

    /// Emit a jump-family instruction targeting a label
    pub fn emit_jump(&mut self, op: Opcode, label: Label) {
        debug_assert!(op.is_jump());
        self.code.push(self.map.encode_op(op));
        self.label_operand(label);
    }

    /// Emit `TRY` with optional catch and finally entries
    pub fn emit_try(&mut self, catch: Option<Label>, finally: Option<Label>, end: Label) {
        self.code.push(self.map.encode_op(Opcode::Try));
        for target in [catch, finally] {
            match target {
                Some(label) => self.label_operand(label),
                None => self.code.push(NO_TARGET),
            }
        }
        self.label_operand(end);
    }

    fn label_operand(&mut self, label: Label) {
        let slot = &mut self.labels[label.0];
        match slot.position {
            Some(position) => self.code.push(position),
            None => {
                slot.patches.push(self.code.len());
                self.code.push(0);
            }
        }
    }

    /// Maybe append one inert filler instruction
    pub fn inject_fake(&mut self, rng: &mut ObfuscationRng, rate: f64) {
        if !rng.chance(rate) {
            return;
        }
        match rng.below(3) {
            0 => {
                let junk = rng.word();
                self.emit(Opcode::FakeAdd, &[junk]);
            }
            1 => self.emit(Opcode::FakePopPush, &[]),
            _ => {
                let target = rng.below(self.code.len() + 1) as u32;
                self.emit(Opcode::FakeJmp, &[target]);
            }
        }
    }

    /// Finish the unit, failing if a referenced label was never bound
    pub fn finish(self) -> CompileResult<CompiledUnit> {
        if let Some(index) = self
            .labels
            .iter()
            .position(|slot| slot.position.is_none() && !slot.patches.is_empty())
        {
            return Err(CompileError::internal(format!("label {} never bound", index)));
        }
        Ok(CompiledUnit::new(self.code, self.constants.into_vec()))
    }
}
