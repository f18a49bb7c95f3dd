//! State threaded through one compilation

use shroud_common::{NameGenerator, ObfuscationRng};
use shroud_vm_bytecode::OpcodeMap;

/// Knobs controlling how functions are lowered
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Accept `let`/`const`/class declarations and `with` by downgrading
    /// them (output targets an older language level)
    pub downlevel: bool,
    /// Probability of injecting a filler instruction after each real one
    pub fake_opcode_rate: f64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            downlevel: false,
            fake_opcode_rate: 0.1,
        }
    }
}

/// Names shared between compiled functions and the runtime.
///
/// All are generated once per run and never collide with program names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSlots {
    /// Environment key holding the captured `this`
    pub this_slot: String,
    /// Environment key holding the `arguments` object
    pub arguments_slot: String,
    /// Environment key holding `new.target`
    pub new_target_slot: String,
    /// Parameter name through which closures reach the environment record
    pub env_param: String,
    /// Global name of the object-rest helper
    pub rest_helper: String,
}

impl EnvSlots {
    /// Draw fresh slot names from a name generator
    pub fn generate(names: &mut NameGenerator) -> Self {
        Self {
            this_slot: names.fresh(),
            arguments_slot: names.fresh(),
            new_target_slot: names.fresh(),
            env_param: names.fresh(),
            rest_helper: names.fresh(),
        }
    }

    /// The three reserved environment keys
    pub fn reserved_keys(&self) -> [&str; 3] {
        [&self.this_slot, &self.arguments_slot, &self.new_target_slot]
    }
}

/// Everything one function compilation borrows from its run
pub struct CompileContext<'a> {
    /// Opcode permutation of the run
    pub map: &'a OpcodeMap,
    /// Random source for temporaries and filler instructions
    pub rng: &'a mut ObfuscationRng,
    /// Name generator for temporaries and renamed bindings
    pub names: &'a mut NameGenerator,
    /// Lowering options
    pub options: &'a CompileOptions,
    /// Reserved environment names
    pub slots: &'a EnvSlots,
}
