//! Per-run state
//!
//! A [`VirtualizeContext`] owns everything that must stay consistent across
//! the functions of one run: the random source, the name generator, the
//! opcode mapping and the runtime's names. Nothing here is process-wide,
//! so independent runs can proceed side by side; hosts that virtualize in
//! parallel share one context behind a `parking_lot::Mutex`.

use std::sync::Arc;

use shroud_ast::Program;
use shroud_ast::scope::all_identifiers;
use shroud_ast::{Expr, Function};
use shroud_codec::{ArtifactKind, CodecResult, Payload, WireBundle, bundle_call, encode};
use shroud_codec::emit::{code_literal, constants_literal, opcode_table_literal};
use shroud_common::{NameGenerator, ObfuscationRng};
use shroud_vm_bytecode::{Constant, OpcodeMap};
use shroud_vm_compiler::{CompileContext, CompileOptions, CompileResult, CompiledFunction, EnvSlots, compile_function};

use crate::options::VirtualizeOptions;
use crate::runtime::RuntimeNames;

/// State shared by every function of one run
pub struct VirtualizeContext {
    options: VirtualizeOptions,
    compile_options: CompileOptions,
    rng: ObfuscationRng,
    names: NameGenerator,
    map: Option<Arc<OpcodeMap>>,
    runtime: Option<RuntimeNames>,
    next_artifact: u32,
}

impl std::fmt::Debug for VirtualizeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualizeContext")
            .field("options", &self.options)
            .field("has_mapping", &self.map.is_some())
            .field("next_artifact", &self.next_artifact)
            .finish()
    }
}

impl VirtualizeContext {
    /// Create a context; the seed in `options` fixes every random choice
    pub fn new(options: VirtualizeOptions) -> Self {
        let mut rng = match options.seed {
            Some(seed) => ObfuscationRng::from_seed(seed),
            None => ObfuscationRng::from_entropy(),
        };
        let mut names = NameGenerator::new(rng.fork());
        names.reserve_all(options.reserved_names.iter().cloned());
        Self {
            compile_options: options.compile_options(),
            options,
            rng,
            names,
            map: None,
            runtime: None,
            next_artifact: 0,
        }
    }

    /// Run options
    pub fn options(&self) -> &VirtualizeOptions {
        &self.options
    }

    /// Keep generated names clear of every identifier in `program`
    pub fn reserve_program(&mut self, program: &Program) {
        self.names.reserve_all(all_identifiers(program));
    }

    /// Keep generated names clear of `name`
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.names.reserve(name);
    }

    /// The run's opcode mapping, created on first use
    pub fn mapping(&mut self) -> Arc<OpcodeMap> {
        let rng = &mut self.rng;
        Arc::clone(self.map.get_or_insert_with(|| {
            let map = OpcodeMap::from_rng(rng);
            tracing::debug!(mask = map.mask(), "created opcode mapping");
            Arc::new(map)
        }))
    }

    /// Whether any function has been compiled yet
    pub fn has_mapping(&self) -> bool {
        self.map.is_some()
    }

    /// Names of the runtime and wrappers, generated on first use
    pub fn runtime_names(&mut self) -> &RuntimeNames {
        let names = &mut self.names;
        self.runtime.get_or_insert_with(|| RuntimeNames::generate(names))
    }

    /// A fresh identifier
    pub fn fresh_name(&mut self) -> String {
        self.names.fresh()
    }

    /// New environment slots for a nested compilation.
    ///
    /// The object-rest helper is shared with the run's slots.
    pub fn fresh_slots(&mut self) -> EnvSlots {
        let rest_helper = self.runtime_names().slots.rest_helper.clone();
        EnvSlots {
            rest_helper,
            ..EnvSlots::generate(&mut self.names)
        }
    }

    /// Compile `function` against `slots`
    pub fn compile(&mut self, function: &Function, slots: &EnvSlots) -> CompileResult<CompiledFunction> {
        let map = self.mapping();
        let mut ctx = CompileContext {
            map: &map,
            rng: &mut self.rng,
            names: &mut self.names,
            options: &self.compile_options,
            slots,
        };
        compile_function(function, &mut ctx)
    }

    /// Encode `payload` under a new artifact id
    pub fn encode(&mut self, payload: &Payload) -> CodecResult<(u32, WireBundle)> {
        let id = self.next_artifact;
        self.next_artifact += 1;
        let bundle = encode(payload, &mut self.rng)?;
        tracing::trace!(id, kind = ?payload.kind(), shards = bundle.shards.len(), "encoded artifact");
        Ok((id, bundle))
    }

    /// Initializer for an instruction tape: a bundle call or a literal
    pub fn code_init(&mut self, code: &[u32]) -> CodecResult<Expr> {
        if !self.options.encode_bytecode {
            return Ok(code_literal(code));
        }
        self.bundle_expr(&Payload::Code(code.to_vec()))
    }

    /// Initializer for a constant pool: a bundle call or a literal
    pub fn consts_init(&mut self, consts: &[Constant]) -> CodecResult<Expr> {
        if !self.options.encode_constants {
            return Ok(constants_literal(consts));
        }
        self.bundle_expr(&Payload::Constants(consts.to_vec()))
    }

    /// Initializer for the opcode table: a bundle call or a literal
    pub fn table_init(&mut self) -> CodecResult<Expr> {
        let map = self.mapping();
        if !self.options.encode_opcode_table {
            return Ok(opcode_table_literal(&map));
        }
        self.bundle_expr(&Payload::OpcodeTable((*map).clone()))
    }

    fn bundle_expr(&mut self, payload: &Payload) -> CodecResult<Expr> {
        let (id, bundle) = self.encode(payload)?;
        debug_assert_eq!(bundle.kind, payload.kind());
        let names = self.runtime_names().codec.clone();
        Ok(bundle_call(&names, &bundle, id))
    }

    /// Kind-checked decode of a payload produced by [`Self::encode`]
    pub fn decode_kind(bundle: &WireBundle, kind: ArtifactKind) -> CodecResult<Payload> {
        let payload = shroud_codec::decode(bundle)?;
        if payload.kind() != kind {
            return Err(shroud_codec::CodecError::malformed(format!(
                "expected {:?} payload, found {:?}",
                kind,
                payload.kind()
            )));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_created_once() {
        let mut ctx = VirtualizeContext::new(VirtualizeOptions::seeded(1));
        assert!(!ctx.has_mapping());
        let a = ctx.mapping();
        let b = ctx.mapping();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_bijection());
    }

    #[test]
    fn test_same_seed_same_choices() {
        let mut a = VirtualizeContext::new(VirtualizeOptions::seeded(7));
        let mut b = VirtualizeContext::new(VirtualizeOptions::seeded(7));
        assert_eq!(*a.mapping(), *b.mapping());
        assert_eq!(a.runtime_names(), b.runtime_names());
    }

    #[test]
    fn test_reserved_names_are_never_generated() {
        let mut ctx = VirtualizeContext::new(VirtualizeOptions::seeded(3));
        let taken: Vec<String> = (0..50).map(|_| ctx.fresh_name()).collect();

        let options = VirtualizeOptions {
            reserved_names: taken.clone(),
            ..VirtualizeOptions::seeded(3)
        };
        let mut ctx = VirtualizeContext::new(options);
        for _ in 0..50 {
            assert!(!taken.contains(&ctx.fresh_name()));
        }
    }

    #[test]
    fn test_fresh_slots_share_rest_helper() {
        let mut ctx = VirtualizeContext::new(VirtualizeOptions::seeded(4));
        let run = ctx.runtime_names().slots.clone();
        let nested = ctx.fresh_slots();
        assert_eq!(nested.rest_helper, run.rest_helper);
        assert_ne!(nested.env_param, run.env_param);
    }

    #[test]
    fn test_artifact_ids_increase() {
        let mut ctx = VirtualizeContext::new(VirtualizeOptions::seeded(5));
        let (first, _) = ctx.encode(&Payload::Code(vec![1, 2])).unwrap();
        let (second, bundle) = ctx.encode(&Payload::Code(vec![3])).unwrap();
        assert_eq!((first, second), (0, 1));
        let payload = VirtualizeContext::decode_kind(&bundle, ArtifactKind::Code).unwrap();
        assert_eq!(payload, Payload::Code(vec![3]));
        assert!(VirtualizeContext::decode_kind(&bundle, ArtifactKind::Constants).is_err());
    }
}
