//! Execution harness
//!
//! Runs virtualized functions on the reference interpreter of
//! `shroud-vm-core` instead of a JavaScript engine. Loading a function goes
//! through the same steps the pass takes (compile with the run's mapping
//! and slots, encode each artifact when enabled) and then decodes the
//! artifacts again, so a passing call also exercises the codec.
//!
//! Closure constants are compiled on demand by [`HarnessFactory`], which
//! shares the run's [`VirtualizeContext`] behind a mutex.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use shroud_ast::{Expr, Function};
use shroud_codec::{DecodeCache, Payload};
use shroud_vm_bytecode::{ClosureSource, CompiledUnit, Constant, OpcodeMap};
use shroud_vm_compiler::{CompiledFunction, EnvSlots};
use shroud_vm_core::{
    ClosureFactory, Code, EnvKeys, FunctionTemplate, JsObject, Realm, ScopeChain, Value, VmError, VmResult,
    empty_scope, rest_helper,
};

use crate::context::VirtualizeContext;
use crate::error::{EngineError, EngineResult};
use crate::options::VirtualizeOptions;

fn env_keys(slots: &EnvSlots) -> EnvKeys {
    EnvKeys {
        this: slots.this_slot.clone(),
        arguments: slots.arguments_slot.clone(),
        new_target: slots.new_target_slot.clone(),
    }
}

fn build_template(
    function: &Function,
    compiled: CompiledFunction,
    code: Code,
    slots: &EnvSlots,
    strict: bool,
    constructable: bool,
) -> FunctionTemplate {
    FunctionTemplate {
        name: function.id.clone(),
        code: Arc::new(code),
        params: compiled.params,
        locals: compiled.locals,
        self_name: compiled.self_name,
        is_async: compiled.is_async,
        strict,
        constructable,
        keys: env_keys(slots),
    }
}

// ============================================================================
// Closure factory
// ============================================================================

/// What is known about a closure constant from the compilation that
/// produced it
#[derive(Debug, Clone)]
struct ClosureEntry {
    expression: Arc<Expr>,
    /// Environment parameter of the creating function
    env_param: String,
    strict: bool,
}

/// Compiles closure constants to bytecode the first time they are created
#[derive(Debug)]
pub struct HarnessFactory {
    ctx: Arc<Mutex<VirtualizeContext>>,
    closures: Mutex<FxHashMap<String, ClosureEntry>>,
    templates: Mutex<FxHashMap<String, Arc<FunctionTemplate>>>,
}

impl HarnessFactory {
    /// Create a factory over a shared context
    pub fn new(ctx: Arc<Mutex<VirtualizeContext>>) -> Self {
        Self {
            ctx,
            closures: Mutex::new(FxHashMap::default()),
            templates: Mutex::new(FxHashMap::default()),
        }
    }

    /// Remember the closure constants of a freshly compiled unit
    fn record(&self, consts: &[Constant], env_param: &str, strict: bool) {
        let mut closures = self.closures.lock();
        for constant in consts {
            if let Constant::Closure(ClosureSource {
                source,
                expression: Some(expression),
            }) = constant
            {
                closures.entry(source.clone()).or_insert_with(|| ClosureEntry {
                    expression: Arc::clone(expression),
                    env_param: env_param.to_string(),
                    strict,
                });
            }
        }
    }

    /// Number of distinct closures compiled so far
    pub fn compiled_count(&self) -> usize {
        self.templates.lock().len()
    }

    fn template(&self, source: &str, entry: &ClosureEntry) -> VmResult<Arc<FunctionTemplate>> {
        if let Some(hit) = self.templates.lock().get(source) {
            return Ok(Arc::clone(hit));
        }

        // arrows arrive with `this`, `arguments` and `new.target` already
        // rewritten to environment slots
        let (function, is_arrow) = match &*entry.expression {
            Expr::Function(f) => ((**f).clone(), false),
            Expr::Arrow(f) => {
                let mut f = (**f).clone();
                f.is_arrow = false;
                f.expression_body = false;
                (f, true)
            }
            _ => return Err(VmError::internal("class and object closures cannot run in the harness")),
        };

        let (compiled, slots, map) = {
            let mut ctx = self.ctx.lock();
            let slots = ctx.fresh_slots();
            let compiled = ctx
                .compile(&function, &slots)
                .map_err(|e| VmError::internal(format!("closure: {e}")))?;
            (compiled, slots, ctx.mapping())
        };
        let strict = entry.strict || function.is_strict();
        self.record(&compiled.unit.consts, &slots.env_param, strict);

        let code = Code::new(compiled.unit.clone(), map);
        let constructable = !is_arrow && !function.is_async;
        let template = Arc::new(build_template(&function, compiled, code, &slots, strict, constructable));
        self.templates
            .lock()
            .insert(source.to_string(), Arc::clone(&template));
        Ok(template)
    }
}

impl ClosureFactory for HarnessFactory {
    fn instantiate(
        &self,
        realm: &Realm,
        source: &ClosureSource,
        env: &Arc<JsObject>,
        scope: &ScopeChain,
    ) -> VmResult<Value> {
        let entry = self
            .closures
            .lock()
            .get(&source.source)
            .cloned()
            .ok_or_else(|| VmError::internal("closure was not produced by this harness"))?;
        let template = self.template(&source.source, &entry)?;

        let binding = JsObject::ordinary(None);
        binding.define(&entry.env_param, Value::Object(Arc::clone(env)));
        let chain: Vec<Arc<JsObject>> = std::iter::once(binding).chain(scope.iter().cloned()).collect();
        Ok(realm.instantiate(template, Arc::from(chain)))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A realm plus a virtualization context
pub struct Harness {
    realm: Realm,
    ctx: Arc<Mutex<VirtualizeContext>>,
    factory: Arc<HarnessFactory>,
    cache: DecodeCache,
    table: Option<Arc<OpcodeMap>>,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("decoded", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Create a harness; the object-rest helper is installed as a global
    pub fn new(options: VirtualizeOptions) -> EngineResult<Self> {
        options.validate()?;
        let mut ctx = VirtualizeContext::new(options);
        let rest_name = ctx.runtime_names().slots.rest_helper.clone();

        let realm = Realm::new();
        realm.define_global(&rest_name, rest_helper(&realm));

        let ctx = Arc::new(Mutex::new(ctx));
        let factory = Arc::new(HarnessFactory::new(Arc::clone(&ctx)));
        realm.set_closure_factory(Arc::clone(&factory) as Arc<dyn ClosureFactory>);
        Ok(Self {
            realm,
            ctx,
            factory,
            cache: DecodeCache::new(),
            table: None,
        })
    }

    /// The realm functions run in
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// The closure factory installed in the realm
    pub fn factory(&self) -> &Arc<HarnessFactory> {
        &self.factory
    }

    /// Number of artifacts decoded so far
    pub fn decoded(&self) -> usize {
        self.cache.misses()
    }

    /// Define a global binding visible to loaded functions
    pub fn define_global(&self, name: &str, value: Value) {
        self.ctx.lock().reserve(name);
        self.realm.define_global(name, value);
    }

    /// Compile `function` and make it callable.
    ///
    /// Named functions are also defined as globals, so they can call each
    /// other and themselves.
    pub fn load(&mut self, function: &Function) -> EngineResult<Value> {
        let (compiled, slots, map) = {
            let mut ctx = self.ctx.lock();
            let slots = ctx.runtime_names().slots.clone();
            let compiled = ctx.compile(function, &slots)?;
            (compiled, slots, ctx.mapping())
        };
        let strict = function.is_strict();
        self.factory.record(&compiled.unit.consts, &slots.env_param, strict);

        let unit = self.round_trip(&compiled.unit)?;
        let map = self.opcode_table(map)?;
        let code = Code::new(unit, map);
        let template = build_template(function, compiled, code, &slots, strict, !function.is_async);

        let value = self.realm.instantiate(Arc::new(template), empty_scope());
        if let Some(name) = &function.id {
            self.realm.define_global(name, value.clone());
        }
        Ok(value)
    }

    /// Call a loaded function
    pub fn call(&self, function: &Value, this: Value, args: &[Value]) -> EngineResult<Value> {
        Ok(self.realm.call(function, this, args)?)
    }

    /// Call a loaded function and wait for its promise, if it returns one
    pub async fn call_async(&self, function: &Value, this: Value, args: &[Value]) -> EngineResult<Value> {
        let result = self.call(function, this, args)?;
        Ok(self.realm.settle(result).await?)
    }

    /// `new function(...args)`
    pub fn construct(&self, function: &Value, args: &[Value]) -> EngineResult<Value> {
        Ok(self.realm.construct(function, args)?)
    }

    // ==================== Codec round trip ====================

    fn encode_decode(&self, payload: Payload) -> EngineResult<Arc<Payload>> {
        let (id, bundle) = self.ctx.lock().encode(&payload)?;
        Ok(self.cache.get_or_decode(id, &bundle)?)
    }

    /// Pass the tape and constants through the codec when enabled
    fn round_trip(&self, unit: &CompiledUnit) -> EngineResult<CompiledUnit> {
        let options = self.ctx.lock().options().clone();
        let code = if options.encode_bytecode {
            match &*self.encode_decode(Payload::Code(unit.code.clone()))? {
                Payload::Code(code) => code.clone(),
                _ => return Err(EngineError::internal("decoded payload is not a tape")),
            }
        } else {
            unit.code.clone()
        };
        let consts = if options.encode_constants {
            match &*self.encode_decode(Payload::Constants(unit.consts.clone()))? {
                Payload::Constants(consts) => consts.clone(),
                _ => return Err(EngineError::internal("decoded payload is not a constant pool")),
            }
        } else {
            unit.consts.clone()
        };
        Ok(CompiledUnit::new(code, consts))
    }

    /// The mapping tapes are executed with, decoded once from its bundle
    /// when the table is encoded
    fn opcode_table(&mut self, map: Arc<OpcodeMap>) -> EngineResult<Arc<OpcodeMap>> {
        if let Some(table) = &self.table {
            return Ok(Arc::clone(table));
        }
        let encode_table = self.ctx.lock().options().encode_opcode_table;
        let table = if encode_table {
            match &*self.encode_decode(Payload::OpcodeTable((*map).clone()))? {
                Payload::OpcodeTable(decoded) => Arc::new(decoded.clone()),
                _ => return Err(EngineError::internal("decoded payload is not an opcode table")),
            }
        } else {
            map
        };
        self.table = Some(Arc::clone(&table));
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_ast::{BinaryOp, Pattern, Stmt};

    fn square() -> Function {
        Function {
            id: Some("square".into()),
            params: vec![Pattern::ident("n")],
            body: vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Mul,
                Expr::ident("n"),
                Expr::ident("n"),
            )))],
            ..Default::default()
        }
    }

    #[test]
    fn test_load_and_call() {
        let mut harness = Harness::new(VirtualizeOptions::seeded(1)).unwrap();
        let f = harness.load(&square()).unwrap();
        let out = harness.call(&f, Value::Undefined, &[Value::Number(7.0)]).unwrap();
        assert_eq!(out.as_number(), Some(49.0));
        assert!(harness.realm().global_value("square").is_callable());
    }

    #[test]
    fn test_encoded_artifacts_are_decoded() {
        let mut harness = Harness::new(VirtualizeOptions::seeded(2)).unwrap();
        harness.load(&square()).unwrap();
        // tape, constants and the opcode table
        assert_eq!(harness.decoded(), 3);

        let mut plain = Harness::new(VirtualizeOptions::seeded(2).without_encoding()).unwrap();
        plain.load(&square()).unwrap();
        assert_eq!(plain.decoded(), 0);
    }

    #[test]
    fn test_rest_helper_is_global() {
        let harness = Harness::new(VirtualizeOptions::seeded(3)).unwrap();
        let name = harness.ctx.lock().runtime_names().slots.rest_helper.clone();
        assert!(harness.realm().global_value(&name).is_callable());
    }
}
