//! Bytecode functions
//!
//! A [`FunctionTemplate`] is everything known about a compiled function at
//! build time. Instantiating it with a [`ScopeChain`] gives a
//! [`BytecodeFunction`] that can be stored in a function object and called.

use std::sync::Arc;

use shroud_vm_bytecode::{ClosureSource, CompiledUnit, Constant, OpcodeMap};

use crate::error::VmResult;
use crate::object::{JsObject, PropertyKey};
use crate::realm::Realm;
use crate::value::Value;

/// Objects consulted, innermost first, before the global object when a
/// global name is resolved
pub type ScopeChain = Arc<[Arc<JsObject>]>;

/// An empty scope chain
pub fn empty_scope() -> ScopeChain {
    Arc::from(Vec::new())
}

/// A tape ready for execution: unit, mapping and pre-built name keys
#[derive(Debug)]
pub struct Code {
    /// Encoded tape and constants
    pub unit: CompiledUnit,
    /// Mapping the tape was encoded with
    pub map: Arc<OpcodeMap>,
    keys: Vec<Option<PropertyKey>>,
}

impl Code {
    /// Prepare a unit for execution
    pub fn new(unit: CompiledUnit, map: Arc<OpcodeMap>) -> Self {
        let keys = unit
            .consts
            .iter()
            .map(|c| match c {
                Constant::String(s) => Some(PropertyKey::string(s)),
                _ => None,
            })
            .collect();
        Self { unit, map, keys }
    }

    /// Property key for the string constant `k`
    pub fn key(&self, k: u32) -> Option<&PropertyKey> {
        self.keys.get(k as usize).and_then(Option::as_ref)
    }
}

/// Environment keys reserved for `this`, `arguments` and `new.target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvKeys {
    /// Key holding `this`
    pub this: String,
    /// Key holding the arguments array
    pub arguments: String,
    /// Key holding `new.target`
    pub new_target: String,
}

/// A compiled function before it is bound to a scope
#[derive(Debug)]
pub struct FunctionTemplate {
    /// Function name, if any
    pub name: Option<String>,
    /// Executable tape
    pub code: Arc<Code>,
    /// Parameter names
    pub params: Vec<String>,
    /// Other environment locals, initially undefined
    pub locals: Vec<String>,
    /// Own name bound to the function object itself
    pub self_name: Option<String>,
    /// Runs on the asynchronous interpreter and returns a promise
    pub is_async: bool,
    /// Strict mode (`this` is not coerced to the global object)
    pub strict: bool,
    /// Whether `new` is allowed (false for arrows, methods and async functions)
    pub constructable: bool,
    /// Reserved environment keys
    pub keys: EnvKeys,
}

impl FunctionTemplate {
    /// Build the environment record for one call
    pub fn environment(
        &self,
        realm: &Realm,
        callee: &Value,
        this: Value,
        args: &[Value],
        new_target: Value,
    ) -> Arc<JsObject> {
        let env = JsObject::ordinary(None);
        env.define(&self.keys.this, this);
        env.define(&self.keys.arguments, Value::Object(realm.new_array(args.to_vec())));
        env.define(&self.keys.new_target, new_target);
        for (i, param) in self.params.iter().enumerate() {
            env.define(param, args.get(i).cloned().unwrap_or_default());
        }
        for local in &self.locals {
            env.define(local, Value::Undefined);
        }
        if let Some(name) = &self.self_name {
            env.define(name, callee.clone());
        }
        env
    }
}

/// A template bound to the scope it was created in
#[derive(Debug)]
pub struct BytecodeFunction {
    /// Compiled function
    pub template: Arc<FunctionTemplate>,
    /// Scope chain captured at creation
    pub scope: ScopeChain,
}

/// Materializes closure constants.
///
/// The interpreter only carries closure source; turning it into a callable
/// value is delegated so hosts can compile it however they like.
pub trait ClosureFactory: Send + Sync {
    /// Create the closure described by `source`, created inside a function
    /// whose environment record is `env` and whose scope chain is `scope`
    fn instantiate(
        &self,
        realm: &Realm,
        source: &ClosureSource,
        env: &Arc<JsObject>,
        scope: &ScopeChain,
    ) -> VmResult<Value>;
}
