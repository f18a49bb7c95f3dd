//! Realm: global object, intrinsics and the call machinery
//!
//! A [`Realm`] is a cheap-to-clone handle. Everything that runs script code
//! (calls, conversions that invoke `valueOf`, property access on
//! primitives) goes through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tokio::runtime::Handle;

use crate::error::{VmError, VmResult};
use crate::function::{BytecodeFunction, ClosureFactory, FunctionTemplate, ScopeChain};
use crate::interpreter::{Frame, run, run_async};
use crate::intrinsics::{self, Intrinsics};
use crate::object::{FunctionKind, JsObject, NativeFunction, ObjectKind, PropertyKey};
use crate::promise::JsPromise;
use crate::value::Value;

/// Maximum nesting of bytecode calls before a RangeError is raised
pub const MAX_CALL_DEPTH: usize = 128;

// Native stack kept free below each bytecode call, and the segment
// allocated when less than that remains.
const STACK_RED_ZONE: usize = 256 * 1024;
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// Error constructors known to the realm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `Error`
    Error,
    /// `TypeError`
    TypeError,
    /// `ReferenceError`
    ReferenceError,
    /// `RangeError`
    RangeError,
}

impl ErrorKind {
    /// Constructor name
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

struct RealmInner {
    global: Arc<JsObject>,
    intrinsics: Intrinsics,
    closure_factory: RwLock<Option<Arc<dyn ClosureFactory>>>,
    depth: AtomicUsize,
}

/// Execution realm shared by every function it runs
#[derive(Clone)]
pub struct Realm {
    inner: Arc<RealmInner>,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("depth", &self.inner.depth.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the call depth when a bytecode call finishes
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Realm {
    /// Create a realm with the standard globals installed
    pub fn new() -> Self {
        let intrinsics = Intrinsics::allocate();
        let global = JsObject::ordinary(Some(Arc::clone(&intrinsics.object_prototype)));
        let realm = Self {
            inner: Arc::new(RealmInner {
                global,
                intrinsics,
                closure_factory: RwLock::new(None),
                depth: AtomicUsize::new(0),
            }),
        };
        intrinsics::install(&realm);
        realm
    }

    /// The global object
    pub fn global(&self) -> &Arc<JsObject> {
        &self.inner.global
    }

    /// Built-in prototypes and well-known symbols
    pub fn intrinsics(&self) -> &Intrinsics {
        &self.inner.intrinsics
    }

    /// Install the host that turns closure constants into functions
    pub fn set_closure_factory(&self, factory: Arc<dyn ClosureFactory>) {
        *self.inner.closure_factory.write() = Some(factory);
    }

    /// Current closure factory
    pub fn closure_factory(&self) -> Option<Arc<dyn ClosureFactory>> {
        self.inner.closure_factory.read().clone()
    }

    /// Define a global binding
    pub fn define_global(&self, name: &str, value: Value) {
        self.inner.global.define(name, value);
    }

    /// Read a global binding
    pub fn global_value(&self, name: &str) -> Value {
        self.inner.global.get(&PropertyKey::from(name))
    }

    // ==================== Object creation ====================

    /// Create a plain object inheriting from `Object.prototype`
    pub fn new_object(&self) -> Arc<JsObject> {
        JsObject::ordinary(Some(Arc::clone(&self.intrinsics().object_prototype)))
    }

    /// Create an array
    pub fn new_array(&self, elements: Vec<Value>) -> Arc<JsObject> {
        JsObject::array(Some(Arc::clone(&self.intrinsics().array_prototype)), elements)
    }

    /// Wrap a promise in an object
    pub fn new_promise(&self, promise: Arc<JsPromise>) -> Arc<JsObject> {
        JsObject::new(
            ObjectKind::Promise(promise),
            Some(Arc::clone(&self.intrinsics().promise_prototype)),
        )
    }

    /// Create a native function object
    pub fn native_function<F>(&self, name: &str, length: usize, is_constructor: bool, func: F) -> Value
    where
        F: Fn(&Realm, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        Value::Object(self.native_object(name, length, is_constructor, func))
    }

    /// Like [`Realm::native_function`], returning the object itself
    pub fn native_object<F>(&self, name: &str, length: usize, is_constructor: bool, func: F) -> Arc<JsObject>
    where
        F: Fn(&Realm, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        let kind = FunctionKind::Native(NativeFunction {
            name: name.to_string(),
            func: Arc::new(func),
            is_constructor,
        });
        let obj = JsObject::new(
            ObjectKind::Function(kind),
            Some(Arc::clone(&self.intrinsics().function_prototype)),
        );
        obj.define("name", Value::string(name));
        obj.define("length", Value::Number(length as f64));
        obj
    }

    /// Bind a template to a scope chain, producing a function object
    pub fn instantiate(&self, template: Arc<FunctionTemplate>, scope: ScopeChain) -> Value {
        let name = template.name.clone().unwrap_or_default();
        let length = template.params.len();
        let constructable = template.constructable;
        let kind = FunctionKind::Bytecode(Arc::new(BytecodeFunction { template, scope }));
        let obj = JsObject::new(
            ObjectKind::Function(kind),
            Some(Arc::clone(&self.intrinsics().function_prototype)),
        );
        obj.define("name", Value::string(name));
        obj.define("length", Value::Number(length as f64));
        if constructable {
            obj.define("prototype", Value::Object(self.new_object()));
        }
        Value::Object(obj)
    }

    // ==================== Errors ====================

    /// Create an error object
    pub fn create_error(&self, kind: ErrorKind, message: &str) -> Arc<JsObject> {
        let intrinsics = self.intrinsics();
        let proto = match kind {
            ErrorKind::Error => &intrinsics.error_prototype,
            ErrorKind::TypeError => &intrinsics.type_error_prototype,
            ErrorKind::ReferenceError => &intrinsics.reference_error_prototype,
            ErrorKind::RangeError => &intrinsics.range_error_prototype,
        };
        let obj = JsObject::new(ObjectKind::Error, Some(Arc::clone(proto)));
        obj.define("message", Value::string(message));
        obj
    }

    /// The value script code observes for a catchable error; fatal errors
    /// are handed back unchanged
    pub fn error_value(&self, err: VmError) -> VmResult<Value> {
        let (kind, message) = match err {
            VmError::Exception(thrown) => return Ok(thrown.value),
            VmError::TypeError(m) => (ErrorKind::TypeError, m),
            VmError::ReferenceError(m) => (ErrorKind::ReferenceError, m),
            VmError::RangeError(m) => (ErrorKind::RangeError, m),
            fatal => return Err(fatal),
        };
        Ok(Value::Object(self.create_error(kind, &message)))
    }

    // ==================== Property access ====================

    /// `value[key]` for an already converted key
    pub fn get(&self, value: &Value, key: &PropertyKey) -> VmResult<Value> {
        let intrinsics = self.intrinsics();
        let proto = match value {
            Value::Object(obj) => return Ok(obj.get(key)),
            Value::Undefined | Value::Null => {
                return Err(VmError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    value.display_string(),
                    key
                )));
            }
            Value::String(s) => {
                if key.as_str() == Some("length") {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(index) = key.as_index() {
                    return Ok(s
                        .encode_utf16()
                        .nth(index)
                        .map(|unit| Value::string(String::from_utf16_lossy(&[unit])))
                        .unwrap_or_default());
                }
                &intrinsics.string_prototype
            }
            Value::Number(_) => &intrinsics.number_prototype,
            Value::Boolean(_) => &intrinsics.boolean_prototype,
            Value::Symbol(_) => &intrinsics.symbol_prototype,
        };
        Ok(proto.get(key))
    }

    /// `value[key]`
    pub fn get_value(&self, value: &Value, key: &Value) -> VmResult<Value> {
        if value.is_nullish() {
            return Err(VmError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                value.display_string(),
                key.display_string()
            )));
        }
        let key = self.to_property_key(key)?;
        self.get(value, &key)
    }

    /// `value[key] = v`; writes to primitives are dropped
    pub fn set_value(&self, value: &Value, key: &Value, v: Value) -> VmResult<()> {
        if value.is_nullish() {
            return Err(VmError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                value.display_string(),
                key.display_string()
            )));
        }
        let key = self.to_property_key(key)?;
        let Value::Object(obj) = value else {
            return Ok(());
        };
        if key.as_str() == Some("__proto__") {
            match v {
                Value::Object(proto) => obj.set_prototype(Some(proto)),
                Value::Null => obj.set_prototype(None),
                _ => {}
            }
            return Ok(());
        }
        obj.set(key, v)
    }

    // ==================== Calls ====================

    /// Call `callee` with an explicit receiver
    pub fn call(&self, callee: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        let function = callee.as_object().and_then(|obj| obj.function());
        match function {
            Some(FunctionKind::Native(native)) => (native.func)(self, &this, args),
            Some(FunctionKind::Bytecode(func)) => self.call_bytecode(callee, func, this, args, Value::Undefined),
            None => Err(VmError::type_error(format!(
                "{} is not a function",
                callee.display_string()
            ))),
        }
    }

    /// `new ctor(...args)`
    pub fn construct(&self, ctor: &Value, args: &[Value]) -> VmResult<Value> {
        let not_constructor = || VmError::type_error(format!("{} is not a constructor", ctor.display_string()));
        let Some(obj) = ctor.as_object() else {
            return Err(not_constructor());
        };
        match obj.function() {
            Some(FunctionKind::Native(native)) if native.is_constructor => {
                (native.func)(self, &Value::Undefined, args)
            }
            Some(FunctionKind::Bytecode(func)) if func.template.constructable => {
                let proto = match obj.get(&PropertyKey::from("prototype")) {
                    Value::Object(p) => p,
                    _ => Arc::clone(&self.intrinsics().object_prototype),
                };
                let this = Value::Object(JsObject::ordinary(Some(proto)));
                let result = self.call_bytecode(ctor, func, this.clone(), args, ctor.clone())?;
                Ok(if result.is_object() { result } else { this })
            }
            _ => Err(not_constructor()),
        }
    }

    fn call_bytecode(
        &self,
        callee: &Value,
        func: &Arc<BytecodeFunction>,
        this: Value,
        args: &[Value],
        new_target: Value,
    ) -> VmResult<Value> {
        let template = &func.template;
        let this = if template.strict || !this.is_nullish() {
            this
        } else {
            Value::Object(Arc::clone(self.global()))
        };
        let env = template.environment(self, callee, this, args, new_target);
        let mut frame = Frame::new(Arc::clone(&template.code), env, Arc::clone(&func.scope));
        if template.is_async {
            return Ok(self.start_async(frame));
        }
        let _guard = self.enter_call()?;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || run(self, &mut frame))
    }

    fn enter_call(&self) -> VmResult<DepthGuard<'_>> {
        let depth = self.inner.depth.fetch_add(1, Ordering::Relaxed);
        let guard = DepthGuard(&self.inner.depth);
        if depth >= MAX_CALL_DEPTH {
            return Err(VmError::range_error("Maximum call stack size exceeded"));
        }
        Ok(guard)
    }

    // ==================== Async ====================

    /// Run an async frame, returning its promise.
    ///
    /// Inside a Tokio runtime the frame becomes a task; otherwise it is
    /// driven to completion on a private current-thread runtime.
    fn start_async(&self, frame: Frame) -> Value {
        let promise = Arc::new(JsPromise::new());
        let object = Value::Object(self.new_promise(Arc::clone(&promise)));
        let realm = self.clone();
        let settle = Arc::clone(&promise);
        let task = async move {
            let outcome = realm.complete_async(frame).await;
            match outcome {
                Ok(value) => settle.resolve(value),
                Err(reason) => settle.reject(reason),
            }
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(task),
                Err(err) => {
                    tracing::error!(error = %err, "failed to start runtime for async function");
                    let reason = self.create_error(ErrorKind::Error, &err.to_string());
                    promise.reject(Value::Object(reason));
                }
            },
        }
        object
    }

    async fn complete_async(&self, mut frame: Frame) -> Result<Value, Value> {
        match run_async(self, &mut frame).await {
            Ok(value) => match value.as_object().and_then(|o| o.promise()).cloned() {
                Some(inner) => inner.settled().await,
                None => Ok(value),
            },
            Err(err) => match self.error_value(err) {
                Ok(reason) => Err(reason),
                Err(fatal) => {
                    tracing::error!(error = %fatal, "async function aborted");
                    Err(Value::Object(self.create_error(ErrorKind::Error, &fatal.to_string())))
                }
            },
        }
    }

    /// Wait for `value` when it is a promise; a rejection becomes an
    /// exception
    pub async fn settle(&self, value: Value) -> VmResult<Value> {
        match value.as_object().and_then(|o| o.promise()).cloned() {
            Some(promise) => promise.settled().await.map_err(VmError::exception),
            None => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_from_undefined_is_type_error() {
        let realm = Realm::new();
        let err = realm.get_value(&Value::Undefined, &Value::string("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot read properties of undefined (reading 'x')"
        );
    }

    #[test]
    fn test_string_indexing() {
        let realm = Realm::new();
        let s = Value::string("héllo");
        assert_eq!(realm.get_value(&s, &Value::string("length")).unwrap().as_number(), Some(5.0));
        assert_eq!(realm.get_value(&s, &Value::Number(1.0)).unwrap().as_str(), Some("é"));
        assert!(realm.get_value(&s, &Value::Number(9.0)).unwrap().is_undefined());
    }

    #[test]
    fn test_proto_assignment() {
        let realm = Realm::new();
        let proto = realm.new_object();
        proto.define("inherited", Value::Boolean(true));
        let obj = Value::Object(realm.new_object());
        realm
            .set_value(&obj, &Value::string("__proto__"), Value::Object(proto))
            .unwrap();
        let got = realm.get_value(&obj, &Value::string("inherited")).unwrap();
        assert!(got.to_boolean());
    }

    #[test]
    fn test_catchable_errors_become_objects() {
        let realm = Realm::new();
        let value = realm.error_value(VmError::type_error("bad")).unwrap();
        assert_eq!(value.display_string(), "TypeError: bad");
        assert!(realm.error_value(VmError::internal("boom")).is_err());
    }

    #[test]
    fn test_native_call() {
        let realm = Realm::new();
        let double = realm.native_function("double", 1, false, |realm, _this, args| {
            let n = realm.to_number(args.first().unwrap_or(&Value::Undefined))?;
            Ok(Value::Number(n * 2.0))
        });
        let out = realm.call(&double, Value::Undefined, &[Value::Number(4.0)]).unwrap();
        assert_eq!(out.as_number(), Some(8.0));
        assert!(realm.call(&Value::Number(1.0), Value::Undefined, &[]).is_err());
    }
}
