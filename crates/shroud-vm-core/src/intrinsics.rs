//! Built-in objects
//!
//! The subset of the standard library that virtualized code and its tests
//! lean on: `Object`, `Function.prototype`, `Array`, the error
//! constructors, `Symbol`, `Promise`, `Math`, `String`, `Number`,
//! `Boolean`, `console` and a few global functions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;

use crate::convert::{number_to_string, to_int32};
use crate::error::{VmError, VmResult};
use crate::object::{JsObject, ObjectKind, PropertyKey};
use crate::promise::{JsPromise, PromiseState};
use crate::realm::{ErrorKind, Realm};
use crate::value::{JsSymbol, Value};

/// Built-in prototypes and well-known symbols
#[derive(Debug)]
pub struct Intrinsics {
    /// `Object.prototype`
    pub object_prototype: Arc<JsObject>,
    /// `Function.prototype`
    pub function_prototype: Arc<JsObject>,
    /// `Array.prototype`
    pub array_prototype: Arc<JsObject>,
    /// Prototype of iterators returned by built-ins
    pub iterator_prototype: Arc<JsObject>,
    /// `Error.prototype`
    pub error_prototype: Arc<JsObject>,
    /// `TypeError.prototype`
    pub type_error_prototype: Arc<JsObject>,
    /// `ReferenceError.prototype`
    pub reference_error_prototype: Arc<JsObject>,
    /// `RangeError.prototype`
    pub range_error_prototype: Arc<JsObject>,
    /// `String.prototype`
    pub string_prototype: Arc<JsObject>,
    /// `Number.prototype`
    pub number_prototype: Arc<JsObject>,
    /// `Boolean.prototype`
    pub boolean_prototype: Arc<JsObject>,
    /// `Symbol.prototype`
    pub symbol_prototype: Arc<JsObject>,
    /// `Promise.prototype`
    pub promise_prototype: Arc<JsObject>,
    /// `Symbol.iterator`
    pub iterator_symbol: Arc<JsSymbol>,
}

impl Intrinsics {
    /// Create the empty prototype objects, linked to each other
    pub fn allocate() -> Self {
        let object_prototype = JsObject::ordinary(None);
        let derived = || JsObject::ordinary(Some(Arc::clone(&object_prototype)));
        let error_prototype = derived();
        let error_derived = || JsObject::ordinary(Some(Arc::clone(&error_prototype)));
        Self {
            function_prototype: derived(),
            array_prototype: derived(),
            iterator_prototype: derived(),
            type_error_prototype: error_derived(),
            reference_error_prototype: error_derived(),
            range_error_prototype: error_derived(),
            string_prototype: derived(),
            number_prototype: derived(),
            boolean_prototype: derived(),
            symbol_prototype: derived(),
            promise_prototype: derived(),
            iterator_symbol: JsSymbol::new(Some("Symbol.iterator".to_string())),
            error_prototype,
            object_prototype,
        }
    }
}

type Native = fn(&Realm, &Value, &[Value]) -> VmResult<Value>;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn methods(realm: &Realm, target: &Arc<JsObject>, table: &[(&str, usize, Native)]) {
    for &(name, length, func) in table {
        target.define(name, realm.native_function(name, length, false, func));
    }
}

fn constructor(realm: &Realm, name: &str, length: usize, prototype: &Arc<JsObject>, func: Native) -> Arc<JsObject> {
    let ctor = realm.native_object(name, length, true, func);
    ctor.define("prototype", Value::Object(Arc::clone(prototype)));
    realm.define_global(name, Value::Object(Arc::clone(&ctor)));
    ctor
}

/// Populate the prototypes and the global object
pub fn install(realm: &Realm) {
    install_object(realm);
    install_function(realm);
    install_array(realm);
    install_errors(realm);
    install_symbol(realm);
    install_promise(realm);
    install_math(realm);
    install_string(realm);
    install_number_and_boolean(realm);
    install_globals(realm);
}

// ============================================================================
// Object
// ============================================================================

fn install_object(realm: &Realm) {
    let proto = &realm.intrinsics().object_prototype;
    let ctor = constructor(realm, "Object", 1, proto, object_ctor);
    methods(
        realm,
        &ctor,
        &[
            ("keys", 1, object_keys),
            ("create", 2, object_create),
            ("getPrototypeOf", 1, object_get_prototype_of),
        ],
    );
    methods(
        realm,
        proto,
        &[
            ("hasOwnProperty", 1, object_has_own_property),
            ("toString", 0, object_to_string),
            ("valueOf", 0, object_value_of),
        ],
    );
}

fn object_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    match arg(args, 0) {
        value @ Value::Object(_) => Ok(value),
        _ => Ok(Value::Object(realm.new_object())),
    }
}

fn require_object(value: &Value) -> VmResult<&Arc<JsObject>> {
    match value {
        Value::Object(obj) => Ok(obj),
        Value::Undefined | Value::Null => Err(VmError::type_error("Cannot convert undefined or null to object")),
        _ => Err(VmError::type_error(format!("{} is not an object", value.display_string()))),
    }
}

fn object_keys(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let target = arg(args, 0);
    let keys = match &target {
        Value::Object(obj) => obj
            .own_keys()
            .into_iter()
            .filter_map(|k| k.as_str().map(Value::string))
            .collect(),
        Value::Undefined | Value::Null => {
            return Err(VmError::type_error("Cannot convert undefined or null to object"));
        }
        _ => Vec::new(),
    };
    Ok(Value::Object(realm.new_array(keys)))
}

fn object_create(_realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let proto = match arg(args, 0) {
        Value::Object(p) => Some(p),
        Value::Null => None,
        other => {
            return Err(VmError::type_error(format!(
                "Object prototype may only be an Object or null: {}",
                other.display_string()
            )));
        }
    };
    Ok(Value::Object(JsObject::ordinary(proto)))
}

fn object_get_prototype_of(_realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let target = arg(args, 0);
    let obj = require_object(&target)?;
    Ok(obj.prototype().map(Value::Object).unwrap_or(Value::Null))
}

fn object_has_own_property(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let key = realm.to_property_key(&arg(args, 0))?;
    match this {
        Value::Object(obj) => Ok(Value::Boolean(obj.has_own(&key))),
        Value::Undefined | Value::Null => Err(VmError::type_error("Cannot convert undefined or null to object")),
        _ => Ok(Value::Boolean(false)),
    }
}

fn object_to_string(_realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let tag = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Boolean(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Symbol(_) => "Symbol",
        Value::Object(obj) => obj.kind_name(),
    };
    Ok(Value::string(format!("[object {}]", tag)))
}

fn object_value_of(_realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(this.clone())
}

// ============================================================================
// Function.prototype
// ============================================================================

fn install_function(realm: &Realm) {
    methods(
        realm,
        &realm.intrinsics().function_prototype,
        &[("call", 1, function_call), ("apply", 2, function_apply)],
    );
}

fn function_call(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let rest = args.get(1..).unwrap_or(&[]);
    realm.call(this, arg(args, 0), rest)
}

fn function_apply(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let list = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        Value::Object(obj) if obj.is_array() => obj.elements(),
        _ => return Err(VmError::type_error("CreateListFromArrayLike called on non-object")),
    };
    realm.call(this, arg(args, 0), &list)
}

// ============================================================================
// Array
// ============================================================================

fn install_array(realm: &Realm) {
    let intrinsics = realm.intrinsics();
    let proto = &intrinsics.array_prototype;
    let ctor = constructor(realm, "Array", 1, proto, array_ctor);
    methods(realm, &ctor, &[("isArray", 1, array_is_array)]);
    methods(
        realm,
        proto,
        &[
            ("push", 1, array_push),
            ("pop", 0, array_pop),
            ("slice", 2, array_slice),
            ("indexOf", 1, array_index_of),
            ("includes", 1, array_includes),
            ("join", 1, array_join),
            ("map", 1, array_map),
            ("forEach", 1, array_for_each),
            ("filter", 1, array_filter),
            ("toString", 0, array_to_string),
        ],
    );
    proto.define_key(
        PropertyKey::symbol(&intrinsics.iterator_symbol),
        realm.native_function("[Symbol.iterator]", 0, false, array_values),
    );
    intrinsics.iterator_prototype.define_key(
        PropertyKey::symbol(&intrinsics.iterator_symbol),
        realm.native_function("[Symbol.iterator]", 0, false, object_value_of),
    );
}

fn this_array<'a>(this: &'a Value, method: &str) -> VmResult<&'a Arc<JsObject>> {
    match this {
        Value::Object(obj) if obj.is_array() => Ok(obj),
        _ => Err(VmError::type_error(format!(
            "Array.prototype.{} called on non-array",
            method
        ))),
    }
}

/// Resolve a relative index argument against `len`
fn relative_index(realm: &Realm, value: &Value, len: usize, default: usize) -> VmResult<usize> {
    if value.is_undefined() {
        return Ok(default);
    }
    let n = realm.to_number(value)?;
    let len = len as f64;
    let index = if n.is_nan() {
        0.0
    } else if n < 0.0 {
        (len + n.trunc()).max(0.0)
    } else {
        n.trunc().min(len)
    };
    Ok(index as usize)
}

fn array_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    if let [Value::Number(n)] = args {
        if *n < 0.0 || n.fract() != 0.0 || *n >= u32::MAX as f64 {
            return Err(VmError::range_error("Invalid array length"));
        }
        return Ok(Value::Object(realm.new_array(vec![Value::Undefined; *n as usize])));
    }
    Ok(Value::Object(realm.new_array(args.to_vec())))
}

fn array_is_array(_realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Boolean(arg(args, 0).as_object().is_some_and(|o| o.is_array())))
}

fn array_push(_realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let array = this_array(this, "push")?;
    let mut len = array.len();
    for value in args {
        len = array.push(value.clone());
    }
    Ok(Value::Number(len as f64))
}

fn array_pop(_realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(this_array(this, "pop")?.pop().unwrap_or_default())
}

fn array_slice(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let elements = this_array(this, "slice")?.elements();
    let start = relative_index(realm, &arg(args, 0), elements.len(), 0)?;
    let end = relative_index(realm, &arg(args, 1), elements.len(), elements.len())?;
    let out = elements.get(start..end.max(start)).unwrap_or(&[]).to_vec();
    Ok(Value::Object(realm.new_array(out)))
}

fn array_index_of(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let elements = this_array(this, "indexOf")?.elements();
    let needle = arg(args, 0);
    let from = relative_index(realm, &arg(args, 1), elements.len(), 0)?;
    let found = elements
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, v)| v.strict_equals(&needle))
        .map_or(-1.0, |(i, _)| i as f64);
    Ok(Value::Number(found))
}

fn array_includes(_realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let elements = this_array(this, "includes")?.elements();
    let needle = arg(args, 0);
    let same_value_zero = |v: &Value| match (v, &needle) {
        (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
        _ => v.strict_equals(&needle),
    };
    Ok(Value::Boolean(elements.iter().any(same_value_zero)))
}

fn join(realm: &Realm, elements: &[Value], separator: &str) -> VmResult<String> {
    let mut out = String::new();
    for (i, value) in elements.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        if !value.is_nullish() {
            out.push_str(&realm.to_string(value)?);
        }
    }
    Ok(out)
}

fn array_join(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let elements = this_array(this, "join")?.elements();
    let separator = match arg(args, 0) {
        Value::Undefined => Arc::from(","),
        other => realm.to_string(&other)?,
    };
    Ok(Value::string(join(realm, &elements, &separator)?))
}

fn array_to_string(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let elements = this_array(this, "toString")?.elements();
    Ok(Value::string(join(realm, &elements, ",")?))
}

/// Run `callback(element, index, array)` over a snapshot of the elements
fn each(
    realm: &Realm,
    this: &Value,
    args: &[Value],
    method: &str,
    mut f: impl FnMut(Value, Value) -> VmResult<()>,
) -> VmResult<()> {
    let array = this_array(this, method)?;
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(VmError::type_error(format!(
            "{} is not a function",
            callback.display_string()
        )));
    }
    let receiver = arg(args, 1);
    for (i, element) in array.elements().into_iter().enumerate() {
        let result = realm.call(
            &callback,
            receiver.clone(),
            &[element.clone(), Value::Number(i as f64), this.clone()],
        )?;
        f(element, result)?;
    }
    Ok(())
}

fn array_map(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let mut out = Vec::new();
    each(realm, this, args, "map", |_, result| {
        out.push(result);
        Ok(())
    })?;
    Ok(Value::Object(realm.new_array(out)))
}

fn array_for_each(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    each(realm, this, args, "forEach", |_, _| Ok(()))?;
    Ok(Value::Undefined)
}

fn array_filter(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let mut out = Vec::new();
    each(realm, this, args, "filter", |element, keep| {
        if keep.to_boolean() {
            out.push(element);
        }
        Ok(())
    })?;
    Ok(Value::Object(realm.new_array(out)))
}

fn array_values(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let array = Arc::clone(this_array(this, "values")?);
    Ok(list_iterator(realm, array))
}

/// An iterator over the live elements of `array`
fn list_iterator(realm: &Realm, array: Arc<JsObject>) -> Value {
    let cursor = AtomicUsize::new(0);
    let iterator = JsObject::ordinary(Some(Arc::clone(&realm.intrinsics().iterator_prototype)));
    let next = realm.native_function("next", 0, false, move |realm, _this, _args| {
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        let result = realm.new_object();
        match array.element(index) {
            Some(value) => {
                result.define("value", value);
                result.define("done", Value::Boolean(false));
            }
            None => {
                result.define("value", Value::Undefined);
                result.define("done", Value::Boolean(true));
            }
        }
        Ok(Value::Object(result))
    });
    iterator.define("next", next);
    Value::Object(iterator)
}

// ============================================================================
// Errors
// ============================================================================

fn install_errors(realm: &Realm) {
    let intrinsics = realm.intrinsics();
    let kinds: [(ErrorKind, &Arc<JsObject>, Native); 4] = [
        (ErrorKind::Error, &intrinsics.error_prototype, error_ctor),
        (ErrorKind::TypeError, &intrinsics.type_error_prototype, type_error_ctor),
        (ErrorKind::ReferenceError, &intrinsics.reference_error_prototype, reference_error_ctor),
        (ErrorKind::RangeError, &intrinsics.range_error_prototype, range_error_ctor),
    ];
    for (kind, proto, ctor) in kinds {
        proto.define("name", Value::string(kind.name()));
        proto.define("message", Value::string(""));
        constructor(realm, kind.name(), 1, proto, ctor);
    }
    methods(realm, &intrinsics.error_prototype, &[("toString", 0, error_to_string)]);
}

fn make_error(realm: &Realm, kind: ErrorKind, args: &[Value]) -> VmResult<Value> {
    let message = match arg(args, 0) {
        Value::Undefined => Arc::from(""),
        other => realm.to_string(&other)?,
    };
    let error = realm.create_error(kind, &message);
    if message.is_empty() {
        error.define("message", Value::string(""));
    }
    Ok(Value::Object(error))
}

fn error_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    make_error(realm, ErrorKind::Error, args)
}

fn type_error_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    make_error(realm, ErrorKind::TypeError, args)
}

fn reference_error_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    make_error(realm, ErrorKind::ReferenceError, args)
}

fn range_error_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    make_error(realm, ErrorKind::RangeError, args)
}

fn error_to_string(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let obj = require_object(this)?;
    let field = |name: &str, default: &str| -> VmResult<String> {
        match obj.get(&PropertyKey::from(name)) {
            Value::Undefined => Ok(default.to_string()),
            other => Ok(realm.to_string(&other)?.to_string()),
        }
    };
    let name = field("name", "Error")?;
    let message = field("message", "")?;
    Ok(Value::string(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }))
}

// ============================================================================
// Symbol
// ============================================================================

fn install_symbol(realm: &Realm) {
    let intrinsics = realm.intrinsics();
    let ctor = realm.native_object("Symbol", 0, false, symbol_ctor);
    ctor.define("prototype", Value::Object(Arc::clone(&intrinsics.symbol_prototype)));
    ctor.define("iterator", Value::Symbol(Arc::clone(&intrinsics.iterator_symbol)));
    realm.define_global("Symbol", Value::Object(ctor));
    methods(realm, &intrinsics.symbol_prototype, &[("toString", 0, symbol_to_string)]);
}

fn symbol_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let description = match arg(args, 0) {
        Value::Undefined => None,
        other => Some(realm.to_string(&other)?.to_string()),
    };
    Ok(Value::Symbol(JsSymbol::new(description)))
}

fn symbol_to_string(_realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Symbol(_) => Ok(Value::string(this.display_string())),
        _ => Err(VmError::type_error("Symbol.prototype.toString requires that 'this' be a Symbol")),
    }
}

// ============================================================================
// Promise
// ============================================================================

fn install_promise(realm: &Realm) {
    let proto = &realm.intrinsics().promise_prototype;
    let ctor = constructor(realm, "Promise", 1, proto, promise_ctor);
    methods(
        realm,
        &ctor,
        &[("resolve", 1, promise_resolve), ("reject", 1, promise_reject)],
    );
    methods(
        realm,
        proto,
        &[("then", 2, promise_then), ("catch", 1, promise_catch)],
    );
}

fn promise_of(value: &Value) -> Option<Arc<JsPromise>> {
    value.as_object().and_then(|o| o.promise()).cloned()
}

/// Settle `target` the way `source` settles
fn adopt(target: Arc<JsPromise>, source: Arc<JsPromise>) {
    match source.state() {
        PromiseState::Fulfilled(value) => target.resolve(value),
        PromiseState::Rejected(reason) => target.reject(reason),
        PromiseState::Pending => match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match source.settled().await {
                        Ok(value) => target.resolve(value),
                        Err(reason) => target.reject(reason),
                    }
                });
            }
            Err(_) => tracing::warn!("pending promise adopted outside a runtime; it will never settle"),
        },
    }
}

/// Resolve `target` with `value`, following promises
fn resolve_with(target: Arc<JsPromise>, value: Value) {
    match promise_of(&value) {
        Some(source) => adopt(target, source),
        None => target.resolve(value),
    }
}

fn promise_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let executor = arg(args, 0);
    if !executor.is_callable() {
        return Err(VmError::type_error(format!(
            "Promise resolver {} is not a function",
            executor.display_string()
        )));
    }
    let promise = Arc::new(JsPromise::new());
    let resolve = {
        let promise = Arc::clone(&promise);
        realm.native_function("resolve", 1, false, move |_realm, _this, args| {
            resolve_with(Arc::clone(&promise), arg(args, 0));
            Ok(Value::Undefined)
        })
    };
    let reject = {
        let promise = Arc::clone(&promise);
        realm.native_function("reject", 1, false, move |_realm, _this, args| {
            promise.reject(arg(args, 0));
            Ok(Value::Undefined)
        })
    };
    if let Err(err) = realm.call(&executor, Value::Undefined, &[resolve, reject]) {
        promise.reject(realm.error_value(err)?);
    }
    Ok(Value::Object(realm.new_promise(promise)))
}

fn promise_resolve(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let value = arg(args, 0);
    if promise_of(&value).is_some() {
        return Ok(value);
    }
    Ok(Value::Object(realm.new_promise(Arc::new(JsPromise::fulfilled(value)))))
}

fn promise_reject(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let promise = JsPromise::rejected(arg(args, 0));
    Ok(Value::Object(realm.new_promise(Arc::new(promise))))
}

/// Run the matching reaction once `source` settles and feed its result
/// into `derived`
fn react(realm: &Realm, source: &JsPromise, derived: &Arc<JsPromise>, on_fulfilled: &Value, on_rejected: &Value) {
    let (handler, outcome, rejected) = match source.state() {
        PromiseState::Fulfilled(value) => (on_fulfilled, value, false),
        PromiseState::Rejected(reason) => (on_rejected, reason, true),
        PromiseState::Pending => return,
    };
    if !handler.is_callable() {
        if rejected {
            derived.reject(outcome);
        } else {
            derived.resolve(outcome);
        }
        return;
    }
    match realm.call(handler, Value::Undefined, &[outcome]) {
        Ok(value) => resolve_with(Arc::clone(derived), value),
        Err(err) => match realm.error_value(err) {
            Ok(reason) => derived.reject(reason),
            Err(fatal) => {
                tracing::error!(error = %fatal, "promise reaction aborted");
                derived.reject(Value::Object(realm.create_error(ErrorKind::Error, &fatal.to_string())));
            }
        },
    }
}

fn promise_then(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let source = promise_of(this)
        .ok_or_else(|| VmError::type_error("Promise.prototype.then called on a non-promise"))?;
    let derived = Arc::new(JsPromise::new());
    let (on_fulfilled, on_rejected) = (arg(args, 0), arg(args, 1));
    match Handle::try_current() {
        Ok(handle) => {
            let realm = realm.clone();
            let derived = Arc::clone(&derived);
            handle.spawn(async move {
                // reactions never run in the same turn that registered them
                let _ = source.settled().await;
                tokio::task::yield_now().await;
                react(&realm, &source, &derived, &on_fulfilled, &on_rejected);
            });
        }
        Err(_) if source.state().is_settled() => react(realm, &source, &derived, &on_fulfilled, &on_rejected),
        Err(_) => tracing::warn!("then() on a pending promise outside a runtime; the reaction is dropped"),
    }
    Ok(Value::Object(realm.new_promise(derived)))
}

fn promise_catch(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    promise_then(realm, this, &[Value::Undefined, arg(args, 0)])
}

// ============================================================================
// Math
// ============================================================================

fn install_math(realm: &Realm) {
    let math = realm.new_object();
    math.define("PI", Value::Number(std::f64::consts::PI));
    methods(
        realm,
        &math,
        &[
            ("abs", 1, math_abs),
            ("floor", 1, math_floor),
            ("ceil", 1, math_ceil),
            ("round", 1, math_round),
            ("trunc", 1, math_trunc),
            ("sqrt", 1, math_sqrt),
            ("pow", 2, math_pow),
            ("max", 2, math_max),
            ("min", 2, math_min),
        ],
    );
    realm.define_global("Math", Value::Object(math));
}

fn number_arg(realm: &Realm, args: &[Value], index: usize) -> VmResult<f64> {
    realm.to_number(&arg(args, index))
}

fn math_abs(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Number(number_arg(realm, args, 0)?.abs()))
}

fn math_floor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Number(number_arg(realm, args, 0)?.floor()))
}

fn math_ceil(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Number(number_arg(realm, args, 0)?.ceil()))
}

fn math_round(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let n = number_arg(realm, args, 0)?;
    // halves round toward +Infinity
    Ok(Value::Number(if n.is_finite() { (n + 0.5).floor() } else { n }))
}

fn math_trunc(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Number(number_arg(realm, args, 0)?.trunc()))
}

fn math_sqrt(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Number(number_arg(realm, args, 0)?.sqrt()))
}

fn math_pow(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    realm.binary(
        shroud_vm_bytecode::BinaryOperator::Exp,
        &Value::Number(number_arg(realm, args, 0)?),
        &Value::Number(number_arg(realm, args, 1)?),
    )
}

fn math_extreme(realm: &Realm, args: &[Value], pick_max: bool) -> VmResult<Value> {
    let mut acc = if pick_max { f64::NEG_INFINITY } else { f64::INFINITY };
    for value in args {
        let n = realm.to_number(value)?;
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        acc = if pick_max { acc.max(n) } else { acc.min(n) };
    }
    Ok(Value::Number(acc))
}

fn math_max(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    math_extreme(realm, args, true)
}

fn math_min(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    math_extreme(realm, args, false)
}

// ============================================================================
// String
// ============================================================================

fn install_string(realm: &Realm) {
    let intrinsics = realm.intrinsics();
    let proto = &intrinsics.string_prototype;
    let ctor = realm.native_object("String", 1, false, string_ctor);
    ctor.define("prototype", Value::Object(Arc::clone(proto)));
    methods(realm, &ctor, &[("fromCharCode", 1, string_from_char_code)]);
    realm.define_global("String", Value::Object(ctor));
    methods(
        realm,
        proto,
        &[
            ("charAt", 1, string_char_at),
            ("charCodeAt", 1, string_char_code_at),
            ("indexOf", 1, string_index_of),
            ("slice", 2, string_slice),
            ("split", 2, string_split),
            ("toUpperCase", 0, string_to_upper_case),
            ("toLowerCase", 0, string_to_lower_case),
            ("toString", 0, string_value_of),
            ("valueOf", 0, string_value_of),
        ],
    );
    proto.define_key(
        PropertyKey::symbol(&intrinsics.iterator_symbol),
        realm.native_function("[Symbol.iterator]", 0, false, string_iterator),
    );
}

fn this_string(realm: &Realm, this: &Value, method: &str) -> VmResult<Arc<str>> {
    if this.is_nullish() {
        return Err(VmError::type_error(format!(
            "String.prototype.{} called on null or undefined",
            method
        )));
    }
    realm.to_string(this)
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn string_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    if args.is_empty() {
        return Ok(Value::string(""));
    }
    Ok(Value::String(realm.string_of(&args[0])?))
}

fn string_from_char_code(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let mut code_units = Vec::with_capacity(args.len());
    for value in args {
        code_units.push(to_int32(realm.to_number(value)?) as u16);
    }
    Ok(Value::string(String::from_utf16_lossy(&code_units)))
}

fn string_char_at(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = units(&this_string(realm, this, "charAt")?);
    let index = number_arg(realm, args, 0)?;
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    if index < 0.0 || index >= s.len() as f64 {
        return Ok(Value::string(""));
    }
    Ok(Value::string(String::from_utf16_lossy(&s[index as usize..index as usize + 1])))
}

fn string_char_code_at(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = units(&this_string(realm, this, "charCodeAt")?);
    let index = number_arg(realm, args, 0)?;
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    if index < 0.0 || index >= s.len() as f64 {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(f64::from(s[index as usize])))
}

fn string_index_of(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = units(&this_string(realm, this, "indexOf")?);
    let needle = units(&realm.to_string(&arg(args, 0))?);
    let from = relative_index(realm, &arg(args, 1), s.len(), 0)?;
    let from = if arg(args, 1).as_number().is_some_and(|n| n < 0.0) { 0 } else { from };
    let found = (from..=s.len().saturating_sub(needle.len()))
        .find(|&i| i + needle.len() <= s.len() && s[i..i + needle.len()] == needle[..])
        .map_or(-1.0, |i| i as f64);
    Ok(Value::Number(found))
}

fn string_slice(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = units(&this_string(realm, this, "slice")?);
    let start = relative_index(realm, &arg(args, 0), s.len(), 0)?;
    let end = relative_index(realm, &arg(args, 1), s.len(), s.len())?;
    let slice = s.get(start..end.max(start)).unwrap_or(&[]);
    Ok(Value::string(String::from_utf16_lossy(slice)))
}

fn string_split(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let s = this_string(realm, this, "split")?;
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => vec![Value::String(s)],
        separator => {
            let separator = realm.to_string(&separator)?;
            if separator.is_empty() {
                units(&s)
                    .chunks(1)
                    .map(|unit| Value::string(String::from_utf16_lossy(unit)))
                    .collect()
            } else {
                s.split(&*separator).map(Value::string).collect()
            }
        }
    };
    Ok(Value::Object(realm.new_array(parts)))
}

fn string_to_upper_case(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::string(this_string(realm, this, "toUpperCase")?.to_uppercase()))
}

fn string_to_lower_case(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    Ok(Value::string(this_string(realm, this, "toLowerCase")?.to_lowercase()))
}

fn string_value_of(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::String(_) => Ok(this.clone()),
        _ => Ok(Value::String(this_string(realm, this, "valueOf")?)),
    }
}

fn string_iterator(realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let s = this_string(realm, this, "[Symbol.iterator]")?;
    let chars = s.chars().map(|c| Value::string(c.to_string())).collect();
    Ok(list_iterator(realm, realm.new_array(chars)))
}

// ============================================================================
// Number and Boolean
// ============================================================================

fn install_number_and_boolean(realm: &Realm) {
    let intrinsics = realm.intrinsics();
    let number = realm.native_object("Number", 1, false, number_ctor);
    number.define("prototype", Value::Object(Arc::clone(&intrinsics.number_prototype)));
    number.define("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0));
    realm.define_global("Number", Value::Object(number));
    methods(
        realm,
        &intrinsics.number_prototype,
        &[("toString", 1, number_to_string_method), ("valueOf", 0, object_value_of)],
    );

    let boolean = realm.native_object("Boolean", 1, false, boolean_ctor);
    boolean.define("prototype", Value::Object(Arc::clone(&intrinsics.boolean_prototype)));
    realm.define_global("Boolean", Value::Object(boolean));
    methods(
        realm,
        &intrinsics.boolean_prototype,
        &[("toString", 0, boolean_to_string), ("valueOf", 0, object_value_of)],
    );
}

fn number_ctor(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    if args.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(realm.to_number(&args[0])?))
}

fn number_to_string_method(realm: &Realm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Number(n) = this else {
        return Err(VmError::type_error("Number.prototype.toString requires that 'this' be a Number"));
    };
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        other => {
            let r = realm.to_number(&other)?;
            if !(2.0..=36.0).contains(&r) {
                return Err(VmError::range_error("toString() radix must be between 2 and 36"));
            }
            r as u32
        }
    };
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 || n.abs() >= 2f64.powi(53) {
        return Ok(Value::string(number_to_string(*n)));
    }
    let mut magnitude = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude /= u64::from(radix);
        if magnitude == 0 {
            break;
        }
    }
    if *n < 0.0 {
        digits.push('-');
    }
    Ok(Value::string(digits.iter().rev().collect::<String>()))
}

fn boolean_ctor(_realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Boolean(arg(args, 0).to_boolean()))
}

fn boolean_to_string(_realm: &Realm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Boolean(b) => Ok(Value::string(if *b { "true" } else { "false" })),
        _ => Err(VmError::type_error("Boolean.prototype.toString requires that 'this' be a Boolean")),
    }
}

// ============================================================================
// Globals
// ============================================================================

fn install_globals(realm: &Realm) {
    let global = realm.global();
    global.define("globalThis", Value::Object(Arc::clone(global)));
    global.define("undefined", Value::Undefined);
    global.define("NaN", Value::Number(f64::NAN));
    global.define("Infinity", Value::Number(f64::INFINITY));
    methods(
        realm,
        global,
        &[("isNaN", 1, global_is_nan), ("parseInt", 2, global_parse_int)],
    );
    let console = realm.new_object();
    methods(realm, &console, &[("log", 0, console_log)]);
    global.define("console", Value::Object(console));
}

fn global_is_nan(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    Ok(Value::Boolean(number_arg(realm, args, 0)?.is_nan()))
}

fn global_parse_int(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let text = realm.to_string(&arg(args, 0))?;
    let mut s = text.trim();
    let sign = if let Some(rest) = s.strip_prefix('-') {
        s = rest;
        -1.0
    } else {
        s = s.strip_prefix('+').unwrap_or(s);
        1.0
    };
    let mut radix = match arg(args, 1) {
        Value::Undefined => 0,
        other => to_int32(realm.to_number(&other)?),
    };
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix as u32)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix as u32))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    Ok(Value::Number(sign * value))
}

fn console_log(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let mut parts = Vec::with_capacity(args.len());
    for value in args {
        parts.push(match value {
            Value::Object(obj) if !matches!(obj.kind(), ObjectKind::Error) => value.display_string(),
            _ => realm.string_of(value)?.to_string(),
        });
    }
    tracing::info!(target: "shroud::console", "{}", parts.join(" "));
    Ok(Value::Undefined)
}

// ============================================================================
// Object rest
// ============================================================================

/// The object-rest helper: `(source, excluded)` returns a fresh object with
/// the own string-keyed properties of `source` whose keys are not listed in
/// the `excluded` array. Symbol keys are not copied.
pub fn rest_helper(realm: &Realm) -> Value {
    realm.native_function("rest", 2, false, object_rest)
}

fn object_rest(realm: &Realm, _this: &Value, args: &[Value]) -> VmResult<Value> {
    let source = arg(args, 0);
    let excluded: Vec<Arc<str>> = match arg(args, 1) {
        Value::Object(list) => list
            .elements()
            .iter()
            .map(|k| realm.to_string(k))
            .collect::<VmResult<_>>()?,
        _ => Vec::new(),
    };
    let out = realm.new_object();
    match &source {
        Value::Undefined | Value::Null => {
            return Err(VmError::type_error(format!(
                "Cannot destructure '{0}' as it is {0}.",
                source.display_string()
            )));
        }
        Value::Object(obj) => {
            for key in obj.own_keys() {
                let Some(name) = key.as_str() else { continue };
                if excluded.iter().any(|e| e.as_ref() == name) {
                    continue;
                }
                out.define_key(key.clone(), obj.get(&key));
            }
        }
        _ => {}
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_global(realm: &Realm, path: &[&str], this: Value, args: &[Value]) -> Value {
        let mut target = Value::Object(Arc::clone(realm.global()));
        for name in path {
            target = realm.get_value(&target, &Value::string(name)).unwrap();
        }
        realm.call(&target, this, args).unwrap()
    }

    #[test]
    fn test_array_methods() {
        let realm = Realm::new();
        let arr = Value::Object(realm.new_array(vec![1.0.into(), 2.0.into(), 3.0.into()]));
        let push = realm.get_value(&arr, &Value::string("push")).unwrap();
        realm.call(&push, arr.clone(), &[4.0.into()]).unwrap();
        let join = realm.get_value(&arr, &Value::string("join")).unwrap();
        let joined = realm.call(&join, arr.clone(), &["-".into()]).unwrap();
        assert_eq!(joined.as_str(), Some("1-2-3-4"));
        let slice = realm.get_value(&arr, &Value::string("slice")).unwrap();
        let tail = realm.call(&slice, arr.clone(), &[Value::Number(-2.0)]).unwrap();
        assert_eq!(realm.to_string(&tail).unwrap().as_ref(), "3,4");
    }

    #[test]
    fn test_array_iterator_protocol() {
        let realm = Realm::new();
        let arr = Value::Object(realm.new_array(vec!["a".into()]));
        let key = Value::Symbol(Arc::clone(&realm.intrinsics().iterator_symbol));
        let values = realm.get_value(&arr, &key).unwrap();
        let iterator = realm.call(&values, arr, &[]).unwrap();
        let next = realm.get_value(&iterator, &Value::string("next")).unwrap();
        let first = realm.call(&next, iterator.clone(), &[]).unwrap();
        assert_eq!(realm.get_value(&first, &"value".into()).unwrap().as_str(), Some("a"));
        let second = realm.call(&next, iterator.clone(), &[]).unwrap();
        assert!(realm.get_value(&second, &"done".into()).unwrap().to_boolean());
        let third = realm.call(&next, iterator, &[]).unwrap();
        assert!(realm.get_value(&third, &"done".into()).unwrap().to_boolean());
    }

    #[test]
    fn test_error_constructors() {
        let realm = Realm::new();
        let err = call_global(&realm, &["TypeError"], Value::Undefined, &["bad".into()]);
        assert_eq!(err.display_string(), "TypeError: bad");
        let ctor = realm.global_value("Error");
        let instance = realm
            .binary(shroud_vm_bytecode::BinaryOperator::InstanceOf, &err, &ctor)
            .unwrap();
        assert!(instance.to_boolean());
    }

    #[test]
    fn test_math_and_parse_int() {
        let realm = Realm::new();
        let max = call_global(&realm, &["Math", "max"], Value::Undefined, &[1.0.into(), 7.0.into()]);
        assert_eq!(max.as_number(), Some(7.0));
        let round = call_global(&realm, &["Math", "round"], Value::Undefined, &[Value::Number(-2.5)]);
        assert_eq!(round.as_number(), Some(-2.0));
        let parsed = call_global(&realm, &["parseInt"], Value::Undefined, &["0x1f".into()]);
        assert_eq!(parsed.as_number(), Some(31.0));
        let parsed = call_global(&realm, &["parseInt"], Value::Undefined, &["12px".into()]);
        assert_eq!(parsed.as_number(), Some(12.0));
    }

    #[test]
    fn test_string_methods() {
        let realm = Realm::new();
        let s = Value::string("shroud");
        let index_of = realm.get_value(&s, &"indexOf".into()).unwrap();
        let found = realm.call(&index_of, s.clone(), &["ou".into()]).unwrap();
        assert_eq!(found.as_number(), Some(3.0));
        let upper = realm.get_value(&s, &"toUpperCase".into()).unwrap();
        assert_eq!(realm.call(&upper, s, &[]).unwrap().as_str(), Some("SHROUD"));
    }

    #[test]
    fn test_number_radix() {
        let realm = Realm::new();
        let n = Value::Number(255.0);
        let to_string = realm.get_value(&n, &"toString".into()).unwrap();
        let hex = realm.call(&to_string, n, &[Value::Number(16.0)]).unwrap();
        assert_eq!(hex.as_str(), Some("ff"));
    }

    #[test]
    fn test_promise_resolve_passes_promises_through() {
        let realm = Realm::new();
        let p = call_global(&realm, &["Promise", "resolve"], Value::Undefined, &[1.0.into()]);
        let again = call_global(&realm, &["Promise", "resolve"], Value::Undefined, &[p.clone()]);
        assert!(p.strict_equals(&again));
    }

    #[test]
    fn test_object_rest_skips_excluded_keys() {
        let realm = Realm::new();
        let source = realm.new_object();
        source.define("a", 1.0.into());
        source.define("b", 2.0.into());
        source.define("c", 3.0.into());
        let excluded = Value::Object(realm.new_array(vec!["b".into()]));
        let rest = realm
            .call(&rest_helper(&realm), Value::Undefined, &[Value::Object(source), excluded])
            .unwrap();
        let keys = call_global(&realm, &["Object", "keys"], Value::Undefined, &[rest]);
        assert_eq!(realm.to_string(&keys).unwrap().as_ref(), "a,c");
    }

    #[test]
    fn test_object_rest_of_null_throws() {
        let realm = Realm::new();
        let err = realm
            .call(&rest_helper(&realm), Value::Undefined, &[Value::Null, Value::Undefined])
            .unwrap_err();
        assert!(err.is_catchable());
    }
}
