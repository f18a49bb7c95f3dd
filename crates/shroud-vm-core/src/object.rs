//! Object model
//!
//! Properties are plain data slots kept in insertion order. Arrays store
//! their elements densely next to the property map; `length` and integer
//! keys are routed to the elements.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;

use crate::error::{VmError, VmResult};
use crate::function::BytecodeFunction;
use crate::promise::JsPromise;
use crate::realm::Realm;
use crate::value::{JsSymbol, Value};

/// Property key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Symbol property key (by symbol id)
    Symbol(u64),
}

impl PropertyKey {
    /// Create a string property key
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Key of a symbol
    pub fn symbol(symbol: &JsSymbol) -> Self {
        Self::Symbol(symbol.id)
    }

    /// String form, if this is a string key
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Symbol(_) => None,
        }
    }

    /// Canonical array index (`"0"`, `"17"`, never `"01"`)
    pub fn as_index(&self) -> Option<usize> {
        let s = self.as_str()?;
        if s.is_empty() || s.len() > 10 || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u64 = s.parse().ok()?;
        (n < u32::MAX as u64).then_some(n as usize)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Symbol(id) => write!(f, "Symbol(#{})", id),
        }
    }
}

/// Signature of a native function: `(realm, this, args)`
pub type NativeFn = Arc<dyn Fn(&Realm, &Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// A function implemented in Rust
#[derive(Clone)]
pub struct NativeFunction {
    /// Function name
    pub name: String,
    /// Implementation
    pub func: NativeFn,
    /// Whether `new` is allowed (the implementation builds the object itself)
    pub is_constructor: bool,
}

/// Callable payload of a function object
#[derive(Clone)]
pub enum FunctionKind {
    /// Rust implementation
    Native(NativeFunction),
    /// Compiled bytecode with its scope chain
    Bytecode(Arc<BytecodeFunction>),
}

/// What an object is, fixed at creation
#[derive(Clone)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array exotic object
    Array,
    /// Callable object
    Function(FunctionKind),
    /// Instance created by an error constructor
    Error,
    /// Promise
    Promise(Arc<JsPromise>),
}

struct ObjectInner {
    prototype: Option<Arc<JsObject>>,
    properties: IndexMap<PropertyKey, Value, FxBuildHasher>,
    elements: Vec<Value>,
}

/// A JavaScript object
pub struct JsObject {
    kind: ObjectKind,
    inner: RwLock<ObjectInner>,
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject").field("kind", &self.kind_name()).finish()
    }
}

impl JsObject {
    /// Create an object of the given kind
    pub fn new(kind: ObjectKind, prototype: Option<Arc<JsObject>>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            inner: RwLock::new(ObjectInner {
                prototype,
                properties: IndexMap::default(),
                elements: Vec::new(),
            }),
        })
    }

    /// Create a plain object
    pub fn ordinary(prototype: Option<Arc<JsObject>>) -> Arc<Self> {
        Self::new(ObjectKind::Ordinary, prototype)
    }

    /// Create an array holding `elements`
    pub fn array(prototype: Option<Arc<JsObject>>, elements: Vec<Value>) -> Arc<Self> {
        let obj = Self::new(ObjectKind::Array, prototype);
        obj.inner.write().elements = elements;
        obj
    }

    /// Object kind
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Short name of the kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Promise(_) => "Promise",
        }
    }

    /// Check if this is an array
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array)
    }

    /// Check if this object can be called
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Function payload
    pub fn function(&self) -> Option<&FunctionKind> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Promise payload
    pub fn promise(&self) -> Option<&Arc<JsPromise>> {
        match &self.kind {
            ObjectKind::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Prototype
    pub fn prototype(&self) -> Option<Arc<JsObject>> {
        self.inner.read().prototype.clone()
    }

    /// Replace the prototype
    pub fn set_prototype(&self, prototype: Option<Arc<JsObject>>) {
        self.inner.write().prototype = prototype;
    }

    /// Own property value
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        let inner = self.inner.read();
        if self.is_array() {
            if key.as_str() == Some("length") {
                return Some(Value::Number(inner.elements.len() as f64));
            }
            if let Some(index) = key.as_index() {
                return inner.elements.get(index).cloned();
            }
        }
        inner.properties.get(key).cloned()
    }

    /// Property value, following the prototype chain
    pub fn get(&self, key: &PropertyKey) -> Value {
        if let Some(value) = self.get_own(key) {
            return value;
        }
        let mut current = self.prototype();
        while let Some(obj) = current {
            if let Some(value) = obj.get_own(key) {
                return value;
            }
            current = obj.prototype();
        }
        Value::Undefined
    }

    /// Own property check
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        let inner = self.inner.read();
        if self.is_array() {
            if key.as_str() == Some("length") {
                return true;
            }
            if let Some(index) = key.as_index() {
                return index < inner.elements.len();
            }
        }
        inner.properties.contains_key(key)
    }

    /// Property check along the prototype chain (the `in` operator)
    pub fn has_property(&self, key: &PropertyKey) -> bool {
        if self.has_own(key) {
            return true;
        }
        let mut current = self.prototype();
        while let Some(obj) = current {
            if obj.has_own(key) {
                return true;
            }
            current = obj.prototype();
        }
        false
    }

    /// Assign a property
    pub fn set(&self, key: PropertyKey, value: Value) -> VmResult<()> {
        let mut inner = self.inner.write();
        if self.is_array() {
            if key.as_str() == Some("length") {
                let len = value.as_number().unwrap_or(f64::NAN);
                if len < 0.0 || len.fract() != 0.0 || len >= u32::MAX as f64 {
                    return Err(VmError::range_error("Invalid array length"));
                }
                inner.elements.resize(len as usize, Value::Undefined);
                return Ok(());
            }
            if let Some(index) = key.as_index() {
                if index >= inner.elements.len() {
                    inner.elements.resize(index + 1, Value::Undefined);
                }
                inner.elements[index] = value;
                return Ok(());
            }
        }
        inner.properties.insert(key, value);
        Ok(())
    }

    /// Define a named data property directly (never array semantics)
    pub fn define(&self, name: &str, value: Value) {
        self.inner.write().properties.insert(PropertyKey::from(name), value);
    }

    /// Define a property under any key directly
    pub fn define_key(&self, key: PropertyKey, value: Value) {
        self.inner.write().properties.insert(key, value);
    }

    /// Own string keys: array indices first, then properties in insertion order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let inner = self.inner.read();
        let mut keys: Vec<PropertyKey> = (0..inner.elements.len())
            .map(|i| PropertyKey::String(Arc::from(i.to_string())))
            .collect();
        keys.extend(
            inner
                .properties
                .keys()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys
    }

    /// Snapshot of the array elements
    pub fn elements(&self) -> Vec<Value> {
        self.inner.read().elements.clone()
    }

    /// Number of array elements
    pub fn len(&self) -> usize {
        self.inner.read().elements.len()
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an array element, returning the new length
    pub fn push(&self, value: Value) -> usize {
        let mut inner = self.inner.write();
        inner.elements.push(value);
        inner.elements.len()
    }

    /// Remove the last array element
    pub fn pop(&self) -> Option<Value> {
        self.inner.write().elements.pop()
    }

    /// Array element at `index`
    pub fn element(&self, index: usize) -> Option<Value> {
        self.inner.read().elements.get(index).cloned()
    }
}
