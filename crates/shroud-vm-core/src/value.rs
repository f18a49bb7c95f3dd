//! JavaScript values
//!
//! Primitives are stored inline; objects are shared through `Arc` so values
//! stay `Send + Sync` and can cross into asynchronous tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use shroud_ast::printer::number_to_js_string;
use shroud_vm_bytecode::Constant;

use crate::object::{JsObject, ObjectKind, PropertyKey};

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// A symbol value
#[derive(Debug)]
pub struct JsSymbol {
    /// Unique id, used as the property key
    pub id: u64,
    /// Description passed at creation
    pub description: Option<String>,
}

impl JsSymbol {
    /// Create a fresh symbol
    pub fn new(description: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description,
        })
    }
}

/// A JavaScript value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE 754 double
    Number(f64),
    /// Immutable string
    String(Arc<str>),
    /// Symbol
    Symbol(Arc<JsSymbol>),
    /// Object (plain, array, function, error, promise)
    Object(Arc<JsObject>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_js_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Symbol(sym) => write!(f, "Symbol({})", sym.description.as_deref().unwrap_or("")),
            Value::Object(obj) => write!(f, "[{:?}]", obj.kind_name()),
        }
    }
}

impl Value {
    /// Create undefined value
    #[inline]
    pub fn undefined() -> Self {
        Value::Undefined
    }

    /// Create null value
    #[inline]
    pub fn null() -> Self {
        Value::Null
    }

    /// Create boolean value
    #[inline]
    pub fn boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    /// Create number value
    #[inline]
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// Create string value
    #[inline]
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    /// Create object value
    #[inline]
    pub fn object(obj: Arc<JsObject>) -> Self {
        Value::Object(obj)
    }

    /// Value of a non-closure constant
    pub fn from_constant(constant: &Constant) -> Option<Self> {
        Some(match constant {
            Constant::Undefined => Value::Undefined,
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Boolean(*b),
            Constant::Number(n) => Value::Number(*n),
            Constant::String(s) => Value::string(s),
            Constant::Closure(_) => return None,
        })
    }

    /// Check if undefined
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if null or undefined
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if this is an object of any kind
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Check if this value can be called
    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(|o| o.is_callable())
    }

    /// Get as number
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string slice
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object
    #[inline]
    pub fn as_object(&self) -> Option<&Arc<JsObject>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_) | Value::Object(_) => true,
        }
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(o) if o.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    /// Strict equality (`===`)
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a.id == b.id,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Best-effort text for messages; never runs script code
    pub fn display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_js_string(*n),
            Value::String(s) => s.to_string(),
            Value::Symbol(sym) => format!("Symbol({})", sym.description.as_deref().unwrap_or("")),
            Value::Object(obj) => match obj.kind() {
                ObjectKind::Error => {
                    let field = |name: &str| match obj.get(&PropertyKey::from(name)) {
                        Value::String(s) => s.to_string(),
                        _ => String::new(),
                    };
                    let (name, message) = (field("name"), field("message"));
                    match (name.is_empty(), message.is_empty()) {
                        (_, true) => name,
                        (true, false) => message,
                        (false, false) => format!("{}: {}", name, message),
                    }
                }
                ObjectKind::Function(_) => "function".to_string(),
                ObjectKind::Array => "[object Array]".to_string(),
                _ => "[object Object]".to_string(),
            },
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Arc<JsObject>> for Value {
    fn from(obj: Arc<JsObject>) -> Self {
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(!Value::Number(-0.0).to_boolean());
        assert!(!Value::string("").to_boolean());
        assert!(Value::string("0").to_boolean());
        assert!(!Value::Null.to_boolean());
    }

    #[test]
    fn test_strict_equality() {
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(0.0).strict_equals(&Value::Number(-0.0)));
        assert!(!Value::string("1").strict_equals(&Value::Number(1.0)));
        assert!(!Value::Undefined.strict_equals(&Value::Null));
    }

    #[test]
    fn test_symbols_are_unique() {
        let a = JsSymbol::new(Some("x".into()));
        let b = JsSymbol::new(Some("x".into()));
        assert!(!Value::Symbol(a.clone()).strict_equals(&Value::Symbol(b)));
        assert!(Value::Symbol(a.clone()).strict_equals(&Value::Symbol(a)));
    }
}
