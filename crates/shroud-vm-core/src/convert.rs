//! Abstract conversion operations (ToPrimitive, ToNumber, ToString, ...)

use std::sync::Arc;

use shroud_ast::printer::number_to_js_string;

use crate::error::{VmError, VmResult};
use crate::object::PropertyKey;
use crate::realm::Realm;
use crate::value::Value;

/// Preferred type for ToPrimitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    /// `+`, `==` and comparisons
    Default,
    /// Arithmetic
    Number,
    /// String conversion
    String,
}

/// ES2023 ToInt32 abstract operation.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ES2023 ToUint32 abstract operation.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Format a number to string per JS semantics.
pub fn number_to_string(n: f64) -> String {
    number_to_js_string(n)
}

/// StringToNumber: decimal, `Infinity` and `0x`/`0o`/`0b` literals
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let radix = |prefix: &str, radix: u32| {
        trimmed
            .strip_prefix(prefix)
            .or_else(|| trimmed.strip_prefix(&prefix.to_uppercase()))
            .map(|digits| {
                if digits.is_empty() {
                    f64::NAN
                } else {
                    u64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64)
                }
            })
    };
    if let Some(n) = radix("0x", 16).or_else(|| radix("0o", 8)).or_else(|| radix("0b", 2)) {
        return n;
    }
    let (sign, body) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    // Rust also accepts "inf" and "nan", which are not numeric literals
    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    body.parse::<f64>().map_or(f64::NAN, |v| sign * v)
}

impl Realm {
    /// ToPrimitive, running `valueOf`/`toString` for objects
    pub fn to_primitive(&self, value: &Value, hint: Hint) -> VmResult<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            Hint::Default | Hint::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = obj.get(&PropertyKey::from(name));
            if method.is_callable() {
                let result = self.call(&method, value.clone(), &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(VmError::type_error("Cannot convert object to primitive value"))
    }

    /// ToNumber
    pub fn to_number(&self, value: &Value) -> VmResult<f64> {
        Ok(match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Symbol(_) => return Err(VmError::type_error("Cannot convert a Symbol value to a number")),
            Value::Object(_) => {
                let prim = self.to_primitive(value, Hint::Number)?;
                return self.to_number(&prim);
            }
        })
    }

    /// ToString
    pub fn to_string(&self, value: &Value) -> VmResult<Arc<str>> {
        Ok(match value {
            Value::Undefined => Arc::from("undefined"),
            Value::Null => Arc::from("null"),
            Value::Boolean(b) => Arc::from(if *b { "true" } else { "false" }),
            Value::Number(n) => Arc::from(number_to_string(*n)),
            Value::String(s) => Arc::clone(s),
            Value::Symbol(_) => return Err(VmError::type_error("Cannot convert a Symbol value to a string")),
            Value::Object(_) => {
                let prim = self.to_primitive(value, Hint::String)?;
                return self.to_string(&prim);
            }
        })
    }

    /// `String(value)`: like ToString but symbols are described
    pub fn string_of(&self, value: &Value) -> VmResult<Arc<str>> {
        match value {
            Value::Symbol(_) => Ok(Arc::from(value.display_string())),
            _ => self.to_string(value),
        }
    }

    /// ToPropertyKey
    pub fn to_property_key(&self, value: &Value) -> VmResult<PropertyKey> {
        Ok(match value {
            Value::Symbol(sym) => PropertyKey::symbol(sym),
            Value::String(s) => PropertyKey::String(Arc::clone(s)),
            Value::Object(_) => {
                let prim = self.to_primitive(value, Hint::String)?;
                return self.to_property_key(&prim);
            }
            other => PropertyKey::String(self.to_string(other)?),
        })
    }
}
