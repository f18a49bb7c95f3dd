//! Binary and unary operators

use std::cmp::Ordering;
use std::sync::Arc;

use shroud_vm_bytecode::{BinaryOperator, UnaryOperator};

use crate::convert::{Hint, to_int32, to_uint32};
use crate::error::{VmError, VmResult};
use crate::object::PropertyKey;
use crate::realm::Realm;
use crate::value::Value;

impl Realm {
    /// Apply a binary operator
    pub fn binary(&self, op: BinaryOperator, a: &Value, b: &Value) -> VmResult<Value> {
        use BinaryOperator as B;
        Ok(match op {
            B::Add => self.add(a, b)?,
            B::TemplateConcat => {
                let left = self.to_string(a)?;
                let right = self.to_string(b)?;
                Value::string(format!("{}{}", left, right))
            }
            B::Sub => self.numeric(a, b, |x, y| x - y)?,
            B::Mul => self.numeric(a, b, |x, y| x * y)?,
            B::Div => self.numeric(a, b, |x, y| x / y)?,
            B::Mod => self.numeric(a, b, |x, y| x % y)?,
            B::Exp => self.numeric(a, b, exponentiate)?,
            B::LooseEq => Value::Boolean(self.loose_equals(a, b)?),
            B::LooseNe => Value::Boolean(!self.loose_equals(a, b)?),
            B::StrictEq => Value::Boolean(a.strict_equals(b)),
            B::StrictNe => Value::Boolean(!a.strict_equals(b)),
            B::Lt => Value::Boolean(self.compare(a, b)? == Some(Ordering::Less)),
            B::Gt => Value::Boolean(self.compare(a, b)? == Some(Ordering::Greater)),
            B::Le => Value::Boolean(matches!(self.compare(a, b)?, Some(Ordering::Less | Ordering::Equal))),
            B::Ge => Value::Boolean(matches!(
                self.compare(a, b)?,
                Some(Ordering::Greater | Ordering::Equal)
            )),
            B::BitAnd => self.int32(a, b, |x, y| x & y)?,
            B::BitOr => self.int32(a, b, |x, y| x | y)?,
            B::BitXor => self.int32(a, b, |x, y| x ^ y)?,
            B::Shl => self.int32(a, b, |x, y| x.wrapping_shl(y as u32 & 31))?,
            B::Shr => self.int32(a, b, |x, y| x >> (y as u32 & 31))?,
            B::UShr => {
                let x = to_uint32(self.to_number(a)?);
                let y = to_uint32(self.to_number(b)?);
                Value::Number(f64::from(x >> (y & 31)))
            }
            B::In => Value::Boolean(self.has_in(a, b)?),
            B::InstanceOf => Value::Boolean(self.instance_of(a, b)?),
        })
    }

    /// Apply a unary operator
    pub fn unary(&self, op: UnaryOperator, value: &Value) -> VmResult<Value> {
        Ok(match op {
            UnaryOperator::Neg => Value::Number(-self.to_number(value)?),
            UnaryOperator::Plus => Value::Number(self.to_number(value)?),
            UnaryOperator::Not => Value::Boolean(!value.to_boolean()),
            UnaryOperator::BitNot => Value::Number(f64::from(!to_int32(self.to_number(value)?))),
            UnaryOperator::TypeOf => Value::string(value.type_of()),
            UnaryOperator::Void => Value::Undefined,
        })
    }

    fn add(&self, a: &Value, b: &Value) -> VmResult<Value> {
        let a = self.to_primitive(a, Hint::Default)?;
        let b = self.to_primitive(b, Hint::Default)?;
        if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
            let left = self.to_string(&a)?;
            let right = self.to_string(&b)?;
            return Ok(Value::String(Arc::from(format!("{}{}", left, right))));
        }
        Ok(Value::Number(self.to_number(&a)? + self.to_number(&b)?))
    }

    fn numeric(&self, a: &Value, b: &Value, f: impl FnOnce(f64, f64) -> f64) -> VmResult<Value> {
        let x = self.to_number(a)?;
        let y = self.to_number(b)?;
        Ok(Value::Number(f(x, y)))
    }

    fn int32(&self, a: &Value, b: &Value, f: impl FnOnce(i32, i32) -> i32) -> VmResult<Value> {
        let x = to_int32(self.to_number(a)?);
        let y = to_int32(self.to_number(b)?);
        Ok(Value::Number(f64::from(f(x, y))))
    }

    /// Abstract equality (`==`)
    pub fn loose_equals(&self, a: &Value, b: &Value) -> VmResult<bool> {
        Ok(match (a, b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(x), Value::String(s)) | (Value::String(s), Value::Number(x)) => {
                *x == crate::convert::string_to_number(s)
            }
            (Value::Boolean(x), other) | (other, Value::Boolean(x)) => {
                let n = Value::Number(f64::from(u8::from(*x)));
                return self.loose_equals(&n, other);
            }
            (Value::Object(_), Value::Object(_)) => a.strict_equals(b),
            (Value::Object(_), _) => {
                let prim = self.to_primitive(a, Hint::Default)?;
                return self.loose_equals(&prim, b);
            }
            (_, Value::Object(_)) => {
                let prim = self.to_primitive(b, Hint::Default)?;
                return self.loose_equals(a, &prim);
            }
            _ => a.strict_equals(b),
        })
    }

    /// Relational comparison; `None` when either side is NaN
    fn compare(&self, a: &Value, b: &Value) -> VmResult<Option<Ordering>> {
        let a = self.to_primitive(a, Hint::Number)?;
        let b = self.to_primitive(b, Hint::Number)?;
        if let (Value::String(x), Value::String(y)) = (&a, &b) {
            return Ok(Some(x.encode_utf16().cmp(y.encode_utf16())));
        }
        let x = self.to_number(&a)?;
        let y = self.to_number(&b)?;
        Ok(x.partial_cmp(&y))
    }

    fn has_in(&self, key: &Value, target: &Value) -> VmResult<bool> {
        let Value::Object(obj) = target else {
            return Err(VmError::type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key.display_string(),
                target.display_string()
            )));
        };
        let key = self.to_property_key(key)?;
        Ok(obj.has_property(&key))
    }

    fn instance_of(&self, value: &Value, ctor: &Value) -> VmResult<bool> {
        let Some(ctor) = ctor.as_object().filter(|c| c.is_callable()) else {
            return Err(VmError::type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let Value::Object(proto) = ctor.get(&PropertyKey::from("prototype")) else {
            return Err(VmError::type_error(
                "Function has non-object prototype in instanceof check",
            ));
        };
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let mut current = obj.prototype();
        while let Some(p) = current {
            if Arc::ptr_eq(&p, &proto) {
                return Ok(true);
            }
            current = p.prototype();
        }
        Ok(false)
    }
}

/// `**` with the cases where IEEE `pow` and JS disagree
fn exponentiate(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(op: BinaryOperator, a: Value, b: Value) -> Value {
        Realm::new().binary(op, &a, &b).unwrap()
    }

    #[test]
    fn test_add_concatenates_strings() {
        let v = eval(BinaryOperator::Add, Value::string("a"), Value::Number(1.0));
        assert_eq!(v.as_str(), Some("a1"));
        let v = eval(BinaryOperator::Add, Value::Number(1.0), Value::Boolean(true));
        assert_eq!(v.as_number(), Some(2.0));
    }

    #[test]
    fn test_loose_equality() {
        let realm = Realm::new();
        assert!(realm.loose_equals(&Value::Null, &Value::Undefined).unwrap());
        assert!(realm.loose_equals(&Value::string("1"), &Value::Number(1.0)).unwrap());
        assert!(realm.loose_equals(&Value::Boolean(true), &Value::string("1")).unwrap());
        assert!(!realm.loose_equals(&Value::Null, &Value::Number(0.0)).unwrap());
    }

    #[test]
    fn test_exponent_edge_cases() {
        assert!(exponentiate(1.0, f64::INFINITY).is_nan());
        assert!(exponentiate(2.0, f64::NAN).is_nan());
        assert_eq!(exponentiate(2.0, 10.0), 1024.0);
        assert_eq!(exponentiate(f64::NAN, 0.0), 1.0);
    }

    #[test]
    fn test_shifts_wrap() {
        let v = eval(BinaryOperator::Shl, Value::Number(1.0), Value::Number(33.0));
        assert_eq!(v.as_number(), Some(2.0));
        let v = eval(BinaryOperator::UShr, Value::Number(-1.0), Value::Number(0.0));
        assert_eq!(v.as_number(), Some(4_294_967_295.0));
        let v = eval(BinaryOperator::Shr, Value::Number(-8.0), Value::Number(1.0));
        assert_eq!(v.as_number(), Some(-4.0));
    }

    #[test]
    fn test_in_requires_object() {
        let realm = Realm::new();
        let err = realm
            .binary(BinaryOperator::In, &Value::string("x"), &Value::Number(1.0))
            .unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let v = eval(BinaryOperator::Lt, Value::string("10"), Value::string("9"));
        assert!(v.to_boolean());
        let v = eval(BinaryOperator::Lt, Value::Number(10.0), Value::string("9"));
        assert!(!v.to_boolean());
        let v = eval(BinaryOperator::Le, Value::Number(f64::NAN), Value::Number(1.0));
        assert!(!v.to_boolean());
    }
}
