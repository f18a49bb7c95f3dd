//! Constant pool for compiled units

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shroud_ast::printer::number_to_js_string;
use shroud_ast::Expr;

/// Source of a closure, function or class materialized at run time.
///
/// The text is what travels in the output; the syntax tree is kept only in
/// memory so a host interpreter can compile the closure on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureSource {
    /// Expression source text (`function (...) {...}`, `() => ...`, `class {}`)
    pub source: String,
    /// Rewritten syntax tree of the same expression
    #[serde(skip)]
    pub expression: Option<Arc<Expr>>,
}

impl ClosureSource {
    /// Closure from source text only
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            expression: None,
        }
    }
}

impl PartialEq for ClosureSource {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// A constant value in the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit floating point number
    Number(f64),
    /// String value
    String(String),
    /// Closure source
    Closure(ClosureSource),
}

/// Kind tag used in de-duplication keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKind {
    Undefined,
    Null,
    Bool,
    Number,
    String,
    Closure,
}

impl Constant {
    /// Create a string constant
    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Check if this is a string
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Get as string if this is a string constant
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as closure if this is a closure constant
    #[inline]
    pub fn as_closure(&self) -> Option<&ClosureSource> {
        match self {
            Self::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Textual form of a number, with sentinels for values that have no
    /// plain decimal spelling
    pub fn number_text(n: f64) -> String {
        if n.is_nan() {
            "NaN".to_string()
        } else if n == 0.0 && n.is_sign_negative() {
            "-0".to_string()
        } else {
            number_to_js_string(n)
        }
    }

    /// Parse a number written by [`Constant::number_text`]
    pub fn parse_number_text(text: &str) -> Option<f64> {
        match text {
            "NaN" => Some(f64::NAN),
            "-0" => Some(-0.0),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        }
    }

    fn dedup_key(&self) -> (ConstKind, String) {
        match self {
            Constant::Undefined => (ConstKind::Undefined, String::new()),
            Constant::Null => (ConstKind::Null, String::new()),
            Constant::Bool(b) => (ConstKind::Bool, b.to_string()),
            Constant::Number(n) => (ConstKind::Number, Self::number_text(*n)),
            Constant::String(s) => (ConstKind::String, s.clone()),
            Constant::Closure(c) => (ConstKind::Closure, c.source.clone()),
        }
    }
}

/// Constant pool
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: FxHashMap<(ConstKind, String), u32>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool, returns its index
    ///
    /// Values with the same kind and textual form share one slot, so `0`
    /// and `-0` stay distinct while two `NaN`s collapse.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = constant.dedup_key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        self.index.insert(key, idx);
        idx
    }

    /// Add a string constant
    #[inline]
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.add(Constant::string(s))
    }

    /// Add a number constant
    #[inline]
    pub fn add_number(&mut self, n: f64) -> u32 {
        self.add(Constant::Number(n))
    }

    /// Get constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Number of constants
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Take the constants in insertion order
    pub fn into_vec(self) -> Vec<Constant> {
        self.constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_string("hello");
        let idx2 = pool.add_string("world");
        let idx3 = pool.add_string("hello");

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_number_and_string_are_distinct() {
        let mut pool = ConstantPool::new();
        let n = pool.add_number(1.0);
        let s = pool.add_string("1");
        assert_ne!(n, s);
    }

    #[test]
    fn test_special_numbers() {
        let mut pool = ConstantPool::new();
        let zero = pool.add_number(0.0);
        let neg_zero = pool.add_number(-0.0);
        let nan1 = pool.add_number(f64::NAN);
        let nan2 = pool.add_number(f64::NAN);
        assert_ne!(zero, neg_zero);
        assert_eq!(nan1, nan2);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_number_text_round_trip() {
        for n in [0.0, -0.0, 1.5, -3.0, 1e300, 5e-324, f64::INFINITY, f64::NEG_INFINITY] {
            let text = Constant::number_text(n);
            let back = Constant::parse_number_text(&text).unwrap();
            assert_eq!(back.to_bits(), n.to_bits(), "{text}");
        }
        assert!(Constant::parse_number_text("NaN").unwrap().is_nan());
    }

    #[test]
    fn test_closure_equality_ignores_tree() {
        let a = ClosureSource::from_source("function () {}");
        let b = ClosureSource {
            source: "function () {}".into(),
            expression: Some(Arc::new(Expr::ident("x"))),
        };
        assert_eq!(a, b);
    }
}
