//! Local binding set of a virtualized function

use indexmap::IndexSet;

/// Names that live in the function's environment record.
///
/// Everything else resolves as a global. Insertion order is kept so the
/// environment literal is emitted deterministically.
#[derive(Debug, Clone, Default)]
pub struct LocalSet {
    names: IndexSet<String>,
}

impl LocalSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a local, returns `false` if it already existed
    pub fn declare(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Whether a name resolves to a local
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Locals in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of locals
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Locals as an owned list
    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_keeps_order_and_dedups() {
        let mut locals = LocalSet::new();
        assert!(locals.declare("b"));
        assert!(locals.declare("a"));
        assert!(!locals.declare("b"));
        assert_eq!(locals.to_vec(), vec!["b", "a"]);
        assert!(locals.contains("a"));
        assert!(!locals.contains("c"));
    }
}
