//! Collision-avoiding identifier generation.

use rustc_hash::FxHashSet;

use crate::rng::ObfuscationRng;

const HEAD: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TAIL: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Words that may never be produced as identifiers.
const KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "let", "static",
    "implements", "interface", "package", "private", "protected", "public", "await",
    "arguments", "eval", "undefined", "NaN", "Infinity",
];

/// Produces unique synthetic identifiers.
///
/// Every name handed out is remembered, so two calls never return the same
/// name, and reserved names (everything already bound in the program) are
/// never produced.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    taken: FxHashSet<String>,
    rng: ObfuscationRng,
    length: usize,
}

impl NameGenerator {
    /// Create a generator drawing from the given randomness
    pub fn new(rng: ObfuscationRng) -> Self {
        let mut taken = FxHashSet::default();
        taken.extend(KEYWORDS.iter().map(|k| k.to_string()));
        Self {
            taken,
            rng,
            length: 5,
        }
    }

    /// Reserve a single name
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.taken.insert(name.into());
    }

    /// Reserve every name of an iterator
    pub fn reserve_all<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.taken.insert(name.into());
        }
    }

    /// Whether a name is reserved or already generated
    pub fn is_reserved(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// A fresh identifier, unique for the lifetime of this generator
    pub fn fresh(&mut self) -> String {
        let mut attempts = 0usize;
        loop {
            let mut name = String::with_capacity(self.length + 1);
            name.push('_');
            name.push(HEAD[self.rng.below(HEAD.len())] as char);
            for _ in 1..self.length {
                name.push(TAIL[self.rng.below(TAIL.len())] as char);
            }
            if self.taken.insert(name.clone()) {
                return name;
            }
            attempts += 1;
            if attempts % 64 == 0 {
                self.length += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_are_unique() {
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(9));
        let mut seen = FxHashSet::default();
        for _ in 0..2000 {
            assert!(seen.insert(names.fresh()));
        }
    }

    #[test]
    fn test_reserved_names_are_avoided() {
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(9));
        let first = names.clone().fresh();
        names.reserve(first.clone());
        assert_ne!(names.fresh(), first);
        assert!(names.is_reserved("function"));
    }

    #[test]
    fn test_fresh_is_identifier() {
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(2));
        let name = names.fresh();
        assert!(name.starts_with('_'));
        assert!(name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric()));
    }
}
