//! Destructuring expansion shared by parameters, declarations and loop heads

use shroud_ast::*;
use shroud_common::NameGenerator;

use crate::error::{CompileError, CompileResult};

/// Expands a binding pattern into plain `var` statements.
///
/// Every intermediate value is evaluated once into a fresh temporary.
/// Array patterns index their source; object rest goes through the runtime
/// helper, which copies own enumerable string keys not already taken.
pub struct PatternExpander<'a> {
    names: &'a mut NameGenerator,
    rest_helper: &'a str,
}

impl<'a> PatternExpander<'a> {
    /// Create an expander using `rest_helper` as the object-rest function
    pub fn new(names: &'a mut NameGenerator, rest_helper: &'a str) -> Self {
        Self { names, rest_helper }
    }

    /// A fresh temporary name
    pub fn temp(&mut self) -> String {
        self.names.fresh()
    }

    /// Append statements binding `pattern` to `value`
    pub fn bind(&mut self, pattern: &Pattern, value: Expr, out: &mut Vec<Stmt>) -> CompileResult<()> {
        match pattern {
            Pattern::Ident(name) => {
                out.push(Stmt::var(name.clone(), Some(value)));
                Ok(())
            }
            Pattern::Assign { target, default } => {
                let (slot, nested) = match target.as_ref() {
                    Pattern::Ident(name) => (name.clone(), false),
                    _ => (self.temp(), true),
                };
                out.push(Stmt::var(slot.clone(), Some(value)));
                out.push(default_if_undefined(&slot, default.as_ref().clone()));
                if nested {
                    self.bind(target, Expr::ident(slot), out)?;
                }
                Ok(())
            }
            Pattern::Array(items) => {
                let source = self.materialize(value, out);
                for (index, item) in items.iter().enumerate() {
                    let Some(item) = item else { continue };
                    match item {
                        Pattern::Rest(inner) => {
                            let rest = slice_from(Expr::ident(source.clone()), index);
                            self.bind(inner, rest, out)?;
                        }
                        _ => {
                            let element = Expr::index(Expr::ident(source.clone()), Expr::num(index as f64));
                            self.bind(item, element, out)?;
                        }
                    }
                }
                Ok(())
            }
            Pattern::Object(props) => {
                let source = self.materialize(value, out);
                let mut taken = Vec::new();
                for prop in props {
                    match prop {
                        ObjectPatternProp::KeyValue { key, value } => {
                            let name = key.static_name().ok_or_else(|| {
                                CompileError::unsupported("computed key in object pattern")
                            })?;
                            let read = property(Expr::ident(source.clone()), &name);
                            taken.push(Expr::str(name));
                            self.bind(value, read, out)?;
                        }
                        ObjectPatternProp::Rest(Pattern::Ident(name)) => {
                            let call = Expr::call(
                                Expr::ident(self.rest_helper),
                                vec![Expr::ident(source.clone()), Expr::array(taken.clone())],
                            );
                            out.push(Stmt::var(name.clone(), Some(call)));
                        }
                        ObjectPatternProp::Rest(_) => {
                            return Err(CompileError::unsupported("nested object rest"));
                        }
                    }
                }
                Ok(())
            }
            Pattern::Rest(_) => Err(CompileError::unsupported("rest element outside array pattern")),
            Pattern::Expr(_) => Err(CompileError::unsupported("expression in binding position")),
        }
    }

    /// Reuse identifiers; spill anything else into a temporary
    fn materialize(&mut self, value: Expr, out: &mut Vec<Stmt>) -> String {
        if let Expr::Ident(name) = &value {
            return name.clone();
        }
        let temp = self.temp();
        out.push(Stmt::var(temp.clone(), Some(value)));
        temp
    }
}

/// `if (name === void 0) name = default;`
pub fn default_if_undefined(name: &str, default: Expr) -> Stmt {
    Stmt::if_then(
        Expr::binary(BinaryOp::StrictEq, Expr::ident(name), Expr::undefined()),
        Stmt::assign(name, default),
    )
}

/// `Array.prototype.slice.call(source, start)`
pub fn slice_from(source: Expr, start: usize) -> Expr {
    let slice = Expr::member(
        Expr::member(Expr::member(Expr::ident("Array"), "prototype"), "slice"),
        "call",
    );
    Expr::call(slice, vec![source, Expr::num(start as f64)])
}

fn property(object: Expr, name: &str) -> Expr {
    if printer::is_identifier_name(name) {
        Expr::member(object, name)
    } else {
        Expr::index(object, Expr::str(name))
    }
}
