//! Closure capture through the environment record
//!
//! Closures created inside a virtualized function are emitted as source
//! text and materialized at run time with the environment record as their
//! only link to the enclosing function. Before printing, every reference to
//! an enclosing local becomes `ENV.name`; in arrow functions `this`,
//! `arguments` and `new.target` become the matching reserved slots.

use rustc_hash::FxHashSet;
use shroud_ast::scope::{function_scope_names, lexical_names, pattern_names};
use shroud_ast::visit::{VisitMut, walk_expr, walk_function, walk_pattern, walk_stmt, walk_stmts};
use shroud_ast::*;

use crate::context::EnvSlots;
use crate::error::{CompileError, CompileResult};
use crate::scope::LocalSet;

/// Rewrite a closure expression so it reaches enclosing locals through the
/// environment parameter
pub fn rewrite_closure(expr: &Expr, locals: &LocalSet, slots: &EnvSlots) -> CompileResult<Expr> {
    let mut rewriter = EnvRewriter {
        locals,
        slots,
        scopes: Vec::new(),
        own_this_depth: 0,
        function_depth: 0,
        error: None,
    };
    let mut out = expr.clone();
    rewriter.visit_expr(&mut out);
    match rewriter.error {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

struct EnvRewriter<'a> {
    locals: &'a LocalSet,
    slots: &'a EnvSlots,
    scopes: Vec<FxHashSet<String>>,
    /// Number of enclosing non-arrow functions (and class bodies)
    own_this_depth: usize,
    function_depth: usize,
    error: Option<CompileError>,
}

impl EnvRewriter<'_> {
    fn env(&self, key: &str) -> Expr {
        Expr::member(Expr::ident(self.slots.env_param.as_str()), key)
    }

    fn bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    /// Environment key a free identifier maps to, if any
    fn captured(&self, name: &str) -> Option<String> {
        if self.bound(name) {
            return None;
        }
        if self.locals.contains(name) {
            return Some(name.to_string());
        }
        if name == "arguments" && self.own_this_depth == 0 {
            return Some(self.slots.arguments_slot.clone());
        }
        None
    }

    fn with_scope(&mut self, names: Vec<String>, f: impl FnOnce(&mut Self)) {
        self.scopes.push(names.into_iter().collect());
        f(self);
        self.scopes.pop();
    }

    fn fail(&mut self, what: &str) {
        if self.error.is_none() {
            self.error = Some(CompileError::unsupported(what));
        }
    }
}

impl VisitMut for EnvRewriter<'_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Block(body) => {
                let names = lexical_names(body);
                self.with_scope(names, |v| walk_stmts(v, body));
            }
            Stmt::For {
                init: Some(ForInit::VarDecl(decl)),
                ..
            } if decl.kind.is_block_scoped() => {
                let names = decl.declarations.iter().flat_map(|d| pattern_names(&d.id)).collect();
                self.with_scope(names, |v| walk_stmt(v, stmt));
            }
            Stmt::ForOf {
                left: ForHead::VarDecl(kind, pattern),
                ..
            }
            | Stmt::ForIn {
                left: ForHead::VarDecl(kind, pattern),
                ..
            } if kind.is_block_scoped() => {
                let names = pattern_names(pattern);
                self.with_scope(names, |v| walk_stmt(v, stmt));
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                let names = lexical_names(block);
                self.with_scope(names, |v| walk_stmts(v, block));
                if let Some(handler) = handler {
                    let mut names = handler.param.as_ref().map(pattern_names).unwrap_or_default();
                    names.extend(lexical_names(&handler.body));
                    self.with_scope(names, |v| {
                        if let Some(param) = &mut handler.param {
                            v.visit_pattern(param);
                        }
                        walk_stmts(v, &mut handler.body);
                    });
                }
                if let Some(finalizer) = finalizer {
                    let names = lexical_names(finalizer);
                    self.with_scope(names, |v| walk_stmts(v, finalizer));
                }
            }
            Stmt::Switch { cases, .. } => {
                let names = cases.iter().flat_map(|c| lexical_names(&c.consequent)).collect();
                self.with_scope(names, |v| walk_stmt(v, stmt));
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Ident(name) => {
                if let Some(key) = self.captured(name) {
                    *expr = self.env(&key);
                }
            }
            Expr::This if self.own_this_depth == 0 => {
                *expr = self.env(&self.slots.this_slot);
            }
            Expr::NewTarget if self.own_this_depth == 0 => {
                *expr = self.env(&self.slots.new_target_slot);
            }
            Expr::Await(_) | Expr::Yield { .. } if self.function_depth == 0 => {
                self.fail("suspension inside a closure expression");
            }
            Expr::Object(props) => {
                for prop in props.iter_mut() {
                    if let ObjectProp::Shorthand(name) = prop {
                        if let Some(key) = self.captured(name) {
                            *prop = ObjectProp::KeyValue {
                                key: PropKey::Ident(name.clone()),
                                value: self.env(&key),
                            };
                        }
                    }
                }
                walk_expr(self, expr);
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Ident(name) => {
                if let Some(key) = self.captured(name) {
                    *pattern = Pattern::Expr(Box::new(self.env(&key)));
                }
            }
            _ => walk_pattern(self, pattern),
        }
    }

    fn visit_function(&mut self, function: &mut Function) {
        let mut names = function_scope_names(function);
        names.extend(function.id.clone());
        if !function.is_arrow {
            names.push("arguments".to_string());
            self.own_this_depth += 1;
        }
        self.function_depth += 1;
        self.with_scope(names, |v| walk_function(v, function));
        self.function_depth -= 1;
        if !function.is_arrow {
            self.own_this_depth -= 1;
        }
    }

    fn visit_class(&mut self, class: &mut Class) {
        if let Some(sup) = &mut class.super_class {
            self.visit_expr(sup);
        }
        self.own_this_depth += 1;
        self.with_scope(class.id.iter().cloned().collect(), |v| {
            for member in &mut class.body {
                match member {
                    ClassMember::Method { key, function, .. } => {
                        v.visit_prop_key(key);
                        v.visit_function(function);
                    }
                    ClassMember::Field { key, value, .. } => {
                        v.visit_prop_key(key);
                        if let Some(value) = value {
                            v.visit_expr(value);
                        }
                    }
                }
            }
        });
        self.own_this_depth -= 1;
    }
}
