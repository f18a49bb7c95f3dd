//! Eligibility gate
//!
//! Decides up front whether a function can be lowered. The walk covers the
//! function's own body only: nested functions and classes travel as
//! closure source and may use any syntax.

use shroud_ast::*;

use crate::context::CompileOptions;
use crate::error::{CompileError, CompileResult};

/// Reject functions whose body uses constructs the compiler cannot lower
pub fn check_eligibility(function: &Function, options: &CompileOptions) -> CompileResult<()> {
    if function.is_arrow {
        return Err(CompileError::ineligible("arrow function"));
    }
    if function.is_generator {
        return Err(CompileError::ineligible("generator function"));
    }
    // closure source cannot carry a `super` binding out of its method
    if shroud_ast::scope::function_usage(function).super_ref {
        return reject("super reference");
    }
    let mut gate = Gate {
        options,
        is_async: function.is_async,
        in_with: false,
    };
    for param in &function.params {
        gate.binding(param)?;
    }
    gate.stmts(&function.body)
}

/// Whether a function passes the gate at the given language level
pub fn can_virtualize(function: &Function, downlevel: bool) -> bool {
    let options = CompileOptions {
        downlevel,
        ..Default::default()
    };
    check_eligibility(function, &options).is_ok()
}

struct Gate<'a> {
    options: &'a CompileOptions,
    is_async: bool,
    in_with: bool,
}

fn reject<T>(what: &str) -> CompileResult<T> {
    Err(CompileError::ineligible(what))
}

impl Gate<'_> {
    fn stmts(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        stmts.iter().try_for_each(|s| self.stmt(s))
    }

    fn var_decl(&mut self, decl: &VarDecl) -> CompileResult<()> {
        if decl.kind.is_block_scoped() && !self.options.downlevel {
            return reject("block-scoped declaration");
        }
        for d in &decl.declarations {
            self.binding(&d.id)?;
            if let Some(init) = &d.init {
                self.expr(init)?;
            }
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(e) | Stmt::Throw(e) => self.expr(e),
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::FunctionDecl(_) => self.closure(),
            Stmt::ClassDecl(_) => {
                if !self.options.downlevel {
                    return reject("class declaration");
                }
                self.closure()
            }
            Stmt::Return(arg) => arg.as_ref().map_or(Ok(()), |e| self.expr(e)),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test)?;
                self.stmt(consequent)?;
                alternate.as_deref().map_or(Ok(()), |s| self.stmt(s))
            }
            Stmt::Block(body) => self.stmts(body),
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.expr(test)?;
                self.stmt(body)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::VarDecl(decl)) => self.var_decl(decl)?,
                    Some(ForInit::Expr(e)) => self.expr(e)?,
                    None => {}
                }
                if let Some(test) = test {
                    self.expr(test)?;
                }
                if let Some(update) = update {
                    self.expr(update)?;
                }
                self.stmt(body)
            }
            Stmt::ForIn { .. } => reject("for-in loop"),
            Stmt::ForOf {
                left,
                right,
                body,
                is_await,
            } => {
                if *is_await {
                    return reject("for-await loop");
                }
                match left {
                    ForHead::VarDecl(kind, pattern) => {
                        if kind.is_block_scoped() && !self.options.downlevel {
                            return reject("block-scoped loop binding");
                        }
                        self.binding(pattern)?;
                    }
                    ForHead::Pattern(pattern) => self.assign_target(pattern)?,
                }
                self.expr(right)?;
                self.stmt(body)
            }
            Stmt::Break(label) | Stmt::Continue(label) => {
                if label.is_some() {
                    return reject("labeled jump");
                }
                Ok(())
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.stmts(block)?;
                if let Some(handler) = handler {
                    match &handler.param {
                        None | Some(Pattern::Ident(_)) => {}
                        Some(_) => return reject("destructuring catch parameter"),
                    }
                    self.stmts(&handler.body)?;
                }
                finalizer.as_ref().map_or(Ok(()), |f| self.stmts(f))
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.expr(discriminant)?;
                for case in cases {
                    if let Some(test) = &case.test {
                        self.expr(test)?;
                    }
                    self.stmts(&case.consequent)?;
                }
                Ok(())
            }
            Stmt::Labeled { .. } => reject("labeled statement"),
            Stmt::With { object, body } => {
                if !self.options.downlevel {
                    return reject("with statement");
                }
                self.expr(object)?;
                let outer = std::mem::replace(&mut self.in_with, true);
                let result = self.stmt(body);
                self.in_with = outer;
                result
            }
            Stmt::Empty | Stmt::Debugger => Ok(()),
            Stmt::Verbatim(_) => reject("pre-rendered statement"),
        }
    }

    /// Declaration or parameter pattern
    fn binding(&mut self, pattern: &Pattern) -> CompileResult<()> {
        match pattern {
            Pattern::Ident(_) => Ok(()),
            Pattern::Array(items) => items.iter().flatten().try_for_each(|p| self.binding(p)),
            Pattern::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectPatternProp::KeyValue { key, value } => {
                            if matches!(key, PropKey::Computed(_)) {
                                return reject("computed key in object pattern");
                            }
                            self.binding(value)?;
                        }
                        ObjectPatternProp::Rest(Pattern::Ident(_)) => {}
                        ObjectPatternProp::Rest(_) => return reject("nested object rest"),
                    }
                }
                Ok(())
            }
            Pattern::Assign { target, default } => {
                self.binding(target)?;
                self.expr(default)
            }
            Pattern::Rest(inner) => self.binding(inner),
            Pattern::Expr(_) => reject("expression in binding position"),
        }
    }

    /// Assignment target: identifiers and member expressions only
    fn assign_target(&mut self, pattern: &Pattern) -> CompileResult<()> {
        match pattern {
            Pattern::Ident(_) => Ok(()),
            Pattern::Expr(expr) => match expr.as_ref() {
                Expr::Ident(_) => Ok(()),
                Expr::Member { optional: true, .. } => reject("optional member as target"),
                Expr::Member { .. } => self.expr(expr),
                _ => reject("invalid assignment target"),
            },
            _ => reject("destructuring assignment"),
        }
    }

    fn args(&mut self, args: &[ExprOrSpread]) -> CompileResult<()> {
        for arg in args {
            if arg.spread {
                return reject("spread argument");
            }
            self.expr(&arg.expr)?;
        }
        Ok(())
    }

    fn prop_key(&mut self, key: &PropKey) -> CompileResult<()> {
        match key {
            PropKey::Computed(e) => self.expr(e),
            _ => Ok(()),
        }
    }

    /// Closures are opaque, except that they cannot see `with` scopes
    fn closure(&self) -> CompileResult<()> {
        if self.in_with {
            return reject("closure inside with");
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Ident(_) | Expr::This | Expr::NewTarget => Ok(()),
            Expr::Super => reject("super reference"),
            Expr::Lit(Lit::Regex { .. }) => reject("regular expression literal"),
            Expr::Lit(Lit::BigInt(_)) => reject("bigint literal"),
            Expr::Lit(_) => Ok(()),
            Expr::Template { exprs, .. } => exprs.iter().try_for_each(|e| self.expr(e)),
            Expr::TaggedTemplate { .. } => reject("tagged template"),
            Expr::Array(items) => {
                for item in items.iter().flatten() {
                    if item.spread {
                        return reject("array spread");
                    }
                    self.expr(&item.expr)?;
                }
                Ok(())
            }
            Expr::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProp::KeyValue { key, value } => {
                            self.prop_key(key)?;
                            self.expr(value)?;
                        }
                        ObjectProp::Shorthand(_) => {}
                        ObjectProp::Method { key, .. } => {
                            self.prop_key(key)?;
                            self.closure()?;
                        }
                        ObjectProp::Spread(_) => return reject("object spread"),
                    }
                }
                Ok(())
            }
            Expr::Function(_) | Expr::Arrow(_) | Expr::Class(_) => self.closure(),
            Expr::Unary {
                op: UnaryOp::Delete,
                ..
            } => reject("delete operator"),
            Expr::Unary { arg, .. } => self.expr(arg),
            Expr::Update { arg, .. } => match arg.as_ref() {
                Expr::Ident(_) => Ok(()),
                Expr::Member { optional: false, .. } => self.expr(arg),
                _ => reject("invalid update target"),
            },
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Assign { target, value, .. } => {
                self.assign_target(target)?;
                self.expr(value)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test)?;
                self.expr(consequent)?;
                self.expr(alternate)
            }
            Expr::Call { callee, args, .. } => {
                if matches!(callee.as_ref(), Expr::Ident(name) if name == "eval") {
                    return reject("direct eval");
                }
                self.expr(callee)?;
                self.args(args)
            }
            Expr::New { callee, args } => {
                self.expr(callee)?;
                self.args(args)
            }
            Expr::Member {
                object, property, ..
            } => {
                self.expr(object)?;
                match property {
                    MemberProp::Computed(p) => self.expr(p),
                    MemberProp::Ident(_) => Ok(()),
                }
            }
            Expr::Chain(inner) => self.expr(inner),
            Expr::Sequence(exprs) => exprs.iter().try_for_each(|e| self.expr(e)),
            Expr::Await(arg) => {
                if !self.is_async {
                    return reject("await outside async function");
                }
                self.expr(arg)
            }
            Expr::Yield { .. } => reject("yield expression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(body: Vec<Stmt>) -> Function {
        Function {
            id: Some("f".into()),
            body,
            ..Default::default()
        }
    }

    fn plain() -> CompileOptions {
        CompileOptions::default()
    }

    fn downlevel() -> CompileOptions {
        CompileOptions {
            downlevel: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_function_is_eligible() {
        let f = function(vec![Stmt::Return(Some(Expr::binary(
            BinaryOp::Add,
            Expr::ident("a"),
            Expr::num(1.0),
        )))]);
        assert!(check_eligibility(&f, &plain()).is_ok());
    }

    #[test]
    fn test_generator_is_rejected() {
        let mut f = function(vec![]);
        f.is_generator = true;
        assert!(matches!(
            check_eligibility(&f, &plain()),
            Err(CompileError::Ineligible(_))
        ));
    }

    #[test]
    fn test_labeled_break_is_rejected() {
        let f = function(vec![Stmt::Labeled {
            label: "outer".into(),
            body: Box::new(Stmt::While {
                test: Expr::Lit(Lit::Bool(true)),
                body: Box::new(Stmt::Break(Some("outer".into()))),
            }),
        }]);
        assert!(check_eligibility(&f, &plain()).is_err());
    }

    #[test]
    fn test_let_needs_downlevel() {
        let f = function(vec![Stmt::VarDecl(VarDecl {
            kind: VarKind::Let,
            declarations: vec![VarDeclarator {
                id: Pattern::ident("x"),
                init: Some(Expr::num(1.0)),
            }],
        })]);
        assert!(check_eligibility(&f, &plain()).is_err());
        assert!(check_eligibility(&f, &downlevel()).is_ok());
        assert!(!can_virtualize(&f, false));
        assert!(can_virtualize(&f, true));
    }

    #[test]
    fn test_await_requires_async() {
        let mut f = function(vec![Stmt::Expr(Expr::Await(Box::new(Expr::ident("p"))))]);
        assert!(check_eligibility(&f, &plain()).is_err());
        f.is_async = true;
        assert!(check_eligibility(&f, &plain()).is_ok());
    }

    #[test]
    fn test_nested_closure_syntax_is_not_gated() {
        let inner = Function {
            is_generator: true,
            body: vec![Stmt::Expr(Expr::Yield {
                arg: None,
                delegate: false,
            })],
            ..Default::default()
        };
        let f = function(vec![Stmt::Return(Some(Expr::Function(Box::new(inner))))]);
        assert!(check_eligibility(&f, &plain()).is_ok());
    }

    #[test]
    fn test_destructuring_assignment_is_rejected() {
        let f = function(vec![Stmt::Expr(Expr::assign(
            Pattern::Array(vec![Some(Pattern::ident("a"))]),
            Expr::ident("xs"),
        ))]);
        assert!(check_eligibility(&f, &plain()).is_err());
    }

    #[test]
    fn test_try_is_allowed() {
        let f = function(vec![Stmt::Try {
            block: vec![Stmt::Throw(Expr::num(1.0))],
            handler: Some(CatchClause {
                param: Some(Pattern::ident("e")),
                body: vec![],
            }),
            finalizer: Some(vec![]),
        }]);
        assert!(check_eligibility(&f, &plain()).is_ok());
    }

    #[test]
    fn test_super_inside_nested_arrow_is_rejected() {
        let arrow = Function {
            is_arrow: true,
            body: vec![Stmt::Return(Some(Expr::member(Expr::Super, "name")))],
            ..Default::default()
        };
        let f = function(vec![Stmt::Return(Some(Expr::Arrow(Box::new(arrow))))]);
        assert!(check_eligibility(&f, &plain()).is_err());
    }
}
