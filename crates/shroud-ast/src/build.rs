//! Constructors for synthesized nodes

use crate::ast::*;

impl Expr {
    /// Identifier reference
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    /// Number literal
    pub fn num(value: f64) -> Self {
        Expr::Lit(Lit::Num(value))
    }

    /// String literal
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Lit(Lit::Str(value.into()))
    }

    /// `undefined` (as `void 0`, immune to shadowing)
    pub fn undefined() -> Self {
        Expr::Unary {
            op: UnaryOp::Void,
            arg: Box::new(Expr::num(0.0)),
        }
    }

    /// `object.name`
    pub fn member(object: Expr, name: impl Into<String>) -> Self {
        Expr::Member {
            object: Box::new(object),
            property: MemberProp::Ident(name.into()),
            optional: false,
        }
    }

    /// `object[index]`
    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::Member {
            object: Box::new(object),
            property: MemberProp::Computed(Box::new(index)),
            optional: false,
        }
    }

    /// `callee(args)`
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args: args
                .into_iter()
                .map(|expr| ExprOrSpread {
                    spread: false,
                    expr,
                })
                .collect(),
            optional: false,
        }
    }

    /// `left op right`
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `!arg`
    pub fn not(arg: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            arg: Box::new(arg),
        }
    }

    /// `target = value`
    pub fn assign(target: Pattern, value: Expr) -> Self {
        Expr::Assign {
            op: AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Array literal without holes or spreads
    pub fn array(items: Vec<Expr>) -> Self {
        Expr::Array(
            items
                .into_iter()
                .map(|expr| {
                    Some(ExprOrSpread {
                        spread: false,
                        expr,
                    })
                })
                .collect(),
        )
    }
}

impl Stmt {
    /// `var name = init;`
    pub fn var(name: impl Into<String>, init: Option<Expr>) -> Self {
        Stmt::VarDecl(VarDecl {
            kind: VarKind::Var,
            declarations: vec![VarDeclarator {
                id: Pattern::Ident(name.into()),
                init,
            }],
        })
    }

    /// `const name = init;`
    pub fn constant(name: impl Into<String>, init: Expr) -> Self {
        Stmt::VarDecl(VarDecl {
            kind: VarKind::Const,
            declarations: vec![VarDeclarator {
                id: Pattern::Ident(name.into()),
                init: Some(init),
            }],
        })
    }

    /// `name = value;`
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Expr(Expr::assign(Pattern::Ident(name.into()), value))
    }

    /// `if (test) consequent`
    pub fn if_then(test: Expr, consequent: Stmt) -> Self {
        Stmt::If {
            test,
            consequent: Box::new(consequent),
            alternate: None,
        }
    }
}

impl Pattern {
    /// Plain identifier target
    pub fn ident(name: impl Into<String>) -> Self {
        Pattern::Ident(name.into())
    }

    /// Identifier name when the pattern is a plain binding
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Pattern::Ident(name) => Some(name),
            _ => None,
        }
    }
}

impl Function {
    /// Whether every parameter is a plain identifier
    pub fn has_simple_params(&self) -> bool {
        self.params.iter().all(|p| matches!(p, Pattern::Ident(_)))
    }

    /// Whether the body carries a `"use strict"` directive
    pub fn is_strict(&self) -> bool {
        self.directives.iter().any(|d| d == "use strict")
    }
}
