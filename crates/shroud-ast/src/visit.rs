//! Mutable tree traversal
//!
//! Implementors override the `visit_*` hooks they care about and call the
//! matching `walk_*` function to keep descending.

use crate::ast::*;

/// Mutable visitor over the syntax tree
pub trait VisitMut {
    /// Visit a statement
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visit an expression
    fn visit_expr(&mut self, expr: &mut Expr) {
        walk_expr(self, expr);
    }

    /// Visit a binding or assignment pattern
    fn visit_pattern(&mut self, pattern: &mut Pattern) {
        walk_pattern(self, pattern);
    }

    /// Visit a function (declaration, expression, arrow or method)
    fn visit_function(&mut self, function: &mut Function) {
        walk_function(self, function);
    }

    /// Visit a class
    fn visit_class(&mut self, class: &mut Class) {
        walk_class(self, class);
    }

    /// Visit a property key
    fn visit_prop_key(&mut self, key: &mut PropKey) {
        if let PropKey::Computed(expr) = key {
            self.visit_expr(expr);
        }
    }
}

/// Visit every statement of a list
pub fn walk_stmts<V: VisitMut + ?Sized>(v: &mut V, stmts: &mut [Stmt]) {
    for stmt in stmts {
        v.visit_stmt(stmt);
    }
}

/// Default statement traversal
pub fn walk_stmt<V: VisitMut + ?Sized>(v: &mut V, stmt: &mut Stmt) {
    match stmt {
        Stmt::Expr(expr) | Stmt::Throw(expr) => v.visit_expr(expr),
        Stmt::VarDecl(decl) => walk_var_decl(v, decl),
        Stmt::FunctionDecl(function) => v.visit_function(function),
        Stmt::ClassDecl(class) => v.visit_class(class),
        Stmt::Return(arg) => {
            if let Some(expr) = arg {
                v.visit_expr(expr);
            }
        }
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            v.visit_expr(test);
            v.visit_stmt(consequent);
            if let Some(alt) = alternate {
                v.visit_stmt(alt);
            }
        }
        Stmt::Block(stmts) => walk_stmts(v, stmts),
        Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
            v.visit_expr(test);
            v.visit_stmt(body);
        }
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            match init {
                Some(ForInit::VarDecl(decl)) => walk_var_decl(v, decl),
                Some(ForInit::Expr(expr)) => v.visit_expr(expr),
                None => {}
            }
            if let Some(test) = test {
                v.visit_expr(test);
            }
            if let Some(update) = update {
                v.visit_expr(update);
            }
            v.visit_stmt(body);
        }
        Stmt::ForIn { left, right, body } | Stmt::ForOf { left, right, body, .. } => {
            match left {
                ForHead::VarDecl(_, pattern) | ForHead::Pattern(pattern) => v.visit_pattern(pattern),
            }
            v.visit_expr(right);
            v.visit_stmt(body);
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            walk_stmts(v, block);
            if let Some(handler) = handler {
                if let Some(param) = &mut handler.param {
                    v.visit_pattern(param);
                }
                walk_stmts(v, &mut handler.body);
            }
            if let Some(finalizer) = finalizer {
                walk_stmts(v, finalizer);
            }
        }
        Stmt::Switch {
            discriminant,
            cases,
        } => {
            v.visit_expr(discriminant);
            for case in cases {
                if let Some(test) = &mut case.test {
                    v.visit_expr(test);
                }
                walk_stmts(v, &mut case.consequent);
            }
        }
        Stmt::Labeled { body, .. } => v.visit_stmt(body),
        Stmt::With { object, body } => {
            v.visit_expr(object);
            v.visit_stmt(body);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Empty | Stmt::Debugger | Stmt::Verbatim(_) => {}
    }
}

/// Visit the declarators of a declaration
pub fn walk_var_decl<V: VisitMut + ?Sized>(v: &mut V, decl: &mut VarDecl) {
    for declarator in &mut decl.declarations {
        v.visit_pattern(&mut declarator.id);
        if let Some(init) = &mut declarator.init {
            v.visit_expr(init);
        }
    }
}

/// Default expression traversal
pub fn walk_expr<V: VisitMut + ?Sized>(v: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Ident(_) | Expr::This | Expr::Super | Expr::NewTarget | Expr::Lit(_) => {}
        Expr::Template { exprs, .. } => {
            for e in exprs {
                v.visit_expr(e);
            }
        }
        Expr::TaggedTemplate { tag, exprs, .. } => {
            v.visit_expr(tag);
            for e in exprs {
                v.visit_expr(e);
            }
        }
        Expr::Array(items) => {
            for item in items.iter_mut().flatten() {
                v.visit_expr(&mut item.expr);
            }
        }
        Expr::Object(props) => {
            for prop in props {
                walk_object_prop(v, prop);
            }
        }
        Expr::Function(function) | Expr::Arrow(function) => v.visit_function(function),
        Expr::Class(class) => v.visit_class(class),
        Expr::Unary { arg, .. } | Expr::Update { arg, .. } | Expr::Await(arg) | Expr::Chain(arg) => {
            v.visit_expr(arg)
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expr::Assign { target, value, .. } => {
            v.visit_pattern(target);
            v.visit_expr(value);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            v.visit_expr(test);
            v.visit_expr(consequent);
            v.visit_expr(alternate);
        }
        Expr::Call { callee, args, .. } | Expr::New { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(&mut arg.expr);
            }
        }
        Expr::Member {
            object, property, ..
        } => {
            v.visit_expr(object);
            if let MemberProp::Computed(prop) = property {
                v.visit_expr(prop);
            }
        }
        Expr::Sequence(exprs) => {
            for e in exprs {
                v.visit_expr(e);
            }
        }
        Expr::Yield { arg, .. } => {
            if let Some(arg) = arg {
                v.visit_expr(arg);
            }
        }
    }
}

/// Visit an object literal property
pub fn walk_object_prop<V: VisitMut + ?Sized>(v: &mut V, prop: &mut ObjectProp) {
    match prop {
        ObjectProp::KeyValue { key, value } => {
            v.visit_prop_key(key);
            v.visit_expr(value);
        }
        ObjectProp::Shorthand(_) => {}
        ObjectProp::Method { key, function, .. } => {
            v.visit_prop_key(key);
            v.visit_function(function);
        }
        ObjectProp::Spread(expr) => v.visit_expr(expr),
    }
}

/// Default pattern traversal
pub fn walk_pattern<V: VisitMut + ?Sized>(v: &mut V, pattern: &mut Pattern) {
    match pattern {
        Pattern::Ident(_) => {}
        Pattern::Array(items) => {
            for item in items.iter_mut().flatten() {
                v.visit_pattern(item);
            }
        }
        Pattern::Object(props) => {
            for prop in props {
                match prop {
                    ObjectPatternProp::KeyValue { key, value } => {
                        v.visit_prop_key(key);
                        v.visit_pattern(value);
                    }
                    ObjectPatternProp::Rest(rest) => v.visit_pattern(rest),
                }
            }
        }
        Pattern::Assign { target, default } => {
            v.visit_pattern(target);
            v.visit_expr(default);
        }
        Pattern::Rest(inner) => v.visit_pattern(inner),
        Pattern::Expr(expr) => v.visit_expr(expr),
    }
}

/// Default function traversal (parameters, then body)
pub fn walk_function<V: VisitMut + ?Sized>(v: &mut V, function: &mut Function) {
    for param in &mut function.params {
        v.visit_pattern(param);
    }
    walk_stmts(v, &mut function.body);
}

/// Default class traversal
pub fn walk_class<V: VisitMut + ?Sized>(v: &mut V, class: &mut Class) {
    if let Some(sup) = &mut class.super_class {
        v.visit_expr(sup);
    }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountIdents(usize);

    impl VisitMut for CountIdents {
        fn visit_expr(&mut self, expr: &mut Expr) {
            if matches!(expr, Expr::Ident(_)) {
                self.0 += 1;
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_walk_reaches_nested_expressions() {
        let mut stmt = Stmt::If {
            test: Expr::binary(BinaryOp::Lt, Expr::ident("a"), Expr::ident("b")),
            consequent: Box::new(Stmt::Return(Some(Expr::call(
                Expr::ident("f"),
                vec![Expr::ident("a")],
            )))),
            alternate: None,
        };
        let mut counter = CountIdents(0);
        counter.visit_stmt(&mut stmt);
        assert_eq!(counter.0, 4);
    }
}
