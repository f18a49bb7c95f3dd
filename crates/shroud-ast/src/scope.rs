//! Binding collection and free-variable analysis

use rustc_hash::FxHashSet;

use crate::ast::*;

/// Names bound by a pattern, in source order
pub fn pattern_names(pattern: &Pattern) -> Vec<String> {
    let mut out = Vec::new();
    collect_pattern_names(pattern, &mut out);
    out
}

fn collect_pattern_names(pattern: &Pattern, out: &mut Vec<String>) {
    match pattern {
        Pattern::Ident(name) => push_unique(out, name),
        Pattern::Array(items) => {
            for item in items.iter().flatten() {
                collect_pattern_names(item, out);
            }
        }
        Pattern::Object(props) => {
            for prop in props {
                match prop {
                    ObjectPatternProp::KeyValue { value, .. } => collect_pattern_names(value, out),
                    ObjectPatternProp::Rest(rest) => collect_pattern_names(rest, out),
                }
            }
        }
        Pattern::Assign { target, .. } => collect_pattern_names(target, out),
        Pattern::Rest(inner) => collect_pattern_names(inner, out),
        Pattern::Expr(_) => {}
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

/// Names hoisted to function scope: `var` bindings at any block depth and
/// function declarations, without descending into nested functions.
pub fn var_scoped_names(body: &[Stmt]) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in body {
        collect_var_names(stmt, &mut out);
    }
    out
}

fn collect_var_decl(decl: &VarDecl, out: &mut Vec<String>) {
    if decl.kind == VarKind::Var {
        for d in &decl.declarations {
            collect_pattern_names(&d.id, out);
        }
    }
}

fn collect_var_names(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::VarDecl(decl) => collect_var_decl(decl, out),
        Stmt::FunctionDecl(function) => {
            if let Some(id) = &function.id {
                push_unique(out, id);
            }
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_var_names(consequent, out);
            if let Some(alt) = alternate {
                collect_var_names(alt, out);
            }
        }
        Stmt::Block(stmts) => stmts.iter().for_each(|s| collect_var_names(s, out)),
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names(body, out),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::VarDecl(decl)) = init {
                collect_var_decl(decl, out);
            }
            collect_var_names(body, out);
        }
        Stmt::ForIn { left, body, .. } | Stmt::ForOf { left, body, .. } => {
            if let ForHead::VarDecl(VarKind::Var, pattern) = left {
                collect_pattern_names(pattern, out);
            }
            collect_var_names(body, out);
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            block.iter().for_each(|s| collect_var_names(s, out));
            if let Some(handler) = handler {
                handler.body.iter().for_each(|s| collect_var_names(s, out));
            }
            if let Some(finalizer) = finalizer {
                finalizer.iter().for_each(|s| collect_var_names(s, out));
            }
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                case.consequent.iter().for_each(|s| collect_var_names(s, out));
            }
        }
        Stmt::Labeled { body, .. } | Stmt::With { body, .. } => collect_var_names(body, out),
        _ => {}
    }
}

/// `let`, `const` and class names declared directly in a statement list
pub fn lexical_names(stmts: &[Stmt]) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::VarDecl(decl) if decl.kind.is_block_scoped() => {
                for d in &decl.declarations {
                    collect_pattern_names(&d.id, &mut out);
                }
            }
            Stmt::ClassDecl(class) => {
                if let Some(id) = &class.id {
                    push_unique(&mut out, id);
                }
            }
            _ => {}
        }
    }
    out
}

/// Every name bound directly in a function's own scope: parameters, hoisted
/// `var`/function names and top-level lexical declarations.
pub fn function_scope_names(function: &Function) -> Vec<String> {
    let mut out = Vec::new();
    for param in &function.params {
        collect_pattern_names(param, &mut out);
    }
    for name in var_scoped_names(&function.body) {
        push_unique(&mut out, &name);
    }
    for name in lexical_names(&function.body) {
        push_unique(&mut out, &name);
    }
    out
}

/// Every identifier spelled anywhere in a program (references, bindings,
/// labels and identifier property names).
pub fn all_identifiers(program: &Program) -> FxHashSet<String> {
    let mut analyzer = ScopeAnalyzer::collecting();
    for stmt in &program.body {
        analyzer.stmt(stmt);
    }
    analyzer.spelled
}

/// Identifiers a function reads or writes without binding them itself.
///
/// The function's own name, its parameters, hoisted and block-scoped
/// declarations, catch parameters and the implicit `arguments` of non-arrow
/// functions all count as bound.
pub fn free_variables(function: &Function) -> FxHashSet<String> {
    let mut analyzer = ScopeAnalyzer::new();
    analyzer.function(function);
    analyzer.free
}

/// Which implicit bindings and suspension points a function body touches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionUsage {
    /// `this` or `new.target`, including through nested arrows
    pub this: bool,
    /// The implicit `arguments` object, including through nested arrows
    pub arguments: bool,
    /// `super` property access or call
    pub super_ref: bool,
    /// `await` in the function's own body
    pub await_expr: bool,
    /// `yield` in the function's own body
    pub yield_expr: bool,
}

/// Detect `this`/`arguments`/`super`/`await`/`yield` usage of a function.
///
/// Arrows share `this`, `arguments` and `super` with their parent, so those
/// are seen through nested arrows but not through nested functions, methods
/// or field initializers. `await` and `yield` only count in the function's
/// own body.
pub fn function_usage(function: &Function) -> FunctionUsage {
    let mut analyzer = ScopeAnalyzer::new();
    analyzer.function_body(function);
    analyzer.usage
}

/// Free variables of a whole statement list evaluated in a fresh scope
pub fn free_variables_of_block(stmts: &[Stmt]) -> FxHashSet<String> {
    let mut analyzer = ScopeAnalyzer::new();
    analyzer.block(stmts);
    analyzer.free
}

// Scope entry for the implicit `arguments` of a non-arrow function. Not a
// valid identifier, so a declared `arguments` never collides with it.
const IMPLICIT_ARGUMENTS: &str = "%arguments";

struct ScopeAnalyzer {
    scopes: Vec<FxHashSet<String>>,
    free: FxHashSet<String>,
    spelled: FxHashSet<String>,
    collect_spelled: bool,
    usage: FunctionUsage,
    // nesting below the analyzed root: any function, and non-arrow functions
    function_depth: usize,
    own_this_depth: usize,
}

impl ScopeAnalyzer {
    fn new() -> Self {
        Self {
            scopes: Vec::new(),
            free: FxHashSet::default(),
            spelled: FxHashSet::default(),
            collect_spelled: false,
            usage: FunctionUsage::default(),
            function_depth: 0,
            own_this_depth: 0,
        }
    }

    fn collecting() -> Self {
        Self {
            collect_spelled: true,
            ..Self::new()
        }
    }

    fn push(&mut self, names: impl IntoIterator<Item = String>) {
        let scope: FxHashSet<String> = names.into_iter().collect();
        if self.collect_spelled {
            self.spelled
                .extend(scope.iter().filter(|name| name.as_str() != IMPLICIT_ARGUMENTS).cloned());
        }
        self.scopes.push(scope);
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn reference(&mut self, name: &str) {
        if self.collect_spelled {
            self.spelled.insert(name.to_string());
        }
        // Some(true) when the name resolves to an implicit `arguments`
        let resolved = self.scopes.iter().rev().find_map(|scope| {
            if scope.contains(name) {
                Some(false)
            } else if name == "arguments" && scope.contains(IMPLICIT_ARGUMENTS) {
                Some(true)
            } else {
                None
            }
        });
        match resolved {
            Some(false) => {}
            Some(true) => {
                if self.own_this_depth == 0 {
                    self.usage.arguments = true;
                }
            }
            None => {
                if name == "arguments" && self.own_this_depth == 0 {
                    self.usage.arguments = true;
                }
                self.free.insert(name.to_string());
            }
        }
    }

    fn spell(&mut self, name: &str) {
        if self.collect_spelled {
            self.spelled.insert(name.to_string());
        }
    }

    fn function(&mut self, function: &Function) {
        self.function_depth += 1;
        if !function.is_arrow {
            self.own_this_depth += 1;
        }
        self.function_body(function);
        if !function.is_arrow {
            self.own_this_depth -= 1;
        }
        self.function_depth -= 1;
    }

    fn function_body(&mut self, function: &Function) {
        let mut names = Vec::new();
        if let Some(id) = &function.id {
            names.push(id.clone());
        }
        if !function.is_arrow {
            names.push(IMPLICIT_ARGUMENTS.to_string());
        }
        names.extend(function_scope_names(function));
        self.push(names);
        for param in &function.params {
            self.pattern(param);
        }
        for stmt in &function.body {
            self.stmt(stmt);
        }
        self.pop();
    }

    fn class(&mut self, class: &Class) {
        if let Some(sup) = &class.super_class {
            self.expr(sup);
        }
        self.push(class.id.clone());
        for member in &class.body {
            match member {
                ClassMember::Method { key, function, .. } => {
                    self.prop_key(key);
                    self.function(function);
                }
                ClassMember::Field { key, value, .. } => {
                    self.prop_key(key);
                    if let Some(value) = value {
                        self.function_depth += 1;
                        self.own_this_depth += 1;
                        self.expr(value);
                        self.own_this_depth -= 1;
                        self.function_depth -= 1;
                    }
                }
            }
        }
        self.pop();
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.push(lexical_names(stmts));
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.pop();
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        for d in &decl.declarations {
            self.pattern(&d.id);
            if let Some(init) = &d.init {
                self.expr(init);
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) | Stmt::Throw(expr) => self.expr(expr),
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::FunctionDecl(function) => self.function(function),
            Stmt::ClassDecl(class) => {
                if let Some(id) = &class.id {
                    self.spell(id);
                }
                self.class(class);
            }
            Stmt::Return(arg) => {
                if let Some(expr) = arg {
                    self.expr(expr);
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.stmt(consequent);
                if let Some(alt) = alternate {
                    self.stmt(alt);
                }
            }
            Stmt::Block(stmts) => self.block(stmts),
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.expr(test);
                self.stmt(body);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let head: Vec<String> = match init {
                    Some(ForInit::VarDecl(decl)) if decl.kind.is_block_scoped() => decl
                        .declarations
                        .iter()
                        .flat_map(|d| pattern_names(&d.id))
                        .collect(),
                    _ => Vec::new(),
                };
                self.push(head);
                match init {
                    Some(ForInit::VarDecl(decl)) => self.var_decl(decl),
                    Some(ForInit::Expr(expr)) => self.expr(expr),
                    None => {}
                }
                if let Some(test) = test {
                    self.expr(test);
                }
                if let Some(update) = update {
                    self.expr(update);
                }
                self.stmt(body);
                self.pop();
            }
            Stmt::ForIn { left, right, body } | Stmt::ForOf { left, right, body, .. } => {
                if matches!(stmt, Stmt::ForOf { is_await: true, .. }) && self.function_depth == 0 {
                    self.usage.await_expr = true;
                }
                let head = match left {
                    ForHead::VarDecl(kind, pattern) if kind.is_block_scoped() => pattern_names(pattern),
                    _ => Vec::new(),
                };
                self.expr(right);
                self.push(head);
                match left {
                    ForHead::VarDecl(_, pattern) | ForHead::Pattern(pattern) => self.pattern(pattern),
                }
                self.stmt(body);
                self.pop();
            }
            Stmt::Break(label) | Stmt::Continue(label) => {
                if let Some(label) = label {
                    self.spell(label);
                }
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.block(block);
                if let Some(handler) = handler {
                    let names = handler.param.as_ref().map(pattern_names).unwrap_or_default();
                    self.push(names);
                    if let Some(param) = &handler.param {
                        self.pattern(param);
                    }
                    self.block(&handler.body);
                    self.pop();
                }
                if let Some(finalizer) = finalizer {
                    self.block(finalizer);
                }
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.expr(discriminant);
                let names: Vec<String> = cases
                    .iter()
                    .flat_map(|c| lexical_names(&c.consequent))
                    .collect();
                self.push(names);
                for case in cases {
                    if let Some(test) = &case.test {
                        self.expr(test);
                    }
                    for stmt in &case.consequent {
                        self.stmt(stmt);
                    }
                }
                self.pop();
            }
            Stmt::Labeled { label, body } => {
                self.spell(label);
                self.stmt(body);
            }
            Stmt::With { object, body } => {
                self.expr(object);
                self.stmt(body);
            }
            Stmt::Empty | Stmt::Debugger | Stmt::Verbatim(_) => {}
        }
    }

    fn prop_key(&mut self, key: &PropKey) {
        match key {
            PropKey::Computed(expr) => self.expr(expr),
            PropKey::Ident(name) => self.spell(name),
            _ => {}
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(name) => self.reference(name),
            Pattern::Array(items) => {
                for item in items.iter().flatten() {
                    self.pattern(item);
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectPatternProp::KeyValue { key, value } => {
                            self.prop_key(key);
                            self.pattern(value);
                        }
                        ObjectPatternProp::Rest(rest) => self.pattern(rest),
                    }
                }
            }
            Pattern::Assign { target, default } => {
                self.pattern(target);
                self.expr(default);
            }
            Pattern::Rest(inner) => self.pattern(inner),
            Pattern::Expr(expr) => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(name) => self.reference(name),
            Expr::This | Expr::NewTarget => {
                if self.own_this_depth == 0 {
                    self.usage.this = true;
                }
            }
            Expr::Super => {
                if self.own_this_depth == 0 {
                    self.usage.super_ref = true;
                }
            }
            Expr::Lit(_) => {}
            Expr::Template { exprs, .. } => exprs.iter().for_each(|e| self.expr(e)),
            Expr::TaggedTemplate { tag, exprs, .. } => {
                self.expr(tag);
                exprs.iter().for_each(|e| self.expr(e));
            }
            Expr::Array(items) => {
                for item in items.iter().flatten() {
                    self.expr(&item.expr);
                }
            }
            Expr::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProp::KeyValue { key, value } => {
                            self.prop_key(key);
                            self.expr(value);
                        }
                        ObjectProp::Shorthand(name) => self.reference(name),
                        ObjectProp::Method { key, function, .. } => {
                            self.prop_key(key);
                            self.function(function);
                        }
                        ObjectProp::Spread(expr) => self.expr(expr),
                    }
                }
            }
            Expr::Function(function) | Expr::Arrow(function) => self.function(function),
            Expr::Class(class) => self.class(class),
            Expr::Await(arg) => {
                if self.function_depth == 0 {
                    self.usage.await_expr = true;
                }
                self.expr(arg)
            }
            Expr::Unary { arg, .. } | Expr::Update { arg, .. } | Expr::Chain(arg) => self.expr(arg),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Assign { target, value, .. } => {
                self.pattern(target);
                self.expr(value);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::Call { callee, args, .. } | Expr::New { callee, args } => {
                self.expr(callee);
                args.iter().for_each(|a| self.expr(&a.expr));
            }
            Expr::Member {
                object, property, ..
            } => {
                self.expr(object);
                match property {
                    MemberProp::Computed(prop) => self.expr(prop),
                    MemberProp::Ident(name) => self.spell(name),
                }
            }
            Expr::Sequence(exprs) => exprs.iter().for_each(|e| self.expr(e)),
            Expr::Yield { arg, .. } => {
                if self.function_depth == 0 {
                    self.usage.yield_expr = true;
                }
                if let Some(arg) = arg {
                    self.expr(arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(params: &[&str], body: Vec<Stmt>) -> Function {
        Function {
            params: params.iter().map(|p| Pattern::ident(*p)).collect(),
            body,
            ..Default::default()
        }
    }

    #[test]
    fn test_var_scoped_names_descend_blocks() {
        let body = vec![
            Stmt::var("a", None),
            Stmt::Block(vec![Stmt::var("b", Some(Expr::num(1.0)))]),
            Stmt::FunctionDecl(Function {
                id: Some("inner".into()),
                body: vec![Stmt::var("hidden", None)],
                ..Default::default()
            }),
        ];
        assert_eq!(var_scoped_names(&body), vec!["a", "b", "inner"]);
    }

    #[test]
    fn test_free_variables_excludes_bindings() {
        let f = func(
            &["x"],
            vec![
                Stmt::var("y", Some(Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::ident("g")))),
                Stmt::Return(Some(Expr::call(Expr::ident("h"), vec![Expr::ident("y")]))),
            ],
        );
        let free = free_variables(&f);
        assert!(free.contains("g"));
        assert!(free.contains("h"));
        assert!(!free.contains("x"));
        assert!(!free.contains("y"));
    }

    #[test]
    fn test_free_variables_sees_through_closures() {
        let inner = Function {
            is_arrow: true,
            body: vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::ident("a"),
                Expr::ident("outer"),
            )))],
            ..Default::default()
        };
        let f = func(&["a"], vec![Stmt::Return(Some(Expr::Arrow(Box::new(inner))))]);
        let free = free_variables(&f);
        assert_eq!(free.len(), 1);
        assert!(free.contains("outer"));
    }

    #[test]
    fn test_block_scoped_names_are_local_to_block() {
        let body = vec![
            Stmt::Block(vec![Stmt::constant("k", Expr::num(1.0))]),
            Stmt::Return(Some(Expr::ident("k"))),
        ];
        let free = free_variables(&func(&[], body));
        assert!(free.contains("k"));
    }

    #[test]
    fn test_all_identifiers_includes_labels_and_props() {
        let program = Program {
            body: vec![Stmt::Labeled {
                label: "outer".into(),
                body: Box::new(Stmt::Expr(Expr::member(Expr::ident("o"), "p"))),
            }],
            ..Default::default()
        };
        let names = all_identifiers(&program);
        for n in ["outer", "o", "p"] {
            assert!(names.contains(n), "missing {n}");
        }
    }

    #[test]
    fn test_usage_sees_this_through_arrows_only() {
        let arrow = Function {
            is_arrow: true,
            body: vec![Stmt::Return(Some(Expr::This))],
            ..Default::default()
        };
        let outer = func(&[], vec![Stmt::Expr(Expr::Arrow(Box::new(arrow)))]);
        let usage = function_usage(&outer);
        assert!(usage.this);
        assert!(!usage.arguments);

        let inner = func(&[], vec![Stmt::Return(Some(Expr::ident("arguments")))]);
        let outer = func(&[], vec![Stmt::Expr(Expr::Function(Box::new(inner)))]);
        assert_eq!(function_usage(&outer), FunctionUsage::default());
    }

    #[test]
    fn test_usage_respects_shadowed_arguments() {
        let reads = func(&[], vec![Stmt::Return(Some(Expr::member(Expr::ident("arguments"), "length")))]);
        assert!(function_usage(&reads).arguments);

        let shadowed = func(&["arguments"], vec![Stmt::Return(Some(Expr::ident("arguments")))]);
        assert!(!function_usage(&shadowed).arguments);
    }

    #[test]
    fn test_usage_await_only_in_own_body() {
        let mut own = func(&["p"], vec![Stmt::Return(Some(Expr::Await(Box::new(Expr::ident("p")))))]);
        own.is_async = true;
        assert!(function_usage(&own).await_expr);

        let mut nested = own.clone();
        nested.is_arrow = true;
        let outer = func(&[], vec![Stmt::Expr(Expr::Arrow(Box::new(nested)))]);
        let usage = function_usage(&outer);
        assert!(!usage.await_expr);
        assert!(!usage.yield_expr);
    }

    #[test]
    fn test_usage_finds_arguments_through_arrow() {
        let arrow = Function {
            is_arrow: true,
            body: vec![Stmt::Return(Some(Expr::index(Expr::ident("arguments"), Expr::num(0.0))))],
            ..Default::default()
        };
        let outer = func(&["a"], vec![Stmt::Return(Some(Expr::Arrow(Box::new(arrow.clone()))))]);
        assert!(function_usage(&outer).arguments);
        assert!(!free_variables(&outer).contains("arguments"));

        let declared = func(
            &[],
            vec![
                Stmt::var("arguments", Some(Expr::num(1.0))),
                Stmt::Return(Some(Expr::Arrow(Box::new(arrow)))),
            ],
        );
        assert!(!function_usage(&declared).arguments);
    }

    #[test]
    fn test_implicit_arguments_is_not_spelled() {
        let program = Program {
            body: vec![Stmt::FunctionDecl(func(&["x"], vec![]))],
            ..Default::default()
        };
        let names = all_identifiers(&program);
        assert!(names.contains("x"));
        assert!(!names.iter().any(|n| n.starts_with('%')));
    }
}
