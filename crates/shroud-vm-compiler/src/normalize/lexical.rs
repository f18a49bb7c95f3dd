//! Block-scoped declaration downgrade and catch-parameter renaming
//!
//! Every `let`/`const`/class binding gets a fresh name and becomes a `var`,
//! so one flat environment can hold all of them without collisions. Catch
//! parameters are renamed the same way even without downgrading.

use shroud_ast::scope::{function_scope_names, lexical_names, pattern_names};
use shroud_ast::visit::{VisitMut, walk_class, walk_expr, walk_function, walk_pattern, walk_stmt, walk_stmts};
use shroud_ast::*;
use shroud_common::NameGenerator;

/// Rename block-scoped bindings in a function body and collect the
/// renamed catch parameters
pub fn lower_lexical(body: &mut Vec<Stmt>, names: &mut NameGenerator) -> Vec<String> {
    let mut lowering = Lowering {
        names,
        catch_names: Vec::new(),
    };
    lowering.block(body);
    lowering.catch_names
}

struct Lowering<'a> {
    names: &'a mut NameGenerator,
    catch_names: Vec<String>,
}

impl Lowering<'_> {
    fn block(&mut self, stmts: &mut Vec<Stmt>) {
        for name in lexical_names(stmts) {
            let fresh = self.names.fresh();
            rename_in_stmts(stmts, &name, &fresh);
        }
        for stmt in stmts.iter_mut() {
            downgrade_declaration(stmt);
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Block(body) => self.block(body),
            Stmt::If {
                consequent,
                alternate,
                ..
            } => {
                self.stmt(consequent);
                if let Some(alt) = alternate {
                    self.stmt(alt);
                }
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => self.stmt(body),
            Stmt::For { .. } => {
                for name in for_head_names(stmt) {
                    let fresh = self.names.fresh();
                    Rename::new(&name, &fresh).for_parts(stmt);
                }
                if let Stmt::For { init, body, .. } = stmt {
                    if let Some(ForInit::VarDecl(decl)) = init {
                        downgrade_var_decl(decl);
                    }
                    self.stmt(body);
                }
            }
            Stmt::ForOf { left, body, .. } | Stmt::ForIn { left, body, .. } => {
                if let ForHead::VarDecl(kind, pattern) = left {
                    if kind.is_block_scoped() {
                        for name in pattern_names(pattern) {
                            let fresh = self.names.fresh();
                            let mut rename = Rename::new(&name, &fresh);
                            rename.visit_pattern(pattern);
                            rename.visit_stmt(body);
                        }
                        *kind = VarKind::Var;
                    }
                }
                self.stmt(body);
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.block(block);
                if let Some(handler) = handler {
                    if let Some(Pattern::Ident(param)) = &handler.param {
                        let fresh = self.names.fresh();
                        rename_in_stmts(&mut handler.body, param, &fresh);
                        self.catch_names.push(fresh.clone());
                        handler.param = Some(Pattern::Ident(fresh));
                    }
                    self.block(&mut handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.block(finalizer);
                }
            }
            Stmt::Switch { cases, .. } => {
                let bound: Vec<String> = cases.iter().flat_map(|c| lexical_names(&c.consequent)).collect();
                for name in bound {
                    let fresh = self.names.fresh();
                    for case in cases.iter_mut() {
                        rename_in_stmts(&mut case.consequent, &name, &fresh);
                    }
                }
                for case in cases.iter_mut() {
                    for stmt in case.consequent.iter_mut() {
                        downgrade_declaration(stmt);
                        self.stmt(stmt);
                    }
                }
            }
            Stmt::Labeled { body, .. } | Stmt::With { body, .. } => self.stmt(body),
            _ => {}
        }
    }
}

/// Turn `let`/`const` into `var` and class declarations into `var C = class C {}`
fn downgrade_declaration(stmt: &mut Stmt) {
    match stmt {
        Stmt::VarDecl(decl) => downgrade_var_decl(decl),
        Stmt::ClassDecl(class) => {
            let Some(id) = class.id.clone() else { return };
            let class = std::mem::take(class);
            *stmt = Stmt::var(id, Some(Expr::Class(Box::new(class))));
        }
        _ => {}
    }
}

fn downgrade_var_decl(decl: &mut VarDecl) {
    if decl.kind == VarKind::Let {
        // a fresh `let x;` starts undefined on every pass through a loop
        for d in &mut decl.declarations {
            if d.init.is_none() {
                d.init = Some(Expr::undefined());
            }
        }
    }
    decl.kind = VarKind::Var;
}

/// Block-scoped names declared by a loop head
fn for_head_names(stmt: &Stmt) -> Vec<String> {
    match stmt {
        Stmt::For {
            init: Some(ForInit::VarDecl(decl)),
            ..
        } if decl.kind.is_block_scoped() => decl
            .declarations
            .iter()
            .flat_map(|d| pattern_names(&d.id))
            .collect(),
        Stmt::ForOf {
            left: ForHead::VarDecl(kind, pattern),
            ..
        }
        | Stmt::ForIn {
            left: ForHead::VarDecl(kind, pattern),
            ..
        } if kind.is_block_scoped() => pattern_names(pattern),
        _ => Vec::new(),
    }
}

/// Rename every occurrence of `from` bound by this statement list
pub fn rename_in_stmts(stmts: &mut [Stmt], from: &str, to: &str) {
    let mut rename = Rename::new(from, to);
    walk_stmts(&mut rename, stmts);
}

/// Renames one binding, stopping where an inner scope shadows it
struct Rename<'a> {
    from: &'a str,
    to: &'a str,
}

impl<'a> Rename<'a> {
    fn new(from: &'a str, to: &'a str) -> Self {
        Self { from, to }
    }

    fn shadows(&self, names: &[String]) -> bool {
        names.iter().any(|n| n == self.from)
    }

    /// Head, test, update and body of a `for` statement
    fn for_parts(&mut self, stmt: &mut Stmt) {
        if let Stmt::For {
            init,
            test,
            update,
            body,
        } = stmt
        {
            match init {
                Some(ForInit::VarDecl(decl)) => {
                    for d in &mut decl.declarations {
                        self.visit_pattern(&mut d.id);
                        if let Some(init) = &mut d.init {
                            self.visit_expr(init);
                        }
                    }
                }
                Some(ForInit::Expr(e)) => self.visit_expr(e),
                None => {}
            }
            if let Some(test) = test {
                self.visit_expr(test);
            }
            if let Some(update) = update {
                self.visit_expr(update);
            }
            self.visit_stmt(body);
        }
    }
}

impl VisitMut for Rename<'_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        if self.shadows(&for_head_names(stmt)) {
            // the loop head opens its own scope; only the iterated value is outside it
            if let Stmt::ForOf { right, .. } | Stmt::ForIn { right, .. } = stmt {
                self.visit_expr(right);
            }
            return;
        }
        match stmt {
            Stmt::Block(body) if self.shadows(&lexical_names(body)) => {}
            Stmt::ClassDecl(class) if class.id.as_deref() == Some(self.from) => {
                class.id = Some(self.to.to_string());
                walk_class(self, class);
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.visit_stmt_list(block);
                if let Some(handler) = handler {
                    let caught = handler.param.as_ref().map(pattern_names).unwrap_or_default();
                    if !self.shadows(&caught) {
                        self.visit_stmt_list(&mut handler.body);
                    }
                }
                if let Some(finalizer) = finalizer {
                    self.visit_stmt_list(finalizer);
                }
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.visit_expr(discriminant);
                let bound: Vec<String> = cases.iter().flat_map(|c| lexical_names(&c.consequent)).collect();
                if !self.shadows(&bound) {
                    for case in cases {
                        if let Some(test) = &mut case.test {
                            self.visit_expr(test);
                        }
                        walk_stmts(self, &mut case.consequent);
                    }
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Ident(name) if name == self.from => *name = self.to.to_string(),
            Expr::Object(props) => {
                for prop in props.iter_mut() {
                    if matches!(prop, ObjectProp::Shorthand(n) if n == self.from) {
                        *prop = ObjectProp::KeyValue {
                            key: PropKey::Ident(self.from.to_string()),
                            value: Expr::ident(self.to),
                        };
                    }
                }
                walk_expr(self, expr);
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Ident(name) if name == self.from => *name = self.to.to_string(),
            _ => walk_pattern(self, pattern),
        }
    }

    fn visit_function(&mut self, function: &mut Function) {
        let mut bound = function_scope_names(function);
        bound.extend(function.id.clone());
        if !function.is_arrow {
            bound.push("arguments".to_string());
        }
        if !self.shadows(&bound) {
            walk_function(self, function);
        }
    }

    fn visit_class(&mut self, class: &mut Class) {
        if class.id.as_deref() != Some(self.from) {
            walk_class(self, class);
        }
    }
}

impl Rename<'_> {
    fn visit_stmt_list(&mut self, stmts: &mut [Stmt]) {
        if !self.shadows(&lexical_names(stmts)) {
            walk_stmts(self, stmts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_common::ObfuscationRng;

    fn names() -> NameGenerator {
        NameGenerator::new(ObfuscationRng::from_seed(5))
    }

    fn let_decl(name: &str, init: Option<Expr>) -> Stmt {
        Stmt::VarDecl(VarDecl {
            kind: VarKind::Let,
            declarations: vec![VarDeclarator {
                id: Pattern::ident(name),
                init,
            }],
        })
    }

    #[test]
    fn test_shadowing_blocks_get_distinct_names() {
        // let x = 1; { let x = 2; use(x); } use(x);
        let mut body = vec![
            let_decl("x", Some(Expr::num(1.0))),
            Stmt::Block(vec![
                let_decl("x", Some(Expr::num(2.0))),
                Stmt::Expr(Expr::call(Expr::ident("use"), vec![Expr::ident("x")])),
            ]),
            Stmt::Expr(Expr::call(Expr::ident("use"), vec![Expr::ident("x")])),
        ];
        let mut names_gen = names();
        lower_lexical(&mut body, &mut names_gen);
        let text: String = body.iter().map(print_statement).collect();
        assert!(!text.contains("let "));
        assert!(!text.contains("(x)"));
        let Stmt::VarDecl(outer) = &body[0] else { panic!() };
        let outer_name = outer.declarations[0].id.as_ident().unwrap().to_string();
        let Stmt::Expr(Expr::Call { args, .. }) = &body[2] else { panic!() };
        assert_eq!(args[0].expr, Expr::ident(outer_name.clone()));
        let Stmt::Block(inner) = &body[1] else { panic!() };
        let Stmt::VarDecl(inner_decl) = &inner[0] else { panic!() };
        assert_ne!(inner_decl.declarations[0].id.as_ident().unwrap(), outer_name);
    }

    #[test]
    fn test_uninitialized_let_gets_undefined() {
        let mut body = vec![Stmt::While {
            test: Expr::ident("go"),
            body: Box::new(Stmt::Block(vec![let_decl("y", None)])),
        }];
        lower_lexical(&mut body, &mut names());
        let text = print_statement(&body[0]);
        assert!(text.contains("= void 0"), "{text}");
    }

    #[test]
    fn test_closure_parameter_shadow_is_respected() {
        // let v = 1; var g = function (v) { return v; };
        let inner = Function {
            params: vec![Pattern::ident("v")],
            body: vec![Stmt::Return(Some(Expr::ident("v")))],
            ..Default::default()
        };
        let mut body = vec![
            let_decl("v", Some(Expr::num(1.0))),
            Stmt::var("g", Some(Expr::Function(Box::new(inner.clone())))),
        ];
        lower_lexical(&mut body, &mut names());
        let Stmt::VarDecl(decl) = &body[1] else { panic!() };
        assert_eq!(decl.declarations[0].init, Some(Expr::Function(Box::new(inner))));
    }

    #[test]
    fn test_catch_parameter_is_renamed() {
        let mut body = vec![Stmt::Try {
            block: vec![],
            handler: Some(CatchClause {
                param: Some(Pattern::ident("e")),
                body: vec![Stmt::Return(Some(Expr::ident("e")))],
            }),
            finalizer: None,
        }];
        let caught = lower_lexical(&mut body, &mut names());
        assert_eq!(caught.len(), 1);
        let Stmt::Try { handler: Some(h), .. } = &body[0] else { panic!() };
        assert_eq!(h.param, Some(Pattern::ident(caught[0].clone())));
        assert_eq!(h.body[0], Stmt::Return(Some(Expr::ident(caught[0].clone()))));
    }

    #[test]
    fn test_class_declaration_becomes_var() {
        let mut body = vec![Stmt::ClassDecl(Class {
            id: Some("C".into()),
            ..Default::default()
        })];
        lower_lexical(&mut body, &mut names());
        let text = print_statement(&body[0]);
        assert!(text.starts_with("var _"), "{text}");
        assert!(text.contains("= class _"), "{text}");
    }
}
