//! The virtualization pass
//!
//! Walks a program outer-first and replaces the body of every function it
//! can lower with a wrapper that hands bytecode to the emitted runtime:
//!
//! ```text
//! function f(a, b) {
//!   const C = <tape>;  const K = <constants>;
//!   const E = {__proto__: null, a: a, b: b, x: void 0, f: f, [ARGS]: arguments, [NT]: new.target};
//!   return RUN(C, K, E, this);
//! }
//! ```
//!
//! A function that cannot be lowered keeps its original body and the walk
//! continues inside it, so nested functions still get their chance. The
//! runtime is inserted once, at the top of the program, and only when at
//! least one function was virtualized.

use rustc_hash::FxHashSet;
use serde::Serialize;
use shroud_ast::scope::{free_variables, function_scope_names, lexical_names, pattern_names};
use shroud_ast::visit::{VisitMut, walk_class, walk_expr, walk_function, walk_stmt, walk_stmts};
use shroud_ast::*;
use shroud_vm_compiler::{CompileError, CompiledFunction};
use tracing::{debug, info, warn};

use crate::context::VirtualizeContext;
use crate::error::{EngineError, EngineResult};
use crate::options::VirtualizeOptions;
use crate::runtime::{RuntimeFeatures, runtime_source};

// ============================================================================
// Report
// ============================================================================

/// A function left untouched, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFunction {
    /// Function name (`<anonymous>` for unnamed expressions)
    pub name: String,
    /// Reason given by the gate, the compiler or the capture check
    pub reason: String,
}

/// Outcome of one run over a program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VirtualizeReport {
    /// Names of the virtualized functions, in walk order
    pub virtualized: Vec<String>,
    /// Functions kept as they were
    pub skipped: Vec<SkippedFunction>,
    /// Whether the runtime was inserted into the program
    pub runtime_inserted: bool,
}

impl VirtualizeReport {
    /// Whether anything was virtualized
    pub fn is_empty(&self) -> bool {
        self.virtualized.is_empty()
    }
}

// ============================================================================
// Virtualizer
// ============================================================================

/// Runs the pass over whole programs
#[derive(Debug)]
pub struct Virtualizer {
    ctx: VirtualizeContext,
}

impl Virtualizer {
    /// Create a virtualizer with its own context
    pub fn new(options: VirtualizeOptions) -> EngineResult<Self> {
        options.validate()?;
        Ok(Self {
            ctx: VirtualizeContext::new(options),
        })
    }

    /// The per-run context
    pub fn context(&self) -> &VirtualizeContext {
        &self.ctx
    }

    /// Virtualize every eligible function of `program` in place
    pub fn run(&mut self, program: &mut Program) -> EngineResult<VirtualizeReport> {
        self.ctx.reserve_program(program);

        let mut walker = Walker {
            ctx: &mut self.ctx,
            scopes: Vec::new(),
            report: VirtualizeReport::default(),
            table_init: None,
            any_async: false,
        };
        walk_stmts(&mut walker, &mut program.body);
        let Walker {
            mut report,
            table_init,
            any_async,
            ..
        } = walker;

        if let Some(table_init) = table_init {
            let features = RuntimeFeatures {
                decoder: self.ctx.options().encodes_anything(),
                async_entry: any_async,
            };
            let source = runtime_source(self.ctx.runtime_names(), &table_init, features);
            program.body.insert(0, Stmt::Verbatim(source));
            report.runtime_inserted = true;
        }

        info!(
            virtualized = report.virtualized.len(),
            skipped = report.skipped.len(),
            runtime = report.runtime_inserted,
            "virtualization finished"
        );
        Ok(report)
    }
}

/// Virtualize `program` with a fresh context
pub fn virtualize(program: &mut Program, options: VirtualizeOptions) -> EngineResult<VirtualizeReport> {
    Virtualizer::new(options)?.run(program)
}

// ============================================================================
// Walk
// ============================================================================

struct Walker<'a> {
    ctx: &'a mut VirtualizeContext,
    /// Bindings of enclosing function and block scopes, innermost last.
    /// The program's own top level is absent: the runtime reaches it.
    scopes: Vec<FxHashSet<String>>,
    report: VirtualizeReport,
    table_init: Option<Expr>,
    any_async: bool,
}

fn display_name(function: &Function) -> String {
    function.id.clone().unwrap_or_else(|| "<anonymous>".to_string())
}

impl Walker<'_> {
    fn scoped(&mut self, names: impl IntoIterator<Item = String>, f: impl FnOnce(&mut Self)) {
        self.scopes.push(names.into_iter().collect());
        f(self);
        self.scopes.pop();
    }

    fn enclosing_binding(&self, function: &Function) -> Option<String> {
        let mut captured: Vec<String> = free_variables(function)
            .into_iter()
            .filter(|name| self.scopes.iter().any(|scope| scope.contains(name)))
            .collect();
        captured.sort();
        captured.into_iter().next()
    }

    fn skip(&mut self, function: &mut Function, reason: String) {
        let name = display_name(function);
        debug!(name = %name, reason = %reason, "function skipped");
        self.report.skipped.push(SkippedFunction { name, reason });
        self.visit_function(function);
    }

    fn candidate(&mut self, function: &mut Function) {
        if let Some(name) = self.enclosing_binding(function) {
            return self.skip(function, format!("captures enclosing binding `{name}`"));
        }

        let slots = self.ctx.runtime_names().slots.clone();
        let compiled = match self.ctx.compile(function, &slots) {
            Ok(compiled) => compiled,
            Err(err) => {
                if err.is_internal() {
                    warn!(name = %display_name(function), error = %err, "compiler invariant broken");
                }
                return self.skip(function, compile_reason(&err));
            }
        };

        match self.wrapper(&compiled) {
            Ok(body) => {
                function.params = compiled.params.iter().map(Pattern::ident).collect();
                function.body = body;
                self.any_async |= compiled.is_async;
                let name = display_name(function);
                debug!(name = %name, words = compiled.unit.code.len(), "function virtualized");
                self.report.virtualized.push(name);
            }
            Err(err) => {
                warn!(name = %display_name(function), error = %err, "encoding failed");
                self.skip(function, err.to_string());
            }
        }
    }

    /// Replacement body for a compiled function
    fn wrapper(&mut self, compiled: &CompiledFunction) -> EngineResult<Vec<Stmt>> {
        if self.table_init.is_none() {
            self.table_init = Some(self.ctx.table_init()?);
        }
        let code_init = self.ctx.code_init(&compiled.unit.code)?;
        let consts_init = self.ctx.consts_init(&compiled.unit.consts)?;

        let downlevel = self.ctx.options().downlevel;
        let names = self.ctx.runtime_names();
        let declare = |name: &str, init: Expr| {
            if downlevel {
                Stmt::var(name, Some(init))
            } else {
                Stmt::constant(name, init)
            }
        };
        let run = Expr::call(
            Expr::ident(names.entry(compiled.is_async)),
            vec![
                Expr::ident(names.code_var.as_str()),
                Expr::ident(names.consts_var.as_str()),
                Expr::ident(names.env_var.as_str()),
                Expr::This,
            ],
        );
        Ok(vec![
            declare(&names.code_var, code_init),
            declare(&names.consts_var, consts_init),
            declare(&names.env_var, env_literal(compiled, &names.slots)),
            Stmt::Return(Some(run)),
        ])
    }
}

fn compile_reason(err: &CompileError) -> String {
    match err {
        CompileError::Ineligible(reason) | CompileError::Unsupported(reason) => reason.clone(),
        CompileError::Internal(_) => err.to_string(),
    }
}

fn env_key(name: &str) -> PropKey {
    if name == "__proto__" {
        PropKey::Computed(Box::new(Expr::str(name)))
    } else {
        PropKey::Ident(name.to_string())
    }
}

/// `{__proto__: null, params, locals, self, [arguments slot], [new.target slot]}`
///
/// The `this` slot is filled by the runtime from the wrapper's receiver.
fn env_literal(compiled: &CompiledFunction, slots: &shroud_vm_compiler::EnvSlots) -> Expr {
    let entry = |key: &str, value: Expr| ObjectProp::KeyValue { key: env_key(key), value };
    let mut props = vec![ObjectProp::KeyValue {
        key: PropKey::Ident("__proto__".to_string()),
        value: Expr::Lit(Lit::Null),
    }];
    props.extend(compiled.params.iter().map(|p| entry(p, Expr::ident(p.as_str()))));
    props.extend(compiled.locals.iter().map(|l| entry(l, Expr::undefined())));
    if let Some(name) = &compiled.self_name {
        props.push(entry(name, Expr::ident(name.as_str())));
    }
    props.push(entry(&slots.arguments_slot, Expr::ident("arguments")));
    props.push(entry(&slots.new_target_slot, Expr::NewTarget));
    Expr::Object(props)
}

impl VisitMut for Walker<'_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::FunctionDecl(function) => self.candidate(function),
            Stmt::Block(body) => self.scoped(lexical_names(body), |w| walk_stmts(w, body)),
            Stmt::For {
                init: Some(ForInit::VarDecl(decl)),
                ..
            } if decl.kind.is_block_scoped() => {
                let names: Vec<String> = decl.declarations.iter().flat_map(|d| pattern_names(&d.id)).collect();
                self.scoped(names, |w| walk_stmt(w, stmt));
            }
            Stmt::ForIn {
                left: ForHead::VarDecl(kind, pattern),
                ..
            }
            | Stmt::ForOf {
                left: ForHead::VarDecl(kind, pattern),
                ..
            } if kind.is_block_scoped() => {
                let names = pattern_names(pattern);
                self.scoped(names, |w| walk_stmt(w, stmt));
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.scoped(lexical_names(block), |w| walk_stmts(w, block));
                if let Some(handler) = handler {
                    let mut names = handler.param.as_ref().map(pattern_names).unwrap_or_default();
                    names.extend(lexical_names(&handler.body));
                    self.scoped(names, |w| {
                        if let Some(param) = &mut handler.param {
                            w.visit_pattern(param);
                        }
                        walk_stmts(w, &mut handler.body);
                    });
                }
                if let Some(finalizer) = finalizer {
                    self.scoped(lexical_names(finalizer), |w| walk_stmts(w, finalizer));
                }
            }
            Stmt::Switch { cases, .. } => {
                let names: Vec<String> = cases.iter().flat_map(|c| lexical_names(&c.consequent)).collect();
                self.scoped(names, |w| walk_stmt(w, stmt));
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Function(function) => self.candidate(function),
            _ => walk_expr(self, expr),
        }
    }

    fn visit_function(&mut self, function: &mut Function) {
        let mut names = function_scope_names(function);
        names.extend(function.id.clone());
        if !function.is_arrow {
            names.push("arguments".to_string());
        }
        self.scoped(names, |w| walk_function(w, function));
    }

    fn visit_class(&mut self, class: &mut Class) {
        let names: Vec<String> = class.id.iter().cloned().collect();
        self.scoped(names, |w| walk_class(w, class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(id: &str) -> Function {
        Function {
            id: Some(id.into()),
            params: vec![Pattern::ident("a"), Pattern::ident("b")],
            body: vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::ident("a"),
                Expr::ident("b"),
            )))],
            ..Default::default()
        }
    }

    fn run(program: &mut Program, options: VirtualizeOptions) -> VirtualizeReport {
        virtualize(program, options).unwrap()
    }

    #[test]
    fn test_nothing_eligible_inserts_no_runtime() {
        let mut program = Program {
            body: vec![Stmt::Expr(Expr::call(Expr::ident("log"), vec![Expr::num(1.0)]))],
            ..Default::default()
        };
        let before = program.clone();
        let report = run(&mut program, VirtualizeOptions::seeded(1));
        assert!(report.is_empty());
        assert!(!report.runtime_inserted);
        assert_eq!(program, before);
    }

    #[test]
    fn test_runtime_inserted_once_at_top() {
        let mut program = Program {
            directives: vec!["use strict".into()],
            body: vec![Stmt::FunctionDecl(add("one")), Stmt::FunctionDecl(add("two"))],
            ..Default::default()
        };
        let report = run(&mut program, VirtualizeOptions::seeded(2));
        assert_eq!(report.virtualized, vec!["one", "two"]);
        assert!(report.runtime_inserted);
        assert_eq!(program.directives, vec!["use strict"]);
        assert!(matches!(program.body[0], Stmt::Verbatim(_)));
        let runtimes = program.body.iter().filter(|s| matches!(s, Stmt::Verbatim(_))).count();
        assert_eq!(runtimes, 1);
    }

    #[test]
    fn test_wrapper_shape() {
        let mut program = Program {
            body: vec![Stmt::FunctionDecl(add("sum"))],
            ..Default::default()
        };
        let mut virtualizer = Virtualizer::new(VirtualizeOptions::seeded(3).without_encoding()).unwrap();
        virtualizer.run(&mut program).unwrap();
        let Stmt::FunctionDecl(function) = &program.body[1] else {
            panic!("expected the function after the runtime");
        };
        assert_eq!(function.params, vec![Pattern::ident("a"), Pattern::ident("b")]);
        assert_eq!(function.body.len(), 4);
        assert!(matches!(
            &function.body[0],
            Stmt::VarDecl(VarDecl { kind: VarKind::Const, .. })
        ));
        let text = print_statement(&program.body[1]);
        assert!(text.contains("__proto__: null"), "{text}");
        assert!(text.contains("arguments"), "{text}");
        assert!(text.contains("new.target"), "{text}");
        assert!(text.contains(", this)"), "{text}");
        assert!(!text.contains("a + b"), "{text}");
    }

    #[test]
    fn test_downlevel_wrapper_uses_var() {
        let mut program = Program {
            body: vec![Stmt::FunctionDecl(add("sum"))],
            ..Default::default()
        };
        let options = VirtualizeOptions {
            downlevel: true,
            ..VirtualizeOptions::seeded(4)
        };
        run(&mut program, options);
        let Stmt::FunctionDecl(function) = &program.body[1] else {
            panic!("expected the function after the runtime");
        };
        assert!(matches!(&function.body[0], Stmt::VarDecl(VarDecl { kind: VarKind::Var, .. })));
    }

    #[test]
    fn test_capturing_function_is_skipped_and_entered() {
        // function outer(a) { labelled: for (;;) break labelled; var g = function () { return a; };
        //                      var h = function (x) { return x; }; }
        let inner_capture = Function {
            body: vec![Stmt::Return(Some(Expr::ident("a")))],
            ..Default::default()
        };
        let inner_plain = Function {
            params: vec![Pattern::ident("x")],
            body: vec![Stmt::Return(Some(Expr::ident("x")))],
            ..Default::default()
        };
        let outer = Function {
            id: Some("outer".into()),
            params: vec![Pattern::ident("a")],
            body: vec![
                Stmt::Labeled {
                    label: "labelled".into(),
                    body: Box::new(Stmt::For {
                        init: None,
                        test: None,
                        update: None,
                        body: Box::new(Stmt::Break(Some("labelled".into()))),
                    }),
                },
                Stmt::var("g", Some(Expr::Function(Box::new(inner_capture.clone())))),
                Stmt::var("h", Some(Expr::Function(Box::new(inner_plain.clone())))),
            ],
            ..Default::default()
        };
        let mut program = Program {
            body: vec![Stmt::FunctionDecl(outer)],
            ..Default::default()
        };
        let report = run(&mut program, VirtualizeOptions::seeded(5));

        assert_eq!(report.virtualized, vec!["<anonymous>"]);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].name, "outer");
        assert_eq!(report.skipped[1].reason, "captures enclosing binding `a`");

        let Stmt::FunctionDecl(outer) = &program.body[1] else {
            panic!("expected outer after the runtime");
        };
        let Stmt::VarDecl(g) = &outer.body[1] else { panic!() };
        assert_eq!(g.declarations[0].init, Some(Expr::Function(Box::new(inner_capture))));
        let Stmt::VarDecl(h) = &outer.body[2] else { panic!() };
        assert_ne!(h.declarations[0].init, Some(Expr::Function(Box::new(inner_plain))));
    }

    #[test]
    fn test_block_scoped_binding_blocks_capture() {
        // { let k = 1; function f() { return k; } }
        let f = Function {
            id: Some("f".into()),
            body: vec![Stmt::Return(Some(Expr::ident("k")))],
            ..Default::default()
        };
        let mut program = Program {
            body: vec![Stmt::Block(vec![
                Stmt::VarDecl(VarDecl {
                    kind: VarKind::Let,
                    declarations: vec![VarDeclarator {
                        id: Pattern::ident("k"),
                        init: Some(Expr::num(1.0)),
                    }],
                }),
                Stmt::FunctionDecl(f),
            ])],
            ..Default::default()
        };
        let report = run(&mut program, VirtualizeOptions::seeded(6));
        assert!(report.is_empty());
        assert_eq!(report.skipped[0].reason, "captures enclosing binding `k`");
    }

    #[test]
    fn test_top_level_bindings_do_not_block() {
        // var total = 0; function bump(n) { total = total + n; }
        let bump = Function {
            id: Some("bump".into()),
            params: vec![Pattern::ident("n")],
            body: vec![Stmt::assign(
                "total",
                Expr::binary(BinaryOp::Add, Expr::ident("total"), Expr::ident("n")),
            )],
            ..Default::default()
        };
        let mut program = Program {
            body: vec![Stmt::var("total", Some(Expr::num(0.0))), Stmt::FunctionDecl(bump)],
            ..Default::default()
        };
        let report = run(&mut program, VirtualizeOptions::seeded(7));
        assert_eq!(report.virtualized, vec!["bump"]);
    }

    #[test]
    fn test_async_entry_only_when_needed() {
        let mut program = Program {
            body: vec![Stmt::FunctionDecl(add("plain"))],
            ..Default::default()
        };
        run(&mut program, VirtualizeOptions::seeded(8));
        let Stmt::Verbatim(runtime) = &program.body[0] else { panic!() };
        assert!(!runtime.contains("async function"));

        let mut asynchronous = add("later");
        asynchronous.is_async = true;
        let mut program = Program {
            body: vec![Stmt::FunctionDecl(asynchronous)],
            ..Default::default()
        };
        run(&mut program, VirtualizeOptions::seeded(8));
        let Stmt::Verbatim(runtime) = &program.body[0] else { panic!() };
        assert!(runtime.contains("async function"));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let options = VirtualizeOptions {
            fake_opcode_rate: -0.5,
            ..VirtualizeOptions::default()
        };
        assert!(Virtualizer::new(options).is_err());
    }

    #[test]
    fn test_report_serializes_for_tooling() {
        let mut program = Program {
            body: vec![Stmt::FunctionDecl(add("sum"))],
            ..Default::default()
        };
        let report = run(&mut program, VirtualizeOptions::seeded(9));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["virtualized"][0], "sum");
        assert_eq!(json["runtime_inserted"], true);
        assert!(json["skipped"].as_array().unwrap().is_empty());
    }
}
