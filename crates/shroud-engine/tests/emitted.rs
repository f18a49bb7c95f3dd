//! Printed programs run under `node`
//!
//! The emitted runtime and decoder are JavaScript text, so these checks run
//! the printed output of every option set next to the unprotected program
//! and compare what each prints. Skipped when no `node` binary is on PATH.

mod common;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use common::*;
use shroud_common::{NameGenerator, ObfuscationRng};
use shroud_engine::ast::*;
use shroud_engine::{RuntimeFeatures, RuntimeNames, runtime_source, virtualize};
use shroud_vm_bytecode::OpcodeMap;

// ============================================================================
// Node
// ============================================================================

fn node() -> Option<PathBuf> {
    let found = which::which("node").ok();
    if found.is_none() {
        eprintln!("node not found on PATH, skipping");
    }
    found
}

fn run_node(node: &Path, source: &str) -> String {
    let mut child = Command::new(node)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn node");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(source.as_bytes())
        .expect("write source");
    let output = child.wait_with_output().expect("node output");
    assert!(
        output.status.success(),
        "node failed:\n{}\n--- source ---\n{source}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf-8 output")
}

/// Run `driver` after the plain program and after each protected rendition;
/// every run must print the same thing
fn assert_same_output(seed: u64, program: Program, driver: &str) {
    let Some(node) = node() else { return };
    let expected = run_node(&node, &format!("{}\n{driver}", print_program(&program)));
    assert!(!expected.trim().is_empty());

    for options in option_sets(seed) {
        let mut protected = program.clone();
        let report = virtualize(&mut protected, options).unwrap();
        assert!(!report.virtualized.is_empty(), "{:?}", report.skipped);
        let source = format!("{}\n{driver}", print_program(&protected));
        assert_eq!(run_node(&node, &source), expected, "{source}");
    }
}

// ============================================================================
// Programs
// ============================================================================

fn block(stmts: Vec<Stmt>) -> Box<Stmt> {
    Box::new(Stmt::Block(stmts))
}

fn postfix_inc(name: &str) -> Expr {
    Expr::Update {
        op: UpdateOp::Increment,
        prefix: false,
        arg: Box::new(id(name)),
    }
}

/// `function f(a, b) { try { if (a > b) return a - b; throw new Error("x"); }
/// catch (e) { return e.message.length; } finally { } }`
fn reference() -> Function {
    func(
        "f",
        &["a", "b"],
        vec![try_catch(
            vec![
                if_else(
                    bin(BinaryOp::Gt, id("a"), id("b")),
                    vec![ret(bin(BinaryOp::Sub, id("a"), id("b")))],
                    None,
                ),
                throw(new(id("Error"), vec![str("x")])),
            ],
            Some("e"),
            Some(vec![ret(Expr::member(Expr::member(id("e"), "message"), "length"))]),
            Some(vec![]),
        )],
    )
}

/// Body, catch-and-rethrow and early return, each through a `finally`
fn guarded() -> Function {
    let mode_is = |value: f64| bin(BinaryOp::StrictEq, id("mode"), num(value));
    func(
        "g",
        &["mode"],
        vec![
            try_catch(
                vec![
                    if_else(mode_is(1.0), vec![throw(new(id("Error"), vec![str("boom")]))], None),
                    if_else(mode_is(2.0), vec![ret(str("early"))], None),
                    log("body"),
                ],
                Some("e"),
                Some(vec![log("catch"), throw(id("e"))]),
                Some(vec![log("finally")]),
            ),
            ret(str("done")),
        ],
    )
}

fn loops() -> Function {
    func(
        "loops",
        &["n"],
        vec![
            var("total", num(0.0)),
            Stmt::For {
                init: Some(ForInit::VarDecl(VarDecl {
                    kind: VarKind::Var,
                    declarations: vec![VarDeclarator {
                        id: Pattern::ident("i"),
                        init: Some(num(0.0)),
                    }],
                })),
                test: Some(bin(BinaryOp::Lt, id("i"), id("n"))),
                update: Some(postfix_inc("i")),
                body: block(vec![
                    if_else(
                        bin(BinaryOp::StrictEq, bin(BinaryOp::Mod, id("i"), num(2.0)), num(0.0)),
                        vec![Stmt::Continue(None)],
                        None,
                    ),
                    compound(BinaryOp::Add, "total", id("i")),
                ]),
            },
            ret(id("total")),
        ],
    )
}

fn switch_fallthrough() -> Function {
    let case = |test: Option<&str>, consequent: Vec<Stmt>| SwitchCase {
        test: test.map(str),
        consequent,
    };
    func(
        "sw",
        &["k"],
        vec![
            var("out", str("")),
            Stmt::Switch {
                discriminant: id("k"),
                cases: vec![
                    case(Some("a"), vec![compound(BinaryOp::Add, "out", str("a"))]),
                    case(Some("b"), vec![compound(BinaryOp::Add, "out", str("b")), Stmt::Break(None)]),
                    case(None, vec![compound(BinaryOp::Add, "out", str("d"))]),
                ],
            },
            ret(id("out")),
        ],
    )
}

fn counter() -> Function {
    let inc = func(
        "inc",
        &["by"],
        vec![compound(BinaryOp::Add, "count", id("by")), ret(id("count"))],
    );
    func(
        "counter",
        &["start"],
        vec![
            var("count", id("start")),
            Stmt::FunctionDecl(inc),
            expr(call(id("inc"), vec![num(10.0)])),
            ret(bin(BinaryOp::Mul, call(id("inc"), vec![num(22.0)]), num(2.0))),
        ],
    )
}

fn optional_call() -> Function {
    let chain = Expr::Chain(Box::new(Expr::Call {
        callee: Box::new(Expr::member(id("o"), "get")),
        args: vec![ExprOrSpread {
            spread: false,
            expr: num(1.0),
        }],
        optional: true,
    }));
    func("opt", &["o"], vec![ret(chain)])
}

fn this_users() -> Vec<Function> {
    let arrow = Function {
        is_arrow: true,
        expression_body: true,
        body: vec![ret(bin(BinaryOp::Add, Expr::member(Expr::This, "v"), num(1.0)))],
        ..Default::default()
    };
    let this_set = |name: &str| {
        expr(Expr::assign(
            Pattern::Expr(Box::new(Expr::member(Expr::This, name))),
            id(name),
        ))
    };
    vec![
        func(
            "method",
            &[],
            vec![var("f", Expr::Arrow(Box::new(arrow))), ret(call(id("f"), vec![]))],
        ),
        func("Point", &["x", "y"], vec![this_set("x"), this_set("y")]),
        func(
            "base",
            &["x"],
            vec![ret(bin(BinaryOp::Add, Expr::member(Expr::This, "base"), id("x")))],
        ),
        func("count", &[], vec![ret(Expr::member(id("arguments"), "length"))]),
    ]
}

fn async_functions() -> Vec<Function> {
    let mut inc = func(
        "inc",
        &["a"],
        vec![ret(bin(BinaryOp::Add, Expr::Await(Box::new(id("a"))), num(1.0)))],
    );
    inc.is_async = true;
    let mut safe = func(
        "safe",
        &["p"],
        vec![try_catch(
            vec![expr(Expr::Await(Box::new(id("p")))), ret(str("resolved"))],
            Some("e"),
            Some(vec![ret(bin(BinaryOp::Add, str("caught "), id("e")))]),
            None,
        )],
    );
    safe.is_async = true;
    vec![inc, safe]
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_reference_function_under_node() {
    assert_same_output(101, program(vec![reference()]), "console.log(JSON.stringify([f(1, 5), f(5, 1)]));");
}

#[test]
fn test_exception_routing_under_node() {
    let driver = r#"var log = [];
var out = [g(0)];
try { g(1); } catch (e) { out.push(e.message); }
out.push(g(2));
console.log(JSON.stringify([out, log]));"#;
    assert_same_output(102, program(vec![guarded()]), driver);
}

#[test]
fn test_control_flow_and_closures_under_node() {
    let driver = r#"console.log(JSON.stringify([
  loops(5), loops(0), sw("a"), sw("b"), sw("z"), counter(1),
  opt({}), opt({ base: 41, get: base }),
  count(1, 2, 3), count(), new Point(3, 4), method.call({ v: 41 })
]));"#;
    let mut functions = vec![loops(), switch_fallthrough(), counter(), optional_call()];
    functions.extend(this_users());
    assert_same_output(103, program(functions), driver);
}

#[test]
fn test_async_functions_under_node() {
    let driver = r#"(async function () {
  var out = [await inc(5), await inc(Promise.resolve(9))];
  out.push(await safe(Promise.reject("no")), await safe(Promise.resolve(1)));
  console.log(JSON.stringify(out));
})();"#;
    assert_same_output(104, program(async_functions()), driver);
}

#[test]
fn test_emitted_runtime_reports_stack_underflow() {
    let Some(node) = node() else { return };
    let names = RuntimeNames::generate(&mut NameGenerator::new(ObfuscationRng::from_seed(105)));
    let table = shroud_codec::emit::opcode_table_literal(&OpcodeMap::identity());
    let runtime = runtime_source(&names, &table, RuntimeFeatures::default());
    // a lone POP (13 under the identity mapping) on an empty stack
    let driver = format!(
        "try {{ {}([13], [], {{}}, void 0); console.log(\"no error\"); }} catch (e) {{ console.log(e.message); }}",
        names.run
    );
    let out = run_node(&node, &format!("{runtime}\n{driver}"));
    assert!(out.starts_with("stack underflow"), "{out}");
}
