//! Shared helpers for the engine integration tests: terse syntax tree
//! builders and harness setup.

#![allow(dead_code)]

use shroud_engine::ast::*;
use shroud_engine::{Harness, Value, VirtualizeOptions};
use shroud_vm_core::PropertyKey;

// ==================== Syntax ====================

pub fn id(name: &str) -> Expr {
    Expr::ident(name)
}

pub fn num(n: f64) -> Expr {
    Expr::num(n)
}

pub fn str(s: &str) -> Expr {
    Expr::str(s)
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::call(callee, args)
}

pub fn method(object: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::member(object, name), args)
}

pub fn new(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::New {
        callee: Box::new(callee),
        args: args.into_iter().map(|expr| ExprOrSpread { spread: false, expr }).collect(),
    }
}

pub fn ret(expr: Expr) -> Stmt {
    Stmt::Return(Some(expr))
}

pub fn expr(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

pub fn var(name: &str, init: Expr) -> Stmt {
    Stmt::var(name, Some(init))
}

pub fn set(name: &str, value: Expr) -> Stmt {
    Stmt::assign(name, value)
}

pub fn compound(op: BinaryOp, name: &str, value: Expr) -> Stmt {
    Stmt::Expr(Expr::Assign {
        op: AssignOp::Binary(op),
        target: Box::new(Pattern::ident(name)),
        value: Box::new(value),
    })
}

pub fn if_else(test: Expr, consequent: Vec<Stmt>, alternate: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If {
        test,
        consequent: Box::new(Stmt::Block(consequent)),
        alternate: alternate.map(|alt| Box::new(Stmt::Block(alt))),
    }
}

pub fn throw(expr: Expr) -> Stmt {
    Stmt::Throw(expr)
}

pub fn try_catch(block: Vec<Stmt>, param: Option<&str>, handler: Option<Vec<Stmt>>, finalizer: Option<Vec<Stmt>>) -> Stmt {
    Stmt::Try {
        block,
        handler: handler.map(|body| CatchClause {
            param: param.map(Pattern::ident),
            body,
        }),
        finalizer,
    }
}

/// `log.push(entry)`
pub fn log(entry: &str) -> Stmt {
    expr(method(id("log"), "push", vec![str(entry)]))
}

pub fn func(name: &str, params: &[&str], body: Vec<Stmt>) -> Function {
    Function {
        id: Some(name.to_string()),
        params: params.iter().map(|p| Pattern::ident(*p)).collect(),
        body,
        ..Default::default()
    }
}

pub fn program(functions: Vec<Function>) -> Program {
    Program {
        body: functions.into_iter().map(Stmt::FunctionDecl).collect(),
        ..Default::default()
    }
}

// ==================== Execution ====================

/// Option sets every behavior test runs under: fully encoded, literal
/// arrays, and heavy filler injection
pub fn option_sets(seed: u64) -> Vec<VirtualizeOptions> {
    vec![
        VirtualizeOptions::seeded(seed),
        VirtualizeOptions::seeded(seed).without_encoding(),
        VirtualizeOptions {
            fake_opcode_rate: 0.6,
            ..VirtualizeOptions::seeded(seed + 1)
        },
    ]
}

/// A harness with an empty `log` array installed as a global
pub fn harness(options: VirtualizeOptions) -> Harness {
    let harness = Harness::new(options).expect("valid options");
    let log = harness.realm().new_array(Vec::new());
    harness.define_global("log", Value::Object(log));
    harness
}

pub fn log_entries(harness: &Harness) -> Vec<String> {
    let log = harness.realm().global_value("log");
    log.as_object()
        .expect("log array")
        .elements()
        .iter()
        .map(|v| v.display_string())
        .collect()
}

pub fn clear_log(harness: &Harness) {
    let log = harness.realm().new_array(Vec::new());
    harness.realm().define_global("log", Value::Object(log));
}

pub fn n(value: f64) -> Value {
    Value::Number(value)
}

pub fn s(value: &str) -> Value {
    Value::string(value)
}

pub fn field(value: &Value, name: &str) -> Value {
    value
        .as_object()
        .expect("object")
        .get(&PropertyKey::from(name))
}

/// Call and unwrap
pub fn invoke(harness: &Harness, function: &Value, args: &[Value]) -> Value {
    harness
        .call(function, Value::Undefined, args)
        .unwrap_or_else(|err| panic!("call failed: {err}"))
}
