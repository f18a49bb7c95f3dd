//! Async functions suspend at `await` and settle their promise

mod common;

use std::sync::Arc;

use common::*;
use shroud_engine::Value;
use shroud_engine::ast::*;
use shroud_vm_core::JsPromise;

fn await_expr(expr: Expr) -> Expr {
    Expr::Await(Box::new(expr))
}

fn async_func(name: &str, params: &[&str], body: Vec<Stmt>) -> Function {
    Function {
        is_async: true,
        ..func(name, params, body)
    }
}

fn promise(harness: &shroud_engine::Harness, promise: JsPromise) -> Value {
    Value::Object(harness.realm().new_promise(Arc::new(promise)))
}

#[tokio::test]
async fn test_await_plain_value_and_promise() {
    // async function inc(a) { return (await a) + 1; }
    let f = async_func("inc", &["a"], vec![ret(bin(BinaryOp::Add, await_expr(id("a")), num(1.0)))]);
    for options in option_sets(71) {
        let mut harness = harness(options);
        let inc = harness.load(&f).unwrap();

        let result = harness.call_async(&inc, Value::Undefined, &[n(5.0)]).await.unwrap();
        assert_eq!(result.as_number(), Some(6.0));

        let pending = promise(&harness, JsPromise::fulfilled(n(9.0)));
        let result = harness.call_async(&inc, Value::Undefined, &[pending]).await.unwrap();
        assert_eq!(result.as_number(), Some(10.0));
    }
}

#[tokio::test]
async fn test_rejection_is_caught_inside() {
    // async function safe(p) {
    //   try { await p; return "resolved"; } catch (e) { return "caught " + e; }
    // }
    let f = async_func(
        "safe",
        &["p"],
        vec![try_catch(
            vec![expr(await_expr(id("p"))), ret(str("resolved"))],
            Some("e"),
            Some(vec![ret(bin(BinaryOp::Add, str("caught "), id("e")))]),
            None,
        )],
    );
    for options in option_sets(72) {
        let mut harness = harness(options);
        let safe = harness.load(&f).unwrap();

        let rejected = promise(&harness, JsPromise::rejected(s("no")));
        let result = harness.call_async(&safe, Value::Undefined, &[rejected]).await.unwrap();
        assert_eq!(result.as_str(), Some("caught no"));

        let fulfilled = promise(&harness, JsPromise::fulfilled(n(1.0)));
        let result = harness.call_async(&safe, Value::Undefined, &[fulfilled]).await.unwrap();
        assert_eq!(result.as_str(), Some("resolved"));
    }
}

#[tokio::test]
async fn test_uncaught_throw_rejects() {
    // async function fail() { log.push("before"); throw new Error("bad"); }
    let f = async_func(
        "fail",
        &[],
        vec![log("before"), throw(new(id("Error"), vec![str("bad")]))],
    );
    let mut harness = harness(shroud_engine::VirtualizeOptions::seeded(73));
    let fail = harness.load(&f).unwrap();

    // the call itself returns a promise
    let promise = harness.call(&fail, Value::Undefined, &[]).unwrap();
    assert!(promise.as_object().and_then(|o| o.promise()).is_some());

    let err = harness.call_async(&fail, Value::Undefined, &[]).await.unwrap_err();
    let thrown = err.thrown().expect("rejection reason");
    assert_eq!(field(thrown, "message").as_str(), Some("bad"));
    assert!(log_entries(&harness).iter().all(|entry| entry == "before"));
}

#[tokio::test]
async fn test_async_function_is_not_constructable() {
    let f = async_func("job", &[], vec![ret(num(1.0))]);
    let mut harness = harness(shroud_engine::VirtualizeOptions::seeded(74));
    let job = harness.load(&f).unwrap();
    assert!(harness.construct(&job, &[]).is_err());
}
