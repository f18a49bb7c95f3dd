//! Exception routing through virtualized try/catch/finally

mod common;

use common::*;
use shroud_engine::Value;
use shroud_engine::ast::*;

fn mode_is(value: f64) -> Expr {
    bin(BinaryOp::StrictEq, id("mode"), num(value))
}

/// ```js
/// function g(mode) {
///   try {
///     if (mode === 1) throw new Error("boom");
///     if (mode === 2) return "early";
///     log.push("body");
///   } catch (e) { log.push("catch"); throw e; }
///   finally { log.push("finally"); }
///   return "done";
/// }
/// ```
fn guarded() -> Function {
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

/// ```js
/// function h() {
///   try {
///     try { throw new Error("in"); }
///     catch (e) { log.push("inner catch"); throw e; }
///     finally { log.push("inner finally"); }
///   } catch (e) { log.push("outer catch"); return "inner"; }
///   finally { log.push("outer finally"); }
/// }
/// ```
fn nested() -> Function {
    func(
        "h",
        &[],
        vec![try_catch(
            vec![try_catch(
                vec![throw(new(id("Error"), vec![str("in")]))],
                Some("e"),
                Some(vec![log("inner catch"), throw(id("e"))]),
                Some(vec![log("inner finally")]),
            )],
            Some("e"),
            Some(vec![log("outer catch"), ret(str("inner"))]),
            Some(vec![log("outer finally")]),
        )],
    )
}

#[test]
fn test_normal_completion_runs_finally() {
    for options in option_sets(31) {
        let mut harness = harness(options);
        let g = harness.load(&guarded()).unwrap();
        let result = invoke(&harness, &g, &[n(0.0)]);
        assert_eq!(result.as_str(), Some("done"));
        assert_eq!(log_entries(&harness), vec!["body", "finally"]);
    }
}

#[test]
fn test_rethrow_propagates_after_finally() {
    for options in option_sets(32) {
        let mut harness = harness(options);
        let g = harness.load(&guarded()).unwrap();
        let err = harness.call(&g, Value::Undefined, &[n(1.0)]).unwrap_err();
        let thrown = err.thrown().expect("uncaught exception");
        assert_eq!(field(thrown, "message").as_str(), Some("boom"));
        assert_eq!(log_entries(&harness), vec!["catch", "finally"]);
    }
}

#[test]
fn test_return_through_finally() {
    for options in option_sets(33) {
        let mut harness = harness(options);
        let g = harness.load(&guarded()).unwrap();
        let result = invoke(&harness, &g, &[n(2.0)]);
        assert_eq!(result.as_str(), Some("early"));
        assert_eq!(log_entries(&harness), vec!["finally"]);
    }
}

#[test]
fn test_nested_handlers_unwind_in_order() {
    for options in option_sets(34) {
        let mut harness = harness(options);
        let h = harness.load(&nested()).unwrap();
        let result = invoke(&harness, &h, &[]);
        assert_eq!(result.as_str(), Some("inner"));
        assert_eq!(
            log_entries(&harness),
            vec!["inner catch", "inner finally", "outer catch", "outer finally"]
        );
    }
}

#[test]
fn test_handler_state_does_not_leak_between_calls() {
    let mut harness = harness(shroud_engine::VirtualizeOptions::seeded(35));
    let g = harness.load(&guarded()).unwrap();
    assert!(harness.call(&g, Value::Undefined, &[n(1.0)]).is_err());
    clear_log(&harness);
    assert_eq!(invoke(&harness, &g, &[n(0.0)]).as_str(), Some("done"));
    assert_eq!(log_entries(&harness), vec!["body", "finally"]);
}
