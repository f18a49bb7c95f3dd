//! Calling hand-assembled bytecode functions through the realm

use std::sync::Arc;

use shroud_vm_bytecode::{BinaryOperator, CompiledUnit, Constant, Opcode, OpcodeMap};
use shroud_vm_core::{
    Code, EnvKeys, FunctionTemplate, JsPromise, PromiseState, Realm, Value, VmError, empty_scope,
};

fn tape(map: &OpcodeMap, parts: &[(Opcode, &[u32])]) -> Vec<u32> {
    let mut code = Vec::new();
    for (op, operands) in parts {
        code.push(map.encode_op(*op));
        code.extend_from_slice(operands);
    }
    code
}

fn keys() -> EnvKeys {
    EnvKeys {
        this: "$this".into(),
        arguments: "$args".into(),
        new_target: "$nt".into(),
    }
}

fn function(realm: &Realm, name: &str, params: &[&str], code: Vec<u32>, consts: Vec<Constant>, is_async: bool) -> Value {
    let code = Code::new(CompiledUnit::new(code, consts), Arc::new(OpcodeMap::identity()));
    let template = FunctionTemplate {
        name: Some(name.to_string()),
        code: Arc::new(code),
        params: params.iter().map(|p| p.to_string()).collect(),
        locals: Vec::new(),
        self_name: Some(name.to_string()),
        is_async,
        strict: true,
        constructable: !is_async,
        keys: keys(),
    };
    realm.instantiate(Arc::new(template), empty_scope())
}

#[test]
fn test_call_with_arguments() {
    let realm = Realm::new();
    let map = OpcodeMap::identity();
    let code = tape(
        &map,
        &[
            (Opcode::LoadLocal, &[0]),
            (Opcode::LoadLocal, &[1]),
            (Opcode::Binary, &[BinaryOperator::Sub.code()]),
            (Opcode::Return, &[]),
        ],
    );
    let sub = function(&realm, "sub", &["a", "b"], code, vec![Constant::string("a"), Constant::string("b")], false);
    let out = realm
        .call(&sub, Value::Undefined, &[Value::Number(10.0), Value::Number(4.0)])
        .unwrap();
    assert_eq!(out.as_number(), Some(6.0));
    // missing arguments read as undefined
    let out = realm.call(&sub, Value::Undefined, &[Value::Number(1.0)]).unwrap();
    assert!(out.as_number().unwrap().is_nan());
    let length = realm.get_value(&sub, &Value::string("length")).unwrap();
    assert_eq!(length.as_number(), Some(2.0));
}

#[test]
fn test_unbounded_recursion_is_range_error() {
    let realm = Realm::new();
    let map = OpcodeMap::identity();
    let code = tape(
        &map,
        &[
            (Opcode::LoadLocal, &[0]),
            (Opcode::Call, &[0]),
            (Opcode::Return, &[]),
        ],
    );
    let f = function(&realm, "f", &[], code, vec![Constant::string("f")], false);
    let err = realm.call(&f, Value::Undefined, &[]).unwrap_err();
    let thrown = err.thrown().expect("recursion error is a JS exception");
    assert!(thrown.display_string().starts_with("RangeError"));
    // the depth counter unwinds with the calls
    let g = function(&realm, "g", &[], tape(&map, &[(Opcode::PushConst, &[0]), (Opcode::Return, &[])]), vec![Constant::Number(1.0)], false);
    assert_eq!(realm.call(&g, Value::Undefined, &[]).unwrap().as_number(), Some(1.0));
}

#[test]
fn test_recursion_limit_holds_on_small_thread_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| {
            let realm = Realm::new();
            let map = OpcodeMap::identity();
            let code = tape(
                &map,
                &[
                    (Opcode::LoadLocal, &[0]),
                    (Opcode::Call, &[0]),
                    (Opcode::Return, &[]),
                ],
            );
            let f = function(&realm, "f", &[], code, vec![Constant::string("f")], false);
            let err = realm.call(&f, Value::Undefined, &[]).unwrap_err();
            err.thrown().map(|v| v.display_string())
        })
        .unwrap();
    let message = handle.join().unwrap().expect("recursion error is a JS exception");
    assert!(message.starts_with("RangeError"), "{message}");
}

#[test]
fn test_construct_binds_this() {
    let realm = Realm::new();
    let map = OpcodeMap::identity();
    let code = tape(
        &map,
        &[
            (Opcode::LoadLocal, &[0]),
            (Opcode::PushConst, &[1]),
            (Opcode::PushConst, &[2]),
            (Opcode::SetProp, &[]),
            (Opcode::Pop, &[]),
            (Opcode::PushConst, &[3]),
            (Opcode::Return, &[]),
        ],
    );
    let point = function(
        &realm,
        "Point",
        &[],
        code,
        vec![
            Constant::string("$this"),
            Constant::string("x"),
            Constant::Number(3.0),
            Constant::Undefined,
        ],
        false,
    );
    let instance = realm.construct(&point, &[]).unwrap();
    assert_eq!(realm.get_value(&instance, &Value::string("x")).unwrap().as_number(), Some(3.0));
    let is_instance = realm.binary(BinaryOperator::InstanceOf, &instance, &point).unwrap();
    assert!(is_instance.to_boolean());
}

#[test]
fn test_async_function_outside_runtime_settles() {
    let realm = Realm::new();
    let map = OpcodeMap::identity();
    let code = tape(
        &map,
        &[
            (Opcode::PushConst, &[0]),
            (Opcode::Await, &[]),
            (Opcode::Return, &[]),
        ],
    );
    let f = function(&realm, "f", &[], code, vec![Constant::Number(5.0)], true);
    let promise = realm.call(&f, Value::Undefined, &[]).unwrap();
    let state = promise.as_object().and_then(|o| o.promise()).unwrap().state();
    assert!(matches!(state, PromiseState::Fulfilled(Value::Number(n)) if n == 5.0));
    assert!(matches!(realm.construct(&f, &[]), Err(VmError::TypeError(_))));
}

#[tokio::test]
async fn test_async_function_rejects_on_throw() {
    let realm = Realm::new();
    let map = OpcodeMap::identity();
    let code = tape(
        &map,
        &[
            (Opcode::LoadGlobal, &[0, 0]),
            (Opcode::Await, &[]),
            (Opcode::Throw, &[]),
        ],
    );
    let pending = Arc::new(JsPromise::new());
    realm.define_global("gate", Value::Object(realm.new_promise(Arc::clone(&pending))));
    let f = function(&realm, "f", &[], code, vec![Constant::string("gate")], true);
    let promise = realm.call(&f, Value::Undefined, &[]).unwrap();
    pending.resolve(Value::string("nope"));
    let err = realm.settle(promise).await.unwrap_err();
    assert_eq!(err.thrown().and_then(Value::as_str), Some("nope"));
}
