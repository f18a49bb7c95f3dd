//! Bytecode interpreter
//!
//! A [`Frame`] executes one function invocation. The operand stack and the
//! try-frame stack belong to the frame; locals live in the environment
//! record. The synchronous driver [`run`] rejects `AWAIT`, the asynchronous
//! driver [`run_async`] suspends on it.
//!
//! ## Try frames
//!
//! `TRY` pushes a frame holding the catch, finally and end targets. When a
//! value is thrown the innermost frame decides where control goes:
//!
//! - in the protected block: to the catch target, or to the finally target
//!   with the throw remembered as pending
//! - in the catch block: to the finally target with the throw pending, or
//!   further out when there is no finally
//! - in the finally block: further out (the pending completion is lost)
//!
//! `RETHROW` ends a catch or finally region and resumes whatever completion
//! is pending: a throw, a return, or a normal exit to the end target.

use std::sync::Arc;

use smallvec::SmallVec;

use shroud_vm_bytecode::{
    BinaryOperator, BytecodeError, Constant, DecodedInstruction, GlobalMode, NO_TARGET, Opcode, UnaryOperator,
};

use crate::error::{VmError, VmResult};
use crate::function::{Code, ScopeChain};
use crate::object::{JsObject, PropertyKey};
use crate::realm::Realm;
use crate::value::Value;

/// What the driver should do after one instruction
#[derive(Debug)]
pub enum InstructionResult {
    /// Execute the next instruction
    Continue,
    /// The function finished with a value
    Return(Value),
    /// Suspend until `value` settles, then resume with the outcome
    Await {
        /// Awaited value
        value: Value,
        /// Offset of the `AWAIT` instruction
        offset: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TryPhase {
    Try,
    Catch,
    Finally,
}

/// Completion waiting for a finally block to end
#[derive(Debug)]
enum Completion {
    Throw(Value),
    Return(Value),
}

#[derive(Debug)]
struct TryFrame {
    catch_ip: Option<usize>,
    finally_ip: Option<usize>,
    end_ip: usize,
    stack_size: usize,
    phase: TryPhase,
    caught: Option<Value>,
    pending: Option<Completion>,
}

impl TryFrame {
    fn has_finally(&self) -> bool {
        self.finally_ip.is_some()
    }
}

fn target(word: u32) -> Option<usize> {
    (word != NO_TARGET).then_some(word as usize)
}

/// One activation of a bytecode function
#[derive(Debug)]
pub struct Frame {
    code: Arc<Code>,
    env: Arc<JsObject>,
    scope: ScopeChain,
    ip: usize,
    /// Offset of the instruction being executed
    current: usize,
    stack: Vec<Value>,
    tries: Vec<TryFrame>,
}

impl Frame {
    /// Create a frame positioned at the start of `code`
    pub fn new(code: Arc<Code>, env: Arc<JsObject>, scope: ScopeChain) -> Self {
        Self {
            code,
            env,
            scope,
            ip: 0,
            current: 0,
            stack: Vec::with_capacity(16),
            tries: Vec::new(),
        }
    }

    /// Environment record of this activation
    pub fn env(&self) -> &Arc<JsObject> {
        &self.env
    }

    /// Operand stack depth
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Resume after an `AWAIT` with the settled value
    pub fn resume(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Execute one instruction.
    ///
    /// Catchable errors are routed to the innermost try frame; an
    /// uncaught one, or any fatal error, is returned.
    pub fn step(&mut self, realm: &Realm) -> VmResult<InstructionResult> {
        let insn = self.code.unit.decode_at(&self.code.map, self.ip).map_err(|err| match err {
            BytecodeError::InvalidOpcode { word, offset } => VmError::InvalidOpcode { word, offset },
            other => VmError::Bytecode(other),
        })?;
        self.current = insn.offset;
        self.ip = insn.next_offset();
        match self.execute(realm, &insn) {
            Ok(result) => Ok(result),
            Err(err) if err.is_catchable() => {
                let value = realm.error_value(err)?;
                self.throw_value(value)?;
                Ok(InstructionResult::Continue)
            }
            Err(err) => Err(err),
        }
    }

    /// Route a thrown value to the innermost handler; `Err` when nothing
    /// catches it
    pub fn throw_value(&mut self, value: Value) -> VmResult<()> {
        while let Some(frame) = self.tries.last_mut() {
            match frame.phase {
                TryPhase::Try => {
                    let stack_size = frame.stack_size;
                    if let Some(catch_ip) = frame.catch_ip {
                        frame.phase = TryPhase::Catch;
                        frame.caught = Some(value);
                        self.ip = catch_ip;
                    } else if let Some(finally_ip) = frame.finally_ip {
                        frame.phase = TryPhase::Finally;
                        frame.pending = Some(Completion::Throw(value));
                        self.ip = finally_ip;
                    } else {
                        self.tries.pop();
                        continue;
                    }
                    self.stack.truncate(stack_size);
                    return Ok(());
                }
                TryPhase::Catch if frame.has_finally() => {
                    let stack_size = frame.stack_size;
                    frame.phase = TryPhase::Finally;
                    frame.pending = Some(Completion::Throw(value));
                    self.ip = frame.finally_ip.unwrap_or(frame.end_ip);
                    self.stack.truncate(stack_size);
                    return Ok(());
                }
                TryPhase::Catch | TryPhase::Finally => {
                    self.tries.pop();
                }
            }
        }
        Err(VmError::exception(value))
    }

    /// Leave the function with `value`, running enclosing finally blocks
    /// first
    fn do_return(&mut self, value: Value) -> InstructionResult {
        while let Some(frame) = self.tries.last_mut() {
            if frame.phase != TryPhase::Finally {
                if let Some(finally_ip) = frame.finally_ip {
                    let stack_size = frame.stack_size;
                    frame.phase = TryPhase::Finally;
                    frame.pending = Some(Completion::Return(value));
                    self.ip = finally_ip;
                    self.stack.truncate(stack_size);
                    return InstructionResult::Continue;
                }
            }
            self.tries.pop();
        }
        InstructionResult::Return(value)
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow(self.current))
    }

    fn pop_n(&mut self, n: usize) -> VmResult<SmallVec<[Value; 3]>> {
        let len = self.stack.len();
        if n > len {
            return Err(VmError::StackUnderflow(self.current));
        }
        Ok(self.stack.drain(len - n..).collect())
    }

    fn constant(&self, k: u32) -> VmResult<&Constant> {
        self.code
            .unit
            .consts
            .get(k as usize)
            .ok_or_else(|| VmError::internal(format!("constant {} out of range", k)))
    }

    fn name(&self, k: u32) -> VmResult<&PropertyKey> {
        self.code
            .key(k)
            .ok_or_else(|| VmError::internal(format!("constant {} is not a name", k)))
    }

    fn jump(&mut self, to: u32) {
        self.ip = to as usize;
    }

    fn load_global(&self, realm: &Realm, key: &PropertyKey, mode: GlobalMode) -> VmResult<Value> {
        if let Some(holder) = self.scope.iter().find(|obj| obj.has_property(key)) {
            return Ok(holder.get(key));
        }
        let global = realm.global();
        if global.has_property(key) {
            return Ok(global.get(key));
        }
        match mode {
            GlobalMode::Strict => Err(VmError::reference_error(format!("{} is not defined", key))),
            GlobalMode::TypeofSafe => Ok(Value::Undefined),
        }
    }

    fn store_global(&self, realm: &Realm, key: &PropertyKey, value: Value) -> VmResult<()> {
        let holder = self
            .scope
            .iter()
            .find(|obj| obj.has_property(key))
            .unwrap_or(realm.global());
        holder.set(key.clone(), value)
    }

    fn execute(&mut self, realm: &Realm, insn: &DecodedInstruction) -> VmResult<InstructionResult> {
        let operand = insn.operand();
        match insn.opcode {
            Opcode::PushConst => {
                let value = Value::from_constant(self.constant(operand)?)
                    .ok_or_else(|| VmError::internal("closure constant pushed as a value"))?;
                self.stack.push(value);
            }
            Opcode::LoadLocal => {
                let value = self.env.get_own(self.name(operand)?).unwrap_or_default();
                self.stack.push(value);
            }
            Opcode::StoreLocal => {
                let value = self.pop()?;
                let key = self.name(operand)?.clone();
                self.env.define_key(key, value);
            }
            Opcode::LoadGlobal => {
                let mode = GlobalMode::from_code(insn.operands[1])
                    .ok_or_else(|| VmError::internal("invalid global mode"))?;
                let value = self.load_global(realm, self.name(operand)?, mode)?;
                self.stack.push(value);
            }
            Opcode::StoreGlobal => {
                let value = self.pop()?;
                self.store_global(realm, self.name(operand)?, value)?;
            }
            Opcode::GetProp => {
                let key = self.pop()?;
                let object = self.pop()?;
                let value = realm.get_value(&object, &key)?;
                self.stack.push(value);
            }
            Opcode::SetProp => {
                let value = self.pop()?;
                let key = self.pop()?;
                let object = self.pop()?;
                realm.set_value(&object, &key, value.clone())?;
                self.stack.push(value);
            }
            Opcode::Binary => {
                let op = BinaryOperator::from_code(operand)
                    .ok_or_else(|| VmError::internal(format!("invalid binary operator {}", operand)))?;
                let b = self.pop()?;
                let a = self.pop()?;
                let value = realm.binary(op, &a, &b)?;
                self.stack.push(value);
            }
            Opcode::Unary => {
                let op = UnaryOperator::from_code(operand)
                    .ok_or_else(|| VmError::internal(format!("invalid unary operator {}", operand)))?;
                let a = self.pop()?;
                let value = realm.unary(op, &a)?;
                self.stack.push(value);
            }
            Opcode::Jmp => self.jump(operand),
            Opcode::JmpIfFalse => {
                if !self.pop()?.to_boolean() {
                    self.jump(operand);
                }
            }
            Opcode::JmpIfTrue => {
                if self.pop()?.to_boolean() {
                    self.jump(operand);
                }
            }
            Opcode::Dup => {
                let top = self.stack.last().cloned().ok_or(VmError::StackUnderflow(self.current))?;
                self.stack.push(top);
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Call => {
                let args = self.pop_n(operand as usize)?;
                let callee = self.pop()?;
                let value = realm.call(&callee, Value::Undefined, &args)?;
                self.stack.push(value);
            }
            Opcode::CallMethod => {
                let args = self.pop_n(operand as usize)?;
                let key = self.pop()?;
                let object = self.pop()?;
                let method = realm.get_value(&object, &key)?;
                if !method.is_callable() {
                    return Err(VmError::type_error(format!(
                        "{} is not a function",
                        key.display_string()
                    )));
                }
                let value = realm.call(&method, object, &args)?;
                self.stack.push(value);
            }
            Opcode::CallThis => {
                let args = self.pop_n(operand as usize)?;
                let callee = self.pop()?;
                let this = self.pop()?;
                let value = realm.call(&callee, this, &args)?;
                self.stack.push(value);
            }
            Opcode::New => {
                let args = self.pop_n(operand as usize)?;
                let ctor = self.pop()?;
                let value = realm.construct(&ctor, &args)?;
                self.stack.push(value);
            }
            Opcode::Return => {
                let value = self.pop()?;
                return Ok(self.do_return(value));
            }
            Opcode::Throw => {
                let value = self.pop()?;
                return Err(VmError::exception(value));
            }
            Opcode::Try => {
                let end_ip = target(insn.operands[2]).ok_or_else(|| VmError::internal("try without end target"))?;
                self.tries.push(TryFrame {
                    catch_ip: target(insn.operands[0]),
                    finally_ip: target(insn.operands[1]),
                    end_ip,
                    stack_size: self.stack.len(),
                    phase: TryPhase::Try,
                    caught: None,
                    pending: None,
                });
            }
            Opcode::EndTry => {
                self.tries
                    .pop()
                    .ok_or_else(|| VmError::internal("END_TRY without a try frame"))?;
            }
            Opcode::EnterCatch => {
                let frame = self
                    .tries
                    .last_mut()
                    .ok_or_else(|| VmError::internal("ENTER_CATCH without a try frame"))?;
                let caught = frame.caught.take().unwrap_or_default();
                self.stack.push(caught);
            }
            Opcode::EnterFinally => {
                let frame = self
                    .tries
                    .last_mut()
                    .ok_or_else(|| VmError::internal("ENTER_FINALLY without a try frame"))?;
                frame.phase = TryPhase::Finally;
            }
            Opcode::Rethrow => {
                let frame = self
                    .tries
                    .pop()
                    .ok_or_else(|| VmError::internal("RETHROW without a try frame"))?;
                match frame.pending {
                    Some(Completion::Throw(value)) => return Err(VmError::exception(value)),
                    Some(Completion::Return(value)) => return Ok(self.do_return(value)),
                    None => self.ip = frame.end_ip,
                }
            }
            Opcode::Await => {
                let value = self.pop()?;
                return Ok(InstructionResult::Await {
                    value,
                    offset: insn.offset,
                });
            }
            Opcode::MakeArray => {
                let elements = self.pop_n(operand as usize)?;
                self.stack.push(Value::Object(realm.new_array(elements.into_vec())));
            }
            Opcode::MakeObject => {
                let entries = self.pop_n(2 * operand as usize)?;
                let object = Value::Object(realm.new_object());
                for pair in entries.chunks(2) {
                    if let [key, value] = pair {
                        realm.set_value(&object, key, value.clone())?;
                    }
                }
                self.stack.push(object);
            }
            Opcode::Closure => {
                let Constant::Closure(source) = self.constant(operand)? else {
                    return Err(VmError::internal("CLOSURE operand is not a closure constant"));
                };
                let factory = realm
                    .closure_factory()
                    .ok_or_else(|| VmError::internal("no closure factory installed"))?;
                let value = factory.instantiate(realm, source, &self.env, &self.scope)?;
                self.stack.push(value);
            }
            Opcode::FakeAdd | Opcode::FakePopPush | Opcode::FakeJmp => {}
        }
        Ok(InstructionResult::Continue)
    }
}

/// Run a frame to completion on the calling thread
pub fn run(realm: &Realm, frame: &mut Frame) -> VmResult<Value> {
    loop {
        match frame.step(realm)? {
            InstructionResult::Continue => {}
            InstructionResult::Return(value) => return Ok(value),
            InstructionResult::Await { offset, .. } => return Err(VmError::AwaitInSync(offset)),
        }
    }
}

/// Run a frame, suspending on `AWAIT` until the awaited value settles
pub async fn run_async(realm: &Realm, frame: &mut Frame) -> VmResult<Value> {
    loop {
        match frame.step(realm)? {
            InstructionResult::Continue => {}
            InstructionResult::Return(value) => return Ok(value),
            InstructionResult::Await { value, .. } => {
                let promise = value.as_object().and_then(|o| o.promise()).cloned();
                match promise {
                    Some(promise) => match promise.settled().await {
                        Ok(settled) => frame.resume(settled),
                        Err(reason) => frame.throw_value(reason)?,
                    },
                    None => {
                        tokio::task::yield_now().await;
                        frame.resume(value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::empty_scope;
    use shroud_vm_bytecode::{CompiledUnit, OpcodeMap};

    fn tape(map: &OpcodeMap, parts: &[(Opcode, &[u32])]) -> Vec<u32> {
        let mut code = Vec::new();
        for (op, operands) in parts {
            code.push(map.encode_op(*op));
            code.extend_from_slice(operands);
        }
        code
    }

    fn frame(code: Vec<u32>, consts: Vec<Constant>) -> Frame {
        let code = Code::new(CompiledUnit::new(code, consts), Arc::new(OpcodeMap::identity()));
        Frame::new(Arc::new(code), JsObject::ordinary(None), empty_scope())
    }

    fn execute(code: Vec<u32>, consts: Vec<Constant>) -> VmResult<Value> {
        let realm = Realm::new();
        run(&realm, &mut frame(code, consts))
    }

    #[test]
    fn test_arithmetic() {
        let map = OpcodeMap::identity();
        let code = tape(
            &map,
            &[
                (Opcode::PushConst, &[0]),
                (Opcode::PushConst, &[1]),
                (Opcode::Binary, &[BinaryOperator::Mul.code()]),
                (Opcode::FakeAdd, &[77]),
                (Opcode::Unary, &[UnaryOperator::Neg.code()]),
                (Opcode::Return, &[]),
            ],
        );
        let out = execute(code, vec![Constant::Number(6.0), Constant::Number(7.0)]).unwrap();
        assert_eq!(out.as_number(), Some(-42.0));
    }

    #[test]
    fn test_locals_live_in_env() {
        let map = OpcodeMap::identity();
        let code = tape(
            &map,
            &[
                (Opcode::PushConst, &[1]),
                (Opcode::StoreLocal, &[0]),
                (Opcode::LoadLocal, &[0]),
                (Opcode::Return, &[]),
            ],
        );
        let realm = Realm::new();
        let mut f = frame(code, vec![Constant::string("x"), Constant::string("hi")]);
        let out = run(&realm, &mut f).unwrap();
        assert_eq!(out.as_str(), Some("hi"));
        assert_eq!(f.env().get(&"x".into()).as_str(), Some("hi"));
    }

    #[test]
    fn test_throw_is_caught() {
        let map = OpcodeMap::identity();
        // try { throw "boom" } catch (e) { return e }
        let code = tape(
            &map,
            &[
                (Opcode::Try, &[10, NO_TARGET, 13]), // 0
                (Opcode::PushConst, &[0]),           // 4
                (Opcode::Throw, &[]),                // 6
                (Opcode::EndTry, &[]),               // 7
                (Opcode::Jmp, &[13]),                // 8
                (Opcode::EnterCatch, &[]),           // 10
                (Opcode::Return, &[]),               // 11
                (Opcode::Rethrow, &[]),              // 12
                (Opcode::PushConst, &[1]),           // 13
                (Opcode::Return, &[]),               // 15
            ],
        );
        let out = execute(code, vec![Constant::string("boom"), Constant::Undefined]).unwrap();
        assert_eq!(out.as_str(), Some("boom"));
    }

    #[test]
    fn test_finally_runs_once_on_return() {
        let map = OpcodeMap::identity();
        // try { return 1 } finally { counter = counter + 1 }
        let code = tape(
            &map,
            &[
                (Opcode::Try, &[NO_TARGET, 9, 20]),           // 0
                (Opcode::PushConst, &[0]),                    // 4
                (Opcode::Return, &[]),                        // 6
                (Opcode::Jmp, &[9]),                          // 7
                (Opcode::EnterFinally, &[]),                  // 9
                (Opcode::LoadGlobal, &[1, 0]),                // 10
                (Opcode::PushConst, &[0]),                    // 13
                (Opcode::Binary, &[BinaryOperator::Add.code()]), // 15
                (Opcode::StoreGlobal, &[1]),                  // 17
                (Opcode::Rethrow, &[]),                       // 19
                (Opcode::PushConst, &[2]),                    // 20
                (Opcode::Return, &[]),                        // 22
            ],
        );
        let realm = Realm::new();
        realm.define_global("counter", Value::Number(0.0));
        let mut f = frame(
            code,
            vec![Constant::Number(1.0), Constant::string("counter"), Constant::Undefined],
        );
        let out = run(&realm, &mut f).unwrap();
        assert_eq!(out.as_number(), Some(1.0));
        assert_eq!(realm.global_value("counter").as_number(), Some(1.0));
    }

    #[test]
    fn test_throw_through_finally_propagates() {
        let map = OpcodeMap::identity();
        // try { throw 5 } finally { counter = 1 }
        let code = tape(
            &map,
            &[
                (Opcode::Try, &[NO_TARGET, 9, 15]), // 0
                (Opcode::PushConst, &[0]),          // 4
                (Opcode::Throw, &[]),               // 6
                (Opcode::Jmp, &[9]),                // 7
                (Opcode::EnterFinally, &[]),        // 9
                (Opcode::PushConst, &[2]),          // 10
                (Opcode::StoreGlobal, &[1]),        // 12
                (Opcode::Rethrow, &[]),             // 14
                (Opcode::PushConst, &[0]),          // 15
                (Opcode::Return, &[]),              // 17
            ],
        );
        let realm = Realm::new();
        let mut f = frame(
            code,
            vec![Constant::Number(5.0), Constant::string("counter"), Constant::Number(1.0)],
        );
        let err = run(&realm, &mut f).unwrap_err();
        assert_eq!(err.thrown().and_then(Value::as_number), Some(5.0));
        assert_eq!(realm.global_value("counter").as_number(), Some(1.0));
    }

    #[test]
    fn test_runtime_errors_are_catchable() {
        let map = OpcodeMap::identity();
        // try { missing } catch (e) { return e }
        let code = tape(
            &map,
            &[
                (Opcode::Try, &[10, NO_TARGET, 13]), // 0
                (Opcode::LoadGlobal, &[0, 0]),       // 4
                (Opcode::Pop, &[]),                  // 7
                (Opcode::EndTry, &[]),               // 8
                (Opcode::Rethrow, &[]),              // 9 (unreachable)
                (Opcode::EnterCatch, &[]),           // 10
                (Opcode::Return, &[]),               // 11
                (Opcode::Rethrow, &[]),              // 12
                (Opcode::PushConst, &[1]),           // 13
                (Opcode::Return, &[]),               // 15
            ],
        );
        let out = execute(code, vec![Constant::string("missing"), Constant::Undefined]).unwrap();
        assert_eq!(out.display_string(), "ReferenceError: missing is not defined");
    }

    #[test]
    fn test_typeof_safe_global() {
        let map = OpcodeMap::identity();
        let code = tape(
            &map,
            &[
                (Opcode::LoadGlobal, &[0, GlobalMode::TypeofSafe.code()]),
                (Opcode::Unary, &[UnaryOperator::TypeOf.code()]),
                (Opcode::Return, &[]),
            ],
        );
        let out = execute(code, vec![Constant::string("missing")]).unwrap();
        assert_eq!(out.as_str(), Some("undefined"));
    }

    #[test]
    fn test_uncaught_throw() {
        let map = OpcodeMap::identity();
        let code = tape(&map, &[(Opcode::PushConst, &[0]), (Opcode::Throw, &[])]);
        let err = execute(code, vec![Constant::string("x")]).unwrap_err();
        assert!(err.is_catchable());
        assert_eq!(err.thrown().and_then(Value::as_str), Some("x"));
    }

    #[test]
    fn test_await_in_sync_interpreter() {
        let map = OpcodeMap::identity();
        let code = tape(
            &map,
            &[
                (Opcode::PushConst, &[0]),
                (Opcode::Await, &[]),
                (Opcode::Return, &[]),
            ],
        );
        let err = execute(code, vec![Constant::Null]).unwrap_err();
        assert!(matches!(err, VmError::AwaitInSync(2)));
    }

    #[test]
    fn test_invalid_opcode_is_fatal() {
        let map = OpcodeMap::identity();
        // the handler must not see tape corruption
        let mut code = tape(&map, &[(Opcode::Try, &[8, NO_TARGET, 8])]);
        code.push(0xdead_beef);
        code.extend(tape(&map, &[(Opcode::PushConst, &[0]), (Opcode::Return, &[])]));
        code.extend(tape(&map, &[(Opcode::EnterCatch, &[]), (Opcode::Return, &[])]));
        let err = execute(code, vec![Constant::Null]).unwrap_err();
        assert!(matches!(err, VmError::InvalidOpcode { offset: 4, .. }));
        assert!(!err.is_catchable());
    }

    #[test]
    fn test_make_object_and_call_method() {
        let map = OpcodeMap::identity();
        // ({a: 1, b: 2}).hasOwnProperty("b")
        let code = tape(
            &map,
            &[
                (Opcode::PushConst, &[0]),
                (Opcode::PushConst, &[1]),
                (Opcode::PushConst, &[2]),
                (Opcode::PushConst, &[3]),
                (Opcode::MakeObject, &[2]),
                (Opcode::PushConst, &[4]),
                (Opcode::PushConst, &[2]),
                (Opcode::CallMethod, &[1]),
                (Opcode::Return, &[]),
            ],
        );
        let out = execute(
            code,
            vec![
                Constant::string("a"),
                Constant::Number(1.0),
                Constant::string("b"),
                Constant::Number(2.0),
                Constant::string("hasOwnProperty"),
            ],
        )
        .unwrap();
        assert!(out.to_boolean());
    }

    #[tokio::test]
    async fn test_async_await_settles() {
        let map = OpcodeMap::identity();
        let code = tape(
            &map,
            &[
                (Opcode::LoadGlobal, &[0, 0]),
                (Opcode::Await, &[]),
                (Opcode::PushConst, &[1]),
                (Opcode::Binary, &[BinaryOperator::Add.code()]),
                (Opcode::Return, &[]),
            ],
        );
        let realm = Realm::new();
        let promise = Arc::new(crate::promise::JsPromise::new());
        realm.define_global("p", Value::Object(realm.new_promise(Arc::clone(&promise))));
        let mut f = frame(code, vec![Constant::string("p"), Constant::Number(1.0)]);
        let task = {
            let realm = realm.clone();
            tokio::spawn(async move { run_async(&realm, &mut f).await })
        };
        tokio::task::yield_now().await;
        promise.resolve(Value::Number(41.0));
        let out = task.await.unwrap().unwrap();
        assert_eq!(out.as_number(), Some(42.0));
    }
}
