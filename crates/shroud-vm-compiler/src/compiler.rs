//! Statement and expression lowering
//!
//! Every expression leaves exactly one value on the operand stack and every
//! statement leaves the stack as it found it. Locals live in the
//! environment record and are addressed by name; anything not in the
//! function's [`LocalSet`] resolves as a global.

use std::sync::Arc;

use shroud_ast::scope::var_scoped_names;
use shroud_ast::*;
use shroud_vm_bytecode::{
    BinaryOperator, ClosureSource, CompiledUnit, Constant, GlobalMode, Opcode, UnaryOperator, verify_stack,
};

use crate::closure::rewrite_closure;
use crate::codegen::{CodeGen, Label};
use crate::context::CompileContext;
use crate::eligibility::check_eligibility;
use crate::error::{CompileError, CompileResult};
use crate::normalize::normalize;
use crate::scope::LocalSet;

/// A function lowered to bytecode, plus what its wrapper needs
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    /// Encoded tape and constants
    pub unit: CompiledUnit,
    /// Wrapper parameter names
    pub params: Vec<String>,
    /// Environment locals other than the parameters, initially undefined
    pub locals: Vec<String>,
    /// Own function name captured into the environment, unless shadowed
    pub self_name: Option<String>,
    /// Runs on the asynchronous interpreter
    pub is_async: bool,
}

/// Check, normalize and lower one function
pub fn compile_function(function: &Function, ctx: &mut CompileContext<'_>) -> CompileResult<CompiledFunction> {
    check_eligibility(function, ctx.options)?;
    let normalized = normalize(function, ctx)?;

    let mut locals = LocalSet::new();
    for param in &normalized.params {
        locals.declare(param.clone());
    }
    for name in var_scoped_names(&normalized.body) {
        locals.declare(name);
    }
    for name in &normalized.catch_names {
        locals.declare(name.clone());
    }
    let self_name = function.id.clone().filter(|id| !locals.contains(id));
    if let Some(name) = &self_name {
        locals.declare(name.clone());
    }

    let mut compiler = FunctionCompiler::new(ctx, locals, function.is_async);
    compiler.stmts(&normalized.body)?;
    compiler.push_undefined();
    compiler.emit(Opcode::Return, &[]);
    let (unit, locals) = compiler.finish()?;

    verify_stack(&unit, ctx.map).map_err(|e| CompileError::internal(e.to_string()))?;
    tracing::debug!(
        name = function.id.as_deref().unwrap_or("<anonymous>"),
        words = unit.code.len(),
        constants = unit.consts.len(),
        "compiled function"
    );

    let locals = locals
        .iter()
        .filter(|name| !normalized.params.iter().any(|p| p.as_str() == *name) && Some(*name) != self_name.as_deref())
        .map(str::to_string)
        .collect();
    Ok(CompiledFunction {
        unit,
        params: normalized.params,
        locals,
        self_name,
        is_async: function.is_async,
    })
}

/// Where `break` and `continue` go
struct JumpScope {
    break_to: Label,
    continue_to: Option<Label>,
    try_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Try,
    Catch,
    Finally,
}

/// An active `try` frame seen from the code being emitted
struct TryRegion {
    region: Region,
    has_finally: bool,
}

struct FunctionCompiler<'c, 'a> {
    ctx: &'c mut CompileContext<'a>,
    code: CodeGen,
    locals: LocalSet,
    jumps: Vec<JumpScope>,
    tries: Vec<TryRegion>,
    /// Temporaries holding the objects of enclosing `with` statements
    withs: Vec<String>,
    is_async: bool,
}

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    fn new(ctx: &'c mut CompileContext<'a>, locals: LocalSet, is_async: bool) -> Self {
        let code = CodeGen::new(ctx.map);
        Self {
            ctx,
            code,
            locals,
            jumps: Vec::new(),
            tries: Vec::new(),
            withs: Vec::new(),
            is_async,
        }
    }

    fn finish(self) -> CompileResult<(CompiledUnit, LocalSet)> {
        Ok((self.code.finish()?, self.locals))
    }

    // ==================== Emission ====================

    fn emit(&mut self, op: Opcode, operands: &[u32]) {
        self.code.emit(op, operands);
        self.code.inject_fake(self.ctx.rng, self.ctx.options.fake_opcode_rate);
    }

    fn jump(&mut self, op: Opcode, label: Label) {
        self.code.emit_jump(op, label);
        self.code.inject_fake(self.ctx.rng, self.ctx.options.fake_opcode_rate);
    }

    fn push_const(&mut self, constant: Constant) {
        let k = self.code.constant(constant);
        self.emit(Opcode::PushConst, &[k]);
    }

    fn push_undefined(&mut self) {
        self.push_const(Constant::Undefined);
    }

    fn push_str(&mut self, s: &str) {
        self.push_const(Constant::string(s));
    }

    fn load_local(&mut self, name: &str) {
        let k = self.code.name(name);
        self.emit(Opcode::LoadLocal, &[k]);
    }

    fn store_local(&mut self, name: &str) {
        let k = self.code.name(name);
        self.emit(Opcode::StoreLocal, &[k]);
    }

    fn binary(&mut self, op: BinaryOperator) {
        self.emit(Opcode::Binary, &[op.code()]);
    }

    fn unary(&mut self, op: UnaryOperator) {
        self.emit(Opcode::Unary, &[op.code()]);
    }

    /// A fresh environment slot for an intermediate value
    fn temp(&mut self) -> String {
        let name = self.ctx.names.fresh();
        self.locals.declare(name.clone());
        name
    }

    // ==================== Names ====================

    fn load_direct(&mut self, name: &str, mode: GlobalMode) {
        if self.locals.contains(name) {
            self.load_local(name);
        } else if name == "arguments" {
            let slot = self.ctx.slots.arguments_slot.clone();
            self.load_local(&slot);
        } else if name == "undefined" {
            self.push_undefined();
        } else {
            let k = self.code.name(name);
            self.emit(Opcode::LoadGlobal, &[k, mode.code()]);
        }
    }

    fn store_direct(&mut self, name: &str) {
        if self.locals.contains(name) {
            self.store_local(name);
        } else if name == "arguments" {
            let slot = self.ctx.slots.arguments_slot.clone();
            self.store_local(&slot);
        } else {
            let k = self.code.name(name);
            self.emit(Opcode::StoreGlobal, &[k]);
        }
    }

    /// Read an identifier, probing enclosing `with` objects innermost first
    fn load_name(&mut self, name: &str, mode: GlobalMode) {
        if self.withs.is_empty() {
            self.load_direct(name, mode);
            return;
        }
        let done = self.code.new_label();
        for object in self.withs.clone().iter().rev() {
            let next = self.code.new_label();
            self.push_str(name);
            self.load_local(object);
            self.binary(BinaryOperator::In);
            self.jump(Opcode::JmpIfFalse, next);
            self.load_local(object);
            self.push_str(name);
            self.emit(Opcode::GetProp, &[]);
            self.jump(Opcode::Jmp, done);
            self.code.mark(next);
        }
        self.load_direct(name, mode);
        self.code.mark(done);
    }

    /// Pop the top of stack into an identifier
    fn store_name(&mut self, name: &str) {
        if self.withs.is_empty() {
            self.store_direct(name);
            return;
        }
        let value = self.temp();
        self.store_local(&value);
        let done = self.code.new_label();
        for object in self.withs.clone().iter().rev() {
            let next = self.code.new_label();
            self.push_str(name);
            self.load_local(object);
            self.binary(BinaryOperator::In);
            self.jump(Opcode::JmpIfFalse, next);
            self.load_local(object);
            self.push_str(name);
            self.load_local(&value);
            self.emit(Opcode::SetProp, &[]);
            self.emit(Opcode::Pop, &[]);
            self.jump(Opcode::Jmp, done);
            self.code.mark(next);
        }
        self.load_local(&value);
        self.store_direct(name);
        self.code.mark(done);
    }

    // ==================== Statements ====================

    fn stmts(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        stmts.iter().try_for_each(|s| self.compile_statement(s))
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
            }
            Stmt::VarDecl(decl) => self.var_decl(decl)?,
            Stmt::FunctionDecl(_) => return Err(CompileError::internal("function declaration survived hoisting")),
            Stmt::ClassDecl(_) => return Err(CompileError::internal("class declaration survived lowering")),
            Stmt::Return(arg) => {
                match arg {
                    Some(expr) => self.compile_expression(expr)?,
                    None => self.push_undefined(),
                }
                self.emit(Opcode::Return, &[]);
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let else_label = self.code.new_label();
                self.compile_expression(test)?;
                self.jump(Opcode::JmpIfFalse, else_label);
                self.compile_statement(consequent)?;
                match alternate {
                    Some(alt) => {
                        let end = self.code.new_label();
                        self.jump(Opcode::Jmp, end);
                        self.code.mark(else_label);
                        self.compile_statement(alt)?;
                        self.code.mark(end);
                    }
                    None => self.code.mark(else_label),
                }
            }
            Stmt::Block(body) => self.stmts(body)?,
            Stmt::While { test, body } => {
                let top = self.code.new_label();
                let end = self.code.new_label();
                self.code.mark(top);
                self.compile_expression(test)?;
                self.jump(Opcode::JmpIfFalse, end);
                self.loop_body(body, end, top)?;
                self.jump(Opcode::Jmp, top);
                self.code.mark(end);
            }
            Stmt::DoWhile { body, test } => {
                let top = self.code.new_label();
                let cont = self.code.new_label();
                let end = self.code.new_label();
                self.code.mark(top);
                self.loop_body(body, end, cont)?;
                self.code.mark(cont);
                self.compile_expression(test)?;
                self.jump(Opcode::JmpIfTrue, top);
                self.code.mark(end);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::VarDecl(decl)) => self.var_decl(decl)?,
                    Some(ForInit::Expr(expr)) => {
                        self.compile_expression(expr)?;
                        self.emit(Opcode::Pop, &[]);
                    }
                    None => {}
                }
                let top = self.code.new_label();
                let cont = self.code.new_label();
                let end = self.code.new_label();
                self.code.mark(top);
                if let Some(test) = test {
                    self.compile_expression(test)?;
                    self.jump(Opcode::JmpIfFalse, end);
                }
                self.loop_body(body, end, cont)?;
                self.code.mark(cont);
                if let Some(update) = update {
                    self.compile_expression(update)?;
                    self.emit(Opcode::Pop, &[]);
                }
                self.jump(Opcode::Jmp, top);
                self.code.mark(end);
            }
            Stmt::ForIn { .. } => return Err(CompileError::unsupported("for-in loop")),
            Stmt::ForOf { .. } => return Err(CompileError::internal("for-of survived lowering")),
            Stmt::Break(None) => self.jump_out(false)?,
            Stmt::Continue(None) => self.jump_out(true)?,
            Stmt::Break(Some(_)) | Stmt::Continue(Some(_)) => {
                return Err(CompileError::unsupported("labeled jump"));
            }
            Stmt::Throw(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Throw, &[]);
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => self.try_stmt(block, handler.as_ref(), finalizer.as_deref())?,
            Stmt::Switch {
                discriminant,
                cases,
            } => self.switch(discriminant, cases)?,
            Stmt::Labeled { .. } => return Err(CompileError::unsupported("labeled statement")),
            Stmt::With { object, body } => {
                self.compile_expression(object)?;
                let slot = self.temp();
                self.store_local(&slot);
                self.withs.push(slot);
                let result = self.compile_statement(body);
                self.withs.pop();
                result?;
            }
            Stmt::Empty | Stmt::Debugger => {}
            Stmt::Verbatim(_) => return Err(CompileError::unsupported("pre-rendered statement")),
        }
        Ok(())
    }

    fn var_decl(&mut self, decl: &VarDecl) -> CompileResult<()> {
        for declarator in &decl.declarations {
            let Pattern::Ident(name) = &declarator.id else {
                return Err(CompileError::internal("pattern survived normalization"));
            };
            if let Some(init) = &declarator.init {
                self.compile_expression(init)?;
                self.store_name(name);
            }
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &Stmt, break_to: Label, continue_to: Label) -> CompileResult<()> {
        self.jumps.push(JumpScope {
            break_to,
            continue_to: Some(continue_to),
            try_depth: self.tries.len(),
        });
        let result = self.compile_statement(body);
        self.jumps.pop();
        result
    }

    /// `break`/`continue`: unwind the try frames crossed, then jump
    fn jump_out(&mut self, is_continue: bool) -> CompileResult<()> {
        let scope = self
            .jumps
            .iter()
            .rev()
            .find(|s| !is_continue || s.continue_to.is_some())
            .ok_or_else(|| CompileError::unsupported("jump outside loop or switch"))?;
        let target = if is_continue { scope.continue_to } else { Some(scope.break_to) };
        let target = target.ok_or_else(|| CompileError::internal("missing continue target"))?;
        let crossed = &self.tries[scope.try_depth..];
        if crossed
            .iter()
            .any(|t| t.has_finally && t.region != Region::Finally)
        {
            return Err(CompileError::unsupported("jump out of a try with finally"));
        }
        for _ in 0..crossed.len() {
            self.emit(Opcode::EndTry, &[]);
        }
        self.jump(Opcode::Jmp, target);
        Ok(())
    }

    fn protected(&mut self, region: Region, has_finally: bool, body: &[Stmt]) -> CompileResult<()> {
        self.tries.push(TryRegion { region, has_finally });
        let result = self.stmts(body);
        self.tries.pop();
        result
    }

    fn try_stmt(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
    ) -> CompileResult<()> {
        let has_finally = finalizer.is_some();
        let catch_label = handler.map(|_| self.code.new_label());
        let finally_label = finalizer.map(|_| self.code.new_label());
        let end = self.code.new_label();

        self.code.emit_try(catch_label, finally_label, end);
        self.protected(Region::Try, has_finally, block)?;
        match finally_label {
            Some(finally) => self.jump(Opcode::Jmp, finally),
            None => {
                self.emit(Opcode::EndTry, &[]);
                self.jump(Opcode::Jmp, end);
            }
        }

        if let (Some(handler), Some(catch)) = (handler, catch_label) {
            self.code.mark(catch);
            self.emit(Opcode::EnterCatch, &[]);
            match &handler.param {
                Some(Pattern::Ident(name)) => self.store_local(name),
                Some(_) => return Err(CompileError::internal("catch pattern survived normalization")),
                None => self.emit(Opcode::Pop, &[]),
            }
            self.protected(Region::Catch, has_finally, &handler.body)?;
            match finally_label {
                Some(finally) => self.jump(Opcode::Jmp, finally),
                None => self.emit(Opcode::Rethrow, &[]),
            }
        }

        if let (Some(body), Some(finally)) = (finalizer, finally_label) {
            self.code.mark(finally);
            self.emit(Opcode::EnterFinally, &[]);
            self.protected(Region::Finally, true, body)?;
            self.emit(Opcode::Rethrow, &[]);
        }

        self.code.mark(end);
        Ok(())
    }

    fn switch(&mut self, discriminant: &Expr, cases: &[SwitchCase]) -> CompileResult<()> {
        let end = self.code.new_label();
        let bodies: Vec<Label> = cases.iter().map(|_| self.code.new_label()).collect();

        self.compile_expression(discriminant)?;
        for (case, &body) in cases.iter().zip(&bodies) {
            let Some(test) = &case.test else { continue };
            let next = self.code.new_label();
            self.emit(Opcode::Dup, &[]);
            self.compile_expression(test)?;
            self.binary(BinaryOperator::StrictEq);
            self.jump(Opcode::JmpIfFalse, next);
            self.emit(Opcode::Pop, &[]);
            self.jump(Opcode::Jmp, body);
            self.code.mark(next);
        }
        self.emit(Opcode::Pop, &[]);
        let default = cases.iter().position(|c| c.test.is_none());
        match default {
            Some(index) => self.jump(Opcode::Jmp, bodies[index]),
            None => self.jump(Opcode::Jmp, end),
        }

        self.jumps.push(JumpScope {
            break_to: end,
            continue_to: None,
            try_depth: self.tries.len(),
        });
        let mut result = Ok(());
        for (case, &body) in cases.iter().zip(&bodies) {
            self.code.mark(body);
            result = self.stmts(&case.consequent);
            if result.is_err() {
                break;
            }
        }
        self.jumps.pop();
        result?;
        self.code.mark(end);
        Ok(())
    }

    // ==================== Expressions ====================

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Ident(name) => self.load_name(name, GlobalMode::Strict),
            Expr::This => {
                let slot = self.ctx.slots.this_slot.clone();
                self.load_local(&slot);
            }
            Expr::NewTarget => {
                let slot = self.ctx.slots.new_target_slot.clone();
                self.load_local(&slot);
            }
            Expr::Super => return Err(CompileError::unsupported("super reference")),
            Expr::Lit(lit) => self.literal(lit)?,
            Expr::Template { quasis, exprs } => self.template(quasis, exprs)?,
            Expr::TaggedTemplate { .. } => return Err(CompileError::unsupported("tagged template")),
            Expr::Array(items) => {
                for item in items {
                    match item {
                        None => self.push_undefined(),
                        Some(item) if item.spread => return Err(CompileError::unsupported("array spread")),
                        Some(item) => self.compile_expression(&item.expr)?,
                    }
                }
                self.emit(Opcode::MakeArray, &[items.len() as u32]);
            }
            Expr::Object(props) => self.object(expr, props)?,
            Expr::Function(_) | Expr::Arrow(_) | Expr::Class(_) => self.closure(expr)?,
            Expr::Unary { op, arg } => self.unary_expr(*op, arg)?,
            Expr::Update { op, prefix, arg } => self.update(*op, *prefix, arg)?,
            Expr::Binary { op, left, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.binary((*op).into());
            }
            Expr::Logical { op, left, right } => {
                let end = self.code.new_label();
                self.compile_expression(left)?;
                self.logical_exit(*op, end);
                self.emit(Opcode::Pop, &[]);
                self.compile_expression(right)?;
                self.code.mark(end);
            }
            Expr::Assign { op, target, value } => self.assign(*op, target, value)?,
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let else_label = self.code.new_label();
                let end = self.code.new_label();
                self.compile_expression(test)?;
                self.jump(Opcode::JmpIfFalse, else_label);
                self.compile_expression(consequent)?;
                self.jump(Opcode::Jmp, end);
                self.code.mark(else_label);
                self.compile_expression(alternate)?;
                self.code.mark(end);
            }
            Expr::Chain(inner) => self.chain(inner)?,
            Expr::Call { .. } | Expr::Member { .. } if has_optional_link(expr) => self.chain(expr)?,
            Expr::Call { callee, args, .. } => self.call(callee, args)?,
            Expr::New { callee, args } => {
                self.compile_expression(callee)?;
                let argc = self.args(args)?;
                self.emit(Opcode::New, &[argc]);
            }
            Expr::Member { object, property, .. } => {
                self.member_object(object)?;
                self.member_key(property)?;
                self.emit(Opcode::GetProp, &[]);
            }
            Expr::Sequence(exprs) => {
                let Some((last, init)) = exprs.split_last() else {
                    self.push_undefined();
                    return Ok(());
                };
                for e in init {
                    self.compile_expression(e)?;
                    self.emit(Opcode::Pop, &[]);
                }
                self.compile_expression(last)?;
            }
            Expr::Await(arg) => {
                if !self.is_async {
                    return Err(CompileError::unsupported("await outside async function"));
                }
                self.compile_expression(arg)?;
                self.emit(Opcode::Await, &[]);
            }
            Expr::Yield { .. } => return Err(CompileError::unsupported("yield expression")),
        }
        Ok(())
    }

    fn literal(&mut self, lit: &Lit) -> CompileResult<()> {
        let constant = match lit {
            Lit::Null => Constant::Null,
            Lit::Bool(b) => Constant::Bool(*b),
            Lit::Num(n) => Constant::Number(*n),
            Lit::Str(s) => Constant::string(s.as_str()),
            Lit::Regex { .. } => return Err(CompileError::unsupported("regular expression literal")),
            Lit::BigInt(_) => return Err(CompileError::unsupported("bigint literal")),
        };
        self.push_const(constant);
        Ok(())
    }

    /// `` `a${x}b` `` as `"a" concat x + "b"`, where concat stringifies
    fn template(&mut self, quasis: &[String], exprs: &[Expr]) -> CompileResult<()> {
        let head = quasis.first().map(String::as_str).unwrap_or("");
        self.push_str(head);
        for (i, e) in exprs.iter().enumerate() {
            self.compile_expression(e)?;
            self.binary(BinaryOperator::TemplateConcat);
            let tail = quasis.get(i + 1).map(String::as_str).unwrap_or("");
            if !tail.is_empty() {
                self.push_str(tail);
                self.binary(BinaryOperator::Add);
            }
        }
        Ok(())
    }

    fn object(&mut self, whole: &Expr, props: &[ObjectProp]) -> CompileResult<()> {
        // methods and accessors keep their home object only as source
        if props.iter().any(|p| matches!(p, ObjectProp::Method { .. })) {
            return self.closure(whole);
        }
        for prop in props {
            match prop {
                ObjectProp::KeyValue { key, value } => {
                    self.prop_key(key)?;
                    self.compile_expression(value)?;
                }
                ObjectProp::Shorthand(name) => {
                    self.push_str(name);
                    self.load_name(name, GlobalMode::Strict);
                }
                ObjectProp::Spread(_) => return Err(CompileError::unsupported("object spread")),
                ObjectProp::Method { .. } => return Err(CompileError::internal("method in plain object")),
            }
        }
        self.emit(Opcode::MakeObject, &[props.len() as u32]);
        Ok(())
    }

    fn prop_key(&mut self, key: &PropKey) -> CompileResult<()> {
        match key {
            PropKey::Computed(e) => self.compile_expression(e),
            other => {
                let name = other
                    .static_name()
                    .ok_or_else(|| CompileError::internal("static key without name"))?;
                self.push_str(&name);
                Ok(())
            }
        }
    }

    fn closure(&mut self, expr: &Expr) -> CompileResult<()> {
        if !self.withs.is_empty() {
            return Err(CompileError::unsupported("closure inside with"));
        }
        let rewritten = rewrite_closure(expr, &self.locals, self.ctx.slots)?;
        let source = print_expression(&rewritten);
        let k = self.code.constant(Constant::Closure(ClosureSource {
            source,
            expression: Some(Arc::new(rewritten)),
        }));
        self.emit(Opcode::Closure, &[k]);
        Ok(())
    }

    fn unary_expr(&mut self, op: UnaryOp, arg: &Expr) -> CompileResult<()> {
        let operator = UnaryOperator::from_ast(op).ok_or_else(|| CompileError::unsupported("delete operator"))?;
        match (op, arg) {
            (UnaryOp::TypeOf, Expr::Ident(name)) => self.load_name(name, GlobalMode::TypeofSafe),
            _ => self.compile_expression(arg)?,
        }
        self.unary(operator);
        Ok(())
    }

    /// With the left value on the stack: keep it and jump to `end` when it
    /// decides the result, otherwise fall through with it still on the stack
    fn logical_exit(&mut self, op: LogicalOp, end: Label) {
        self.emit(Opcode::Dup, &[]);
        match op {
            LogicalOp::And => self.jump(Opcode::JmpIfFalse, end),
            LogicalOp::Or => self.jump(Opcode::JmpIfTrue, end),
            LogicalOp::Nullish => {
                self.push_const(Constant::Null);
                self.binary(BinaryOperator::LooseEq);
                self.jump(Opcode::JmpIfFalse, end);
            }
        }
    }

    fn member_object(&mut self, object: &Expr) -> CompileResult<()> {
        if matches!(object, Expr::Super) {
            return Err(CompileError::unsupported("super property"));
        }
        self.compile_expression(object)
    }

    fn member_key(&mut self, property: &MemberProp) -> CompileResult<()> {
        match property {
            MemberProp::Ident(name) => {
                self.push_str(name);
                Ok(())
            }
            MemberProp::Computed(e) => self.compile_expression(e),
        }
    }

    /// Evaluate object and key once into temporaries
    fn spill_reference(&mut self, object: &Expr, property: &MemberProp) -> CompileResult<(String, String)> {
        self.member_object(object)?;
        let object_slot = self.temp();
        self.store_local(&object_slot);
        self.member_key(property)?;
        let key_slot = self.temp();
        self.store_local(&key_slot);
        Ok((object_slot, key_slot))
    }

    fn assign(&mut self, op: AssignOp, target: &Pattern, value: &Expr) -> CompileResult<()> {
        match target {
            Pattern::Ident(name) => self.assign_name(op, name, value),
            Pattern::Expr(e) => match e.as_ref() {
                Expr::Ident(name) => self.assign_name(op, name, value),
                Expr::Member {
                    object,
                    property,
                    optional: false,
                } => self.assign_member(op, object, property, value),
                _ => Err(CompileError::unsupported("assignment target")),
            },
            _ => Err(CompileError::unsupported("destructuring assignment")),
        }
    }

    fn assign_name(&mut self, op: AssignOp, name: &str, value: &Expr) -> CompileResult<()> {
        match op {
            AssignOp::Assign => {
                self.compile_expression(value)?;
                self.emit(Opcode::Dup, &[]);
                self.store_name(name);
            }
            AssignOp::Binary(op) => {
                self.load_name(name, GlobalMode::Strict);
                self.compile_expression(value)?;
                self.binary(op.into());
                self.emit(Opcode::Dup, &[]);
                self.store_name(name);
            }
            AssignOp::Logical(op) => {
                let end = self.code.new_label();
                self.load_name(name, GlobalMode::Strict);
                self.logical_exit(op, end);
                self.emit(Opcode::Pop, &[]);
                self.compile_expression(value)?;
                self.emit(Opcode::Dup, &[]);
                self.store_name(name);
                self.code.mark(end);
            }
        }
        Ok(())
    }

    fn assign_member(
        &mut self,
        op: AssignOp,
        object: &Expr,
        property: &MemberProp,
        value: &Expr,
    ) -> CompileResult<()> {
        match op {
            AssignOp::Assign => {
                self.member_object(object)?;
                self.member_key(property)?;
                self.compile_expression(value)?;
                self.emit(Opcode::SetProp, &[]);
            }
            AssignOp::Binary(op) => {
                let (o, k) = self.spill_reference(object, property)?;
                self.load_local(&o);
                self.load_local(&k);
                self.load_local(&o);
                self.load_local(&k);
                self.emit(Opcode::GetProp, &[]);
                self.compile_expression(value)?;
                self.binary(op.into());
                self.emit(Opcode::SetProp, &[]);
            }
            AssignOp::Logical(op) => {
                let (o, k) = self.spill_reference(object, property)?;
                let end = self.code.new_label();
                self.load_local(&o);
                self.load_local(&k);
                self.emit(Opcode::GetProp, &[]);
                self.logical_exit(op, end);
                self.emit(Opcode::Pop, &[]);
                self.load_local(&o);
                self.load_local(&k);
                self.compile_expression(value)?;
                self.emit(Opcode::SetProp, &[]);
                self.code.mark(end);
            }
        }
        Ok(())
    }

    fn update(&mut self, op: UpdateOp, prefix: bool, arg: &Expr) -> CompileResult<()> {
        let delta = match op {
            UpdateOp::Increment => BinaryOperator::Add,
            UpdateOp::Decrement => BinaryOperator::Sub,
        };
        match arg {
            Expr::Ident(name) => {
                self.load_name(name, GlobalMode::Strict);
                self.unary(UnaryOperator::Plus);
                if prefix {
                    self.push_const(Constant::Number(1.0));
                    self.binary(delta);
                    self.emit(Opcode::Dup, &[]);
                } else {
                    self.emit(Opcode::Dup, &[]);
                    self.push_const(Constant::Number(1.0));
                    self.binary(delta);
                }
                self.store_name(name);
            }
            Expr::Member {
                object,
                property,
                optional: false,
            } => {
                let (o, k) = self.spill_reference(object, property)?;
                if prefix {
                    self.load_local(&o);
                    self.load_local(&k);
                    self.load_local(&o);
                    self.load_local(&k);
                    self.emit(Opcode::GetProp, &[]);
                    self.unary(UnaryOperator::Plus);
                    self.push_const(Constant::Number(1.0));
                    self.binary(delta);
                    self.emit(Opcode::SetProp, &[]);
                } else {
                    let old = self.temp();
                    self.load_local(&o);
                    self.load_local(&k);
                    self.emit(Opcode::GetProp, &[]);
                    self.unary(UnaryOperator::Plus);
                    self.store_local(&old);
                    self.load_local(&o);
                    self.load_local(&k);
                    self.load_local(&old);
                    self.push_const(Constant::Number(1.0));
                    self.binary(delta);
                    self.emit(Opcode::SetProp, &[]);
                    self.emit(Opcode::Pop, &[]);
                    self.load_local(&old);
                }
            }
            _ => return Err(CompileError::unsupported("update target")),
        }
        Ok(())
    }

    fn args(&mut self, args: &[ExprOrSpread]) -> CompileResult<u32> {
        for arg in args {
            if arg.spread {
                return Err(CompileError::unsupported("spread argument"));
            }
            self.compile_expression(&arg.expr)?;
        }
        Ok(args.len() as u32)
    }

    fn call(&mut self, callee: &Expr, args: &[ExprOrSpread]) -> CompileResult<()> {
        match callee {
            Expr::Member {
                object, property, ..
            } => {
                self.member_object(object)?;
                self.member_key(property)?;
                let argc = self.args(args)?;
                self.emit(Opcode::CallMethod, &[argc]);
            }
            Expr::Ident(name) if name == "eval" => return Err(CompileError::unsupported("direct eval")),
            _ => {
                self.compile_expression(callee)?;
                let argc = self.args(args)?;
                self.emit(Opcode::Call, &[argc]);
            }
        }
        Ok(())
    }

    // ==================== Optional chains ====================

    /// Evaluate a chain; any nullish optional link yields `undefined`
    fn chain(&mut self, expr: &Expr) -> CompileResult<()> {
        let nullish = self.code.new_label();
        let end = self.code.new_label();
        self.chain_value(expr, nullish)?;
        self.jump(Opcode::Jmp, end);
        self.code.mark(nullish);
        self.push_undefined();
        self.code.mark(end);
        Ok(())
    }

    fn chain_value(&mut self, expr: &Expr, nullish: Label) -> CompileResult<()> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                self.chain_object(object, nullish)?;
                if *optional {
                    self.nullish_guard(nullish);
                }
                self.member_key(property)?;
                self.emit(Opcode::GetProp, &[]);
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => match callee.as_ref() {
                Expr::Member {
                    object,
                    property,
                    optional: member_optional,
                } => {
                    self.chain_object(object, nullish)?;
                    if *member_optional {
                        self.nullish_guard(nullish);
                    }
                    if *optional {
                        // o.m?.(): the receiver must survive the guard on m
                        let receiver = self.temp();
                        self.store_local(&receiver);
                        self.load_local(&receiver);
                        self.member_key(property)?;
                        self.emit(Opcode::GetProp, &[]);
                        let function = self.guard_slot(nullish);
                        self.load_local(&receiver);
                        self.load_local(&function);
                        let argc = self.args(args)?;
                        self.emit(Opcode::CallThis, &[argc]);
                    } else {
                        self.member_key(property)?;
                        let argc = self.args(args)?;
                        self.emit(Opcode::CallMethod, &[argc]);
                    }
                }
                _ => {
                    self.chain_object(callee, nullish)?;
                    if *optional {
                        self.nullish_guard(nullish);
                    }
                    let argc = self.args(args)?;
                    self.emit(Opcode::Call, &[argc]);
                }
            },
            _ => self.compile_expression(expr)?,
        }
        Ok(())
    }

    /// Inner link of a chain; a nested chain boundary gets its own labels
    fn chain_object(&mut self, expr: &Expr, nullish: Label) -> CompileResult<()> {
        match expr {
            Expr::Member { object, .. } if matches!(object.as_ref(), Expr::Super) => {
                Err(CompileError::unsupported("super property"))
            }
            Expr::Member { .. } | Expr::Call { .. } => self.chain_value(expr, nullish),
            _ => self.compile_expression(expr),
        }
    }

    /// Pop the top of stack into a slot and leave the chain when it is nullish
    fn guard_slot(&mut self, nullish: Label) -> String {
        let slot = self.temp();
        self.store_local(&slot);
        self.load_local(&slot);
        self.push_const(Constant::Null);
        self.binary(BinaryOperator::LooseEq);
        self.jump(Opcode::JmpIfTrue, nullish);
        slot
    }

    fn nullish_guard(&mut self, nullish: Label) {
        let slot = self.guard_slot(nullish);
        self.load_local(&slot);
    }
}

/// Whether a member/call spine contains an optional link below any chain
/// boundary
fn has_optional_link(expr: &Expr) -> bool {
    match expr {
        Expr::Member {
            object, optional, ..
        } => *optional || has_optional_link(object),
        Expr::Call {
            callee, optional, ..
        } => *optional || has_optional_link(callee),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompileOptions, EnvSlots};
    use shroud_common::{NameGenerator, ObfuscationRng};
    use shroud_vm_bytecode::OpcodeMap;

    fn compile_with(function: &Function, options: CompileOptions) -> CompileResult<CompiledFunction> {
        let map = OpcodeMap::from_rng(&mut ObfuscationRng::from_seed(11));
        let mut rng = ObfuscationRng::from_seed(12);
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(13));
        let slots = EnvSlots::generate(&mut names);
        let mut ctx = CompileContext {
            map: &map,
            rng: &mut rng,
            names: &mut names,
            options: &options,
            slots: &slots,
        };
        compile_function(function, &mut ctx)
    }

    fn compile(function: &Function) -> CompileResult<CompiledFunction> {
        compile_with(function, CompileOptions::default())
    }

    fn opcodes(compiled: &CompiledFunction) -> Vec<Opcode> {
        let map = OpcodeMap::from_rng(&mut ObfuscationRng::from_seed(11));
        compiled
            .unit
            .disassemble(&map)
            .unwrap()
            .into_iter()
            .map(|i| i.opcode)
            .filter(|op| !op.is_fake())
            .collect()
    }

    fn func(params: &[&str], body: Vec<Stmt>) -> Function {
        Function {
            id: Some("f".into()),
            params: params.iter().map(|p| Pattern::ident(*p)).collect(),
            body,
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_return() {
        let f = func(
            &["a", "b"],
            vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::ident("a"),
                Expr::ident("b"),
            )))],
        );
        let compiled = compile(&f).unwrap();
        assert_eq!(compiled.params, vec!["a", "b"]);
        assert_eq!(compiled.self_name.as_deref(), Some("f"));
        let ops = opcodes(&compiled);
        assert_eq!(
            &ops[..4],
            &[Opcode::LoadLocal, Opcode::LoadLocal, Opcode::Binary, Opcode::Return]
        );
        assert_eq!(ops.last(), Some(&Opcode::Return));
    }

    #[test]
    fn test_unknown_names_are_globals() {
        let f = func(&[], vec![Stmt::Expr(Expr::call(Expr::ident("log"), vec![Expr::num(1.0)]))]);
        let ops = opcodes(&compile(&f).unwrap());
        assert_eq!(&ops[..3], &[Opcode::LoadGlobal, Opcode::PushConst, Opcode::Call]);
    }

    #[test]
    fn test_typeof_unknown_uses_safe_mode() {
        let f = func(
            &[],
            vec![Stmt::Return(Some(Expr::Unary {
                op: UnaryOp::TypeOf,
                arg: Box::new(Expr::ident("maybe")),
            }))],
        );
        let compiled = compile(&f).unwrap();
        let map = OpcodeMap::from_rng(&mut ObfuscationRng::from_seed(11));
        let first = compiled.unit.decode_at(&map, 0).unwrap();
        assert_eq!(first.opcode, Opcode::LoadGlobal);
        assert_eq!(first.operands[1], GlobalMode::TypeofSafe.code());
    }

    #[test]
    fn test_method_call_uses_call_method() {
        let f = func(
            &["o"],
            vec![Stmt::Return(Some(Expr::call(
                Expr::member(Expr::ident("o"), "m"),
                vec![Expr::num(1.0)],
            )))],
        );
        let ops = opcodes(&compile(&f).unwrap());
        assert!(ops.contains(&Opcode::CallMethod));
    }

    #[test]
    fn test_optional_call_uses_call_this() {
        // return o.m?.(1)
        let call = Expr::Call {
            callee: Box::new(Expr::member(Expr::ident("o"), "m")),
            args: vec![ExprOrSpread {
                spread: false,
                expr: Expr::num(1.0),
            }],
            optional: true,
        };
        let f = func(&["o"], vec![Stmt::Return(Some(Expr::Chain(Box::new(call))))]);
        let ops = opcodes(&compile(&f).unwrap());
        assert!(ops.contains(&Opcode::CallThis));
        assert!(!ops.contains(&Opcode::CallMethod));
    }

    #[test]
    fn test_try_catch_finally_layout() {
        let f = func(
            &[],
            vec![Stmt::Try {
                block: vec![Stmt::Throw(Expr::num(1.0))],
                handler: Some(CatchClause {
                    param: Some(Pattern::ident("e")),
                    body: vec![],
                }),
                finalizer: Some(vec![Stmt::Expr(Expr::call(Expr::ident("done"), vec![]))]),
            }],
        );
        let compiled = compile(&f).unwrap();
        assert_eq!(compiled.locals.len(), 1, "renamed catch parameter");
        let ops = opcodes(&compiled);
        let want = [
            Opcode::Try,
            Opcode::PushConst,
            Opcode::Throw,
            Opcode::Jmp,
            Opcode::EnterCatch,
            Opcode::StoreLocal,
            Opcode::Jmp,
            Opcode::EnterFinally,
        ];
        assert_eq!(&ops[..want.len()], &want);
        assert!(ops.contains(&Opcode::Rethrow));
    }

    #[test]
    fn test_break_out_of_try_emits_end_try() {
        let f = func(
            &[],
            vec![Stmt::While {
                test: Expr::Lit(Lit::Bool(true)),
                body: Box::new(Stmt::Try {
                    block: vec![Stmt::Break(None)],
                    handler: Some(CatchClause {
                        param: None,
                        body: vec![],
                    }),
                    finalizer: None,
                }),
            }],
        );
        let ops = opcodes(&compile(&f).unwrap());
        let pos = ops.iter().position(|op| *op == Opcode::Try).unwrap();
        assert_eq!(&ops[pos + 1..pos + 3], &[Opcode::EndTry, Opcode::Jmp]);
    }

    #[test]
    fn test_break_across_finally_is_unsupported() {
        let f = func(
            &[],
            vec![Stmt::While {
                test: Expr::Lit(Lit::Bool(true)),
                body: Box::new(Stmt::Try {
                    block: vec![Stmt::Break(None)],
                    handler: None,
                    finalizer: Some(vec![]),
                }),
            }],
        );
        assert!(matches!(compile(&f), Err(CompileError::Unsupported(_))));
    }

    #[test]
    fn test_closure_constant_reads_env() {
        // function f(n) { return function () { return n; }; }
        let inner = Function {
            body: vec![Stmt::Return(Some(Expr::ident("n")))],
            ..Default::default()
        };
        let f = func(&["n"], vec![Stmt::Return(Some(Expr::Function(Box::new(inner))))]);
        let compiled = compile(&f).unwrap();
        let source = compiled
            .unit
            .consts
            .iter()
            .find_map(|c| c.as_closure())
            .unwrap();
        assert!(source.source.contains(".n;"), "{}", source.source);
        assert!(source.expression.is_some());
    }

    #[test]
    fn test_switch_with_default() {
        let f = func(
            &["x"],
            vec![Stmt::Switch {
                discriminant: Expr::ident("x"),
                cases: vec![
                    SwitchCase {
                        test: Some(Expr::num(1.0)),
                        consequent: vec![Stmt::Return(Some(Expr::str("one")))],
                    },
                    SwitchCase {
                        test: None,
                        consequent: vec![Stmt::Break(None)],
                    },
                ],
            }],
        );
        assert!(compile(&f).is_ok());
    }

    #[test]
    fn test_with_requires_downlevel_and_rejects_closures() {
        let body = vec![Stmt::With {
            object: Expr::ident("o"),
            body: Box::new(Stmt::Expr(Expr::assign(Pattern::ident("x"), Expr::num(1.0)))),
        }];
        let f = func(&[], body);
        assert!(matches!(compile(&f), Err(CompileError::Ineligible(_))));
        let downlevel = CompileOptions {
            downlevel: true,
            ..Default::default()
        };
        assert!(compile_with(&f, downlevel.clone()).is_ok());

        let with_closure = func(
            &[],
            vec![Stmt::With {
                object: Expr::ident("o"),
                body: Box::new(Stmt::Expr(Expr::Arrow(Box::new(Function {
                    is_arrow: true,
                    ..Default::default()
                })))),
            }],
        );
        assert!(compile_with(&with_closure, downlevel).is_err());
    }

    #[test]
    fn test_fake_opcodes_keep_stack_balanced() {
        let f = func(
            &["a"],
            vec![
                Stmt::var("i", Some(Expr::num(0.0))),
                Stmt::While {
                    test: Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::ident("a")),
                    body: Box::new(Stmt::Expr(Expr::Update {
                        op: UpdateOp::Increment,
                        prefix: false,
                        arg: Box::new(Expr::ident("i")),
                    })),
                },
                Stmt::Return(Some(Expr::ident("i"))),
            ],
        );
        let options = CompileOptions {
            fake_opcode_rate: 1.0,
            ..Default::default()
        };
        let compiled = compile_with(&f, options).unwrap();
        let map = OpcodeMap::from_rng(&mut ObfuscationRng::from_seed(11));
        let all = compiled.unit.disassemble(&map).unwrap();
        assert!(all.iter().any(|i| i.opcode.is_fake()));
        assert!(verify_stack(&compiled.unit, &map).is_ok());
    }
}
