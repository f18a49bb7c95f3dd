//! Function normalization
//!
//! Rewrites a copy of a function into the subset the compiler lowers
//! directly: plain identifier parameters, `var`-only declarations without
//! patterns, no `for-of` and no function declarations. The input tree is
//! never modified.

mod for_of;
mod lexical;
mod patterns;

pub use lexical::rename_in_stmts;
pub use patterns::PatternExpander;

use shroud_ast::*;

use crate::context::CompileContext;
use crate::error::{CompileError, CompileResult};
use patterns::{default_if_undefined, slice_from};

/// A function rewritten into the directly compilable subset
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFunction {
    /// Plain parameter names, in order (the rest parameter is dropped)
    pub params: Vec<String>,
    /// Hoisted functions, then the parameter prologue, then the body
    pub body: Vec<Stmt>,
    /// Renamed catch parameters (locals not declared by `var`)
    pub catch_names: Vec<String>,
}

/// Normalize a candidate function
pub fn normalize(function: &Function, ctx: &mut CompileContext<'_>) -> CompileResult<NormalizedFunction> {
    let mut body = function.body.clone();
    let catch_names = lexical::lower_lexical(&mut body, ctx.names);

    let mut expander = PatternExpander::new(&mut *ctx.names, &ctx.slots.rest_helper);
    for_of::lower_for_of(&mut body, &mut expander)?;
    expand_declarations(&mut body, &mut expander)?;

    let mut hoisted = Vec::new();
    hoist_functions(&mut body, &mut hoisted)?;

    let (params, prologue) = lower_params(&function.params, &mut expander)?;

    let mut out = hoisted;
    out.extend(prologue);
    out.extend(body);
    Ok(NormalizedFunction {
        params,
        body: out,
        catch_names,
    })
}

fn lower_params(
    params: &[Pattern],
    expander: &mut PatternExpander<'_>,
) -> CompileResult<(Vec<String>, Vec<Stmt>)> {
    let mut names = Vec::with_capacity(params.len());
    let mut prologue = Vec::new();
    for (index, param) in params.iter().enumerate() {
        match param {
            Pattern::Ident(name) => names.push(name.clone()),
            Pattern::Assign { target, default } => {
                let slot = match target.as_ref() {
                    Pattern::Ident(name) => name.clone(),
                    _ => expander.temp(),
                };
                names.push(slot.clone());
                prologue.push(default_if_undefined(&slot, default.as_ref().clone()));
                if !matches!(target.as_ref(), Pattern::Ident(_)) {
                    expander.bind(target, Expr::ident(slot), &mut prologue)?;
                }
            }
            Pattern::Rest(inner) => {
                let rest = slice_from(Expr::ident("arguments"), index);
                expander.bind(inner, rest, &mut prologue)?;
            }
            Pattern::Array(_) | Pattern::Object(_) => {
                let slot = expander.temp();
                names.push(slot.clone());
                expander.bind(param, Expr::ident(slot), &mut prologue)?;
            }
            Pattern::Expr(_) => return Err(CompileError::unsupported("expression parameter")),
        }
    }
    Ok((names, prologue))
}

/// Replace destructuring declarations with plain ones
fn expand_declarations(stmts: &mut [Stmt], expander: &mut PatternExpander<'_>) -> CompileResult<()> {
    stmts.iter_mut().try_for_each(|s| expand_in_stmt(s, expander))
}

fn needs_expansion(decl: &VarDecl) -> bool {
    decl.declarations.iter().any(|d| !matches!(d.id, Pattern::Ident(_)))
}

fn expand_decl(decl: VarDecl, expander: &mut PatternExpander<'_>) -> CompileResult<Vec<Stmt>> {
    let mut out = Vec::new();
    for declarator in decl.declarations {
        match (declarator.id, declarator.init) {
            (Pattern::Ident(name), init) => out.push(Stmt::var(name, init)),
            (pattern, Some(init)) => expander.bind(&pattern, init, &mut out)?,
            (_, None) => return Err(CompileError::unsupported("destructuring without initializer")),
        }
    }
    Ok(out)
}

fn expand_in_stmt(stmt: &mut Stmt, expander: &mut PatternExpander<'_>) -> CompileResult<()> {
    match stmt {
        Stmt::VarDecl(decl) if needs_expansion(decl) => {
            let decl = decl.clone();
            *stmt = Stmt::Block(expand_decl(decl, expander)?);
            Ok(())
        }
        Stmt::For { init, body, .. } => {
            expand_in_stmt(body, expander)?;
            let Some(ForInit::VarDecl(decl)) = init else {
                return Ok(());
            };
            if !needs_expansion(decl) {
                return Ok(());
            }
            // the initializer runs once, so it can move in front of the loop
            let decl = decl.clone();
            *init = None;
            let mut block = expand_decl(decl, expander)?;
            block.push(std::mem::replace(stmt, Stmt::Empty));
            *stmt = Stmt::Block(block);
            Ok(())
        }
        Stmt::Block(body) => expand_declarations(body, expander),
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            expand_in_stmt(consequent, expander)?;
            match alternate {
                Some(alt) => expand_in_stmt(alt, expander),
                None => Ok(()),
            }
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::ForIn { body, .. }
        | Stmt::ForOf { body, .. }
        | Stmt::Labeled { body, .. }
        | Stmt::With { body, .. } => expand_in_stmt(body, expander),
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            expand_declarations(block, expander)?;
            if let Some(handler) = handler {
                expand_declarations(&mut handler.body, expander)?;
            }
            match finalizer {
                Some(finalizer) => expand_declarations(finalizer, expander),
                None => Ok(()),
            }
        }
        Stmt::Switch { cases, .. } => cases
            .iter_mut()
            .try_for_each(|case| expand_declarations(&mut case.consequent, expander)),
        _ => Ok(()),
    }
}

/// Move every function declaration to `hoisted` as `var f = function f() {}`
fn hoist_functions(stmts: &mut Vec<Stmt>, hoisted: &mut Vec<Stmt>) -> CompileResult<()> {
    let mut kept = Vec::with_capacity(stmts.len());
    for mut stmt in stmts.drain(..) {
        if let Stmt::FunctionDecl(function) = stmt {
            hoisted.push(declare_function(function)?);
            continue;
        }
        hoist_in_stmt(&mut stmt, hoisted)?;
        kept.push(stmt);
    }
    *stmts = kept;
    Ok(())
}

fn declare_function(function: Function) -> CompileResult<Stmt> {
    let name = function
        .id
        .clone()
        .ok_or_else(|| CompileError::unsupported("anonymous function declaration"))?;
    Ok(Stmt::var(name, Some(Expr::Function(Box::new(function)))))
}

fn hoist_in_stmt(stmt: &mut Stmt, hoisted: &mut Vec<Stmt>) -> CompileResult<()> {
    match stmt {
        Stmt::FunctionDecl(_) => {
            if let Stmt::FunctionDecl(function) = std::mem::replace(stmt, Stmt::Empty) {
                hoisted.push(declare_function(function)?);
            }
            Ok(())
        }
        Stmt::Block(body) => hoist_functions(body, hoisted),
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            hoist_in_stmt(consequent, hoisted)?;
            match alternate {
                Some(alt) => hoist_in_stmt(alt, hoisted),
                None => Ok(()),
            }
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::For { body, .. }
        | Stmt::ForIn { body, .. }
        | Stmt::ForOf { body, .. }
        | Stmt::Labeled { body, .. }
        | Stmt::With { body, .. } => hoist_in_stmt(body, hoisted),
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            hoist_functions(block, hoisted)?;
            if let Some(handler) = handler {
                hoist_functions(&mut handler.body, hoisted)?;
            }
            match finalizer {
                Some(finalizer) => hoist_functions(finalizer, hoisted),
                None => Ok(()),
            }
        }
        Stmt::Switch { cases, .. } => cases
            .iter_mut()
            .try_for_each(|case| hoist_functions(&mut case.consequent, hoisted)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompileOptions, EnvSlots};
    use shroud_common::{NameGenerator, ObfuscationRng};
    use shroud_vm_bytecode::OpcodeMap;

    fn run(function: &Function) -> NormalizedFunction {
        let map = OpcodeMap::identity();
        let mut rng = ObfuscationRng::from_seed(1);
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(2));
        let slots = EnvSlots::generate(&mut names);
        let options = CompileOptions {
            downlevel: true,
            ..Default::default()
        };
        let mut ctx = CompileContext {
            map: &map,
            rng: &mut rng,
            names: &mut names,
            options: &options,
            slots: &slots,
        };
        normalize(function, &mut ctx).unwrap()
    }

    #[test]
    fn test_parameter_prologue() {
        // function f(a, b = 2, {c}, ...rest) {}
        let function = Function {
            id: Some("f".into()),
            params: vec![
                Pattern::ident("a"),
                Pattern::Assign {
                    target: Box::new(Pattern::ident("b")),
                    default: Box::new(Expr::num(2.0)),
                },
                Pattern::Object(vec![ObjectPatternProp::KeyValue {
                    key: PropKey::Ident("c".into()),
                    value: Pattern::ident("c"),
                }]),
                Pattern::Rest(Box::new(Pattern::ident("rest"))),
            ],
            ..Default::default()
        };
        let normalized = run(&function);
        assert_eq!(normalized.params.len(), 3);
        assert_eq!(&normalized.params[..2], &["a".to_string(), "b".to_string()]);
        let text: String = normalized.body.iter().map(print_statement).collect();
        assert!(text.contains("b === void 0"), "{text}");
        assert!(text.contains(&format!("var c = {}.c", normalized.params[2])), "{text}");
        assert!(text.contains("var rest = Array.prototype.slice.call(arguments, 3)"), "{text}");
    }

    #[test]
    fn test_function_declarations_are_hoisted_first() {
        let inner = Function {
            id: Some("g".into()),
            ..Default::default()
        };
        let function = Function {
            id: Some("f".into()),
            params: vec![Pattern::Assign {
                target: Box::new(Pattern::ident("x")),
                default: Box::new(Expr::num(1.0)),
            }],
            body: vec![
                Stmt::Return(Some(Expr::call(Expr::ident("g"), vec![]))),
                Stmt::Block(vec![Stmt::FunctionDecl(inner)]),
            ],
            ..Default::default()
        };
        let normalized = run(&function);
        assert!(print_statement(&normalized.body[0]).starts_with("var g = function g("));
        assert!(matches!(normalized.body[1], Stmt::If { .. }));
        let text: String = normalized.body.iter().map(print_statement).collect();
        assert_eq!(text.matches("function g").count(), 1);
    }

    #[test]
    fn test_input_is_not_modified() {
        let function = Function {
            id: Some("f".into()),
            body: vec![Stmt::VarDecl(VarDecl {
                kind: VarKind::Const,
                declarations: vec![VarDeclarator {
                    id: Pattern::Array(vec![Some(Pattern::ident("p")), Some(Pattern::ident("q"))]),
                    init: Some(Expr::ident("pair")),
                }],
            })],
            ..Default::default()
        };
        let before = function.clone();
        let normalized = run(&function);
        assert_eq!(function, before);
        let text: String = normalized.body.iter().map(print_statement).collect();
        assert!(!text.contains("const"), "{text}");
        assert!(text.contains("= pair[0]"), "{text}");
    }
}
