//! `for-of` lowering to an explicit iterator loop
//!
//! ```text
//! for (HEAD of RIGHT) BODY
//! ```
//! becomes
//! ```text
//! { var it = RIGHT[Symbol.iterator](); var step;
//!   while (!(step = it.next()).done) { HEAD = step.value; BODY } }
//! ```
//! An early `break` does not call the iterator's `return` method.

use shroud_ast::*;

use super::patterns::PatternExpander;
use crate::error::{CompileError, CompileResult};

/// Lower every `for-of` in a function body (nested functions excluded)
pub fn lower_for_of(stmts: &mut [Stmt], expander: &mut PatternExpander<'_>) -> CompileResult<()> {
    stmts.iter_mut().try_for_each(|s| lower_stmt(s, expander))
}

fn lower_stmt(stmt: &mut Stmt, expander: &mut PatternExpander<'_>) -> CompileResult<()> {
    match stmt {
        Stmt::Block(body) => lower_for_of(body, expander),
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            lower_stmt(consequent, expander)?;
            match alternate {
                Some(alt) => lower_stmt(alt, expander),
                None => Ok(()),
            }
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::For { body, .. }
        | Stmt::ForIn { body, .. }
        | Stmt::Labeled { body, .. }
        | Stmt::With { body, .. } => lower_stmt(body, expander),
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            lower_for_of(block, expander)?;
            if let Some(handler) = handler {
                lower_for_of(&mut handler.body, expander)?;
            }
            match finalizer {
                Some(finalizer) => lower_for_of(finalizer, expander),
                None => Ok(()),
            }
        }
        Stmt::Switch { cases, .. } => cases
            .iter_mut()
            .try_for_each(|case| lower_for_of(&mut case.consequent, expander)),
        Stmt::ForOf { is_await: true, .. } => Err(CompileError::unsupported("for-await loop")),
        Stmt::ForOf { .. } => {
            let Stmt::ForOf {
                left, right, body, ..
            } = std::mem::replace(stmt, Stmt::Empty)
            else {
                return Err(CompileError::internal("for-of vanished"));
            };
            let mut body = *body;
            lower_stmt(&mut body, expander)?;
            *stmt = lower_loop(left, right, body, expander)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn lower_loop(
    left: ForHead,
    right: Expr,
    body: Stmt,
    expander: &mut PatternExpander<'_>,
) -> CompileResult<Stmt> {
    let iterator = expander.temp();
    let step = expander.temp();

    let iterator_method = Expr::index(right, Expr::member(Expr::ident("Symbol"), "iterator"));
    let advance = Expr::assign(
        Pattern::ident(step.clone()),
        Expr::call(Expr::member(Expr::ident(iterator.clone()), "next"), vec![]),
    );
    let test = Expr::not(Expr::member(advance, "done"));

    let value = Expr::member(Expr::ident(step.clone()), "value");
    let mut inner = Vec::new();
    match left {
        ForHead::VarDecl(_, pattern) => expander.bind(&pattern, value, &mut inner)?,
        ForHead::Pattern(Pattern::Ident(name)) => inner.push(Stmt::assign(name, value)),
        ForHead::Pattern(Pattern::Expr(target)) => {
            inner.push(Stmt::Expr(Expr::assign(Pattern::Expr(target), value)));
        }
        ForHead::Pattern(_) => return Err(CompileError::unsupported("destructuring assignment")),
    }
    inner.push(body);

    Ok(Stmt::Block(vec![
        Stmt::var(iterator, Some(Expr::call(iterator_method, vec![]))),
        Stmt::var(step, None),
        Stmt::While {
            test,
            body: Box::new(Stmt::Block(inner)),
        },
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_common::{NameGenerator, ObfuscationRng};

    #[test]
    fn test_for_of_becomes_iterator_loop() {
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(2));
        let mut expander = PatternExpander::new(&mut names, "__rest");
        let mut body = vec![Stmt::ForOf {
            left: ForHead::VarDecl(VarKind::Var, Pattern::ident("x")),
            right: Expr::ident("xs"),
            body: Box::new(Stmt::Expr(Expr::call(Expr::ident("use"), vec![Expr::ident("x")]))),
            is_await: false,
        }];
        lower_for_of(&mut body, &mut expander).unwrap();
        let text = print_statement(&body[0]);
        assert!(text.contains("xs[Symbol.iterator]()"), "{text}");
        assert!(text.contains(".next()).done"), "{text}");
        assert!(text.contains("var x = "), "{text}");
        assert!(!text.contains(" of "), "{text}");
    }

    #[test]
    fn test_nested_for_of_in_body_is_lowered() {
        let mut names = NameGenerator::new(ObfuscationRng::from_seed(2));
        let mut expander = PatternExpander::new(&mut names, "__rest");
        let inner = Stmt::ForOf {
            left: ForHead::Pattern(Pattern::ident("y")),
            right: Expr::ident("ys"),
            body: Box::new(Stmt::Empty),
            is_await: false,
        };
        let mut body = vec![Stmt::ForOf {
            left: ForHead::VarDecl(VarKind::Var, Pattern::ident("x")),
            right: Expr::ident("xs"),
            body: Box::new(inner),
            is_await: false,
        }];
        lower_for_of(&mut body, &mut expander).unwrap();
        let text = print_statement(&body[0]);
        assert!(text.contains("ys[Symbol.iterator]()"), "{text}");
    }
}
