//! Disassembly of a program's candidate functions
//!
//! Compiles every function the pass would consider, without touching the
//! program, and renders each tape as a listing together with its
//! stack-balance report.

use std::fmt;

use shroud_ast::visit::{VisitMut, walk_expr, walk_function, walk_stmt};
use shroud_ast::{Expr, Function, Program, Stmt};
use shroud_vm_bytecode::{StackReport, verify_stack};

use crate::context::VirtualizeContext;
use crate::error::{EngineError, EngineResult};
use crate::options::VirtualizeOptions;

/// One compiled function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionListing {
    /// Function name (`<anonymous>` for unnamed expressions)
    pub name: String,
    /// Listing and stack report, or why the function was rejected
    pub outcome: Result<(String, StackReport), String>,
}

impl fmt::Display for FunctionListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok((listing, report)) => {
                writeln!(f, "== {} ==", self.name)?;
                write!(f, "{listing}")?;
                writeln!(
                    f,
                    "-- reachable {}, max depth {}, return depths {:?}",
                    report.reachable, report.max_depth, report.return_depths
                )
            }
            Err(reason) => writeln!(f, "== {} == skipped: {reason}", self.name),
        }
    }
}

/// Compile and list every function declaration and function expression
/// of `program`, outer functions first
pub fn disassemble_program(program: &Program, options: VirtualizeOptions) -> EngineResult<Vec<FunctionListing>> {
    options.validate()?;
    let mut ctx = VirtualizeContext::new(options);
    ctx.reserve_program(program);

    let mut collector = Collector {
        ctx: &mut ctx,
        listings: Vec::new(),
        error: None,
    };
    let mut body = program.body.clone();
    for stmt in &mut body {
        collector.visit_stmt(stmt);
    }
    match collector.error {
        Some(err) => Err(err),
        None => Ok(collector.listings),
    }
}

struct Collector<'a> {
    ctx: &'a mut VirtualizeContext,
    listings: Vec<FunctionListing>,
    error: Option<EngineError>,
}

impl Collector<'_> {
    fn list(&mut self, function: &Function) -> EngineResult<FunctionListing> {
        let name = function.id.clone().unwrap_or_else(|| "<anonymous>".to_string());
        let slots = self.ctx.runtime_names().slots.clone();
        let compiled = match self.ctx.compile(function, &slots) {
            Ok(compiled) => compiled,
            Err(err) if err.is_internal() => return Err(err.into()),
            Err(err) => {
                return Ok(FunctionListing {
                    name,
                    outcome: Err(err.to_string()),
                });
            }
        };
        let map = self.ctx.mapping();
        let listing = compiled
            .unit
            .listing(&map)
            .map_err(|e| EngineError::internal(e.to_string()))?;
        let report = verify_stack(&compiled.unit, &map).map_err(|e| EngineError::internal(e.to_string()))?;
        Ok(FunctionListing {
            name,
            outcome: Ok((listing, report)),
        })
    }

    fn candidate(&mut self, function: &mut Function) {
        match self.list(function) {
            Ok(listing) => self.listings.push(listing),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }
        walk_function(self, function);
    }
}

impl VisitMut for Collector<'_> {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::FunctionDecl(function) => self.candidate(function),
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Function(function) => self.candidate(function),
            _ => walk_expr(self, expr),
        }
    }
}
