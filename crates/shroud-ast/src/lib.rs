//! JavaScript syntax tree used by the Shroud passes.
//!
//! The tree is a closed set of tagged variants. Parsing source text is the
//! job of an external front end; programs arrive here already built (the
//! CLI reads them as JSON through `serde`). Passes rewrite the tree and
//! [`printer`] turns it back into source.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod ast;
pub mod build;
pub mod printer;
pub mod scope;
pub mod visit;

pub use ast::*;
pub use printer::{print_expression, print_function, print_program, print_statement};
