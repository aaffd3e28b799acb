//! Math-notation expression compiler
//!
//! Parses LaTeX-like arithmetic (`\frac`, `\left|...\right|`, `^`, functions,
//! subscripts) into an [`ArithExpr`] tree and renders it as an aggregation
//! expression in document or array-element scope.

mod ast;
pub mod cache;
mod clean;
mod deps;
pub mod parser;


pub use ast::*;
pub use clean::clean;
pub use deps::extract_field_dependencies;
pub use parser::{parse, parse_with_depth, DEFAULT_MAX_DEPTH};

use serde_json::Value;

/// Parse and render in one step
pub fn convert_to_mongo(expr: &str, scope: FieldScope) -> Value {
    parse(expr).to_mongo(scope)
}
