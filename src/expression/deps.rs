//! Field dependency extraction

use crate::expression::ast::MathFunction;
use crate::expression::clean::clean;
use ahash::AHashSet;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z_][a-zA-Z0-9_.]*").expect("static regex"));

/// Leftovers of LaTeX commands that are not field names
const LATEX_ARTIFACTS: [&str; 9] = [
    "left", "right", "frac", "dfrac", "tfrac", "cdot", "times", "div", "operatorname",
];

/// Identifiers referenced by an expression, de-duplicated in first-occurrence order
///
/// Numeric literals (exponent fragments included), function names, LaTeX
/// leftovers and array-relative `this` tokens are excluded.
pub fn extract_field_dependencies(expr: &str) -> Vec<String> {
    let cleaned = clean(expr);
    let bytes = cleaned.as_bytes();
    let mut seen = AHashSet::new();
    let mut deps = Vec::new();

    for m in IDENTIFIER_TOKEN.find_iter(&cleaned) {
        if m.start() > 0 {
            let prev = bytes[m.start() - 1];
            if prev.is_ascii_digit() || prev == b'.' || prev == b'\\' {
                continue;
            }
        }
        let token = m.as_str().trim_end_matches('.');
        if token.is_empty()
            || MathFunction::from_name(token).is_some()
            || LATEX_ARTIFACTS.contains(&token)
            || token == "this"
            || token.starts_with("this.")
        {
            continue;
        }
        if seen.insert(token.to_string()) {
            deps.push(token.to_string());
        }
    }
    deps
}
