//! Math-notation parser
//!
//! Splits the cleaned text at its main operator and recurses, with a hard
//! depth limit. Input that cannot be parsed degrades to a raw field
//! reference; the parser never fails.

use crate::expression::ast::{ArithExpr, ArithOp, MathFunction};
use crate::expression::clean::{clean_with_depth, matching_close};
use once_cell::sync::Lazy;
use regex::Regex;

/// Default recursion limit
pub const DEFAULT_MAX_DEPTH: usize = 10;

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$").expect("static regex")
});

pub(crate) static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.]*$").expect("static regex"));

/// Parse with the default depth limit
pub fn parse(expr: &str) -> ArithExpr {
    parse_with_depth(expr, DEFAULT_MAX_DEPTH)
}

/// Parse with an explicit depth limit
pub fn parse_with_depth(expr: &str, max_depth: usize) -> ArithExpr {
    let cleaned = clean_with_depth(expr, max_depth);
    parse_cleaned(&cleaned, 0, max_depth)
}

fn parse_cleaned(text: &str, depth: usize, max_depth: usize) -> ArithExpr {
    let text = text.trim();
    if depth > max_depth {
        tracing::debug!(text, depth, "parse depth exceeded, using raw field");
        return ArithExpr::Field(text.to_string());
    }

    let text = strip_outer_parens(text);

    if let Some((func, inner)) = split_call(text) {
        return ArithExpr::call(func, parse_cleaned(inner, depth + 1, max_depth));
    }

    if let Some((idx, op)) = find_main_operator(text) {
        let left = parse_cleaned(&text[..idx], depth + 1, max_depth);
        let right = parse_cleaned(&text[idx + 1..], depth + 1, max_depth);
        return ArithExpr::binary(op, left, right);
    }

    parse_atom(text, depth, max_depth)
}

fn parse_atom(text: &str, depth: usize, max_depth: usize) -> ArithExpr {
    if NUMBER.is_match(text) {
        if let Ok(n) = text.parse::<f64>() {
            return ArithExpr::Number(n);
        }
    }
    if IDENTIFIER.is_match(text) {
        return ArithExpr::Field(text.to_string());
    }
    if let Some(rest) = text.strip_prefix('-') {
        if !rest.trim().is_empty() {
            return ArithExpr::Negate(Box::new(parse_cleaned(rest, depth + 1, max_depth)));
        }
    }
    if let Some(rest) = text.strip_prefix('+') {
        if !rest.trim().is_empty() {
            return parse_cleaned(rest, depth + 1, max_depth);
        }
    }
    tracing::trace!(text, "unparseable operand, using raw field");
    ArithExpr::Field(text.to_string())
}

/// Remove every layer of parentheses wrapping the whole text
///
/// One pass: the k-th leading `(` is a wrapping layer when it closes at the
/// k-th trailing `)` and all outer layers wrap too.
fn strip_outer_parens(text: &str) -> &str {
    let bytes = text.as_bytes();

    let leading: Vec<usize> = bytes
        .iter()
        .enumerate()
        .take_while(|(_, &b)| b == b'(' || b == b' ')
        .filter(|(_, &b)| b == b'(')
        .map(|(i, _)| i)
        .collect();
    if leading.is_empty() {
        return text;
    }
    let trailing: Vec<usize> = bytes
        .iter()
        .enumerate()
        .rev()
        .take_while(|(_, &b)| b == b')' || b == b' ')
        .filter(|(_, &b)| b == b')')
        .map(|(i, _)| i)
        .collect();

    let mut closes: Vec<Option<usize>> = vec![None; leading.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => stack.push(i),
            b')' => {
                if let Some(open) = stack.pop() {
                    let layer = stack.len();
                    if layer < leading.len() && leading[layer] == open {
                        closes[layer] = Some(i);
                    }
                }
            }
            _ => {}
        }
    }

    let layers = leading
        .iter()
        .zip(&trailing)
        .zip(&closes)
        .take_while(|((&open, &close), &found)| open < close && found == Some(close))
        .count();
    match layers {
        0 => text,
        n => text[leading[n - 1] + 1..trailing[n - 1]].trim(),
    }
}

/// `name(body)` spanning the whole text, for a known function name
fn split_call(text: &str) -> Option<(MathFunction, &str)> {
    let open = text.find('(')?;
    let func = MathFunction::from_name(&text[..open])?;
    let chars: Vec<char> = text.chars().collect();
    let open_char = text[..open].chars().count();
    let close = matching_close(&chars, open_char, '(', ')')?;
    if close != chars.len() - 1 {
        return None;
    }
    let inner = &text[open + 1..text.len() - 1];
    (!inner.trim().is_empty()).then_some((func, inner))
}

/// Byte offset of the operator the text splits at
///
/// Scans right to left at parenthesis depth 0 and keeps the lowest-precedence
/// operator. Ties go to the rightmost operator, except for `^` where the
/// leftmost wins.
pub fn find_main_operator(text: &str) -> Option<(usize, ArithOp)> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut best: Option<(usize, ArithOp)> = None;

    for i in (0..bytes.len()).rev() {
        match bytes[i] {
            b')' => depth += 1,
            b'(' => depth -= 1,
            b if depth == 0 => {
                let Some(op) = ArithOp::from_byte(b) else {
                    continue;
                };
                if matches!(op, ArithOp::Add | ArithOp::Subtract) && is_unary(bytes, i) {
                    continue;
                }
                if text[..i].trim().is_empty() || text[i + 1..].trim().is_empty() {
                    continue;
                }
                best = match best {
                    None => Some((i, op)),
                    Some((_, current)) if op.precedence() < current.precedence() => Some((i, op)),
                    Some((_, current))
                        if op.precedence() == current.precedence() && op.is_right_associative() =>
                    {
                        Some((i, op))
                    }
                    keep => keep,
                };
            }
            _ => {}
        }
    }
    best
}

/// Sign rather than binary operator: at the start, after an operator or `(`,
/// or as the exponent sign of a numeric literal like `1e-5`
fn is_unary(bytes: &[u8], i: usize) -> bool {
    let mut j = i;
    while j > 0 && bytes[j - 1] == b' ' {
        j -= 1;
    }
    if j == 0 {
        return true;
    }
    let prev = bytes[j - 1];
    if matches!(prev, b'+' | b'-' | b'*' | b'/' | b'^' | b'(') {
        return true;
    }
    if j == i && matches!(prev, b'e' | b'E') && j >= 2 {
        let mut k = j - 1;
        while k > 0 && (bytes[k - 1].is_ascii_digit() || bytes[k - 1] == b'.') {
            k -= 1;
        }
        let mantissa_len = (j - 1) - k;
        let standalone = k == 0 || !(bytes[k - 1].is_ascii_alphanumeric() || bytes[k - 1] == b'_');
        return mantissa_len > 0 && bytes[j - 2].is_ascii_digit() && standalone;
    }
    false
}
