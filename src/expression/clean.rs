//! Normalization of LaTeX math notation into plain infix text
//!
//! After cleaning, fractions, function bodies and absolute values are all
//! parenthesized, so the splitter only has to track one kind of bracket.

use crate::expression::parser::DEFAULT_MAX_DEPTH;
use once_cell::sync::Lazy;
use regex::Regex;

static SUBSCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_\{([^{}]*)\}").expect("static regex"));

static BACKSLASH_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(sqrt|sin|cos|tan|log|ln|abs)\b").expect("static regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

const ABS_OPEN: char = '\u{1}';
const ABS_CLOSE: char = '\u{2}';

/// Normalize a math-notation string
pub fn clean(raw: &str) -> String {
    clean_with_depth(raw, DEFAULT_MAX_DEPTH)
}

/// Normalize, expanding fractions nested at most `max_depth` deep
///
/// Deeper fractions are left as written and end up as raw field text.
pub fn clean_with_depth(raw: &str, max_depth: usize) -> String {
    let text = expand_fractions(raw, max_depth);
    let text = SUBSCRIPT.replace_all(&text, "_$1").into_owned();
    let text = replace_delimiters(&text);
    let text = BACKSLASH_FUNCTION.replace_all(&text, "$1").into_owned();
    let text = unify_abs(&text);
    let text: String = text
        .chars()
        .map(|c| match c {
            '{' | '[' => '(',
            '}' | ']' => ')',
            c => c,
        })
        .collect();
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Index of the bracket closing the one at `open`
pub fn matching_close(chars: &[char], open: usize, open_ch: char, close_ch: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        if c == open_ch {
            depth += 1;
        } else if c == close_ch {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Braced argument starting at or after `from`, skipping whitespace
fn braced_arg(chars: &[char], from: usize) -> Option<(String, usize)> {
    let mut start = from;
    while chars.get(start).is_some_and(|c| c.is_whitespace()) {
        start += 1;
    }
    if chars.get(start) != Some(&'{') {
        return None;
    }
    let end = matching_close(chars, start, '{', '}')?;
    Some((chars[start + 1..end].iter().collect(), end + 1))
}

/// `\frac{a}{b}` → `(a)/(b)`, nested fractions included up to `budget` levels
fn expand_fractions(input: &str, budget: usize) -> String {
    const COMMANDS: [&str; 3] = ["\\dfrac", "\\tfrac", "\\frac"];

    if budget == 0 {
        tracing::debug!(len = input.len(), "fraction nesting too deep, left unexpanded");
        return input.to_string();
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let command = COMMANDS.iter().find(|cmd| {
            cmd.chars()
                .enumerate()
                .all(|(k, c)| chars.get(i + k) == Some(&c))
        });
        if let Some(cmd) = command {
            let after = i + cmd.chars().count();
            let parsed = braced_arg(&chars, after)
                .and_then(|(num, next)| braced_arg(&chars, next).map(|(den, end)| (num, den, end)));
            if let Some((num, den, end)) = parsed {
                out.push('(');
                out.push_str(&expand_fractions(&num, budget - 1));
                out.push_str(")/(");
                out.push_str(&expand_fractions(&den, budget - 1));
                out.push(')');
                i = end;
                continue;
            }
            tracing::trace!(input, "malformed fraction left unexpanded");
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn replace_delimiters(input: &str) -> String {
    input
        .replace("\\left|", &ABS_OPEN.to_string())
        .replace("\\right|", &ABS_CLOSE.to_string())
        .replace("\\left\\{", "(")
        .replace("\\right\\}", ")")
        .replace("\\left(", "(")
        .replace("\\right)", ")")
        .replace("\\left[", "(")
        .replace("\\right]", ")")
        .replace("\\left.", "")
        .replace("\\right.", "")
        .replace("\\cdot", "*")
        .replace("\\times", "*")
        .replace("\\div", "/")
        .replace("\\,", " ")
        .replace("\\;", " ")
        .replace("\\!", "")
        .replace("left|", &ABS_OPEN.to_string())
        .replace("|right", &ABS_CLOSE.to_string())
}

/// Rewrite every absolute-value form into `abs(...)` with balanced parentheses
///
/// A bare `|` opens when it starts an operand (input start, after an operator,
/// after `(` or right after another opening bar) and closes otherwise. Bars
/// left open at the end are closed; a close with nothing open is dropped.
fn unify_abs(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut open = 0usize;

    for c in input.chars() {
        match c {
            ABS_OPEN => {
                out.push_str("abs(");
                open += 1;
            }
            ABS_CLOSE => {
                if open > 0 {
                    out.push(')');
                    open -= 1;
                }
            }
            '|' => {
                if open == 0 || starts_operand(&out) {
                    out.push_str("abs(");
                    open += 1;
                } else {
                    out.push(')');
                    open -= 1;
                }
            }
            c => out.push(c),
        }
    }
    for _ in 0..open {
        out.push(')');
    }
    out
}

fn starts_operand(out: &str) -> bool {
    let trimmed = out.trim_end();
    if trimmed.ends_with("abs(") {
        return true;
    }
    match trimmed.chars().last() {
        None => true,
        Some(c) => matches!(c, '+' | '-' | '*' | '/' | '^' | '(' | '{' | '[' | ','),
    }
}
