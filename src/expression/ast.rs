//! Arithmetic expression tree and its aggregation-expression rendering

use serde_json::{json, Map, Number, Value};
use std::fmt;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Subtract,
    /// Multiplication (*)
    Multiply,
    /// Division (/)
    Divide,
    /// Exponentiation (^)
    Power,
}

impl ArithOp {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(ArithOp::Add),
            b'-' => Some(ArithOp::Subtract),
            b'*' => Some(ArithOp::Multiply),
            b'/' => Some(ArithOp::Divide),
            b'^' => Some(ArithOp::Power),
            _ => None,
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Subtract => 1,
            ArithOp::Multiply | ArithOp::Divide => 2,
            ArithOp::Power => 3,
        }
    }

    pub fn is_right_associative(self) -> bool {
        self == ArithOp::Power
    }

    pub fn symbol(self) -> char {
        match self {
            ArithOp::Add => '+',
            ArithOp::Subtract => '-',
            ArithOp::Multiply => '*',
            ArithOp::Divide => '/',
            ArithOp::Power => '^',
        }
    }

    pub fn mongo_key(self) -> &'static str {
        match self {
            ArithOp::Add => "$add",
            ArithOp::Subtract => "$subtract",
            ArithOp::Multiply => "$multiply",
            ArithOp::Divide => "$divide",
            ArithOp::Power => "$pow",
        }
    }
}

/// Unary math functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    /// Base-10 logarithm
    Log,
    /// Natural logarithm
    Ln,
}

impl MathFunction {
    pub const ALL: [MathFunction; 7] = [
        MathFunction::Abs,
        MathFunction::Sqrt,
        MathFunction::Sin,
        MathFunction::Cos,
        MathFunction::Tan,
        MathFunction::Log,
        MathFunction::Ln,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "abs" => Some(MathFunction::Abs),
            "sqrt" => Some(MathFunction::Sqrt),
            "sin" => Some(MathFunction::Sin),
            "cos" => Some(MathFunction::Cos),
            "tan" => Some(MathFunction::Tan),
            "log" => Some(MathFunction::Log),
            "ln" => Some(MathFunction::Ln),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MathFunction::Abs => "abs",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Tan => "tan",
            MathFunction::Log => "log",
            MathFunction::Ln => "ln",
        }
    }

    pub fn mongo_key(self) -> &'static str {
        match self {
            MathFunction::Abs => "$abs",
            MathFunction::Sqrt => "$sqrt",
            MathFunction::Sin => "$sin",
            MathFunction::Cos => "$cos",
            MathFunction::Tan => "$tan",
            MathFunction::Log => "$log10",
            MathFunction::Ln => "$ln",
        }
    }
}

/// How field leaves are referenced when rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FieldScope {
    /// Relative to the document root (`$path`)
    #[default]
    Document,
    /// Relative to the current array element (`$$this.path`)
    ArrayElement,
}

impl FieldScope {
    /// Reference string for a field path in this scope
    pub fn field_ref(self, path: &str) -> String {
        if path.starts_with('$') {
            return path.to_string();
        }
        if path == "this" || path.starts_with("this.") {
            return format!("$${}", path);
        }
        match self {
            FieldScope::Document => format!("${}", path),
            FieldScope::ArrayElement => format!("$$this.{}", path),
        }
    }
}

/// Parsed arithmetic expression
#[derive(Debug, Clone, PartialEq)]
pub enum ArithExpr {
    Number(f64),
    /// Field path, or the raw text of an input that could not be parsed
    Field(String),
    Binary {
        op: ArithOp,
        left: Box<ArithExpr>,
        right: Box<ArithExpr>,
    },
    Call {
        func: MathFunction,
        arg: Box<ArithExpr>,
    },
    Negate(Box<ArithExpr>),
}

impl ArithExpr {
    pub fn binary(op: ArithOp, left: ArithExpr, right: ArithExpr) -> Self {
        ArithExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(func: MathFunction, arg: ArithExpr) -> Self {
        ArithExpr::Call {
            func,
            arg: Box::new(arg),
        }
    }

    pub fn field(path: impl Into<String>) -> Self {
        ArithExpr::Field(path.into())
    }

    /// Render as an aggregation expression
    pub fn to_mongo(&self, scope: FieldScope) -> Value {
        self.to_mongo_with(scope, &mut |_| None)
    }

    /// Render, letting `leaf` supply the expression for a field leaf
    pub fn to_mongo_with<F>(&self, scope: FieldScope, leaf: &mut F) -> Value
    where
        F: FnMut(&str) -> Option<Value>,
    {
        match self {
            ArithExpr::Number(n) => json_number(*n),
            ArithExpr::Field(path) => {
                leaf(path).unwrap_or_else(|| Value::String(scope.field_ref(path)))
            }
            ArithExpr::Binary { op, left, right } => {
                let left = left.to_mongo_with(scope, leaf);
                let right = right.to_mongo_with(scope, leaf);
                single(op.mongo_key(), json!([left, right]))
            }
            ArithExpr::Call { func, arg } => single(func.mongo_key(), arg.to_mongo_with(scope, leaf)),
            ArithExpr::Negate(inner) => {
                single("$multiply", json!([-1, inner.to_mongo_with(scope, leaf)]))
            }
        }
    }

    /// Field leaves in left-to-right order
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ArithExpr::Number(_) => {}
            ArithExpr::Field(path) => out.push(path),
            ArithExpr::Binary { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            ArithExpr::Call { arg, .. } | ArithExpr::Negate(arg) => arg.collect_fields(out),
        }
    }

    /// Replace field leaves for which `f` returns a subtree
    pub fn substitute<F>(&self, f: &mut F) -> ArithExpr
    where
        F: FnMut(&str) -> Option<ArithExpr>,
    {
        match self {
            ArithExpr::Number(n) => ArithExpr::Number(*n),
            ArithExpr::Field(path) => f(path).unwrap_or_else(|| ArithExpr::Field(path.clone())),
            ArithExpr::Binary { op, left, right } => {
                ArithExpr::binary(*op, left.substitute(f), right.substitute(f))
            }
            ArithExpr::Call { func, arg } => ArithExpr::call(*func, arg.substitute(f)),
            ArithExpr::Negate(inner) => ArithExpr::Negate(Box::new(inner.substitute(f))),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            ArithExpr::Number(_) | ArithExpr::Field(_) => 1,
            ArithExpr::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
            ArithExpr::Call { arg, .. } | ArithExpr::Negate(arg) => 1 + arg.depth(),
        }
    }
}

/// Fully parenthesized infix form; parses back to the same tree
impl fmt::Display for ArithExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithExpr::Number(n) => write!(f, "{}", n),
            ArithExpr::Field(path) => f.write_str(path),
            ArithExpr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ArithExpr::Call { func, arg } => write!(f, "{}({})", func.name(), arg),
            ArithExpr::Negate(inner) => write!(f, "-({})", inner),
        }
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// JSON number, as an integer when the value is whole
pub fn json_number(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
