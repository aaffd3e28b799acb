//! Array predicates and aggregations
//!
//! Shared by descriptor values, list operators used directly on a condition,
//! list variable references and the projection stage.

use super::value::{array_input, coerce_number, single};
use super::{Compiler, Scope};
use crate::filter::{Block, ConditionValue, ListConditionDescriptor, OperatorKind};
use serde_json::{json, Value};

/// Normalized array operation
#[derive(Debug, Clone)]
pub(crate) struct ListQuery<'q> {
    pub op: OperatorKind,
    /// Schema path of the array, used to type element fields
    pub array_path: String,
    /// Rendered array reference (`$arr` or `$$this.arr`)
    pub reference: String,
    pub sub_field: Option<&'q str>,
    pub element: Option<&'q Block>,
    pub scalar: Option<&'q Value>,
    pub comparison: Option<OperatorKind>,
    pub comparison_value: Option<&'q Value>,
}

impl<'q> ListQuery<'q> {
    /// From a descriptor; a list operator on the enclosing condition takes
    /// precedence over the descriptor's own, a comparison one fills in a
    /// missing comparison
    pub fn from_descriptor(
        descriptor: &'q ListConditionDescriptor,
        outer: Option<OperatorKind>,
        scope: Scope<'_>,
    ) -> Option<Self> {
        let op = outer
            .filter(|op| op.is_list_operator())
            .or(descriptor.operator)
            .filter(|op| op.is_list_operator())?;
        let field = descriptor.field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self {
            op,
            array_path: scope.schema_path(field),
            reference: scope.reference(field),
            sub_field: descriptor.sub_field(),
            element: descriptor.value.nested(),
            scalar: descriptor.value.literal(),
            comparison: descriptor
                .comparison
                .or(outer.filter(|op| op.is_comparison())),
            comparison_value: descriptor.comparison_value.as_ref(),
        })
    }

    /// From a condition whose own operator is a list operator
    pub fn from_condition(
        field: &str,
        op: OperatorKind,
        value: &'q ConditionValue,
        scope: Scope<'_>,
    ) -> Self {
        Self {
            op,
            array_path: scope.schema_path(field),
            reference: scope.reference(field),
            sub_field: None,
            element: value.nested(),
            scalar: value.literal(),
            comparison: None,
            comparison_value: None,
        }
    }

    /// Value an aggregate is compared against
    fn target(&self) -> Option<&'q Value> {
        self.comparison_value
            .filter(|v| !v.is_null())
            .or_else(|| self.scalar.filter(|v| !v.is_null() && *v != ""))
    }
}

/// Compiled array operation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ListPredicate {
    Expr(Value),
    /// No element predicate: the field only has to be an array
    IsArray { path: String, reference: String },
}

impl ListPredicate {
    pub fn into_query(self) -> Value {
        match self {
            ListPredicate::Expr(expr) => single("$expr", expr),
            ListPredicate::IsArray { path, .. } => {
                single(path, json!({"$exists": true, "$type": "array"}))
            }
        }
    }

    pub fn into_expr(self) -> Value {
        match self {
            ListPredicate::Expr(expr) => expr,
            ListPredicate::IsArray { reference, .. } => json!({"$isArray": reference}),
        }
    }
}

impl Compiler<'_> {
    pub(crate) fn list_predicate(&self, query: &ListQuery<'_>) -> Option<ListPredicate> {
        match query.op {
            OperatorKind::AnyElementTrue | OperatorKind::AllElementsTrue => {
                Some(ListPredicate::Expr(self.quantifier_expr(query)))
            }
            OperatorKind::Filter => Some(match self.filter_expr(query) {
                Some(filtered) => ListPredicate::Expr(json!({"$gt": [{"$size": filtered}, 0]})),
                None => {
                    tracing::trace!(array = %query.array_path, "filter without element predicate");
                    ListPredicate::IsArray {
                        path: query.array_path.clone(),
                        reference: query.reference.clone(),
                    }
                }
            }),
            op if op.is_aggregation() => Some(ListPredicate::Expr(self.aggregate_comparison(query))),
            _ => None,
        }
    }

    /// Per-element predicate: the nested block, else equality with a scalar
    fn element_predicate(&self, query: &ListQuery<'_>) -> Option<Value> {
        if let Some(block) = query.element {
            let compiled = self.expr_block(block, Scope::element_of(&query.array_path));
            if compiled.is_some() {
                return compiled;
            }
        }
        query
            .scalar
            .filter(|v| !v.is_null() && **v != "")
            .map(|v| json!({"$eq": ["$$this", v]}))
    }

    /// `$anyElementTrue`/`$allElementsTrue` over mapped elements, or over the
    /// array itself when there is no element predicate
    pub(crate) fn quantifier_expr(&self, query: &ListQuery<'_>) -> Value {
        let input = array_input(query.reference.as_str());
        let operand = match self.element_predicate(query) {
            Some(predicate) => json!({"$map": {"input": input, "in": predicate}}),
            None => input,
        };
        single(query.op.as_str(), operand)
    }

    pub(crate) fn filter_expr(&self, query: &ListQuery<'_>) -> Option<Value> {
        let cond = self.element_predicate(query)?;
        Some(json!({"$filter": {
            "input": array_input(query.reference.as_str()),
            "cond": cond,
        }}))
    }

    pub(crate) fn aggregate_expr(&self, query: &ListQuery<'_>) -> Value {
        let path = match query.sub_field {
            Some(sub) => format!("{}.{}", query.reference, sub),
            None => query.reference.clone(),
        };
        single(query.op.as_str(), Value::String(path))
    }

    /// Aggregate compared with the comparison sub-operator (default `$eq`);
    /// without a target the aggregate must be positive
    fn aggregate_comparison(&self, query: &ListQuery<'_>) -> Value {
        let aggregate = self.aggregate_expr(query);
        match query.target() {
            Some(target) => {
                let cmp = query
                    .comparison
                    .filter(|op| op.is_comparison())
                    .unwrap_or(OperatorKind::Eq);
                single(cmp.as_str(), json!([aggregate, coerce_number(target)]))
            }
            None => json!({"$gt": [aggregate, 0]}),
        }
    }
}
