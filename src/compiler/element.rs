//! Aggregation-expression form
//!
//! Used for per-element predicates (`$$this.field`), for negated named blocks
//! materialized in the projection stage, and for variable comparisons under
//! `$expr`. Everything here is a boolean aggregation expression, never a
//! query document.

use super::list::{ListPredicate, ListQuery};
use super::value::{
    array_input, as_f64, coerce_for, combine, is_false, literal_pattern, negate_expr,
    range_bounds, regex_text, single, wrap_array, NULL,
};
use super::{Compiler, Scope};
use crate::config::{FieldType, ListShape, ListVariable};
use crate::expression::{json_number, ArithExpr};
use crate::filter::{Block, Condition, ConditionValue, Node, OperatorKind};
use crate::resolver::FieldKind;
use serde_json::{json, Value};

impl Compiler<'_> {
    /// A block, negated when it is a negated named block
    pub(crate) fn expr_block(&self, block: &Block, scope: Scope<'_>) -> Option<Value> {
        let combined = self.expr_children(block, scope)?;
        Some(if block.is_negated_named() {
            negate_expr(combined)
        } else {
            combined
        })
    }

    /// A block's children combined with its logic, ignoring its own negation
    pub(crate) fn expr_children(&self, block: &Block, scope: Scope<'_>) -> Option<Value> {
        let parts = block
            .children
            .iter()
            .filter_map(|child| match child {
                Node::Block(b) => self.expr_block(b, scope),
                Node::Condition(c) => self.expr_condition(c, scope),
            })
            .collect();
        combine(block.logic, parts)
    }

    pub(crate) fn expr_condition(&self, condition: &Condition, scope: Scope<'_>) -> Option<Value> {
        let (Some(field), Some(op)) = (condition.field_name(), condition.operator) else {
            tracing::trace!(id = %condition.id, "incomplete condition skipped");
            return None;
        };

        let expr = match self.resolver.classify(field) {
            FieldKind::List(variable, shape) => {
                return self.expr_list_reference(condition, op, variable, shape)
            }
            FieldKind::Arithmetic(_) => match self.resolver.expand_arithmetic(field, self.config) {
                Some(tree) => self.compare_expr(
                    self.arithmetic_expr(&tree, scope),
                    op,
                    condition.value.literal()?,
                    Some(FieldType::Number),
                ),
                None => self.expr_base(field, op, &condition.value, scope),
            },
            FieldKind::Base => self.expr_base(field, op, &condition.value, scope),
        }?;

        Some(if condition.is_negated() {
            negate_expr(expr)
        } else {
            expr
        })
    }

    /// Render an expanded variable for an expression context
    ///
    /// Aggregate list variables are inlined from their definition: their
    /// projected field is not visible inside the projection stage itself, and
    /// under `$$this` a leaf would resolve against the element.
    pub(crate) fn arithmetic_expr(&self, tree: &ArithExpr, scope: Scope<'_>) -> Value {
        tree.to_mongo_with(scope.fields, &mut |leaf| match self.resolver.classify(leaf) {
            FieldKind::List(variable, ListShape::Aggregate) => {
                ListQuery::from_descriptor(&variable.list_condition, None, Scope::document())
                    .map(|query| self.aggregate_expr(&query))
            }
            _ => None,
        })
    }

    fn expr_base(
        &self,
        field: &str,
        op: OperatorKind,
        value: &ConditionValue,
        scope: Scope<'_>,
    ) -> Option<Value> {
        if let ConditionValue::List(descriptor) = value {
            let query = ListQuery::from_descriptor(descriptor, Some(op), scope)?;
            return self.list_predicate(&query).map(ListPredicate::into_expr);
        }
        if op.is_list_operator() {
            let query = ListQuery::from_condition(field, op, value, scope);
            return self.list_predicate(&query).map(ListPredicate::into_expr);
        }
        let field_type = self.resolver.field_type(&scope.schema_path(field));
        self.compare_expr(
            Value::String(scope.reference(field)),
            op,
            value.literal()?,
            field_type,
        )
    }

    /// Inline a list variable's definition
    ///
    /// List variable definitions are document level, so their array is always
    /// referenced from the root regardless of the surrounding scope. The
    /// condition's switch overrides a quantifier's stored one.
    pub(crate) fn expr_list_reference(
        &self,
        condition: &Condition,
        op: OperatorKind,
        variable: &ListVariable,
        shape: ListShape,
    ) -> Option<Value> {
        let descriptor = &variable.list_condition;
        let query = ListQuery::from_descriptor(descriptor, None, Scope::document())?;
        let literal = condition.value.literal().unwrap_or(NULL);

        let expr = match shape {
            ListShape::Quantifier => {
                let mut expr = self.quantifier_expr(&query);
                if compares_with_false(condition, op) {
                    expr = negate_expr(expr);
                }
                let switch = condition
                    .boolean_switch
                    .or(descriptor.boolean_switch)
                    .unwrap_or(true);
                return Some(if switch { expr } else { negate_expr(expr) });
            }
            ListShape::Aggregate => self.compare_expr(
                self.aggregate_expr(&query),
                op,
                literal,
                Some(FieldType::Number),
            )?,
            ListShape::Filter => {
                let filtered = self
                    .filter_expr(&query)
                    .unwrap_or_else(|| array_input(query.reference.as_str()));
                self.array_condition(filtered, op, literal)?
            }
        };

        Some(if condition.is_negated() {
            negate_expr(expr)
        } else {
            expr
        })
    }

    /// Condition on an array-valued expression; anything but a length or
    /// presence test means "not empty"
    pub(crate) fn array_condition(
        &self,
        array: Value,
        op: OperatorKind,
        value: &Value,
    ) -> Option<Value> {
        match op {
            OperatorKind::LengthGt | OperatorKind::LengthLt | OperatorKind::Exists => {
                self.compare_expr(array, op, value, Some(FieldType::Array))
            }
            _ => Some(json!({"$gt": [{"$size": array_input(array)}, 0]})),
        }
    }

    /// Compare an expression against a literal
    pub(crate) fn compare_expr(
        &self,
        lhs: Value,
        op: OperatorKind,
        value: &Value,
        field_type: Option<FieldType>,
    ) -> Option<Value> {
        let expr = match op {
            OperatorKind::Eq
            | OperatorKind::Ne
            | OperatorKind::Gt
            | OperatorKind::Gte
            | OperatorKind::Lt
            | OperatorKind::Lte => single(op.as_str(), json!([lhs, coerce_for(field_type, value)])),
            OperatorKind::In => json!({"$in": [lhs, wrap_array(value)]}),
            OperatorKind::Nin => negate_expr(json!({"$in": [lhs, wrap_array(value)]})),
            OperatorKind::Regex => self.regex_match(lhs, regex_text(value)),
            OperatorKind::Contains => self.regex_match(lhs, literal_pattern(value, false, false)),
            OperatorKind::StartsWith => self.regex_match(lhs, literal_pattern(value, true, false)),
            OperatorKind::EndsWith => self.regex_match(lhs, literal_pattern(value, false, true)),
            OperatorKind::Exists => {
                let cmp = if is_false(value) { "$eq" } else { "$ne" };
                single(cmp, json!([{"$type": lhs}, "missing"]))
            }
            OperatorKind::IsNumber => json!({"$isNumber": lhs}),
            OperatorKind::Between => {
                let (low, high) = range_bounds(value)?;
                json!({"$and": [{"$gte": [lhs.clone(), low]}, {"$lte": [lhs, high]}]})
            }
            OperatorKind::NotBetween => {
                let (low, high) = range_bounds(value)?;
                json!({"$or": [{"$lt": [lhs.clone(), low]}, {"$gt": [lhs, high]}]})
            }
            OperatorKind::LengthGt => {
                let n = as_f64(value)?;
                if n < 0.0 {
                    Value::Bool(true)
                } else {
                    json!({"$gt": [{"$size": array_input(lhs)}, json_number(n)]})
                }
            }
            OperatorKind::LengthLt => {
                let n = as_f64(value)?;
                if n <= 0.0 {
                    Value::Bool(false)
                } else {
                    json!({"$lt": [{"$size": array_input(lhs)}, json_number(n)]})
                }
            }
            _ => {
                tracing::trace!(operator = %op, "list operator without array context");
                return None;
            }
        };
        Some(expr)
    }

    fn regex_match(&self, input: Value, pattern: String) -> Value {
        json!({"$regexMatch": {
            "input": input,
            "regex": pattern,
            "options": self.config.regex_options,
        }})
    }
}

/// `$eq false` or `$ne true` against a boolean-valued reference
fn compares_with_false(condition: &Condition, op: OperatorKind) -> bool {
    let Some(value) = condition.value.literal() else {
        return false;
    };
    match coerce_for(Some(FieldType::Boolean), value) {
        Value::Bool(b) => matches!((op, b), (OperatorKind::Eq, false) | (OperatorKind::Ne, true)),
        _ => false,
    }
}
