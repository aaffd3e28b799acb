//! Query-document form of the match stage

use super::list::{ListPredicate, ListQuery};
use super::value::{
    array_input, as_f64, coerce_for, combine, is_false, literal_pattern, negate_query,
    range_bounds, regex_text, single, wrap_array, NULL,
};
use super::{Compiler, Scope};
use crate::config::{FieldType, ListShape, ListVariable};
use crate::expression::FieldScope;
use crate::filter::{Block, Condition, ConditionValue, Node, OperatorKind};
use crate::resolver::FieldKind;
use serde_json::{json, Value};

impl Compiler<'_> {
    pub(crate) fn match_block(&self, block: &Block) -> Option<Value> {
        if block.is_negated_named() {
            let projected = self.projected_blocks.iter().find(|(_, b)| b == block);
            if let Some((name, _)) = projected {
                return Some(single(name.as_str(), Value::Bool(false)));
            }
            tracing::debug!(block = %block.id, "negated block has no predicate to reference");
            return None;
        }

        let parts = block
            .children
            .iter()
            .filter_map(|child| match child {
                Node::Block(b) => self.match_block(b),
                Node::Condition(c) => self.match_condition(c),
            })
            .collect();
        combine(block.logic, parts)
    }

    pub(crate) fn match_condition(&self, condition: &Condition) -> Option<Value> {
        let (Some(field), Some(op)) = (condition.field_name(), condition.operator) else {
            tracing::trace!(id = %condition.id, "incomplete condition skipped");
            return None;
        };

        let fragment = match self.resolver.classify(field) {
            FieldKind::List(variable, shape) => {
                return self.match_list_reference(condition, op, variable, shape)
            }
            FieldKind::Arithmetic(_) => match self.resolver.expand_arithmetic(field, self.config) {
                Some(tree) => self
                    .compare_expr(
                        tree.to_mongo(FieldScope::Document),
                        op,
                        condition.value.literal()?,
                        Some(FieldType::Number),
                    )
                    .map(|expr| single("$expr", expr)),
                None => {
                    tracing::debug!(variable = field, "variable without expression, using field path");
                    self.match_base(field, op, &condition.value)
                }
            },
            FieldKind::Base => self.match_base(field, op, &condition.value),
        }?;

        Some(if condition.is_negated() {
            negate_query(fragment)
        } else {
            fragment
        })
    }

    fn match_base(&self, field: &str, op: OperatorKind, value: &ConditionValue) -> Option<Value> {
        if let ConditionValue::List(descriptor) = value {
            let query = ListQuery::from_descriptor(descriptor, Some(op), Scope::document())?;
            return self.list_predicate(&query).map(ListPredicate::into_query);
        }
        if op.is_list_operator() {
            let query = ListQuery::from_condition(field, op, value, Scope::document());
            return self.list_predicate(&query).map(ListPredicate::into_query);
        }
        self.compare_query(field, op, value.literal()?, self.resolver.field_type(field))
    }

    /// Reference to a list variable
    ///
    /// Materialized variables compare against their projected field; all
    /// others are inlined as an expression.
    fn match_list_reference(
        &self,
        condition: &Condition,
        op: OperatorKind,
        variable: &ListVariable,
        shape: ListShape,
    ) -> Option<Value> {
        let name = variable.name.trim();
        if !shape.is_materialized() || !self.projected_lists.contains(name) {
            return self
                .expr_list_reference(condition, op, variable, shape)
                .map(|expr| single("$expr", expr));
        }

        let literal = condition.value.literal().unwrap_or(NULL);
        let fragment = match (shape, op) {
            (ListShape::Filter, OperatorKind::LengthGt | OperatorKind::LengthLt | OperatorKind::Exists) => {
                self.compare_query(name, op, literal, Some(FieldType::Array))?
            }
            (ListShape::Filter, _) => json!({"$expr": {
                "$gt": [{"$size": array_input(format!("${}", name))}, 0]
            }}),
            _ => self.compare_query(name, op, literal, Some(FieldType::Number))?,
        };

        Some(if condition.is_negated() {
            negate_query(fragment)
        } else {
            fragment
        })
    }

    /// `{field: {$op: value}}` for the non-array operators
    pub(crate) fn compare_query(
        &self,
        field: &str,
        op: OperatorKind,
        value: &Value,
        field_type: Option<FieldType>,
    ) -> Option<Value> {
        let boolean = field_type == Some(FieldType::Boolean) || value.is_boolean();
        let predicate = match op {
            OperatorKind::Eq if boolean => json!({"$in": [coerce_for(field_type, value)]}),
            OperatorKind::Ne if boolean => json!({"$nin": [coerce_for(field_type, value)]}),
            OperatorKind::Eq
            | OperatorKind::Ne
            | OperatorKind::Gt
            | OperatorKind::Gte
            | OperatorKind::Lt
            | OperatorKind::Lte => single(op.as_str(), coerce_for(field_type, value)),
            OperatorKind::In | OperatorKind::Nin => single(op.as_str(), wrap_array(value)),
            OperatorKind::Regex => self.regex_query(regex_text(value)),
            OperatorKind::Contains => self.regex_query(literal_pattern(value, false, false)),
            OperatorKind::StartsWith => self.regex_query(literal_pattern(value, true, false)),
            OperatorKind::EndsWith => self.regex_query(literal_pattern(value, false, true)),
            OperatorKind::Exists => json!({"$exists": !is_false(value)}),
            OperatorKind::IsNumber => {
                return Some(json!({"$expr": {"$isNumber": format!("${}", field)}}))
            }
            OperatorKind::Between => {
                let (low, high) = range_bounds(value)?;
                json!({"$gte": low, "$lte": high})
            }
            OperatorKind::NotBetween => {
                let (low, high) = range_bounds(value)?;
                return Some(json!({"$or": [
                    single(field, json!({"$lt": low})),
                    single(field, json!({"$gt": high})),
                ]}));
            }
            OperatorKind::LengthGt => {
                let n = as_f64(value)?;
                if n < 0.0 {
                    return Some(json!({"$expr": true}));
                }
                let index = n.floor() as i64;
                return Some(single(format!("{}.{}", field, index), json!({"$exists": true})));
            }
            OperatorKind::LengthLt => {
                let n = as_f64(value)?;
                if n <= 0.0 {
                    return Some(json!({"$expr": false}));
                }
                let index = n.ceil() as i64 - 1;
                return Some(single(format!("{}.{}", field, index), json!({"$exists": false})));
            }
            _ => {
                tracing::trace!(operator = %op, field, "list operator without array context");
                return None;
            }
        };
        Some(single(field, predicate))
    }

    fn regex_query(&self, pattern: String) -> Value {
        json!({"$regex": pattern, "$options": self.config.regex_options})
    }
}
